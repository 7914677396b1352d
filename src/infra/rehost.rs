//! Re-hosting for images the platform cannot fetch itself.
//!
//! Downloads the payload, runs the bounded RGB/JPEG re-encode, and uploads
//! the result to the media host under a staging tag, returning the public
//! locator the publish pipeline should use instead.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{info, warn};
use url::Url;

use crate::application::library::MediaHost;
use crate::application::publish::{ImageRehoster, PublishError};
use crate::domain::images::DishName;
use crate::infra::error::InfraError;
use crate::infra::image_ops::{RecodeBudget, recode_for_publish};

pub struct RehostService {
    http: Client,
    host: Arc<dyn MediaHost>,
    budget: RecodeBudget,
    staging_tag: DishName,
}

impl RehostService {
    pub fn new(
        host: Arc<dyn MediaHost>,
        budget: RecodeBudget,
        staging_tag: DishName,
    ) -> Result<Self, InfraError> {
        let http = Client::builder()
            .user_agent(concat!("plateful/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| {
                InfraError::configuration(format!("failed to build rehost client: {err}"))
            })?;
        Ok(Self {
            http,
            host,
            budget,
            staging_tag,
        })
    }
}

#[async_trait]
impl ImageRehoster for RehostService {
    async fn rehost(&self, locator: &Url) -> Result<Url, PublishError> {
        let response = self
            .http
            .get(locator.clone())
            .send()
            .await
            .map_err(PublishError::transport)?;
        if !response.status().is_success() {
            return Err(PublishError::transport(format!(
                "image fetch returned {}",
                response.status()
            )));
        }
        let payload = response.bytes().await.map_err(PublishError::transport)?;

        let encoded = recode_for_publish(&payload, &self.budget)
            .map_err(|err| PublishError::recode(err.to_string()))?;

        let stem = locator
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .map(|name| name.rsplit_once('.').map_or(name, |(base, _)| base))
            .filter(|base| !base.is_empty())
            .unwrap_or("image");
        let filename = format!("{stem}.jpg");

        let asset = self
            .host
            .upload_tagged(&filename, encoded, &self.staging_tag)
            .await?;
        if let Err(err) = self
            .host
            .set_context(&asset.locator, "origin", locator.as_str())
            .await
        {
            warn!(
                target = "infra::rehost",
                error = %err,
                "failed to record origin metadata on re-hosted asset"
            );
        }
        info!(
            target = "infra::rehost",
            original = %locator,
            rehosted = %asset.locator,
            "image re-encoded and re-hosted"
        );
        Ok(asset.locator)
    }
}

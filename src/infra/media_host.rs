//! Tag-based media host client and the hosted image index over it.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, multipart};
use serde::Deserialize;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use url::Url;

use crate::application::library::{
    ImageStore, MediaHost, NewImage, RemoteAsset, StoreError,
};
use crate::domain::images::{DishName, ImageRecord};
use crate::infra::error::InfraError;

/// REST client for a media host that stores assets under tags and supports
/// tag search, retagging, and context metadata.
pub struct TaggedMediaClient {
    http: Client,
    base: Url,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct AssetPayload {
    secure_url: Url,
    #[serde(default, with = "time::serde::rfc3339::option")]
    created_at: Option<OffsetDateTime>,
}

#[derive(Debug, Deserialize)]
struct SearchPayload {
    #[serde(default)]
    resources: Vec<AssetPayload>,
}

impl TaggedMediaClient {
    pub fn new(base: Url, api_key: String) -> Result<Self, InfraError> {
        let http = Client::builder()
            .user_agent(user_agent())
            .build()
            .map_err(|err| {
                InfraError::configuration(format!("failed to build media host client: {err}"))
            })?;
        Ok(Self {
            http,
            base,
            api_key,
        })
    }

    fn url(&self, path: &str) -> Result<Url, StoreError> {
        self.base
            .join(path)
            .map_err(|err| StoreError::from_persistence(format!("bad media host path: {err}")))
    }

    async fn expect_success(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::from_persistence(format!(
                "media host returned {status}: {body}"
            )));
        }
        Ok(response)
    }

    fn asset(payload: AssetPayload) -> RemoteAsset {
        RemoteAsset {
            locator: payload.secure_url,
            created_at: payload.created_at.unwrap_or_else(OffsetDateTime::now_utc),
        }
    }
}

fn user_agent() -> &'static str {
    concat!("plateful/", env!("CARGO_PKG_VERSION"))
}

#[async_trait]
impl MediaHost for TaggedMediaClient {
    async fn upload_tagged(
        &self,
        filename: &str,
        payload: Bytes,
        tag: &DishName,
    ) -> Result<RemoteAsset, StoreError> {
        let form = multipart::Form::new()
            .text("tags", tag.as_str().to_string())
            .part(
                "file",
                multipart::Part::bytes(payload.to_vec()).file_name(filename.to_string()),
            );
        let response = self
            .http
            .post(self.url("upload")?)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(StoreError::from_persistence)?;
        let response = Self::expect_success(response).await?;
        let payload: AssetPayload = response
            .json()
            .await
            .map_err(StoreError::from_persistence)?;
        Ok(Self::asset(payload))
    }

    async fn search_by_tag(&self, tag: &DishName) -> Result<Vec<RemoteAsset>, StoreError> {
        let response = self
            .http
            .get(self.url("resources/search")?)
            .bearer_auth(&self.api_key)
            .query(&[("tag", tag.as_str())])
            .send()
            .await
            .map_err(StoreError::from_persistence)?;
        let response = Self::expect_success(response).await?;
        let payload: SearchPayload = response
            .json()
            .await
            .map_err(StoreError::from_persistence)?;
        Ok(payload.resources.into_iter().map(Self::asset).collect())
    }

    async fn replace_tag(
        &self,
        locator: &Url,
        from: &DishName,
        to: &DishName,
    ) -> Result<(), StoreError> {
        let body = serde_json::json!({
            "asset": locator,
            "remove": from.as_str(),
            "add": to.as_str(),
        });
        let response = self
            .http
            .post(self.url("resources/retag")?)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(StoreError::from_persistence)?;
        Self::expect_success(response).await.map(|_| ())
    }

    async fn remove_asset(&self, locator: &Url) -> Result<(), StoreError> {
        let response = self
            .http
            .delete(self.url("resources")?)
            .bearer_auth(&self.api_key)
            .query(&[("asset", locator.as_str())])
            .send()
            .await
            .map_err(StoreError::from_persistence)?;
        Self::expect_success(response).await.map(|_| ())
    }

    async fn set_context(&self, locator: &Url, key: &str, value: &str) -> Result<(), StoreError> {
        let body = serde_json::json!({
            "asset": locator,
            "context": { key: value },
        });
        let response = self
            .http
            .post(self.url("resources/context")?)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(StoreError::from_persistence)?;
        Self::expect_success(response).await.map(|_| ())
    }
}

/// Image index backed by the remote media host.
///
/// The host offers search-by-tag but no tag listing, so the known dish-tag
/// universe is tracked here: seeded from configuration and extended on
/// every add or move.
pub struct HostedLibrary {
    host: Arc<dyn MediaHost>,
    tags: RwLock<BTreeSet<DishName>>,
}

impl HostedLibrary {
    pub fn new(host: Arc<dyn MediaHost>, seed_tags: Vec<DishName>) -> Self {
        Self {
            host,
            tags: RwLock::new(seed_tags.into_iter().collect()),
        }
    }
}

#[async_trait]
impl ImageStore for HostedLibrary {
    async fn list_all(&self) -> Result<BTreeMap<DishName, Vec<ImageRecord>>, StoreError> {
        let tags: Vec<DishName> = self.tags.read().await.iter().cloned().collect();
        let mut snapshot = BTreeMap::new();
        for dish in tags {
            let assets = self.host.search_by_tag(&dish).await?;
            if assets.is_empty() {
                continue;
            }
            let records = assets
                .into_iter()
                .map(|asset| ImageRecord {
                    locator: asset.locator,
                    dish: dish.clone(),
                    created_at: asset.created_at,
                })
                .collect();
            snapshot.insert(dish, records);
        }
        Ok(snapshot)
    }

    async fn add(&self, image: NewImage, dish: &DishName) -> Result<ImageRecord, StoreError> {
        let asset = self
            .host
            .upload_tagged(&image.original_name, image.payload, dish)
            .await?;
        self.tags.write().await.insert(dish.clone());
        Ok(ImageRecord {
            locator: asset.locator,
            dish: dish.clone(),
            created_at: asset.created_at,
        })
    }

    async fn remove(&self, locator: &Url) -> Result<(), StoreError> {
        self.host.remove_asset(locator).await
    }

    async fn recategorize(
        &self,
        locator: &Url,
        from: &DishName,
        to: &DishName,
    ) -> Result<(), StoreError> {
        // One retag call swaps both tags upstream, so the move cannot be
        // observed half-applied.
        self.host.replace_tag(locator, from, to).await?;
        self.tags.write().await.insert(to.clone());
        Ok(())
    }
}

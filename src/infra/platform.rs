//! Photo-platform client: two-phase media publishing and token endpoints.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use time::OffsetDateTime;
use url::Url;

use crate::application::publish::{
    CreationId, PlatformClient, PublishError, RefreshedToken,
};
use crate::domain::types::TokenHealth;
use crate::infra::error::InfraError;

/// Client for a Graph-style publishing API: one endpoint creates a media
/// container from `{image_url, caption}`, a second publishes the container
/// by creation id. Token introspection and long-lived refresh live on
/// separate bases.
pub struct GraphPlatformClient {
    http: Client,
    graph_base: Url,
    refresh_base: Url,
}

impl GraphPlatformClient {
    pub fn new(graph_base: Url, refresh_base: Url) -> Result<Self, InfraError> {
        let http = Client::builder()
            .user_agent(concat!("plateful/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| {
                InfraError::configuration(format!("failed to build platform client: {err}"))
            })?;
        Ok(Self {
            http,
            graph_base,
            refresh_base,
        })
    }

    fn graph_url(&self, path: &str) -> Result<Url, PublishError> {
        self.graph_base
            .join(path)
            .map_err(|err| PublishError::transport(format!("bad platform path: {err}")))
    }
}

fn into_transport(err: reqwest::Error) -> PublishError {
    PublishError::transport(err)
}

#[derive(Debug, Deserialize)]
struct DebugTokenEnvelope {
    data: DebugTokenData,
}

#[derive(Debug, Deserialize)]
struct DebugTokenData {
    is_valid: bool,
    #[serde(default)]
    expires_at: Option<i64>,
    #[serde(default)]
    scopes: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RefreshPayload {
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[async_trait]
impl PlatformClient for GraphPlatformClient {
    async fn create_media(
        &self,
        account: &str,
        token: &str,
        image_url: &Url,
        caption: &str,
    ) -> Result<CreationId, PublishError> {
        let endpoint = self.graph_url(&format!("{account}/media"))?;
        let params = [
            ("image_url", image_url.as_str()),
            ("caption", caption),
            ("access_token", token),
        ];
        let response = self
            .http
            .post(endpoint)
            .form(&params)
            .send()
            .await
            .map_err(into_transport)?;
        let status = response.status();
        let body = response.text().await.map_err(into_transport)?;
        if status.is_server_error() {
            return Err(PublishError::transport(format!("status {status}: {body}")));
        }

        // The raw payload travels with the error: a success-shaped response
        // without an id is still a creation failure.
        let payload: serde_json::Value = serde_json::from_str(&body).unwrap_or_default();
        match payload.get("id").and_then(serde_json::Value::as_str) {
            Some(id) if status.is_success() => Ok(CreationId(id.to_string())),
            _ => Err(PublishError::media_creation(body)),
        }
    }

    async fn publish_media(
        &self,
        account: &str,
        token: &str,
        creation: &CreationId,
    ) -> Result<Option<String>, PublishError> {
        let endpoint = self.graph_url(&format!("{account}/media_publish"))?;
        let params = [
            ("creation_id", creation.0.as_str()),
            ("access_token", token),
        ];
        let response = self
            .http
            .post(endpoint)
            .form(&params)
            .send()
            .await
            .map_err(into_transport)?;
        let status = response.status();
        let body = response.text().await.map_err(into_transport)?;
        if status.is_server_error() {
            return Err(PublishError::transport(format!("status {status}: {body}")));
        }
        if !status.is_success() {
            return Err(PublishError::Publish {
                status: status.as_u16(),
                payload: body,
            });
        }

        let payload: serde_json::Value = serde_json::from_str(&body).unwrap_or_default();
        Ok(payload
            .get("id")
            .and_then(serde_json::Value::as_str)
            .map(ToString::to_string))
    }

    async fn token_status(&self, token: &str) -> Result<TokenHealth, PublishError> {
        let endpoint = self.graph_url("debug_token")?;
        let response = self
            .http
            .get(endpoint)
            .query(&[("input_token", token), ("access_token", token)])
            .send()
            .await
            .map_err(into_transport)?;
        let status = response.status();
        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::transport(format!("status {status}: {body}")));
        }
        if !status.is_success() {
            // The platform refuses introspection for dead tokens; that is
            // an answer, not a failure.
            return Ok(TokenHealth {
                is_valid: false,
                expires_at: None,
                scopes: vec![],
            });
        }

        let envelope: DebugTokenEnvelope = response.json().await.map_err(into_transport)?;
        let expires_at = envelope
            .data
            .expires_at
            .filter(|stamp| *stamp > 0)
            .and_then(|stamp| OffsetDateTime::from_unix_timestamp(stamp).ok());
        Ok(TokenHealth {
            is_valid: envelope.data.is_valid,
            expires_at,
            scopes: envelope.data.scopes,
        })
    }

    async fn refresh_token(&self, token: &str) -> Result<RefreshedToken, PublishError> {
        let endpoint = self
            .refresh_base
            .join("refresh_access_token")
            .map_err(|err| PublishError::transport(format!("bad refresh path: {err}")))?;
        let response = self
            .http
            .get(endpoint)
            .query(&[("grant_type", "ig_refresh_token"), ("access_token", token)])
            .send()
            .await
            .map_err(into_transport)?;
        let status = response.status();
        let body = response.text().await.map_err(into_transport)?;
        if status.is_server_error() {
            return Err(PublishError::transport(format!("status {status}: {body}")));
        }
        if !status.is_success() {
            return Err(PublishError::refresh_denied(body));
        }

        let payload: RefreshPayload =
            serde_json::from_str(&body).map_err(|_| PublishError::refresh_denied(body.clone()))?;
        match payload.access_token {
            Some(value) => Ok(RefreshedToken {
                value,
                expires_in_seconds: payload.expires_in,
            }),
            None => Err(PublishError::refresh_denied(body)),
        }
    }
}

//! Two-phase publish pipeline and access-token lifecycle.

use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tokio::sync::RwLock;
use tracing::{error, info};
use url::Url;

use crate::application::library::StoreError;
use crate::domain::types::{AccessToken, PublishJob, PublishState, TokenHealth};

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("publishing is not configured: missing {what}")]
    NotConfigured { what: &'static str },
    #[error("transient upstream failure: {message}")]
    Transport { message: String },
    #[error("media container was not created: {payload}")]
    MediaCreation { payload: String },
    #[error("platform rejected the publish call (status {status}): {payload}")]
    Publish { status: u16, payload: String },
    #[error("platform refused to refresh the access token: {payload}")]
    RefreshDenied { payload: String },
    #[error("image could not be prepared for publishing: {message}")]
    Recode { message: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PublishError {
    pub fn transport(message: impl std::fmt::Display) -> Self {
        Self::Transport {
            message: message.to_string(),
        }
    }

    pub fn media_creation(payload: impl Into<String>) -> Self {
        Self::MediaCreation {
            payload: payload.into(),
        }
    }

    pub fn refresh_denied(payload: impl Into<String>) -> Self {
        Self::RefreshDenied {
            payload: payload.into(),
        }
    }

    pub fn recode(message: impl Into<String>) -> Self {
        Self::Recode {
            message: message.into(),
        }
    }
}

/// Opaque identifier from the platform's media-creation phase, consumed by
/// the publish phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreationId(pub String);

/// Renewed long-lived token as returned by the platform.
#[derive(Debug, Clone)]
pub struct RefreshedToken {
    pub value: String,
    pub expires_in_seconds: Option<i64>,
}

/// The photo platform's publish and token endpoints.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Phase one: submit image + caption. A success-shaped response without
    /// a creation id must surface as [`PublishError::MediaCreation`].
    async fn create_media(
        &self,
        account: &str,
        token: &str,
        image_url: &Url,
        caption: &str,
    ) -> Result<CreationId, PublishError>;

    /// Phase two: publish the created container. Returns the post id when
    /// the platform reports one.
    async fn publish_media(
        &self,
        account: &str,
        token: &str,
        creation: &CreationId,
    ) -> Result<Option<String>, PublishError>;

    async fn token_status(&self, token: &str) -> Result<TokenHealth, PublishError>;

    async fn refresh_token(&self, token: &str) -> Result<RefreshedToken, PublishError>;
}

/// Re-encodes and re-hosts an image the platform cannot fetch publicly,
/// returning the public locator to publish instead.
#[async_trait]
pub trait ImageRehoster: Send + Sync {
    async fn rehost(&self, locator: &Url) -> Result<Url, PublishError>;
}

/// Owns the long-lived access token. Publish paths read the current value
/// under a shared lock; refresh takes the write half for the whole
/// exchange, so a refresh can never race a publish using the same token.
pub struct TokenKeeper {
    token: RwLock<Option<AccessToken>>,
}

impl TokenKeeper {
    #[must_use]
    pub fn new(initial: Option<AccessToken>) -> Self {
        Self {
            token: RwLock::new(initial),
        }
    }

    pub async fn current(&self) -> Option<AccessToken> {
        self.token.read().await.clone()
    }

    /// Probe the platform for the current token's validity.
    pub async fn check_status(
        &self,
        client: &dyn PlatformClient,
    ) -> Result<TokenHealth, PublishError> {
        let guard = self.token.read().await;
        let token = guard.as_ref().ok_or(PublishError::NotConfigured {
            what: "access token",
        })?;
        client.token_status(&token.value).await
    }

    /// Exchange a still-valid token for a renewed one, invalidating the old
    /// value on success. A token the platform already reports as invalid is
    /// refused up front — refresh extends a live token, it cannot resurrect
    /// an expired one.
    pub async fn refresh(
        &self,
        client: &dyn PlatformClient,
    ) -> Result<AccessToken, PublishError> {
        let mut guard = self.token.write().await;
        let current = guard.as_ref().ok_or(PublishError::NotConfigured {
            what: "access token",
        })?;

        let health = client.token_status(&current.value).await?;
        if !health.is_valid {
            counter!("plateful_token_refresh_denied_total").increment(1);
            return Err(PublishError::refresh_denied(
                "token already expired; a new long-lived token must be issued",
            ));
        }

        let renewed = client.refresh_token(&current.value).await?;
        let expires_at = renewed
            .expires_in_seconds
            .map(|seconds| OffsetDateTime::now_utc() + Duration::seconds(seconds));
        let token = AccessToken {
            value: renewed.value,
            expires_at,
        };
        *guard = Some(token.clone());
        counter!("plateful_token_refresh_total").increment(1);
        info!(
            target = "application::publish",
            expires_at = ?token.expires_at,
            "access token refreshed in place"
        );
        Ok(token)
    }
}

/// Outcome of a completed publish attempt.
#[derive(Debug, Clone)]
pub struct PublishReceipt {
    pub post_id: Option<String>,
    pub creation_id: CreationId,
}

/// Drives one publish attempt through `Draft -> ContainerCreated ->
/// Published`. There is no automatic retry across states; a caller that
/// wants to retry starts a fresh attempt from `Draft`.
pub struct PublishPipeline {
    client: Arc<dyn PlatformClient>,
    tokens: Arc<TokenKeeper>,
    rehoster: Arc<dyn ImageRehoster>,
    account_id: Option<String>,
}

impl PublishPipeline {
    pub fn new(
        client: Arc<dyn PlatformClient>,
        tokens: Arc<TokenKeeper>,
        rehoster: Arc<dyn ImageRehoster>,
        account_id: Option<String>,
    ) -> Self {
        Self {
            client,
            tokens,
            rehoster,
            account_id,
        }
    }

    pub async fn publish(
        &self,
        image: Url,
        caption: String,
    ) -> Result<PublishReceipt, PublishError> {
        // Fail fast before any network call.
        let account = self
            .account_id
            .as_deref()
            .ok_or(PublishError::NotConfigured { what: "account id" })?;

        // Shared read held across the whole attempt: a concurrent refresh
        // waits rather than swapping the token mid-flight.
        let token_guard = self.tokens.token.read().await;
        let token = token_guard
            .as_ref()
            .ok_or(PublishError::NotConfigured {
                what: "access token",
            })?
            .value
            .clone();

        let mut job = PublishJob::new(image, caption);

        let image_url = if needs_public_rehost(&job.image) {
            match self.rehoster.rehost(&job.image).await {
                Ok(public) => {
                    info!(
                        target = "application::publish",
                        original = %job.image,
                        rehosted = %public,
                        "image re-hosted for platform fetch"
                    );
                    public
                }
                Err(err) => {
                    job.state = PublishState::Failed {
                        reason: err.to_string(),
                    };
                    return Err(self.fail(&job, err));
                }
            }
        } else {
            job.image.clone()
        };

        let creation = match self
            .client
            .create_media(account, &token, &image_url, &job.caption)
            .await
        {
            Ok(creation) => {
                job.state = PublishState::ContainerCreated {
                    creation_id: creation.0.clone(),
                };
                info!(
                    target = "application::publish",
                    creation_id = %creation.0,
                    state = job.state.label(),
                    "media container created"
                );
                creation
            }
            Err(err) => {
                job.state = PublishState::Failed {
                    reason: err.to_string(),
                };
                return Err(self.fail(&job, err));
            }
        };

        match self.client.publish_media(account, &token, &creation).await {
            Ok(post_id) => {
                job.state = PublishState::Published {
                    post_id: post_id.clone(),
                };
                counter!("plateful_publish_success_total").increment(1);
                info!(
                    target = "application::publish",
                    post_id = post_id.as_deref().unwrap_or("-"),
                    state = job.state.label(),
                    "post published"
                );
                Ok(PublishReceipt {
                    post_id,
                    creation_id: creation,
                })
            }
            Err(err) => {
                job.state = PublishState::Failed {
                    reason: err.to_string(),
                };
                Err(self.fail(&job, err))
            }
        }
    }

    fn fail(&self, job: &PublishJob, err: PublishError) -> PublishError {
        counter!("plateful_publish_failure_total").increment(1);
        error!(
            target = "application::publish",
            image = %job.image,
            state = job.state.label(),
            error = %err,
            "publish attempt failed"
        );
        err
    }
}

/// The platform fetches images over the public internet; anything it cannot
/// reach (non-HTTPS, loopback, RFC 1918 hosts) must be re-hosted first.
#[must_use]
pub fn needs_public_rehost(locator: &Url) -> bool {
    if locator.scheme() != "https" {
        return true;
    }
    match locator.host_str() {
        Some(host) => is_private_host(host),
        None => true,
    }
}

fn is_private_host(host: &str) -> bool {
    if host == "localhost" || host == "0.0.0.0" || host.ends_with(".local") {
        return true;
    }
    if host.starts_with("127.") || host.starts_with("10.") || host.starts_with("192.168.") {
        return true;
    }
    if let Some(rest) = host.strip_prefix("172.") {
        if let Some((second, _)) = rest.split_once('.') {
            if let Ok(octet) = second.parse::<u8>() {
                return (16..=31).contains(&octet);
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Default)]
    struct ScriptedPlatform {
        create_calls: AtomicUsize,
        publish_calls: AtomicUsize,
        fail_creation: bool,
        token_valid: bool,
    }

    #[async_trait]
    impl PlatformClient for ScriptedPlatform {
        async fn create_media(
            &self,
            _account: &str,
            _token: &str,
            _image_url: &Url,
            _caption: &str,
        ) -> Result<CreationId, PublishError> {
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_creation {
                Err(PublishError::media_creation(r#"{"error":"no id"}"#))
            } else {
                Ok(CreationId("container-7".to_string()))
            }
        }

        async fn publish_media(
            &self,
            _account: &str,
            _token: &str,
            creation: &CreationId,
        ) -> Result<Option<String>, PublishError> {
            self.publish_calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(creation.0, "container-7");
            Ok(Some("post-1".to_string()))
        }

        async fn token_status(&self, _token: &str) -> Result<TokenHealth, PublishError> {
            Ok(TokenHealth {
                is_valid: self.token_valid,
                expires_at: None,
                scopes: vec![],
            })
        }

        async fn refresh_token(&self, _token: &str) -> Result<RefreshedToken, PublishError> {
            Ok(RefreshedToken {
                value: "renewed".to_string(),
                expires_in_seconds: Some(5_184_000),
            })
        }
    }

    struct NoRehost;

    #[async_trait]
    impl ImageRehoster for NoRehost {
        async fn rehost(&self, _locator: &Url) -> Result<Url, PublishError> {
            panic!("public locators must not be re-hosted");
        }
    }

    fn keeper() -> Arc<TokenKeeper> {
        Arc::new(TokenKeeper::new(Some(AccessToken {
            value: "tok".to_string(),
            expires_at: None,
        })))
    }

    fn pipeline(platform: Arc<ScriptedPlatform>) -> PublishPipeline {
        PublishPipeline::new(platform, keeper(), Arc::new(NoRehost), Some("acct".to_string()))
    }

    fn public_image() -> Url {
        Url::parse("https://cdn.example/pho.jpg").unwrap()
    }

    #[tokio::test]
    async fn successful_attempt_walks_both_phases() {
        let platform = Arc::new(ScriptedPlatform {
            token_valid: true,
            ..Default::default()
        });
        let receipt = pipeline(Arc::clone(&platform))
            .publish(public_image(), "fresh pho tonight".to_string())
            .await
            .expect("publish succeeds");

        assert_eq!(receipt.creation_id.0, "container-7");
        assert_eq!(receipt.post_id.as_deref(), Some("post-1"));
        assert_eq!(platform.create_calls.load(Ordering::SeqCst), 1);
        assert_eq!(platform.publish_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_creation_id_halts_before_the_publish_phase() {
        let platform = Arc::new(ScriptedPlatform {
            fail_creation: true,
            token_valid: true,
            ..Default::default()
        });
        let err = pipeline(Arc::clone(&platform))
            .publish(public_image(), "caption".to_string())
            .await
            .expect_err("creation fails");

        assert!(matches!(err, PublishError::MediaCreation { .. }));
        assert_eq!(platform.publish_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_credentials_fail_before_any_network_call() {
        let platform = Arc::new(ScriptedPlatform {
            token_valid: true,
            ..Default::default()
        });
        let pipeline = PublishPipeline::new(
            Arc::clone(&platform),
            keeper(),
            Arc::new(NoRehost),
            None,
        );
        let err = pipeline
            .publish(public_image(), "caption".to_string())
            .await
            .expect_err("unconfigured");

        assert!(matches!(
            err,
            PublishError::NotConfigured { what: "account id" }
        ));
        assert_eq!(platform.create_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn refresh_refuses_an_expired_token() {
        let platform = ScriptedPlatform {
            token_valid: false,
            ..Default::default()
        };
        let keeper = keeper();
        let err = keeper
            .refresh(&platform)
            .await
            .expect_err("expired token cannot refresh");

        assert!(matches!(err, PublishError::RefreshDenied { .. }));
        // The old token stays in place; nothing claims validity.
        assert_eq!(keeper.current().await.unwrap().value, "tok");
    }

    #[tokio::test]
    async fn refresh_swaps_a_valid_token_in_place() {
        let platform = ScriptedPlatform {
            token_valid: true,
            ..Default::default()
        };
        let keeper = keeper();
        let renewed = keeper.refresh(&platform).await.expect("refresh succeeds");

        assert_eq!(renewed.value, "renewed");
        assert!(renewed.expires_at.is_some());
        assert_eq!(keeper.current().await.unwrap().value, "renewed");
    }

    #[test]
    fn private_and_plain_http_locators_need_rehosting() {
        for raw in [
            "http://cdn.example/a.jpg",
            "https://localhost/a.jpg",
            "https://127.0.0.1/a.jpg",
            "https://192.168.1.4/a.jpg",
            "https://172.20.0.9/a.jpg",
            "https://kitchen.local/a.jpg",
        ] {
            assert!(needs_public_rehost(&Url::parse(raw).unwrap()), "{raw}");
        }
        for raw in ["https://cdn.example/a.jpg", "https://172.9.0.1/a.jpg"] {
            assert!(!needs_public_rehost(&Url::parse(raw).unwrap()), "{raw}");
        }
    }
}

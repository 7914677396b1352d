//! Image-index adapter traits and their shared error surface.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use time::OffsetDateTime;
use url::Url;

use crate::domain::images::{DishName, ImageRecord};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("image not found in the index")]
    NotFound,
    #[error("storage error: {0}")]
    Persistence(String),
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("index integrity violated: {message}")]
    Integrity { message: String },
}

impl StoreError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity {
            message: message.into(),
        }
    }
}

/// A new payload entering the index.
#[derive(Debug, Clone)]
pub struct NewImage {
    pub original_name: String,
    pub payload: Bytes,
}

/// The image index: dish categories mapping to candidate image records.
///
/// Backings may be local (file-backed map) or remote (tag search against a
/// media host); both present the same contract.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Full snapshot. An empty index yields an empty map, never an error.
    async fn list_all(&self) -> Result<BTreeMap<DishName, Vec<ImageRecord>>, StoreError>;

    async fn add(&self, image: NewImage, dish: &DishName) -> Result<ImageRecord, StoreError>;

    /// Removing an unknown locator reports [`StoreError::NotFound`],
    /// distinct from storage-layer failures.
    async fn remove(&self, locator: &Url) -> Result<(), StoreError>;

    /// Move a record between dishes. Atomic with respect to this index's
    /// view: the record leaves `from` and appears under `to`, or the call
    /// fails with no partial move.
    async fn recategorize(
        &self,
        locator: &Url,
        from: &DishName,
        to: &DishName,
    ) -> Result<(), StoreError>;
}

/// An asset as the remote media host reports it.
#[derive(Debug, Clone)]
pub struct RemoteAsset {
    pub locator: Url,
    pub created_at: OffsetDateTime,
}

/// Remote media host supporting tag-based storage and retrieval.
#[async_trait]
pub trait MediaHost: Send + Sync {
    async fn upload_tagged(
        &self,
        filename: &str,
        payload: Bytes,
        tag: &DishName,
    ) -> Result<RemoteAsset, StoreError>;

    async fn search_by_tag(&self, tag: &DishName) -> Result<Vec<RemoteAsset>, StoreError>;

    /// Swap `from` for `to` on one asset in a single upstream call, so the
    /// move cannot be observed half-applied.
    async fn replace_tag(
        &self,
        locator: &Url,
        from: &DishName,
        to: &DishName,
    ) -> Result<(), StoreError>;

    async fn remove_asset(&self, locator: &Url) -> Result<(), StoreError>;

    /// Attach a key/value pair to the asset's context metadata.
    async fn set_context(&self, locator: &Url, key: &str, value: &str) -> Result<(), StoreError>;
}

//! Local asset stores.
//!
//! An [`AssetStore`] is the source side of a migration: it enumerates assets in
//! a stable order, hands out their raw bytes on demand and deletes them in
//! batches once the remote copy has been confirmed.

pub mod directory;
pub mod memory;

use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use directory::DirectoryAssetStore;
pub use memory::MemoryAssetStore;

/// Opaque asset identity, stable for the lifetime of the asset in its store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetId(String);

impl AssetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A media asset as seen by the engine.
///
/// The byte length is deliberately absent: it is only known once the bytes
/// have been fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub id: AssetId,

    /// Original filename, may contain path separators
    pub filename: String,

    /// Creation timestamp if the store knows it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Asset {
    pub fn new(id: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            id: AssetId::new(id),
            filename: filename.into(),
            created_at: None,
        }
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }
}

/// Source of assets for a migration run
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Start a lazy, finite enumeration of assets in store order.
    ///
    /// The stream is not restartable; each run asks for a fresh one.
    async fn enumerate(&self) -> Result<BoxStream<'static, Asset>>;

    /// Read the raw bytes of an asset
    async fn fetch_bytes(&self, asset: &Asset) -> Result<Bytes>;

    /// Delete a batch of assets, returning how many were removed
    async fn delete(&self, assets: &[Asset]) -> Result<usize>;
}

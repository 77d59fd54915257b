//! Remote stores.
//!
//! A [`RemoteStore`] is the destination of a migration: an endpoint that can
//! report whether an object exists (and how large it is) and accept a
//! full-body upload. Status interpretation is left to the caller so the dedup
//! and upload-confirmation rules live in one place.

pub mod http;
pub mod memory;
pub mod target;

use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;

pub use http::HttpRemoteStore;
pub use memory::MemoryRemoteStore;
pub use target::{ImageFormat, UploadTarget};

/// What a metadata-only probe reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeResponse {
    pub status: u16,

    /// Reported `Content-Length`, if present and parseable
    pub content_length: Option<u64>,
}

impl ProbeResponse {
    pub fn found(content_length: u64) -> Self {
        Self {
            status: 200,
            content_length: Some(content_length),
        }
    }

    pub fn not_found() -> Self {
        Self {
            status: 404,
            content_length: None,
        }
    }
}

/// Destination endpoint for asset uploads
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Probe the target without transferring a body.
    ///
    /// Errors only when no response was received.
    async fn probe(&self, target: &UploadTarget) -> Result<ProbeResponse>;

    /// Upload the full body, returning the response status.
    ///
    /// Errors only when no response was received.
    async fn upload(&self, target: &UploadTarget, body: Bytes) -> Result<u16>;
}

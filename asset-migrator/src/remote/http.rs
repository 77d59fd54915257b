//! HTTP remote store using reqwest.
//!
//! Probes with `HEAD` and uploads with `PUT` against `{base_url}/{remote_name}`.

use super::{ProbeResponse, RemoteStore, UploadTarget};
use crate::{MigrationError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Client, Url};
use std::time::Duration;
use tracing::debug;

/// Reqwest-based remote store
#[derive(Debug, Clone)]
pub struct HttpRemoteStore {
    client: Client,
    base_url: Url,
}

impl HttpRemoteStore {
    /// Create a store with default timeouts
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeouts(base_url, Duration::from_secs(60), Duration::from_secs(10))
    }

    /// Create a store with explicit request and connect timeouts
    pub fn with_timeouts(
        base_url: &str,
        timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| MigrationError::Config(format!("invalid remote URL {base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(MigrationError::Config(format!(
                "remote URL {base_url} cannot carry a path"
            )));
        }

        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .user_agent(concat!("asset-migrator/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| MigrationError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, base_url })
    }

    /// Create a store around a pre-configured client
    pub fn with_client(client: Client, base_url: Url) -> Self {
        Self { client, base_url }
    }

    /// Full URL of a target: the base endpoint plus one escaped path segment
    pub fn url_for(&self, target: &UploadTarget) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                MigrationError::Config(format!(
                    "remote URL {} cannot carry a path",
                    self.base_url
                ))
            })?
            .pop_if_empty()
            .push(target.remote_name());
        Ok(url)
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn probe(&self, target: &UploadTarget) -> Result<ProbeResponse> {
        let url = self.url_for(target)?;
        debug!(url = %url, "HEAD");

        let resp = self.client.head(url).send().await?;

        // Read the header directly: a HEAD response has no body to size
        let content_length = resp
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());

        Ok(ProbeResponse {
            status: resp.status().as_u16(),
            content_length,
        })
    }

    async fn upload(&self, target: &UploadTarget, body: Bytes) -> Result<u16> {
        let url = self.url_for(target)?;
        debug!(url = %url, bytes = body.len(), "PUT");

        let resp = self
            .client
            .put(url)
            .header(CONTENT_TYPE, target.content_type())
            .body(body)
            .send()
            .await?;

        Ok(resp.status().as_u16())
    }
}

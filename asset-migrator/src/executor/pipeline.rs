//! Single-asset backup: target, fetch, dedup, upload.

use super::dedup::DedupChecker;
use crate::remote::{RemoteStore, UploadTarget};
use crate::store::{Asset, AssetStore};
use crate::transfer::progress::format_bytes;
use crate::{MigrationError, Result};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// How an asset ended up backed up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupOutcome {
    /// Bytes were PUT to the remote
    Uploaded { bytes: u64 },

    /// The remote already held a copy of the same size
    AlreadyPresent { bytes: u64 },
}

impl BackupOutcome {
    pub fn bytes(&self) -> u64 {
        match self {
            BackupOutcome::Uploaded { bytes } | BackupOutcome::AlreadyPresent { bytes } => *bytes,
        }
    }

    pub fn was_uploaded(&self) -> bool {
        matches!(self, BackupOutcome::Uploaded { .. })
    }
}

/// Backs up one asset per call. Holds no per-run state, so one pipeline can
/// serve any number of runs.
#[derive(Clone)]
pub struct UploadPipeline {
    assets: Arc<dyn AssetStore>,
    remote: Arc<dyn RemoteStore>,
    dedup: DedupChecker,
    call_timeout: Duration,
}

impl UploadPipeline {
    pub fn new(
        assets: Arc<dyn AssetStore>,
        remote: Arc<dyn RemoteStore>,
        call_timeout: Duration,
    ) -> Self {
        let dedup = DedupChecker::new(remote.clone(), call_timeout);
        Self {
            assets,
            remote,
            dedup,
            call_timeout,
        }
    }

    /// Back up a single asset.
    ///
    /// The target is derived before any bytes are read, so an unsupported
    /// filename costs neither a fetch nor a network call.
    pub async fn process(&self, asset: &Asset) -> Result<BackupOutcome> {
        let target = UploadTarget::for_filename(&asset.filename)?;

        let body = self.assets.fetch_bytes(asset).await?;
        let bytes = body.len() as u64;

        if self.dedup.exists(&target, bytes).await {
            debug!(
                asset_id = %asset.id,
                target = %target,
                "Already present on remote, skipping upload"
            );
            return Ok(BackupOutcome::AlreadyPresent { bytes });
        }

        self.upload(&target, body).await?;
        info!(asset_id = %asset.id, target = %target, size = %format_bytes(bytes), "Uploaded");

        Ok(BackupOutcome::Uploaded { bytes })
    }

    async fn upload(&self, target: &UploadTarget, body: Bytes) -> Result<()> {
        let status = tokio::time::timeout(self.call_timeout, self.remote.upload(target, body))
            .await
            .map_err(|_| {
                MigrationError::Timeout(format!(
                    "upload of {} exceeded {}s",
                    target,
                    self.call_timeout.as_secs_f64()
                ))
            })??;

        if !(200..=299).contains(&status) {
            return Err(MigrationError::Server { status });
        }
        Ok(())
    }
}

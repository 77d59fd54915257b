//! Remote existence check.
//!
//! A remote copy counts as present only when the probe answers exactly 200 and
//! reports a `Content-Length` equal to the local byte length. Every other
//! outcome (transport error, timeout, other status, missing or different
//! length) means "upload it", so a doubtful probe can cost an extra upload but
//! never a lost asset.

use crate::remote::{RemoteStore, UploadTarget};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Clone)]
pub struct DedupChecker {
    remote: Arc<dyn RemoteStore>,
    call_timeout: Duration,
}

impl DedupChecker {
    pub fn new(remote: Arc<dyn RemoteStore>, call_timeout: Duration) -> Self {
        Self {
            remote,
            call_timeout,
        }
    }

    pub async fn exists(&self, target: &UploadTarget, expected_size: u64) -> bool {
        let probe = tokio::time::timeout(self.call_timeout, self.remote.probe(target));
        let response = match probe.await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                debug!(target = %target, error = %e, "Probe failed, treating as absent");
                return false;
            }
            Err(_) => {
                debug!(
                    target = %target,
                    timeout_ms = self.call_timeout.as_millis() as u64,
                    "Probe timed out, treating as absent"
                );
                return false;
            }
        };

        let present = response.status == 200 && response.content_length == Some(expected_size);
        debug!(
            target = %target,
            status = response.status,
            remote_size = ?response.content_length,
            expected_size,
            present,
            "Probe"
        );
        present
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{MemoryRemoteStore, ProbeResponse};
    use crate::Result;
    use async_trait::async_trait;
    use bytes::Bytes;

    fn checker(remote: &MemoryRemoteStore) -> DedupChecker {
        DedupChecker::new(Arc::new(remote.clone()), Duration::from_secs(5))
    }

    fn target(name: &str) -> UploadTarget {
        UploadTarget::for_filename(name).unwrap()
    }

    #[tokio::test]
    async fn test_matching_size_exists() {
        let remote = MemoryRemoteStore::new();
        remote.insert_sized("a.jpg", 100);
        assert!(checker(&remote).exists(&target("a.jpg"), 100).await);
    }

    #[tokio::test]
    async fn test_size_mismatch_does_not_exist() {
        let remote = MemoryRemoteStore::new();
        remote.insert_sized("a.jpg", 99);
        assert!(!checker(&remote).exists(&target("a.jpg"), 100).await);
    }

    #[tokio::test]
    async fn test_absent_does_not_exist() {
        let remote = MemoryRemoteStore::new();
        assert!(!checker(&remote).exists(&target("a.jpg"), 100).await);
    }

    #[tokio::test]
    async fn test_transport_error_does_not_exist() {
        let remote = MemoryRemoteStore::new();
        remote.insert_sized("a.jpg", 100);
        remote.fail_probes(1);
        assert!(!checker(&remote).exists(&target("a.jpg"), 100).await);
    }

    /// Answers every probe with a fixed response
    struct FixedProbe(ProbeResponse);

    #[async_trait]
    impl RemoteStore for FixedProbe {
        async fn probe(&self, _target: &UploadTarget) -> Result<ProbeResponse> {
            Ok(self.0)
        }

        async fn upload(&self, _target: &UploadTarget, _body: Bytes) -> Result<u16> {
            Ok(201)
        }
    }

    #[tokio::test]
    async fn test_non_200_success_status_does_not_count() {
        let remote = FixedProbe(ProbeResponse {
            status: 204,
            content_length: Some(100),
        });
        let checker = DedupChecker::new(Arc::new(remote), Duration::from_secs(5));
        assert!(!checker.exists(&target("a.jpg"), 100).await);
    }

    #[tokio::test]
    async fn test_missing_length_does_not_count() {
        let remote = FixedProbe(ProbeResponse {
            status: 200,
            content_length: None,
        });
        let checker = DedupChecker::new(Arc::new(remote), Duration::from_secs(5));
        assert!(!checker.exists(&target("a.jpg"), 0).await);
    }

    /// Never answers
    struct Hanging;

    #[async_trait]
    impl RemoteStore for Hanging {
        async fn probe(&self, _target: &UploadTarget) -> Result<ProbeResponse> {
            std::future::pending().await
        }

        async fn upload(&self, _target: &UploadTarget, _body: Bytes) -> Result<u16> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_timeout_does_not_exist() {
        let checker = DedupChecker::new(Arc::new(Hanging), Duration::from_secs(30));
        assert!(!checker.exists(&target("a.jpg"), 1).await);
    }
}

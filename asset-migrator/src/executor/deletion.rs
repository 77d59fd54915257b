//! Deferred batch deletion of backed-up assets.
//!
//! Assets enter the queue only after their remote copy was confirmed. A flush
//! works on a snapshot: the store is asked to delete exactly the snapshot, and
//! only on success are those entries removed. Anything appended while the
//! store call is in flight stays queued for the next cycle.

use crate::store::{Asset, AssetId, AssetStore};
use crate::{MigrationError, Result};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::{error, info};

#[derive(Default)]
struct Pending {
    order: Vec<Asset>,
    ids: HashSet<AssetId>,
}

/// Ordered set of assets awaiting deletion from the local store
#[derive(Default)]
pub struct DeletionQueue {
    pending: Mutex<Pending>,
    flush_lock: tokio::sync::Mutex<()>,
    delete_completed: AtomicU64,
}

impl DeletionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append an asset; returns false if it was already queued
    pub fn push(&self, asset: Asset) -> bool {
        let mut pending = self.lock();
        if !pending.ids.insert(asset.id.clone()) {
            return false;
        }
        pending.order.push(asset);
        true
    }

    pub fn len(&self) -> usize {
        self.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queued assets in append order
    pub fn snapshot(&self) -> Vec<Asset> {
        self.lock().order.clone()
    }

    /// Assets deleted by successful flushes so far
    pub fn delete_completed(&self) -> u64 {
        self.delete_completed.load(Ordering::SeqCst)
    }

    /// Run one delete cycle against `store`.
    ///
    /// Returns the number of assets in the deleted snapshot. Cycles never
    /// overlap; a second caller waits for the first to finish.
    pub async fn flush(&self, store: &dyn AssetStore) -> Result<usize> {
        let _cycle = self.flush_lock.lock().await;

        let snapshot = self.snapshot();
        if snapshot.is_empty() {
            return Ok(0);
        }

        info!(count = snapshot.len(), "Deleting backed-up assets");
        match store.delete(&snapshot).await {
            Ok(removed) => {
                let mut pending = self.lock();
                for asset in &snapshot {
                    pending.ids.remove(&asset.id);
                }
                let Pending { order, ids } = &mut *pending;
                order.retain(|a| ids.contains(&a.id));
                drop(pending);

                self.delete_completed
                    .fetch_add(snapshot.len() as u64, Ordering::SeqCst);
                info!(count = snapshot.len(), removed, "Delete cycle complete");
                Ok(snapshot.len())
            }
            Err(e) => {
                error!(count = snapshot.len(), error = %e, "Delete cycle failed, queue kept");
                Err(match e {
                    MigrationError::Delete(_) => e,
                    other => MigrationError::Delete(other.to_string()),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryAssetStore;
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures_util::stream::BoxStream;
    use std::sync::Arc;
    use tokio::sync::Notify;

    #[test]
    fn test_duplicate_push_is_ignored() {
        let queue = DeletionQueue::new();
        assert!(queue.push(Asset::new("a", "a.jpg")));
        assert!(!queue.push(Asset::new("a", "a.jpg")));
        assert!(queue.push(Asset::new("b", "b.jpg")));
        assert_eq!(queue.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_flush_does_not_touch_store() {
        let store = MemoryAssetStore::new();
        let queue = DeletionQueue::new();

        assert_eq!(queue.flush(&store).await.unwrap(), 0);
        assert_eq!(store.delete_calls(), 0);
    }

    #[tokio::test]
    async fn test_successful_flush_empties_queue() {
        let store = MemoryAssetStore::new();
        let queue = DeletionQueue::new();
        for name in ["1.jpg", "2.jpg", "3.jpg"] {
            queue.push(store.add_sized(name, 1));
        }

        assert_eq!(queue.flush(&store).await.unwrap(), 3);
        assert!(queue.is_empty());
        assert_eq!(queue.delete_completed(), 3);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_failed_flush_keeps_queue() {
        let store = MemoryAssetStore::new();
        let queue = DeletionQueue::new();
        for name in ["1.jpg", "2.jpg", "3.jpg"] {
            queue.push(store.add_sized(name, 1));
        }
        store.set_fail_deletes(true);

        let err = queue.flush(&store).await.unwrap_err();

        assert!(matches!(err, MigrationError::Delete(_)));
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.delete_completed(), 0);

        store.set_fail_deletes(false);
        assert_eq!(queue.flush(&store).await.unwrap(), 3);
        assert_eq!(queue.delete_completed(), 3);
    }

    /// Blocks inside `delete` until released
    struct GatedStore {
        inner: MemoryAssetStore,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl AssetStore for GatedStore {
        async fn enumerate(&self) -> Result<BoxStream<'static, Asset>> {
            self.inner.enumerate().await
        }

        async fn fetch_bytes(&self, asset: &Asset) -> Result<Bytes> {
            self.inner.fetch_bytes(asset).await
        }

        async fn delete(&self, assets: &[Asset]) -> Result<usize> {
            self.entered.notify_one();
            self.release.notified().await;
            self.inner.delete(assets).await
        }
    }

    #[tokio::test]
    async fn test_appends_during_flush_survive() {
        let store = Arc::new(GatedStore {
            inner: MemoryAssetStore::new(),
            entered: Notify::new(),
            release: Notify::new(),
        });
        let queue = Arc::new(DeletionQueue::new());
        queue.push(store.inner.add_sized("1.jpg", 1));
        queue.push(store.inner.add_sized("2.jpg", 1));

        let flush = {
            let queue = queue.clone();
            let store = store.clone();
            tokio::spawn(async move { queue.flush(store.as_ref()).await })
        };

        store.entered.notified().await;
        let late = store.inner.add_sized("3.jpg", 1);
        queue.push(late.clone());
        store.release.notify_one();

        assert_eq!(flush.await.unwrap().unwrap(), 2);
        assert_eq!(queue.snapshot(), vec![late]);
        assert_eq!(queue.delete_completed(), 2);
        // The late asset was never part of a delete call
        assert_eq!(store.inner.deleted().len(), 2);
    }

    #[tokio::test]
    async fn test_partition_across_cycles() {
        // Every queued asset ends up either deleted or still queued
        let store = MemoryAssetStore::new();
        let queue = DeletionQueue::new();
        let mut all = Vec::new();

        for round in 0..4 {
            for i in 0..3 {
                let asset = store.add_sized(format!("{round}-{i}.png"), 1);
                queue.push(asset.clone());
                all.push(asset.id);
            }
            store.set_fail_deletes(round % 2 == 1);
            let _ = queue.flush(&store).await;

            let deleted: HashSet<_> = store.deleted().into_iter().collect();
            let queued: HashSet<_> = queue.snapshot().into_iter().map(|a| a.id).collect();
            for id in &all {
                assert!(deleted.contains(id) ^ queued.contains(id), "{id} lost or duplicated");
            }
            assert_eq!(queue.delete_completed(), deleted.len() as u64);
        }
    }
}

//! In-memory asset store with injectable fetch and delete failures.

use super::{Asset, AssetId, AssetStore};
use crate::{MigrationError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, BoxStream, StreamExt};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Internal state for MemoryAssetStore.
#[derive(Default)]
struct MemoryAssetState {
    /// Assets in enumeration order
    assets: Vec<(Asset, Bytes)>,
    /// Remaining forced fetch failures per asset
    fetch_failures: HashMap<AssetId, u32>,
    /// Fail every delete call while set
    fail_deletes: bool,
    /// Every fetch attempt, in order
    fetched: Vec<AssetId>,
    /// Successfully deleted assets, in order
    deleted: Vec<AssetId>,
    delete_calls: usize,
    next_id: usize,
}

/// In-memory asset store with failure injection.
///
/// Clones share state, so a test can keep a handle while the executor owns
/// another.
#[derive(Clone, Default)]
pub struct MemoryAssetStore {
    state: Arc<Mutex<MemoryAssetState>>,
}

impl MemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryAssetState> {
        // A panicking test thread must not hide the state from the others
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add an asset with the given content, returning it
    pub fn add(&self, filename: impl Into<String>, content: impl Into<Bytes>) -> Asset {
        let mut state = self.lock();
        state.next_id += 1;
        let asset = Asset::new(format!("asset-{}", state.next_id), filename);
        state.assets.push((asset.clone(), content.into()));
        asset
    }

    /// Add an asset whose content is `len` filler bytes
    pub fn add_sized(&self, filename: impl Into<String>, len: usize) -> Asset {
        self.add(filename, vec![0u8; len])
    }

    /// Make the next `times` fetches of `asset` fail
    pub fn fail_fetch(&self, asset: &Asset, times: u32) {
        self.lock().fetch_failures.insert(asset.id.clone(), times);
    }

    /// Make delete calls fail until reset
    pub fn set_fail_deletes(&self, fail: bool) {
        self.lock().fail_deletes = fail;
    }

    pub fn fetched(&self) -> Vec<AssetId> {
        self.lock().fetched.clone()
    }

    pub fn deleted(&self) -> Vec<AssetId> {
        self.lock().deleted.clone()
    }

    pub fn delete_calls(&self) -> usize {
        self.lock().delete_calls
    }

    pub fn len(&self) -> usize {
        self.lock().assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AssetStore for MemoryAssetStore {
    async fn enumerate(&self) -> Result<BoxStream<'static, Asset>> {
        let assets: Vec<Asset> = self.lock().assets.iter().map(|(a, _)| a.clone()).collect();
        Ok(stream::iter(assets).boxed())
    }

    async fn fetch_bytes(&self, asset: &Asset) -> Result<Bytes> {
        let mut state = self.lock();
        state.fetched.push(asset.id.clone());

        if let Some(remaining) = state.fetch_failures.get_mut(&asset.id) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(MigrationError::Fetch {
                    asset: asset.id.to_string(),
                    reason: "injected fetch failure".to_string(),
                });
            }
        }

        state
            .assets
            .iter()
            .find(|(a, _)| a.id == asset.id)
            .map(|(_, bytes)| bytes.clone())
            .ok_or_else(|| MigrationError::Fetch {
                asset: asset.id.to_string(),
                reason: "asset not found".to_string(),
            })
    }

    async fn delete(&self, assets: &[Asset]) -> Result<usize> {
        let mut state = self.lock();
        state.delete_calls += 1;

        if state.fail_deletes {
            return Err(MigrationError::Delete("injected delete failure".to_string()));
        }

        let before = state.assets.len();
        state
            .assets
            .retain(|(a, _)| !assets.iter().any(|d| d.id == a.id));
        let removed = before - state.assets.len();
        state.deleted.extend(assets.iter().map(|a| a.id.clone()));

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_enumerate_in_insertion_order() {
        let store = MemoryAssetStore::new();
        store.add_sized("b.jpg", 1);
        store.add_sized("a.jpg", 1);

        let names: Vec<String> = store
            .enumerate()
            .await
            .unwrap()
            .map(|a| a.filename)
            .collect()
            .await;
        assert_eq!(names, vec!["b.jpg", "a.jpg"]);
    }

    #[tokio::test]
    async fn test_injected_fetch_failures_run_out() {
        let store = MemoryAssetStore::new();
        let asset = store.add("a.jpg", b"abc".to_vec());
        store.fail_fetch(&asset, 1);

        assert!(store.fetch_bytes(&asset).await.is_err());
        assert_eq!(store.fetch_bytes(&asset).await.unwrap().len(), 3);
        assert_eq!(store.fetched().len(), 2);
    }

    #[tokio::test]
    async fn test_delete_removes_from_enumeration() {
        let store = MemoryAssetStore::new();
        let a = store.add_sized("a.jpg", 1);
        store.add_sized("b.jpg", 1);

        assert_eq!(store.delete(&[a.clone()]).await.unwrap(), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.deleted(), vec![a.id]);
    }

    #[tokio::test]
    async fn test_delete_failure() {
        let store = MemoryAssetStore::new();
        let a = store.add_sized("a.jpg", 1);
        store.set_fail_deletes(true);

        assert!(matches!(
            store.delete(&[a]).await,
            Err(MigrationError::Delete(_))
        ));
        assert_eq!(store.len(), 1);
        assert_eq!(store.delete_calls(), 1);
    }
}

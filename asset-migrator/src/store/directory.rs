//! Directory-backed asset store.
//!
//! Walks a root directory in file-name order and exposes every regular file
//! as an asset whose identity is its path relative to the root. Enumeration
//! runs on a blocking thread and feeds the run through a bounded channel, so
//! the walker never gets more than a few entries ahead of the worker and stops
//! as soon as the run drops the stream.

use super::{Asset, AssetStore};
use crate::{MigrationError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::stream::{self, BoxStream, StreamExt};
use std::ops::ControlFlow;
use std::path::{Component, Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

/// Entries buffered between the walker thread and the run
const ENUMERATION_BUFFER: usize = 16;

/// Options for directory walking
#[derive(Debug, Clone)]
pub struct WalkOptions {
    /// Follow symbolic links
    pub follow_links: bool,

    /// Maximum depth (None = unlimited)
    pub max_depth: Option<usize>,

    /// File or directory names containing any of these are skipped
    pub exclude_patterns: Vec<String>,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            follow_links: false,
            max_depth: None,
            exclude_patterns: vec![".DS_Store".to_string(), "Thumbs.db".to_string()],
        }
    }
}

/// Asset store over a directory tree
#[derive(Debug, Clone)]
pub struct DirectoryAssetStore {
    root: PathBuf,
    options: WalkOptions,
}

impl DirectoryAssetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_options(root, WalkOptions::default())
    }

    pub fn with_options(root: impl Into<PathBuf>, options: WalkOptions) -> Self {
        Self {
            root: root.into(),
            options,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve an asset identity back to a path, refusing anything that
    /// would escape the root
    fn resolve(&self, asset: &Asset) -> Result<PathBuf> {
        let relative = Path::new(asset.id.as_str());
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if escapes || asset.id.as_str().is_empty() {
            return Err(MigrationError::Fetch {
                asset: asset.id.to_string(),
                reason: "asset id is not a path inside the store root".to_string(),
            });
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl AssetStore for DirectoryAssetStore {
    async fn enumerate(&self) -> Result<BoxStream<'static, Asset>> {
        let is_dir = tokio::fs::metadata(&self.root)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !is_dir {
            return Err(MigrationError::Enumeration(format!(
                "{} is not a readable directory",
                self.root.display()
            )));
        }

        let (tx, rx) = mpsc::channel(ENUMERATION_BUFFER);
        let root = self.root.clone();
        let options = self.options.clone();

        tokio::task::spawn_blocking(move || {
            walk_assets(&root, &options, |asset| {
                if tx.blocking_send(asset).is_ok() {
                    ControlFlow::Continue(())
                } else {
                    debug!("Enumeration of {} dropped, walk stopped", root.display());
                    ControlFlow::Break(())
                }
            });
        });

        Ok(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|asset| (asset, rx))
        })
        .boxed())
    }

    async fn fetch_bytes(&self, asset: &Asset) -> Result<Bytes> {
        let path = self.resolve(asset)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) => Err(MigrationError::Fetch {
                asset: asset.id.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn delete(&self, assets: &[Asset]) -> Result<usize> {
        let mut deleted = 0usize;
        let mut failures = Vec::new();

        for asset in assets {
            let path = match self.resolve(asset) {
                Ok(p) => p,
                Err(e) => {
                    failures.push(e.to_string());
                    continue;
                }
            };
            match tokio::fs::remove_file(&path).await {
                Ok(()) => deleted += 1,
                // Removed by an earlier, partially failed delete cycle
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!("Asset already gone: {}", path.display());
                    deleted += 1;
                }
                Err(e) => failures.push(format!("{}: {}", path.display(), e)),
            }
        }

        if let Some(first) = failures.first() {
            return Err(MigrationError::Delete(format!(
                "failed to delete {} of {} assets (first: {})",
                failures.len(),
                assets.len(),
                first
            )));
        }

        info!("Deleted {} assets from {}", deleted, self.root.display());
        Ok(deleted)
    }
}

/// Walk `root` in file-name order, handing each file to `callback` as an
/// asset until the walk ends or the callback breaks.
///
/// Unreadable entries are skipped; a single bad file never ends the walk.
pub fn walk_assets<F>(root: &Path, options: &WalkOptions, mut callback: F)
where
    F: FnMut(Asset) -> ControlFlow<()>,
{
    let mut walker = WalkDir::new(root)
        .follow_links(options.follow_links)
        .sort_by_file_name();

    if let Some(max_depth) = options.max_depth {
        walker = walker.max_depth(max_depth);
    }

    let walker = walker
        .into_iter()
        .filter_entry(|entry| !should_exclude(entry, &options.exclude_patterns));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        if let Some(asset) = asset_from_entry(&entry, root) {
            if callback(asset).is_break() {
                break;
            }
        }
    }
}

fn asset_from_entry(entry: &DirEntry, root: &Path) -> Option<Asset> {
    let relative = entry.path().strip_prefix(root).ok()?;

    let id = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    if id.is_empty() {
        return None;
    }

    // A file that vanished after listing still becomes an asset; its fetch
    // fails and is reported against that asset alone
    let created_at = match entry.metadata() {
        Ok(metadata) => metadata
            .created()
            .or_else(|_| metadata.modified())
            .ok()
            .map(DateTime::<Utc>::from),
        Err(e) => {
            warn!("No metadata for {}: {}", entry.path().display(), e);
            None
        }
    };

    let mut asset = Asset::new(id.clone(), id);
    asset.created_at = created_at;
    Some(asset)
}

/// Check if a directory entry should be excluded based on patterns
fn should_exclude(entry: &DirEntry, patterns: &[String]) -> bool {
    // Never exclude the root itself
    if entry.depth() == 0 {
        return false;
    }

    let file_name = entry.file_name().to_string_lossy();
    patterns.iter().any(|pattern| file_name.contains(pattern.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    async fn collect_ids(store: &DirectoryAssetStore) -> Vec<String> {
        store
            .enumerate()
            .await
            .unwrap()
            .map(|a| a.id.to_string())
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_enumerate_empty_directory() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let store = DirectoryAssetStore::new(temp_dir.path());
        assert!(collect_ids(&store).await.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_enumerate_in_name_order_with_subdirectories() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;

        fs::create_dir(temp_dir.path().join("2024"))?;
        fs::write(temp_dir.path().join("b.jpg"), b"bb")?;
        fs::write(temp_dir.path().join("a.png"), b"a")?;
        fs::write(temp_dir.path().join("2024/IMG_0001.HEIC"), b"heic")?;

        let store = DirectoryAssetStore::new(temp_dir.path());
        assert_eq!(
            collect_ids(&store).await,
            vec!["2024/IMG_0001.HEIC", "a.png", "b.jpg"]
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_exclude_patterns() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;

        fs::write(temp_dir.path().join("keep.jpg"), b"keep")?;
        fs::write(temp_dir.path().join(".DS_Store"), b"exclude")?;

        let store = DirectoryAssetStore::new(temp_dir.path());
        assert_eq!(collect_ids(&store).await, vec!["keep.jpg"]);

        Ok(())
    }

    #[tokio::test]
    async fn test_enumerate_missing_root_fails() {
        let store = DirectoryAssetStore::new("/definitely/not/a/real/root");
        assert!(matches!(
            store.enumerate().await,
            Err(MigrationError::Enumeration(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_bytes() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        fs::write(temp_dir.path().join("photo.jpg"), b"12345")?;

        let store = DirectoryAssetStore::new(temp_dir.path());
        let bytes = store
            .fetch_bytes(&Asset::new("photo.jpg", "photo.jpg"))
            .await
            .unwrap();
        assert_eq!(bytes.len(), 5);

        let missing = store.fetch_bytes(&Asset::new("gone.jpg", "gone.jpg")).await;
        assert!(matches!(missing, Err(MigrationError::Fetch { .. })));

        Ok(())
    }

    #[tokio::test]
    async fn test_fetch_rejects_escaping_ids() {
        let store = DirectoryAssetStore::new("/tmp");
        let result = store
            .fetch_bytes(&Asset::new("../etc/passwd", "passwd.jpg"))
            .await;
        assert!(matches!(result, Err(MigrationError::Fetch { .. })));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        fs::write(temp_dir.path().join("a.jpg"), b"a")?;
        fs::write(temp_dir.path().join("b.jpg"), b"b")?;

        let store = DirectoryAssetStore::new(temp_dir.path());
        let batch = vec![Asset::new("a.jpg", "a.jpg"), Asset::new("b.jpg", "b.jpg")];

        assert_eq!(store.delete(&batch).await.unwrap(), 2);
        assert!(!temp_dir.path().join("a.jpg").exists());

        // Second cycle over the same snapshot still succeeds
        assert_eq!(store.delete(&batch).await.unwrap(), 2);

        Ok(())
    }

    #[tokio::test]
    async fn test_dropping_stream_stops_walker() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        for i in 0..100 {
            fs::write(temp_dir.path().join(format!("{i:03}.jpg")), b"x")?;
        }

        let store = DirectoryAssetStore::new(temp_dir.path());
        let first: Vec<Asset> = store.enumerate().await.unwrap().take(2).collect().await;
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].id.as_str(), "000.jpg");

        Ok(())
    }

    #[test]
    fn test_walk_continues_past_vanished_file() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        for i in 0..100 {
            fs::write(temp_dir.path().join(format!("{i:03}.jpg")), b"x")?;
        }

        let vanished = temp_dir.path().join("050.jpg");
        let mut seen = Vec::new();
        walk_assets(temp_dir.path(), &WalkOptions::default(), |asset| {
            if seen.is_empty() {
                fs::remove_file(&vanished).unwrap();
            }
            seen.push(asset);
            ControlFlow::Continue(())
        });

        assert_eq!(seen.len(), 100);
        assert_eq!(seen[99].id.as_str(), "099.jpg");
        assert_eq!(seen[50].id.as_str(), "050.jpg");
        assert!(seen[50].created_at.is_none());
        assert!(seen[51].created_at.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_enumeration_yields_assets_after_vanished_file() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        for i in 0..100 {
            fs::write(temp_dir.path().join(format!("{i:03}.jpg")), b"x")?;
        }

        let store = DirectoryAssetStore::new(temp_dir.path());
        let mut assets = store.enumerate().await.unwrap();
        let first = assets.next().await.unwrap();
        assert_eq!(first.id.as_str(), "000.jpg");

        fs::remove_file(temp_dir.path().join("050.jpg"))?;
        let rest: Vec<Asset> = assets.collect().await;

        assert_eq!(rest.last().map(|a| a.id.as_str()), Some("099.jpg"));
        assert_eq!(rest.len(), 99);
        Ok(())
    }
}

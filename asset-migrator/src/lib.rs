//! Asset Migrator Library
//!
//! Backs up media assets from a local store to an HTTP endpoint, skipping
//! copies the remote already holds, and deletes the originals in batches once
//! their remote copy is confirmed.

pub mod config;
pub mod events;
pub mod executor;
pub mod remote;
pub mod shutdown;
pub mod store;
pub mod transfer;
pub mod utils;

// Re-export commonly used types
pub use self::config::Config;
pub use events::MigrationEvent;
pub use executor::state::{FailedAsset, RunSummary, StatusSnapshot};
pub use executor::{ExecutorOptions, MigrationExecutor, RunHandle};
pub use remote::{HttpRemoteStore, MemoryRemoteStore, RemoteStore, UploadTarget};
pub use store::{Asset, AssetId, AssetStore, DirectoryAssetStore, MemoryAssetStore};
pub use utils::errors::{MigrationError, Result};

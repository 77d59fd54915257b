use crate::config::AppConfig;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

pub struct AppState {
    pub config: AppConfig,
    upload_seq: AtomicU64,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            upload_seq: AtomicU64::new(0),
        }
    }

    /// Final location of a received file
    pub fn file_path(&self, name: &str) -> PathBuf {
        self.config.root_dir.join(name)
    }

    /// Fresh scratch path for an upload in progress, unique per request
    pub fn partial_path(&self, name: &str) -> PathBuf {
        let seq = self.upload_seq.fetch_add(1, Ordering::Relaxed);
        self.config
            .root_dir
            .join(format!(".{}.{}.{}.part", name, std::process::id(), seq))
    }
}

//! Error taxonomy for the migration engine.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MigrationError {
    /// Asset bytes could not be read from the asset store
    #[error("Fetch error for asset {asset}: {reason}")]
    Fetch { asset: String, reason: String },

    /// Filename has no supported image extension; never retried
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Probe or upload failed before a response was received
    #[error("Transport error: {0}")]
    Transport(String),

    /// Remote answered outside the 2xx range
    #[error("Server responded with status {status}")]
    Server { status: u16 },

    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Batch delete against the asset store failed
    #[error("Delete error: {0}")]
    Delete(String),

    #[error("Enumeration error: {0}")]
    Enumeration(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Worker task failed: {0}")]
    Worker(String),
}

impl MigrationError {
    /// Whether another attempt at the same asset could succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            MigrationError::UnsupportedFormat(_) | MigrationError::Config(_)
        )
    }
}

impl From<reqwest::Error> for MigrationError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            MigrationError::Timeout(err.to_string())
        } else {
            MigrationError::Transport(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, MigrationError>;

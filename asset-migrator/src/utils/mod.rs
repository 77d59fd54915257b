//! Utility modules for the migrator.

pub mod errors;
pub mod logger;

pub use errors::{MigrationError, Result};

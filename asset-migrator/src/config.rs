//! Configuration management for the migrator.
//!
//! Loads an optional TOML file with `ASSET_MIGRATOR__SECTION__KEY` environment
//! overrides. Every field has a default, so an empty configuration is valid.

use crate::store::directory::WalkOptions;
use crate::{MigrationError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable prefix, e.g. `ASSET_MIGRATOR__RUN__BUDGET=50`
pub const ENV_PREFIX: &str = "ASSET_MIGRATOR";

const ENV_SEPARATOR: &str = "__";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub source: SourceConfig,
    pub remote: RemoteConfig,
    pub run: RunConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Directory whose files are migrated
    pub root: PathBuf,

    /// File or directory names containing any of these are skipped
    pub exclude_patterns: Vec<String>,

    pub follow_links: bool,

    /// Maximum walk depth (unset = unlimited)
    pub max_depth: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base endpoint; each asset becomes one path segment below it
    pub base_url: String,

    /// Whole-request timeout of the HTTP client
    pub timeout_secs: u64,

    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Assets processed per run
    pub budget: u64,

    /// Attempts per asset, including the first
    pub max_attempts: u32,

    /// Upper bound on a single probe or upload
    pub call_timeout_secs: u64,

    /// Base delay between attempts (0 = retry immediately)
    pub backoff_base_ms: u64,

    pub backoff_max_ms: u64,

    /// Flush the deletion queue after a run that was not cancelled
    pub delete_after_backup: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        let walk = WalkOptions::default();
        Self {
            root: PathBuf::from("."),
            exclude_patterns: walk.exclude_patterns,
            follow_links: walk.follow_links,
            max_depth: walk.max_depth,
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout_secs: 60,
            connect_timeout_secs: 10,
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            budget: 1000,
            max_attempts: 3,
            call_timeout_secs: 60,
            backoff_base_ms: 0,
            backoff_max_ms: 10_000,
            delete_after_backup: false,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl From<&SourceConfig> for WalkOptions {
    fn from(source: &SourceConfig) -> Self {
        Self {
            follow_links: source.follow_links,
            max_depth: source.max_depth,
            exclude_patterns: source.exclude_patterns.clone(),
        }
    }
}

impl Config {
    /// Load from an optional TOML file plus the process environment.
    ///
    /// The result is not validated; callers apply their own overrides first
    /// and then call [`Config::validate`].
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, environment())
    }

    fn load_with_env(path: Option<&Path>, env: config::Environment) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(true),
            );
        }

        builder
            .add_source(env)
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| MigrationError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.remote.base_url.trim().is_empty() {
            return Err(MigrationError::Config("remote.base_url is empty".to_string()));
        }
        if self.run.call_timeout_secs == 0 {
            return Err(MigrationError::Config(
                "run.call_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| MigrationError::Config(e.to_string()))
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_SEPARATOR)
        .separator(ENV_SEPARATOR)
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("source.exclude_patterns")
}

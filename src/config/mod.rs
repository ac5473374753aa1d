//! Configuration loading for the buildpack store

pub mod schema;

pub use schema::{
    CacheConfig, EngineConfig, GithubConfig, LoggingConfig, PackagerConfig, PackagerKind, StoreConfig,
    TargetConfig,
};

use crate::error::{StoreError, StoreResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "BUILDPACK_STORE_CONFIG";

/// Environment variable holding the GitHub API token
pub const TOKEN_ENV: &str = "GIT_TOKEN";

/// Configuration loader
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a loader that honors `BUILDPACK_STORE_CONFIG`
    pub fn new() -> Self {
        Self {
            config_path: std::env::var_os(CONFIG_ENV).map(PathBuf::from),
        }
    }

    /// Create a loader for a specific file
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            config_path: Some(path),
        }
    }

    /// Load configuration, falling back to defaults, then apply environment
    pub async fn load(&self) -> StoreResult<StoreConfig> {
        let mut config = match &self.config_path {
            Some(path) if path.exists() => Self::load_from_file(path).await?,
            Some(path) => {
                debug!("Config file {} not found, using defaults", path.display());
                StoreConfig::default()
            }
            None => StoreConfig::default(),
        };

        Self::apply_env(&mut config);
        Ok(config)
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(path: &Path) -> StoreResult<StoreConfig> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| StoreError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| StoreError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Fill unset values from the process environment
    fn apply_env(config: &mut StoreConfig) {
        if config.github.token.is_none() {
            config.github.token = std::env::var(TOKEN_ENV).ok().filter(|t| !t.is_empty());
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

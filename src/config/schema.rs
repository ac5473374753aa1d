//! Configuration schema for the buildpack store
//!
//! Configuration is read from a TOML file, every section optional.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// On-disk cache settings
    pub cache: CacheConfig,

    /// GitHub release API settings
    pub github: GithubConfig,

    /// Container engine settings
    pub engine: EngineConfig,

    /// Packaging tool settings
    pub packager: PackagerConfig,

    /// Default target for remote buildpacks
    pub target: TargetConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

/// On-disk cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache directory (defaults to `<home>/.freezer-cache`)
    pub dir: PathBuf,

    /// Seconds to wait for another holder to release the cache lock
    pub lock_timeout_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(std::env::var_os("HOME").map(PathBuf::from)),
            lock_timeout_secs: 300,
        }
    }
}

/// Compute `<home>/.freezer-cache`, falling back to the platform home directory
pub fn default_cache_dir(home: Option<PathBuf>) -> PathBuf {
    home.filter(|h| !h.as_os_str().is_empty())
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".freezer-cache")
}

/// GitHub release API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
    /// API base URL
    pub api_url: String,

    /// Access token (populated from `GIT_TOKEN` when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            token: None,
        }
    }
}

/// Container engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Engine executable: `docker` or `podman`
    pub binary: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary: "docker".to_string(),
        }
    }
}

/// Packaging tool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PackagerConfig {
    /// Which packaging tool builds buildpack source
    pub kind: PackagerKind,

    /// `jam` executable
    pub jam: String,

    /// libpak `create-package` executable
    pub create_package: String,

    /// `pack` executable
    pub pack: String,
}

impl Default for PackagerConfig {
    fn default() -> Self {
        Self {
            kind: PackagerKind::Jam,
            jam: "jam".to_string(),
            create_package: "create-package".to_string(),
            pack: "pack".to_string(),
        }
    }
}

/// Packaging tool family
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackagerKind {
    /// Paketo `jam pack`
    #[default]
    Jam,
    /// libpak `create-package`
    Libpak,
}

/// Default target used when a request names none
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub platform: String,
    pub arch: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            platform: "linux".to_string(),
            arch: "amd64".to_string(),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log format: "text" or "json"
    pub format: String,

    /// `EnvFilter` directive
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: "text".to_string(),
            filter: "buildpack_store=info".to_string(),
        }
    }
}

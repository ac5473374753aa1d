//! Buildpack artifact cache
//!
//! Entries are addressed by string keys derived from the acquisition
//! identity (`<name>` for local buildpacks, `<org>:<repo>:<platform>:<arch>`
//! for remote ones). Keys for artifacts packaged with vendored dependencies
//! carry a `:cached` suffix.
//!
//! # Lifecycle
//!
//! A store is opened before any `get`/`set` and closed exactly once after
//! use. Opening acquires the store's exclusive lock; closing releases it.

pub mod file;

pub use file::FileCacheStore;

use crate::error::StoreResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Suffix distinguishing dependency-bundled artifacts from raw ones
pub const CACHED_SUFFIX: &str = ":cached";

/// Derive the cached-variant key from an uncached key
pub fn cached_key(uncached: &str) -> String {
    format!("{}{}", uncached, CACHED_SUFFIX)
}

/// A cached buildpack artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Version the artifact was packaged or released as
    pub version: String,

    /// Path to the artifact on disk
    pub uri: PathBuf,

    /// Content checksum of the source directory (local buildpacks only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,

    /// When the entry was written
    pub updated_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(version: impl Into<String>, uri: impl Into<PathBuf>) -> Self {
        Self {
            version: version.into(),
            uri: uri.into(),
            checksum: None,
            updated_at: Utc::now(),
        }
    }

    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }

    /// Whether the artifact this entry points at still exists
    pub fn artifact_exists(&self) -> bool {
        self.uri.is_file()
    }
}

/// Keyed storage with an explicit open/close lifecycle
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Acquire the store's lock and load its index
    async fn open(&self) -> StoreResult<()>;

    /// Persist the index and release the lock
    async fn close(&self) -> StoreResult<()>;

    /// Look up an entry
    async fn get(&self, key: &str) -> StoreResult<Option<CacheEntry>>;

    /// Insert or replace an entry; the last write wins
    async fn set(&self, key: &str, entry: CacheEntry) -> StoreResult<()>;

    /// Directory artifacts are stored under
    fn dir(&self) -> &Path;
}

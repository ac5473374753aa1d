//! File-backed cache store
//!
//! The cache directory holds a JSON index (`buildpacks-cache.db`) mapping
//! keys to entries, and a lock file (`buildpacks-cache.lock`) that an open
//! store holds an exclusive advisory lock on. The OS drops the lock when its
//! holder exits, so a lock file left behind by a killed process is harmless.
//!
//! Opening waits for other holders, in this process or another one, until
//! the lock timeout elapses.

use crate::cache::{CacheEntry, CacheStore};
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use fs4::fs_std::FileExt;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Index file name inside the cache directory
pub const INDEX_FILE: &str = "buildpacks-cache.db";

/// Lock file name inside the cache directory
pub const LOCK_FILE: &str = "buildpacks-cache.lock";

/// Default time `open` waits for the lock
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(300);

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// State held between `open` and `close`
struct OpenCache {
    index: BTreeMap<String, CacheEntry>,
    lock: File,
    _session: OwnedMutexGuard<()>,
}

/// Cache store persisted as a JSON index next to the artifacts
pub struct FileCacheStore {
    dir: PathBuf,
    lock_timeout: Duration,
    session: Arc<Mutex<()>>,
    state: Mutex<Option<OpenCache>>,
}

impl FileCacheStore {
    /// Create a store rooted at `dir`; nothing touches disk until `open`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            session: Arc::new(Mutex::new(())),
            state: Mutex::new(None),
        }
    }

    /// How long `open` waits for another holder before giving up
    pub fn with_lock_timeout(self, lock_timeout: Duration) -> Self {
        Self {
            lock_timeout,
            ..self
        }
    }

    fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    fn lock_path(&self) -> PathBuf {
        self.dir.join(LOCK_FILE)
    }

    fn locked_elsewhere(&self) -> StoreError {
        StoreError::CacheUnavailable {
            reason: format!(
                "cache is locked by another holder ({}) after waiting {:?}",
                self.lock_path().display(),
                self.lock_timeout
            ),
        }
    }

    /// Take the in-process session, so one handle serves one acquisition at a time
    async fn begin_session(&self, deadline: Instant) -> StoreResult<OwnedMutexGuard<()>> {
        tokio::time::timeout_at(deadline, self.session.clone().lock_owned())
            .await
            .map_err(|_| self.locked_elsewhere())
    }

    /// Take the cross-process advisory lock, polling until `deadline`
    async fn acquire_lock(&self, deadline: Instant) -> StoreResult<File> {
        let path = self.lock_path();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| StoreError::io(format!("opening cache lock {}", path.display()), e))?;

        loop {
            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => return Ok(file),
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        return Err(self.locked_elsewhere());
                    }
                    debug!("Waiting for cache lock {}", path.display());
                    tokio::time::sleep(LOCK_POLL_INTERVAL).await;
                }
                Err(e) => {
                    return Err(StoreError::io(
                        format!("locking cache {}", path.display()),
                        e,
                    ))
                }
            }
        }
    }

    fn release_lock(&self, lock: &File) -> StoreResult<()> {
        FileExt::unlock(lock).map_err(|e| {
            StoreError::io(format!("unlocking cache {}", self.lock_path().display()), e)
        })
    }

    async fn read_index(&self) -> StoreResult<BTreeMap<String, CacheEntry>> {
        let path = self.index_path();
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => {
                return Err(StoreError::io(
                    format!("reading cache index {}", path.display()),
                    e,
                ))
            }
        };

        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        serde_json::from_str(&content).map_err(|e| StoreError::CacheCorrupt {
            path,
            reason: e.to_string(),
        })
    }

    async fn write_index(&self, index: &BTreeMap<String, CacheEntry>) -> StoreResult<()> {
        let path = self.index_path();
        let content = serde_json::to_string_pretty(index)?;
        fs::write(&path, content)
            .await
            .map_err(|e| StoreError::io(format!("writing cache index {}", path.display()), e))
    }
}

#[async_trait]
impl CacheStore for FileCacheStore {
    async fn open(&self) -> StoreResult<()> {
        let deadline = Instant::now() + self.lock_timeout;
        let session = self.begin_session(deadline).await?;

        fs::create_dir_all(&self.dir).await.map_err(|e| {
            StoreError::io(format!("creating cache dir {}", self.dir.display()), e)
        })?;

        let lock = self.acquire_lock(deadline).await?;
        let index = match self.read_index().await {
            Ok(index) => index,
            Err(e) => {
                if let Err(unlock_err) = self.release_lock(&lock) {
                    warn!("Failed to release cache lock: {}", unlock_err);
                }
                return Err(e);
            }
        };

        debug!("Opened cache {} ({} entries)", self.dir.display(), index.len());
        *self.state.lock().await = Some(OpenCache {
            index,
            lock,
            _session: session,
        });
        Ok(())
    }

    async fn close(&self) -> StoreResult<()> {
        let open = self
            .state
            .lock()
            .await
            .take()
            .ok_or_else(|| StoreError::CacheNotOpen(self.dir.clone()))?;

        let written = self.write_index(&open.index).await;
        let released = self.release_lock(&open.lock);
        drop(open);
        debug!("Closed cache {}", self.dir.display());
        written.and(released)
    }

    async fn get(&self, key: &str) -> StoreResult<Option<CacheEntry>> {
        let guard = self.state.lock().await;
        let open = guard
            .as_ref()
            .ok_or_else(|| StoreError::CacheNotOpen(self.dir.clone()))?;
        Ok(open.index.get(key).cloned())
    }

    async fn set(&self, key: &str, entry: CacheEntry) -> StoreResult<()> {
        let mut guard = self.state.lock().await;
        let open = guard
            .as_mut()
            .ok_or_else(|| StoreError::CacheNotOpen(self.dir.clone()))?;
        open.index.insert(key.to_string(), entry);
        self.write_index(&open.index).await
    }

    fn dir(&self) -> &Path {
        &self.dir
    }
}

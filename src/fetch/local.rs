//! Packaging fetcher for local buildpack directories

use crate::cache::{CacheEntry, CacheStore};
use crate::error::{StoreError, StoreResult};
use crate::fetch::checksum::directory_checksum;
use crate::fetch::{LocalBuildpack, LocalFetcher, Packager, DEFAULT_LOCAL_VERSION};
use crate::reference::sanitize_name;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Packages local buildpacks, reusing the last artifact while the source is unchanged
pub struct CachingLocalFetcher {
    cache: Arc<dyn CacheStore>,
    packager: Arc<dyn Packager>,
}

impl CachingLocalFetcher {
    pub fn new(cache: Arc<dyn CacheStore>, packager: Arc<dyn Packager>) -> Self {
        Self { cache, packager }
    }

    fn output_path(&self, name: &str) -> PathBuf {
        self.cache
            .dir()
            .join(sanitize_name(name))
            .join(format!("{}.tgz", Uuid::new_v4()))
    }
}

async fn checksum(path: &Path) -> StoreResult<String> {
    let dir = path.to_path_buf();
    tokio::task::spawn_blocking(move || directory_checksum(&dir))
        .await
        .map_err(|e| StoreError::Internal(format!("checksum task failed: {}", e)))?
}

#[async_trait]
impl LocalFetcher for CachingLocalFetcher {
    async fn get(&self, buildpack: &LocalBuildpack) -> StoreResult<PathBuf> {
        let key = buildpack.key();
        let version = buildpack
            .version
            .clone()
            .unwrap_or_else(|| DEFAULT_LOCAL_VERSION.to_string());
        let sum = checksum(&buildpack.path).await?;

        let stale = match self.cache.get(key).await? {
            Some(entry)
                if entry.checksum.as_deref() == Some(sum.as_str())
                    && entry.version == version
                    && entry.artifact_exists() =>
            {
                debug!("Cache hit for {}: {}", key, entry.uri.display());
                return Ok(entry.uri);
            }
            Some(entry) => {
                debug!("Cache entry for {} is stale", key);
                Some(entry)
            }
            None => None,
        };

        let output = self.output_path(&buildpack.name);
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::io(format!("creating {}", parent.display()), e))?;
        }

        info!(
            "Packaging {} as {} (offline: {})",
            buildpack.path.display(),
            version,
            buildpack.offline
        );
        self.packager
            .package(&buildpack.path, &output, &version, buildpack.offline)
            .await?;

        self.cache
            .set(key, CacheEntry::new(version, &output).with_checksum(sum))
            .await?;

        if let Some(stale) = stale.filter(|entry| entry.uri != output) {
            remove_artifact(&stale.uri).await;
        }

        Ok(output)
    }

    fn with_packager(&self, packager: Arc<dyn Packager>) -> Arc<dyn LocalFetcher> {
        Arc::new(Self::new(self.cache.clone(), packager))
    }
}

/// Delete an artifact no cache entry points at anymore
async fn remove_artifact(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed replaced artifact {}", path.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove replaced artifact {}: {}", path.display(), e),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cache::FileCacheStore;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Packager that writes a marker file and records its calls
    #[derive(Default)]
    pub(crate) struct RecordingPackager {
        pub calls: Mutex<Vec<(PathBuf, PathBuf, String, bool)>>,
    }

    #[async_trait]
    impl Packager for RecordingPackager {
        async fn package(
            &self,
            source_dir: &Path,
            output: &Path,
            version: &str,
            offline: bool,
        ) -> StoreResult<()> {
            std::fs::write(output, version).unwrap();
            self.calls.lock().unwrap().push((
                source_dir.to_path_buf(),
                output.to_path_buf(),
                version.to_string(),
                offline,
            ));
            Ok(())
        }
    }

    struct Fixture {
        fetcher: CachingLocalFetcher,
        cache: Arc<FileCacheStore>,
        packager: Arc<RecordingPackager>,
        source: PathBuf,
        _temp: TempDir,
    }

    async fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("cool-buildpack");
        std::fs::create_dir_all(source.join("bin")).unwrap();
        std::fs::write(source.join("buildpack.toml"), "api = \"0.8\"").unwrap();
        std::fs::write(source.join("bin/build"), "#!/bin/sh").unwrap();

        let cache = Arc::new(FileCacheStore::new(temp.path().join("cache")));
        cache.open().await.unwrap();
        let packager = Arc::new(RecordingPackager::default());
        let fetcher = CachingLocalFetcher::new(cache.clone(), packager.clone());
        Fixture {
            fetcher,
            cache,
            packager,
            source,
            _temp: temp,
        }
    }

    #[tokio::test]
    async fn packages_with_default_version() {
        let fx = fixture().await;
        let bp = LocalBuildpack::new(&fx.source, "cool-buildpack");

        let artifact = fx.fetcher.get(&bp).await.unwrap();
        assert!(artifact.starts_with(fx.cache.dir().join("cool-buildpack")));

        let calls = fx.packager.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, fx.source);
        assert_eq!(calls[0].2, "testing");
        assert!(!calls[0].3);

        let entry = fx.cache.get("cool-buildpack").await.unwrap().unwrap();
        assert_eq!(entry.uri, artifact);
    }

    #[tokio::test]
    async fn unchanged_source_hits_cache() {
        let fx = fixture().await;
        let bp = LocalBuildpack::new(&fx.source, "cool-buildpack")
            .with_version(Some("1.0.0".to_string()));

        let first = fx.fetcher.get(&bp).await.unwrap();
        let second = fx.fetcher.get(&bp).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(fx.packager.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn changed_source_or_version_repackages() {
        let fx = fixture().await;
        let bp = LocalBuildpack::new(&fx.source, "cool-buildpack");
        fx.fetcher.get(&bp).await.unwrap();

        std::fs::write(fx.source.join("bin/build"), "#!/bin/bash").unwrap();
        fx.fetcher.get(&bp).await.unwrap();

        let versioned = bp.with_version(Some("2.0.0".to_string()));
        let latest = fx.fetcher.get(&versioned).await.unwrap();

        assert_eq!(fx.packager.calls.lock().unwrap().len(), 3);

        // Only the artifact the entry points at is kept
        let artifacts: Vec<_> = std::fs::read_dir(fx.cache.dir().join("cool-buildpack"))
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        assert_eq!(artifacts, vec![latest]);
    }

    #[tokio::test]
    async fn offline_variant_does_not_remove_online_artifact() {
        let fx = fixture().await;
        let bp = LocalBuildpack::new(&fx.source, "cool-buildpack");
        let online = fx.fetcher.get(&bp).await.unwrap();
        let offline = fx.fetcher.get(&bp.clone().with_offline(true)).await.unwrap();

        assert_ne!(online, offline);
        assert!(online.is_file());
        assert!(offline.is_file());
    }

    #[tokio::test]
    async fn swapped_packager_is_used() {
        let fx = fixture().await;
        let other = Arc::new(RecordingPackager::default());
        let fetcher = fx.fetcher.with_packager(other.clone());

        fetcher
            .get(&LocalBuildpack::new(&fx.source, "cool-buildpack"))
            .await
            .unwrap();
        assert_eq!(other.calls.lock().unwrap().len(), 1);
        assert!(fx.packager.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn offline_uses_cached_key() {
        let fx = fixture().await;
        let bp = LocalBuildpack::new(&fx.source, "cool-buildpack").with_offline(true);

        fx.fetcher.get(&bp).await.unwrap();
        assert!(fx.cache.get("cool-buildpack:cached").await.unwrap().is_some());
        assert!(fx.cache.get("cool-buildpack").await.unwrap().is_none());
        assert!(fx.packager.calls.lock().unwrap()[0].3);
    }
}

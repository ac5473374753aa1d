//! Buildpack acquisition dispatcher
//!
//! `BuildpackStore::resolve` classifies a reference and routes it to the
//! local fetcher, the remote fetcher, or the registry extractor followed by
//! the local fetcher. Every call runs inside one open/close cycle of the
//! cache store.

use crate::cache::{CacheStore, FileCacheStore};
use crate::config::{PackagerKind, StoreConfig};
use crate::engine::CliEngine;
use crate::error::{StoreError, StoreResult};
use crate::extract::{ImageExtractor, RegistryExtractor};
use crate::fetch::{
    CachingLocalFetcher, CachingRemoteFetcher, GithubReleaseService, JamPackager, LibpakPackager,
    LocalBuildpack, LocalFetcher, Packager, RemoteBuildpack, RemoteFetcher,
};
use crate::reference::{base_name, sanitize_name, Reference};
use crate::request::{AcquisitionRequest, Target};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Resolves buildpack references into local artifacts
#[derive(Clone)]
pub struct BuildpackStore {
    cache: Arc<dyn CacheStore>,
    local: Arc<dyn LocalFetcher>,
    remote: Arc<dyn RemoteFetcher>,
    extractor: Arc<dyn RegistryExtractor>,
    default_target: Target,
    scratch_dir: PathBuf,
}

impl BuildpackStore {
    /// Create a store from explicit collaborators
    pub fn new(
        cache: Arc<dyn CacheStore>,
        local: Arc<dyn LocalFetcher>,
        remote: Arc<dyn RemoteFetcher>,
        extractor: Arc<dyn RegistryExtractor>,
    ) -> Self {
        Self {
            cache,
            local,
            remote,
            extractor,
            default_target: Target::default(),
            scratch_dir: std::env::temp_dir(),
        }
    }

    /// Wire the default collaborators described by `config`
    pub fn from_config(config: &StoreConfig) -> Self {
        let cache: Arc<dyn CacheStore> = Arc::new(
            FileCacheStore::new(&config.cache.dir)
                .with_lock_timeout(Duration::from_secs(config.cache.lock_timeout_secs)),
        );
        let packager: Arc<dyn Packager> = match config.packager.kind {
            PackagerKind::Jam => Arc::new(JamPackager::new(
                &config.packager.jam,
                &config.packager.pack,
            )),
            PackagerKind::Libpak => Arc::new(LibpakPackager::new(
                &config.packager.create_package,
                &config.packager.pack,
            )),
        };
        let releases = Arc::new(GithubReleaseService::new(
            &config.github.api_url,
            config.github.token.clone(),
        ));
        let engine = Arc::new(CliEngine::new(&config.engine.binary));

        Self::new(
            cache.clone(),
            Arc::new(CachingLocalFetcher::new(cache.clone(), packager.clone())),
            Arc::new(CachingRemoteFetcher::new(cache, releases, packager)),
            Arc::new(ImageExtractor::new(engine)),
        )
        .with_default_target(Target::new(
            &config.target.platform,
            &config.target.arch,
        ))
    }

    pub fn with_local_fetcher(self, local: Arc<dyn LocalFetcher>) -> Self {
        Self { local, ..self }
    }

    pub fn with_remote_fetcher(self, remote: Arc<dyn RemoteFetcher>) -> Self {
        Self { remote, ..self }
    }

    pub fn with_cache(self, cache: Arc<dyn CacheStore>) -> Self {
        Self { cache, ..self }
    }

    /// Package local and remote buildpacks with `packager`
    pub fn with_packager(self, packager: Arc<dyn Packager>) -> Self {
        let local = self.local.with_packager(packager.clone());
        let remote = self.remote.with_packager(packager);
        Self {
            local,
            remote,
            ..self
        }
    }

    pub fn with_registry_extractor(self, extractor: Arc<dyn RegistryExtractor>) -> Self {
        Self { extractor, ..self }
    }

    /// Target used for remote references when a request names none
    pub fn with_default_target(self, default_target: Target) -> Self {
        Self {
            default_target,
            ..self
        }
    }

    /// Parent directory for registry extraction directories
    pub fn with_scratch_dir(self, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
            ..self
        }
    }

    /// Resolve a reference into a local artifact path.
    ///
    /// The cache is opened before dispatch and closed afterwards on every
    /// path; a close failure is only reported when dispatch succeeded.
    /// Concurrent calls wait on the cache lock and run one at a time.
    pub async fn resolve(&self, request: &AcquisitionRequest) -> StoreResult<PathBuf> {
        self.cache
            .open()
            .await
            .map_err(|e| StoreError::CacheUnavailable {
                reason: match e {
                    StoreError::CacheUnavailable { reason } => reason,
                    other => other.to_string(),
                },
            })?;
        debug!("Opened cache {}", self.cache.dir().display());

        let result = self.dispatch(request).await;
        let closed = self.cache.close().await;

        match (result, closed) {
            (Ok(path), Ok(())) => Ok(path),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), closed) => {
                if let Err(close_err) = closed {
                    warn!("Failed to close cache after error: {}", close_err);
                }
                Err(e)
            }
        }
    }

    async fn dispatch(&self, request: &AcquisitionRequest) -> StoreResult<PathBuf> {
        let raw = request.reference();
        let reference = Reference::classify(raw)?;
        debug!("Resolving {} reference {}", reference.kind(), raw);

        match reference {
            Reference::Local(path) => {
                let buildpack = LocalBuildpack::new(&path, base_name(raw))
                    .with_offline(request.offline())
                    .with_version(request.version().map(str::to_string));
                self.local.get(&buildpack).await
            }
            Reference::Remote { org, repo } => {
                let target = request.target().unwrap_or(&self.default_target);
                let buildpack = RemoteBuildpack::new(org, repo, &target.platform, &target.arch)
                    .with_offline(request.offline())
                    .with_version(request.version().map(str::to_string));
                self.remote.get(&buildpack).await
            }
            Reference::Registry(image) => self.resolve_registry(&image, request).await,
        }
    }

    async fn resolve_registry(
        &self,
        image: &str,
        request: &AcquisitionRequest,
    ) -> StoreResult<PathBuf> {
        let name = base_name(image);
        let destination = self.extraction_dir(&name).await?;

        let extracted = self
            .extractor
            .extract(image, &destination)
            .await
            .map_err(|e| StoreError::RegistryExtraction(Box::new(e)))?;
        debug!(
            "Extracted {} into {} (left for the caller to remove)",
            image,
            destination.display()
        );

        let version = request
            .version()
            .map(str::to_string)
            .unwrap_or(extracted.version);
        info!("Packaging registry buildpack {} as {}", image, version);

        let buildpack = LocalBuildpack::new(extracted.root, name)
            .with_offline(request.offline())
            .with_version(Some(version));
        self.local.get(&buildpack).await
    }

    async fn extraction_dir(&self, name: &str) -> StoreResult<PathBuf> {
        let dir = self
            .scratch_dir
            .join(format!("{}-{}", sanitize_name(name), Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StoreError::io(format!("creating temp dir {}", dir.display()), e))?;
        Ok(dir)
    }

    /// Cache directory artifacts are stored under
    pub fn cache_dir(&self) -> &Path {
        self.cache.dir()
    }
}

//! Release-backed fetcher for GitHub-hosted buildpacks

use crate::archive;
use crate::cache::{CacheEntry, CacheStore};
use crate::error::{StoreError, StoreResult};
use crate::fetch::github::{Release, ReleaseService};
use crate::fetch::{Packager, RemoteBuildpack, RemoteFetcher};
use crate::reference::sanitize_name;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Downloads released buildpacks, packaging from source when no usable asset exists
pub struct CachingRemoteFetcher {
    cache: Arc<dyn CacheStore>,
    releases: Arc<dyn ReleaseService>,
    packager: Arc<dyn Packager>,
}

impl CachingRemoteFetcher {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        releases: Arc<dyn ReleaseService>,
        packager: Arc<dyn Packager>,
    ) -> Self {
        Self {
            cache,
            releases,
            packager,
        }
    }

    async fn release(&self, buildpack: &RemoteBuildpack) -> StoreResult<Release> {
        match &buildpack.version {
            Some(version) => {
                let tag = if version.starts_with('v') {
                    version.clone()
                } else {
                    format!("v{}", version)
                };
                self.releases
                    .by_tag(&buildpack.org, &buildpack.repo, &tag)
                    .await
            }
            None => self.releases.latest(&buildpack.org, &buildpack.repo).await,
        }
    }

    fn artifact_dir(&self, buildpack: &RemoteBuildpack, version: &str) -> PathBuf {
        self.cache
            .dir()
            .join(sanitize_name(&buildpack.org))
            .join(sanitize_name(&buildpack.repo))
            .join(sanitize_name(version))
    }

    async fn package_source(
        &self,
        buildpack: &RemoteBuildpack,
        release: &Release,
        dir: &Path,
        version: &str,
    ) -> StoreResult<PathBuf> {
        if release.tarball_url.is_empty() {
            return Err(StoreError::Release {
                repo: buildpack.slug(),
                reason: format!("release {} has no source tarball", release.tag_name),
            });
        }

        let work = tempfile::tempdir().map_err(|e| StoreError::io("creating source work dir", e))?;
        let tarball = work.path().join("source.tgz");
        self.releases.download(&release.tarball_url, &tarball).await?;

        let source = work.path().join("source");
        let (from, to) = (tarball.clone(), source.clone());
        let root = tokio::task::spawn_blocking(move || {
            archive::unpack_file(&from, &to)?;
            archive::single_root(&to)
        })
        .await
        .map_err(|e| StoreError::Internal(format!("unpack task failed: {}", e)))?
        .map_err(|e| StoreError::io(format!("unpacking {}", tarball.display()), e))?;

        let suffix = if buildpack.offline { "-cached" } else { "" };
        let output = dir.join(format!("{}{}.cnb", sanitize_name(&buildpack.repo), suffix));
        info!("Packaging {} {} from source", buildpack.slug(), version);
        self.packager
            .package(&root, &output, version, buildpack.offline)
            .await?;
        Ok(output)
    }
}

#[async_trait]
impl RemoteFetcher for CachingRemoteFetcher {
    async fn get(&self, buildpack: &RemoteBuildpack) -> StoreResult<PathBuf> {
        let key = buildpack.key();
        let release = self.release(buildpack).await?;
        let version = release.version();

        if let Some(entry) = self.cache.get(key).await? {
            if entry.version == version && entry.artifact_exists() {
                debug!("Cache hit for {}: {}", key, entry.uri.display());
                return Ok(entry.uri);
            }
            debug!("Cache entry for {} is stale ({} != {})", key, entry.version, version);
        }

        let dir = self.artifact_dir(buildpack, &version);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StoreError::io(format!("creating {}", dir.display()), e))?;

        let asset = if buildpack.offline {
            None
        } else {
            release.packaged_asset(&buildpack.platform, &buildpack.arch)
        };

        let artifact = match asset {
            Some(asset) => {
                info!("Downloading {} {} ({})", buildpack.slug(), version, asset.name);
                let destination = dir.join(sanitize_name(&asset.name));
                self.releases
                    .download(&asset.browser_download_url, &destination)
                    .await?;
                destination
            }
            None => {
                self.package_source(buildpack, &release, &dir, &version)
                    .await?
            }
        };

        self.cache
            .set(key, CacheEntry::new(version, &artifact))
            .await?;
        Ok(artifact)
    }

    fn with_packager(&self, packager: Arc<dyn Packager>) -> Arc<dyn RemoteFetcher> {
        Arc::new(Self::new(self.cache.clone(), self.releases.clone(), packager))
    }
}

//! Local and remote buildpack fetchers
//!
//! Fetchers turn a buildpack descriptor into a packaged artifact on disk,
//! consulting the cache store before doing any packaging or download work.

pub mod checksum;
mod command;
pub mod github;
pub mod jam;
pub mod libpak;
pub mod local;
pub mod remote;

pub use command::host_arch;
pub use github::{GithubReleaseService, Release, ReleaseAsset, ReleaseService};
pub use jam::JamPackager;
pub use libpak::LibpakPackager;
pub use local::CachingLocalFetcher;
pub use remote::CachingRemoteFetcher;

use crate::cache::cached_key;
use crate::error::StoreResult;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Version used when packaging a local buildpack without an override
pub const DEFAULT_LOCAL_VERSION: &str = "testing";

/// A buildpack source directory on the local filesystem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalBuildpack {
    pub path: PathBuf,
    pub name: String,
    pub uncached_key: String,
    pub cached_key: String,
    pub offline: bool,
    pub version: Option<String>,
}

impl LocalBuildpack {
    pub fn new(path: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            path: path.into(),
            uncached_key: name.clone(),
            cached_key: cached_key(&name),
            name,
            offline: false,
            version: None,
        }
    }

    pub fn with_offline(self, offline: bool) -> Self {
        Self { offline, ..self }
    }

    pub fn with_version(self, version: Option<String>) -> Self {
        Self { version, ..self }
    }

    /// Cache key for the variant this descriptor asks for
    pub fn key(&self) -> &str {
        if self.offline {
            &self.cached_key
        } else {
            &self.uncached_key
        }
    }
}

/// A buildpack published as GitHub releases
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteBuildpack {
    pub org: String,
    pub repo: String,
    pub platform: String,
    pub arch: String,
    pub uncached_key: String,
    pub cached_key: String,
    pub offline: bool,
    pub version: Option<String>,
}

impl RemoteBuildpack {
    pub fn new(
        org: impl Into<String>,
        repo: impl Into<String>,
        platform: impl Into<String>,
        arch: impl Into<String>,
    ) -> Self {
        let (org, repo, platform, arch) = (org.into(), repo.into(), platform.into(), arch.into());
        let uncached_key = format!("{}:{}:{}:{}", org, repo, platform, arch);
        Self {
            cached_key: cached_key(&uncached_key),
            uncached_key,
            org,
            repo,
            platform,
            arch,
            offline: false,
            version: None,
        }
    }

    pub fn with_offline(self, offline: bool) -> Self {
        Self { offline, ..self }
    }

    pub fn with_version(self, version: Option<String>) -> Self {
        Self { version, ..self }
    }

    pub fn key(&self) -> &str {
        if self.offline {
            &self.cached_key
        } else {
            &self.uncached_key
        }
    }

    /// `org/repo`, as used by the release API
    pub fn slug(&self) -> String {
        format!("{}/{}", self.org, self.repo)
    }
}

/// Produces a packaged artifact from a local buildpack
#[async_trait]
pub trait LocalFetcher: Send + Sync {
    async fn get(&self, buildpack: &LocalBuildpack) -> StoreResult<PathBuf>;

    /// The same fetcher, packaging with `packager` instead
    fn with_packager(&self, packager: Arc<dyn Packager>) -> Arc<dyn LocalFetcher>;
}

/// Produces a packaged artifact from a GitHub-hosted buildpack
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    async fn get(&self, buildpack: &RemoteBuildpack) -> StoreResult<PathBuf>;

    /// The same fetcher, packaging source releases with `packager` instead
    fn with_packager(&self, packager: Arc<dyn Packager>) -> Arc<dyn RemoteFetcher>;
}

/// Turns buildpack source into a distributable artifact
#[async_trait]
pub trait Packager: Send + Sync {
    async fn package(
        &self,
        source_dir: &Path,
        output: &Path,
        version: &str,
        offline: bool,
    ) -> StoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_keys_follow_name() {
        let bp = LocalBuildpack::new("/tmp/cool-buildpack", "cool-buildpack");
        assert_eq!(bp.uncached_key, "cool-buildpack");
        assert_eq!(bp.cached_key, "cool-buildpack:cached");
        assert_eq!(bp.key(), "cool-buildpack");
        assert_eq!(bp.with_offline(true).key(), "cool-buildpack:cached");
    }

    #[test]
    fn remote_keys_include_target() {
        let bp = RemoteBuildpack::new("some-org", "some-repo", "linux", "arm64")
            .with_version(Some("1.0.0".to_string()));
        assert_eq!(bp.uncached_key, "some-org:some-repo:linux:arm64");
        assert_eq!(bp.cached_key, "some-org:some-repo:linux:arm64:cached");
        assert_eq!(bp.slug(), "some-org/some-repo");
        assert_eq!(bp.version.as_deref(), Some("1.0.0"));
        assert!(!bp.offline);
    }
}

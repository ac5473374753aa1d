//! GitHub release lookups and downloads

use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// A published release
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Release {
    pub tag_name: String,

    /// Source tarball (gzip tar) of the tagged tree
    #[serde(default)]
    pub tarball_url: String,

    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

/// A file attached to a release
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    pub browser_download_url: String,
}

impl Release {
    /// Release version: the tag without a leading `v` when it is semver,
    /// otherwise the tag verbatim
    pub fn version(&self) -> String {
        let stripped = self.tag_name.strip_prefix('v').unwrap_or(&self.tag_name);
        match semver::Version::parse(stripped) {
            Ok(version) => version.to_string(),
            Err(_) => self.tag_name.clone(),
        }
    }

    /// Pick a packaged buildpack asset, preferring one built for the target
    pub fn packaged_asset(&self, platform: &str, arch: &str) -> Option<&ReleaseAsset> {
        let packaged: Vec<&ReleaseAsset> = self
            .assets
            .iter()
            .filter(|a| a.name.ends_with(".cnb") || a.name.ends_with(".tgz"))
            .collect();

        let qualified = format!("{}-{}", platform, arch);
        packaged
            .iter()
            .find(|a| a.name.contains(&qualified))
            .or_else(|| packaged.iter().find(|a| a.name.contains(arch)))
            .or_else(|| packaged.first())
            .copied()
    }
}

/// Release metadata and artifact source
#[async_trait]
pub trait ReleaseService: Send + Sync {
    /// Most recent published release
    async fn latest(&self, org: &str, repo: &str) -> StoreResult<Release>;

    /// Release for a specific tag
    async fn by_tag(&self, org: &str, repo: &str, tag: &str) -> StoreResult<Release>;

    /// Stream `url` into `destination`
    async fn download(&self, url: &str, destination: &Path) -> StoreResult<()>;
}

/// `ReleaseService` backed by the GitHub REST API
#[derive(Clone)]
pub struct GithubReleaseService {
    api_url: String,
    token: Option<String>,
    agent: ureq::Agent,
}

impl GithubReleaseService {
    pub fn new(api_url: impl Into<String>, token: Option<String>) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(300)))
            .build()
            .into();
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token,
            agent,
        }
    }

    fn get(&self, url: &str) -> Result<ureq::http::Response<ureq::Body>, ureq::Error> {
        let mut request = self
            .agent
            .get(url)
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", "buildpack-store");
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }
        request.call()
    }

    async fn fetch_release(&self, slug: String, url: String) -> StoreResult<Release> {
        debug!("Fetching release metadata: {}", url);
        let service = self.clone();
        let release_err = |reason: String| StoreError::Release {
            repo: slug.clone(),
            reason,
        };

        let body = tokio::task::spawn_blocking(move || -> Result<String, ureq::Error> {
            let mut response = service.get(&url)?;
            response.body_mut().read_to_string()
        })
        .await
        .map_err(|e| StoreError::Internal(format!("release task failed: {}", e)))?
        .map_err(|e| release_err(e.to_string()))?;

        serde_json::from_str(&body).map_err(|e| release_err(format!("malformed release: {}", e)))
    }
}

#[async_trait]
impl ReleaseService for GithubReleaseService {
    async fn latest(&self, org: &str, repo: &str) -> StoreResult<Release> {
        let url = format!("{}/repos/{}/{}/releases/latest", self.api_url, org, repo);
        self.fetch_release(format!("{}/{}", org, repo), url).await
    }

    async fn by_tag(&self, org: &str, repo: &str, tag: &str) -> StoreResult<Release> {
        let url = format!(
            "{}/repos/{}/{}/releases/tags/{}",
            self.api_url, org, repo, tag
        );
        self.fetch_release(format!("{}/{}", org, repo), url).await
    }

    async fn download(&self, url: &str, destination: &Path) -> StoreResult<()> {
        debug!("Downloading {} to {}", url, destination.display());
        let service = self.clone();
        let url = url.to_string();
        let destination: PathBuf = destination.to_path_buf();

        tokio::task::spawn_blocking(move || -> StoreResult<()> {
            let response = service.get(&url).map_err(|e| StoreError::Release {
                repo: url.clone(),
                reason: e.to_string(),
            })?;
            let mut reader = response.into_body().into_reader();
            let mut file = File::create(&destination).map_err(|e| {
                StoreError::io(format!("creating {}", destination.display()), e)
            })?;
            std::io::copy(&mut reader, &mut file).map_err(|e| {
                StoreError::io(format!("downloading to {}", destination.display()), e)
            })?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Internal(format!("download task failed: {}", e)))?
    }
}

//! Acquisition requests
//!
//! A request is an immutable value: every `with_*` option consumes the
//! request and returns a new one, so partially configured requests can be
//! cloned and branched freely.

use crate::error::{StoreError, StoreResult};
use std::fmt;
use std::str::FromStr;

/// Platform/architecture pair a remote buildpack is fetched for
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    pub platform: String,
    pub arch: String,
}

impl Target {
    pub fn new(platform: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            arch: arch.into(),
        }
    }
}

impl Default for Target {
    fn default() -> Self {
        Self::new("linux", "amd64")
    }
}

impl FromStr for Target {
    type Err = StoreError;

    fn from_str(s: &str) -> StoreResult<Self> {
        match s.split_once('/') {
            Some((platform, arch))
                if !platform.is_empty() && !arch.is_empty() && !arch.contains('/') =>
            {
                Ok(Self::new(platform, arch))
            }
            _ => Err(StoreError::InvalidTarget(s.to_string())),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.platform, self.arch)
    }
}

/// Input to `BuildpackStore::resolve`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionRequest {
    reference: String,
    version: Option<String>,
    offline: bool,
    target: Option<Target>,
}

impl AcquisitionRequest {
    /// Create a request for a local path, `github.com/<org>/<repo>`, or image reference
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            version: None,
            offline: false,
            target: None,
        }
    }

    /// Package the buildpack with an explicit version
    pub fn with_version(self, version: impl Into<String>) -> Self {
        Self {
            version: Some(version.into()),
            ..self
        }
    }

    /// Package the buildpack with its dependencies vendored
    pub fn with_offline_dependencies(self) -> Self {
        Self {
            offline: true,
            ..self
        }
    }

    /// Fetch remote buildpacks for a specific platform/architecture
    pub fn with_target(self, target: Target) -> Self {
        Self {
            target: Some(target),
            ..self
        }
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn offline(&self) -> bool {
        self.offline
    }

    pub fn target(&self) -> Option<&Target> {
        self.target.as_ref()
    }
}

//! Buildpack reference classification
//!
//! Resolution order (first match wins):
//! 1. An existing local directory
//! 2. `github.com/<org>/<repo>`
//! 3. Anything else is treated as a registry image reference

use crate::error::{StoreError, StoreResult};
use std::path::{Path, PathBuf};

/// Source-control host prefixes recognized as remote references
pub const SOURCE_HOSTS: &[&str] = &["github.com"];

/// A classified buildpack reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    /// Directory on the local filesystem
    Local(PathBuf),

    /// GitHub repository publishing buildpack releases
    Remote { org: String, repo: String },

    /// Packaged buildpack image in a container registry
    Registry(String),
}

impl Reference {
    /// Classify a raw reference string
    pub fn classify(raw: &str) -> StoreResult<Self> {
        if Path::new(raw).is_dir() {
            return Ok(Self::Local(PathBuf::from(raw)));
        }

        if SOURCE_HOSTS.iter().any(|host| raw.starts_with(host)) {
            let parts: Vec<&str> = raw.splitn(3, '/').collect();
            return match parts.as_slice() {
                [_, org, repo] if !org.is_empty() && !repo.is_empty() => Ok(Self::Remote {
                    org: (*org).to_string(),
                    repo: (*repo).to_string(),
                }),
                _ => Err(StoreError::IncompleteReference(raw.to_string())),
            };
        }

        Ok(Self::Registry(raw.to_string()))
    }

    /// Short human-readable kind, used in log lines
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Local(_) => "local",
            Self::Remote { .. } => "remote",
            Self::Registry(_) => "registry",
        }
    }
}

/// Last `/`-separated segment of a reference or path
pub fn base_name(raw: &str) -> String {
    let trimmed = raw.trim_end_matches('/');
    let base = Path::new(trimmed)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if base.is_empty() {
        raw.to_string()
    } else {
        base
    }
}

/// Make a reference or name safe to use as a single directory name
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            c if c.is_ascii_alphanumeric() => c,
            '-' | '.' | '_' => c,
            _ => '_',
        })
        .collect()
}

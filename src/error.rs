//! Error types for the buildpack store
//!
//! All modules use `StoreResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for buildpack store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// All errors that can occur while acquiring a buildpack
#[derive(Error, Debug)]
pub enum StoreError {
    // Cache errors
    #[error("failed to open cache: {reason}")]
    CacheUnavailable { reason: String },

    #[error("cache at {0} is not open")]
    CacheNotOpen(PathBuf),

    #[error("cache index {path} is corrupt: {reason}")]
    CacheCorrupt { path: PathBuf, reason: String },

    // Reference errors
    #[error("incomplete github.com reference: {0:?}")]
    IncompleteReference(String),

    #[error("invalid target {0:?}: expected <platform>/<arch>")]
    InvalidTarget(String),

    // Registry image errors
    #[error("failed to pull buildpack image {image}: {reason}")]
    ImagePull { image: String, reason: String },

    #[error("failed to export image {image}: {reason}")]
    ImageExport { image: String, reason: String },

    #[error("no layers found in image {0}")]
    NoLayers(String),

    #[error("failed to decompress layer into {path}: {reason}")]
    LayerDecompression { path: PathBuf, reason: String },

    #[error("no buildpack.toml or extension.toml found under {0}")]
    DescriptorNotFound(PathBuf),

    #[error("found both buildpack.toml ({buildpack}) and extension.toml ({extension})")]
    AmbiguousDescriptor {
        buildpack: PathBuf,
        extension: PathBuf,
    },

    #[error("failed to parse descriptor {path}: {reason}")]
    DescriptorParse { path: PathBuf, reason: String },

    #[error("failed to rewrite descriptor {path}: {reason}")]
    DescriptorRewrite { path: PathBuf, reason: String },

    #[error("failed to create local buildpack from registry image: {0}")]
    RegistryExtraction(#[source] Box<StoreError>),

    // Fetch errors
    #[error("release lookup failed for {repo}: {reason}")]
    Release { repo: String, reason: String },

    #[error("failed to package {path}: {reason}")]
    Package { path: PathBuf, reason: String },

    // Configuration errors
    #[error("invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("command execution error: {command}, stderr: {stderr}")]
    CommandExecution { command: String, stderr: String },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a command execution error
    pub fn command_exec(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::CommandExecution {
            command: command.into(),
            stderr: stderr.into(),
        }
    }

    /// Name of the acquisition stage that produced this error.
    ///
    /// Registry failures surfaced by the dispatcher report the stage of the
    /// wrapped error, so a pull failure stays distinguishable from a rewrite
    /// failure.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::CacheUnavailable { .. } | Self::CacheNotOpen(_) | Self::CacheCorrupt { .. } => {
                "cache"
            }
            Self::IncompleteReference(_) | Self::InvalidTarget(_) => "reference",
            Self::ImagePull { .. } => "pull",
            Self::ImageExport { .. } => "export",
            Self::NoLayers(_) => "layers",
            Self::LayerDecompression { .. } => "decompress",
            Self::DescriptorNotFound(_)
            | Self::AmbiguousDescriptor { .. }
            | Self::DescriptorParse { .. } => "descriptor",
            Self::DescriptorRewrite { .. } => "rewrite",
            Self::RegistryExtraction(inner) => inner.stage(),
            Self::Release { .. } => "fetch",
            Self::Package { .. } => "package",
            Self::ConfigInvalid { .. } => "config",
            Self::Io { .. } => "io",
            Self::CommandFailed { .. } | Self::CommandExecution { .. } => "command",
            Self::Json(_) | Self::TomlParse(_) | Self::TomlSerialize(_) => "serialization",
            Self::Internal(_) => "internal",
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ImagePull { .. } | Self::Release { .. } => true,
            Self::CacheUnavailable { .. } => true,
            Self::RegistryExtraction(inner) => inner.is_retryable(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = StoreError::IncompleteReference("github.com/incomplete".to_string());
        assert_eq!(
            err.to_string(),
            "incomplete github.com reference: \"github.com/incomplete\""
        );
    }

    #[test]
    fn registry_errors_keep_inner_stage() {
        let err = StoreError::RegistryExtraction(Box::new(StoreError::NoLayers(
            "some-image".to_string(),
        )));
        assert_eq!(err.stage(), "layers");
        assert!(err.to_string().starts_with(
            "failed to create local buildpack from registry image: no layers found"
        ));
    }

    #[test]
    fn error_retryable() {
        assert!(StoreError::ImagePull {
            image: "x".to_string(),
            reason: "timeout".to_string(),
        }
        .is_retryable());
        assert!(!StoreError::IncompleteReference("github.com/x".to_string()).is_retryable());
    }
}

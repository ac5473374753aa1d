//! Buildpack and extension descriptors
//!
//! A buildpack directory is described by `buildpack.toml`, an extension by
//! `extension.toml`. Both share the `[metadata]` table whose
//! `include-files` and `pre-package` keys drive packaging. Keys this crate
//! does not model are carried through `extra` tables so that a
//! parse/encode cycle preserves them.

use crate::error::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Which kind of descriptor a directory carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorKind {
    Buildpack,
    Extension,
}

impl DescriptorKind {
    /// Well-known descriptor file name
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Buildpack => "buildpack.toml",
            Self::Extension => "extension.toml",
        }
    }

    /// Kind for a descriptor file name, if it is one
    pub fn from_file_name(name: &str) -> Option<Self> {
        match name {
            "buildpack.toml" => Some(Self::Buildpack),
            "extension.toml" => Some(Self::Extension),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buildpack => "buildpack",
            Self::Extension => "extension",
        }
    }
}

impl fmt::Display for DescriptorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `[buildpack]` / `[extension]` table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DescriptorInfo {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default)]
    pub version: String,

    #[serde(flatten)]
    pub extra: toml::Table,
}

/// `[metadata]` table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Files packaged into the buildpack artifact, relative to its root
    #[serde(
        rename = "include-files",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub include_files: Vec<String>,

    /// Build-time hook run before packaging
    #[serde(
        rename = "pre-package",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub pre_package: Option<String>,

    #[serde(flatten)]
    pub extra: toml::Table,
}

/// Parsed `buildpack.toml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildpackConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api: Option<String>,

    pub buildpack: DescriptorInfo,

    #[serde(default)]
    pub metadata: Metadata,

    #[serde(flatten)]
    pub extra: toml::Table,
}

/// Parsed `extension.toml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api: Option<String>,

    pub extension: DescriptorInfo,

    #[serde(default)]
    pub metadata: Metadata,

    #[serde(flatten)]
    pub extra: toml::Table,
}

/// A parsed descriptor of either kind
#[derive(Debug, Clone, PartialEq)]
pub enum Descriptor {
    Buildpack(BuildpackConfig),
    Extension(ExtensionConfig),
}

fn read(path: &Path) -> StoreResult<String> {
    std::fs::read_to_string(path)
        .map_err(|e| StoreError::io(format!("reading descriptor {}", path.display()), e))
}

fn parse_err(path: &Path) -> impl FnOnce(toml::de::Error) -> StoreError + '_ {
    move |e| StoreError::DescriptorParse {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

/// Parse a `buildpack.toml` file
pub fn parse_buildpack_config(path: &Path) -> StoreResult<BuildpackConfig> {
    toml::from_str(&read(path)?).map_err(parse_err(path))
}

/// Parse an `extension.toml` file
pub fn parse_extension_config(path: &Path) -> StoreResult<ExtensionConfig> {
    toml::from_str(&read(path)?).map_err(parse_err(path))
}

impl Descriptor {
    /// Parse the descriptor at `path` as `kind`
    pub fn parse(kind: DescriptorKind, path: &Path) -> StoreResult<Self> {
        match kind {
            DescriptorKind::Buildpack => parse_buildpack_config(path).map(Self::Buildpack),
            DescriptorKind::Extension => parse_extension_config(path).map(Self::Extension),
        }
    }

    pub fn kind(&self) -> DescriptorKind {
        match self {
            Self::Buildpack(_) => DescriptorKind::Buildpack,
            Self::Extension(_) => DescriptorKind::Extension,
        }
    }

    fn info(&self) -> &DescriptorInfo {
        match self {
            Self::Buildpack(config) => &config.buildpack,
            Self::Extension(config) => &config.extension,
        }
    }

    pub fn metadata(&self) -> &Metadata {
        match self {
            Self::Buildpack(config) => &config.metadata,
            Self::Extension(config) => &config.metadata,
        }
    }

    fn metadata_mut(&mut self) -> &mut Metadata {
        match self {
            Self::Buildpack(config) => &mut config.metadata,
            Self::Extension(config) => &mut config.metadata,
        }
    }

    pub fn id(&self) -> &str {
        &self.info().id
    }

    /// Declared `buildpack.version` / `extension.version`
    pub fn version(&self) -> &str {
        &self.info().version
    }

    /// Point packaging metadata at an already-extracted file set: the
    /// pre-package hook is dropped and `include-files` replaced wholesale.
    pub fn rewrite_metadata(&mut self, include_files: Vec<String>) {
        let metadata = self.metadata_mut();
        metadata.pre_package = None;
        metadata.include_files = include_files;
    }

    /// Serialize back to TOML
    pub fn encode(&self) -> StoreResult<String> {
        let encoded = match self {
            Self::Buildpack(config) => toml::to_string(config)?,
            Self::Extension(config) => toml::to_string(config)?,
        };
        Ok(encoded)
    }

    /// Truncate and overwrite the descriptor file at `path`
    pub fn write(&self, path: &Path) -> StoreResult<()> {
        let rewrite_err = |reason: String| StoreError::DescriptorRewrite {
            path: path.to_path_buf(),
            reason,
        };

        let encoded = self.encode().map_err(|e| rewrite_err(e.to_string()))?;
        std::fs::write(path, encoded).map_err(|e| rewrite_err(e.to_string()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::TempDir;

    pub(crate) const BUILDPACK_TOML: &str = r#"
api = "0.8"

[buildpack]
id = "paketo-buildpacks/go-dist"
name = "Paketo Buildpack for Go Distribution"
version = "2.3.4"
homepage = "https://github.com/paketo-buildpacks/go-dist"

[metadata]
include-files = ["bin/build", "bin/detect", "buildpack.toml"]
pre-package = "./scripts/build.sh"

[[metadata.dependencies]]
id = "go"
version = "1.22.0"
stacks = ["*"]

[[stacks]]
id = "*"
"#;

    const EXTENSION_TOML: &str = r#"
api = "0.9"

[extension]
id = "paketo-community/ubi-nodejs-extension"
version = "0.1.0"

[metadata]
pre-package = "./scripts/build.sh"
"#;

    fn write_file(temp: &TempDir, name: &str, contents: &str) -> std::path::PathBuf {
        let path = temp.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn kind_from_file_name() {
        assert_eq!(
            DescriptorKind::from_file_name("buildpack.toml"),
            Some(DescriptorKind::Buildpack)
        );
        assert_eq!(
            DescriptorKind::from_file_name("extension.toml"),
            Some(DescriptorKind::Extension)
        );
        assert_eq!(DescriptorKind::from_file_name("package.toml"), None);
    }

    #[test]
    fn parse_buildpack() {
        let temp = TempDir::new().unwrap();
        let path = write_file(&temp, "buildpack.toml", BUILDPACK_TOML);

        let descriptor = Descriptor::parse(DescriptorKind::Buildpack, &path).unwrap();
        assert_eq!(descriptor.kind(), DescriptorKind::Buildpack);
        assert_eq!(descriptor.id(), "paketo-buildpacks/go-dist");
        assert_eq!(descriptor.version(), "2.3.4");
        assert_eq!(
            descriptor.metadata().pre_package.as_deref(),
            Some("./scripts/build.sh")
        );
    }

    #[test]
    fn parse_extension() {
        let temp = TempDir::new().unwrap();
        let path = write_file(&temp, "extension.toml", EXTENSION_TOML);

        let descriptor = Descriptor::parse(DescriptorKind::Extension, &path).unwrap();
        assert_eq!(descriptor.kind(), DescriptorKind::Extension);
        assert_eq!(descriptor.version(), "0.1.0");
        assert!(descriptor.metadata().include_files.is_empty());
    }

    #[test]
    fn rewrite_preserves_untouched_fields() {
        let temp = TempDir::new().unwrap();
        let path = write_file(&temp, "buildpack.toml", BUILDPACK_TOML);
        let original = parse_buildpack_config(&path).unwrap();

        let mut descriptor = Descriptor::Buildpack(original.clone());
        descriptor.rewrite_metadata(vec!["bin/run".to_string()]);
        descriptor.write(&path).unwrap();

        let rewritten = parse_buildpack_config(&path).unwrap();
        assert_eq!(rewritten.api, original.api);
        assert_eq!(rewritten.buildpack, original.buildpack);
        assert_eq!(rewritten.extra, original.extra);
        assert_eq!(rewritten.metadata.extra, original.metadata.extra);
        assert_eq!(rewritten.metadata.include_files, vec!["bin/run"]);
        assert!(rewritten.metadata.pre_package.is_none());

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("pre-package"));
    }

    #[test]
    fn missing_id_is_parse_error() {
        let temp = TempDir::new().unwrap();
        let path = write_file(&temp, "buildpack.toml", "[buildpack]\nversion = \"1.0.0\"\n");

        let err = Descriptor::parse(DescriptorKind::Buildpack, &path).unwrap_err();
        assert!(matches!(err, StoreError::DescriptorParse { .. }));
    }

    #[test]
    fn write_to_missing_directory_is_rewrite_error() {
        let temp = TempDir::new().unwrap();
        let path = write_file(&temp, "extension.toml", EXTENSION_TOML);
        let descriptor = Descriptor::parse(DescriptorKind::Extension, &path).unwrap();

        let err = descriptor
            .write(&temp.path().join("gone/extension.toml"))
            .unwrap_err();
        assert_eq!(err.stage(), "rewrite");
    }
}

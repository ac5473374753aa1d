//! `jam` + `pack` packager
//!
//! `jam pack` builds buildpack source into a tarball; `pack buildpack
//! package` then turns the unpacked tarball into a `.cnb` file.

use crate::archive;
use crate::error::{StoreError, StoreResult};
use crate::extract::descriptor::DescriptorKind;
use crate::fetch::command::{host_arch, run};
use crate::fetch::Packager;
use async_trait::async_trait;
use std::path::Path;

/// Packager shelling out to `jam` and `pack`
#[derive(Debug, Clone)]
pub struct JamPackager {
    jam: String,
    pack: String,
}

impl JamPackager {
    pub fn new(jam: impl Into<String>, pack: impl Into<String>) -> Self {
        Self {
            jam: jam.into(),
            pack: pack.into(),
        }
    }

    /// Descriptor kind of a buildpack source directory
    pub fn detect_kind(source_dir: &Path) -> DescriptorKind {
        if source_dir.join(DescriptorKind::Extension.file_name()).is_file() {
            DescriptorKind::Extension
        } else {
            DescriptorKind::Buildpack
        }
    }

    /// `jam pack` arguments for a source directory
    pub fn jam_args(
        kind: DescriptorKind,
        source_dir: &Path,
        tarball: &Path,
        version: &str,
        offline: bool,
    ) -> Vec<String> {
        let mut args = vec![
            "pack".to_string(),
            format!("--{}", kind.as_str()),
            source_dir.join(kind.file_name()).display().to_string(),
            "--output".to_string(),
            tarball.display().to_string(),
            "--version".to_string(),
            version.to_string(),
        ];
        if offline {
            args.push("--offline".to_string());
        }
        args
    }

    /// `pack <kind> package` arguments
    pub fn pack_args(kind: DescriptorKind, output: &Path) -> Vec<String> {
        vec![
            kind.as_str().to_string(),
            "package".to_string(),
            output.display().to_string(),
            "--format".to_string(),
            "file".to_string(),
            "--target".to_string(),
            format!("linux/{}", host_arch()),
        ]
    }
}

impl Default for JamPackager {
    fn default() -> Self {
        Self::new("jam", "pack")
    }
}

#[async_trait]
impl Packager for JamPackager {
    async fn package(
        &self,
        source_dir: &Path,
        output: &Path,
        version: &str,
        offline: bool,
    ) -> StoreResult<()> {
        let package_err = |reason: String| StoreError::Package {
            path: source_dir.to_path_buf(),
            reason,
        };

        let kind = Self::detect_kind(source_dir);
        let work = tempfile::tempdir()
            .map_err(|e| StoreError::io("creating packaging work dir", e))?;
        let tarball = work.path().join(format!("{}.tgz", version));

        run(
            &self.jam,
            &Self::jam_args(kind, source_dir, &tarball, version, offline),
            None,
        )
        .await
        .map_err(|e| package_err(e.to_string()))?;

        let build_dir = work.path().join("build");
        let (unpack_from, unpack_to) = (tarball.clone(), build_dir.clone());
        tokio::task::spawn_blocking(move || archive::unpack_file(&unpack_from, &unpack_to))
            .await
            .map_err(|e| StoreError::Internal(format!("unpack task failed: {}", e)))?
            .map_err(|e| package_err(format!("unpacking {}: {}", tarball.display(), e)))?;

        run(&self.pack, &Self::pack_args(kind, output), Some(&build_dir))
            .await
            .map_err(|e| package_err(e.to_string()))
    }
}

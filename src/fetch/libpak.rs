//! libpak `create-package` + `pack` packager
//!
//! `create-package` assembles a libpak buildpack into a staging directory,
//! which `pack buildpack package` turns into a `.cnb` file.

use crate::error::{StoreError, StoreResult};
use crate::fetch::command::{host_arch, run};
use crate::fetch::Packager;
use async_trait::async_trait;
use std::path::Path;

/// Packager shelling out to `create-package` and `pack`
#[derive(Debug, Clone)]
pub struct LibpakPackager {
    create_package: String,
    pack: String,
}

impl LibpakPackager {
    pub fn new(create_package: impl Into<String>, pack: impl Into<String>) -> Self {
        Self {
            create_package: create_package.into(),
            pack: pack.into(),
        }
    }

    /// `create-package` arguments; run from the buildpack source directory
    pub fn create_package_args(destination: &Path, version: &str, offline: bool) -> Vec<String> {
        let mut args = vec![
            "--destination".to_string(),
            destination.display().to_string(),
            "--version".to_string(),
            version.to_string(),
        ];
        if offline {
            args.push("--include-dependencies".to_string());
        }
        args
    }

    /// `pack buildpack package` arguments for a staged buildpack
    pub fn pack_args(output: &Path, staged: &Path) -> Vec<String> {
        vec![
            "buildpack".to_string(),
            "package".to_string(),
            output.display().to_string(),
            "--path".to_string(),
            staged.display().to_string(),
            "--format".to_string(),
            "file".to_string(),
            "--target".to_string(),
            format!("linux/{}", host_arch()),
        ]
    }
}

impl Default for LibpakPackager {
    fn default() -> Self {
        Self::new("create-package", "pack")
    }
}

#[async_trait]
impl Packager for LibpakPackager {
    async fn package(
        &self,
        source_dir: &Path,
        output: &Path,
        version: &str,
        offline: bool,
    ) -> StoreResult<()> {
        let package_err = |e: StoreError| StoreError::Package {
            path: source_dir.to_path_buf(),
            reason: e.to_string(),
        };

        let staged = tempfile::tempdir()
            .map_err(|e| StoreError::io("creating create-package destination", e))?;

        run(
            &self.create_package,
            &Self::create_package_args(staged.path(), version, offline),
            Some(source_dir),
        )
        .await
        .map_err(package_err)?;

        run(&self.pack, &Self::pack_args(output, staged.path()), None)
            .await
            .map_err(package_err)
    }
}

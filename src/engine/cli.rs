//! Docker/Podman CLI engine
//!
//! Implements `ContainerEngine` by executing the engine binary directly.

use crate::engine::{ContainerEngine, ExportedImage};
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// Container engine driven through its command line (`docker` or `podman`)
#[derive(Debug, Clone)]
pub struct CliEngine {
    binary: String,
}

impl CliEngine {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Execute an engine command and return the output
    async fn exec(&self, args: &[&str]) -> StoreResult<std::process::Output> {
        debug!("Executing: {} {:?}", self.binary, args);

        Command::new(&self.binary)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| StoreError::command_failed(format!("{} {:?}", self.binary, args), e))
    }
}

impl Default for CliEngine {
    fn default() -> Self {
        Self::new("docker")
    }
}

#[async_trait]
impl ContainerEngine for CliEngine {
    async fn pull(&self, reference: &str) -> StoreResult<()> {
        info!("Pulling image: {}", reference);

        let output = self
            .exec(&["pull", reference])
            .await
            .map_err(|e| StoreError::ImagePull {
                image: reference.to_string(),
                reason: e.to_string(),
            })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(StoreError::ImagePull {
                image: reference.to_string(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    async fn export_image(&self, reference: &str) -> StoreResult<ExportedImage> {
        let export_err = |reason: String| StoreError::ImageExport {
            image: reference.to_string(),
            reason,
        };

        let workdir = tempfile::tempdir().map_err(|e| export_err(e.to_string()))?;
        let archive = workdir.path().join("image.tar");
        let archive_arg = archive.display().to_string();

        debug!("Exporting {} to {}", reference, archive_arg);
        let output = self
            .exec(&["save", "-o", &archive_arg, reference])
            .await
            .map_err(|e| export_err(e.to_string()))?;

        if !output.status.success() {
            return Err(export_err(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let reference = reference.to_string();
        tokio::task::spawn_blocking(move || ExportedImage::open_owned(reference, archive, workdir))
            .await
            .map_err(|e| StoreError::Internal(format!("export task failed: {}", e)))?
    }

    fn engine_name(&self) -> &str {
        &self.binary
    }
}

//! Saved image archives
//!
//! `docker save` / `podman save` write a tar holding a `manifest.json` that
//! lists the image's layer blobs (bottom to top) by their path inside the
//! archive. Layer blobs may be plain tar or gzip tar.

use crate::archive;
use crate::error::{StoreError, StoreResult};
use serde::Deserialize;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Manifest file name inside a saved image archive
pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    #[serde(rename = "Layers", default)]
    layers: Vec<String>,
}

/// An image exported from the engine's local store
#[derive(Debug)]
pub struct ExportedImage {
    reference: String,
    archive: PathBuf,
    layers: Vec<ImageLayer>,
    _workdir: Option<TempDir>,
}

/// One layer blob inside a saved image archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageLayer {
    archive: PathBuf,
    entry: String,
}

impl ExportedImage {
    /// Read the layer list from a saved image archive
    pub fn open(reference: impl Into<String>, archive: impl Into<PathBuf>) -> StoreResult<Self> {
        let reference = reference.into();
        let archive = archive.into();
        let layers = read_layers(&reference, &archive)?;
        Ok(Self {
            reference,
            archive,
            layers,
            _workdir: None,
        })
    }

    /// Like `open`, but removes `workdir` when the image is dropped
    pub fn open_owned(
        reference: impl Into<String>,
        archive: impl Into<PathBuf>,
        workdir: TempDir,
    ) -> StoreResult<Self> {
        let mut image = Self::open(reference, archive)?;
        image._workdir = Some(workdir);
        Ok(image)
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn archive(&self) -> &Path {
        &self.archive
    }

    /// Layers bottom to top; fails with `NoLayers` when the image has none
    pub fn layers(&self) -> StoreResult<&[ImageLayer]> {
        if self.layers.is_empty() {
            return Err(StoreError::NoLayers(self.reference.clone()));
        }
        Ok(&self.layers)
    }
}

impl ImageLayer {
    /// Path of the blob inside the archive
    pub fn entry(&self) -> &str {
        &self.entry
    }

    /// Uncompressed tar stream of this layer
    pub fn uncompressed(&self) -> std::io::Result<Box<dyn Read + Send>> {
        let file = File::open(&self.archive)?;
        let mut outer = tar::Archive::new(file);

        for entry in outer.entries()? {
            let mut entry = entry?;
            if normalize(&entry.path()?.to_string_lossy()) != self.entry {
                continue;
            }

            let mut blob = tempfile::tempfile()?;
            std::io::copy(&mut entry, &mut blob)?;
            blob.seek(SeekFrom::Start(0))?;
            return archive::decompressing(blob);
        }

        Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("layer {} not found in {}", self.entry, self.archive.display()),
        ))
    }
}

fn normalize(path: &str) -> String {
    path.trim_start_matches("./").to_string()
}

fn read_layers(reference: &str, archive: &Path) -> StoreResult<Vec<ImageLayer>> {
    let export_err = |reason: String| StoreError::ImageExport {
        image: reference.to_string(),
        reason,
    };

    let file = File::open(archive)
        .map_err(|e| export_err(format!("opening {}: {}", archive.display(), e)))?;
    let mut outer = tar::Archive::new(file);
    let entries = outer
        .entries()
        .map_err(|e| export_err(format!("reading {}: {}", archive.display(), e)))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| export_err(e.to_string()))?;
        let path = entry.path().map_err(|e| export_err(e.to_string()))?;
        if normalize(&path.to_string_lossy()) != MANIFEST_FILE {
            continue;
        }

        let mut content = String::new();
        entry
            .read_to_string(&mut content)
            .map_err(|e| export_err(format!("reading {}: {}", MANIFEST_FILE, e)))?;
        let manifest: Vec<ManifestEntry> = serde_json::from_str(&content)
            .map_err(|e| export_err(format!("malformed {}: {}", MANIFEST_FILE, e)))?;

        let layers = manifest
            .into_iter()
            .next()
            .map(|m| m.layers)
            .unwrap_or_default();
        return Ok(layers
            .into_iter()
            .map(|entry| ImageLayer {
                archive: archive.to_path_buf(),
                entry: normalize(&entry),
            })
            .collect());
    }

    Err(export_err(format!(
        "{} has no {}",
        archive.display(),
        MANIFEST_FILE
    )))
}

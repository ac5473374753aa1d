//! Registry image extraction
//!
//! Turns a packaged buildpack image into a buildpack source directory that
//! the local fetcher can repackage:
//!
//! 1. Pull the image and export it from the engine's local store
//! 2. Unpack the first layer (buildpack images carry their payload there)
//! 3. Find `buildpack.toml` or `extension.toml` in the unpacked tree
//! 4. Rewrite its metadata so `include-files` lists the extracted files and
//!    no pre-package hook runs again

pub mod descriptor;

pub use descriptor::{
    parse_buildpack_config, parse_extension_config, BuildpackConfig, Descriptor, DescriptorKind,
    ExtensionConfig, Metadata,
};

use crate::archive;
use crate::engine::{ContainerEngine, ImageLayer};
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Result of extracting a registry image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedBuildpack {
    /// Directory containing the rewritten descriptor
    pub root: PathBuf,

    /// Version declared by the descriptor
    pub version: String,

    pub kind: DescriptorKind,
}

/// Produces a local buildpack directory from a registry image
#[async_trait]
pub trait RegistryExtractor: Send + Sync {
    async fn extract(&self, reference: &str, destination: &Path) -> StoreResult<ExtractedBuildpack>;
}

/// `RegistryExtractor` backed by a container engine
pub struct ImageExtractor {
    engine: Arc<dyn ContainerEngine>,
}

impl ImageExtractor {
    pub fn new(engine: Arc<dyn ContainerEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl RegistryExtractor for ImageExtractor {
    async fn extract(&self, reference: &str, destination: &Path) -> StoreResult<ExtractedBuildpack> {
        self.engine.pull(reference).await?;

        let image = self.engine.export_image(reference).await?;
        let layer = image.layers()?[0].clone();
        debug!(
            "Exported {} via {}, using layer {}",
            reference,
            self.engine.engine_name(),
            layer.entry()
        );

        let destination = destination.to_path_buf();
        let extracted = tokio::task::spawn_blocking(move || {
            unpack_layer(&layer, &destination)?;
            locate_and_rewrite(&destination)
        })
        .await
        .map_err(|e| StoreError::Internal(format!("extraction task failed: {}", e)))??;
        drop(image);

        info!(
            "Extracted {} {} from {} into {}",
            extracted.kind,
            extracted.version,
            reference,
            extracted.root.display()
        );
        Ok(extracted)
    }
}

fn unpack_layer(layer: &ImageLayer, destination: &Path) -> StoreResult<()> {
    let decompress_err = |e: std::io::Error| StoreError::LayerDecompression {
        path: destination.to_path_buf(),
        reason: e.to_string(),
    };

    let stream = layer.uncompressed().map_err(decompress_err)?;
    archive::unpack(stream, destination).map_err(decompress_err)
}

/// Files found in an extracted tree and the descriptor that owns them
#[derive(Debug, Default)]
struct Walk {
    files: Vec<PathBuf>,
    buildpack: Option<PathBuf>,
    extension: Option<PathBuf>,
}

/// Depth-first walk in lexicographic order; symlinks are recorded, never followed
fn walk(dir: &Path, found: &mut Walk) -> StoreResult<()> {
    let access_err =
        |e: std::io::Error| StoreError::io(format!("accessing extracted path {}", dir.display()), e);

    let mut entries = std::fs::read_dir(dir)
        .map_err(access_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(access_err)?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let path = entry.path();
        if entry.file_type().map_err(access_err)?.is_dir() {
            walk(&path, found)?;
            continue;
        }

        match DescriptorKind::from_file_name(&entry.file_name().to_string_lossy()) {
            Some(DescriptorKind::Buildpack) => found.buildpack = Some(path.clone()),
            Some(DescriptorKind::Extension) => found.extension = Some(path.clone()),
            None => {}
        }
        found.files.push(path);
    }
    Ok(())
}

/// `include-files` for a descriptor: every other file under its directory,
/// relative to that directory
fn include_files(files: &[PathBuf], descriptor_path: &Path, root: &Path) -> Vec<String> {
    let mut included: Vec<String> = files
        .iter()
        .filter(|path| path.as_path() != descriptor_path)
        .filter_map(|path| match path.strip_prefix(root) {
            Ok(relative) => Some(relative.to_string_lossy().into_owned()),
            Err(_) => {
                debug!("Skipping {} outside {}", path.display(), root.display());
                None
            }
        })
        .collect();
    included.sort();
    included
}

/// Find the descriptor in an extracted tree, rewrite its metadata in place,
/// and report its directory and declared version.
///
/// Among descriptors of one kind the last in walk order wins; a tree holding
/// both kinds is rejected.
pub fn locate_and_rewrite(extracted: &Path) -> StoreResult<ExtractedBuildpack> {
    let mut found = Walk::default();
    walk(extracted, &mut found)?;

    let (kind, descriptor_path) = match (found.buildpack.take(), found.extension.take()) {
        (Some(buildpack), Some(extension)) => {
            return Err(StoreError::AmbiguousDescriptor {
                buildpack,
                extension,
            })
        }
        (Some(path), None) => (DescriptorKind::Buildpack, path),
        (None, Some(path)) => (DescriptorKind::Extension, path),
        (None, None) => return Err(StoreError::DescriptorNotFound(extracted.to_path_buf())),
    };

    let root = descriptor_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| extracted.to_path_buf());
    debug!("Using {} at {}", kind, descriptor_path.display());

    let mut descriptor = Descriptor::parse(kind, &descriptor_path)?;
    descriptor.rewrite_metadata(include_files(&found.files, &descriptor_path, &root));
    descriptor.write(&descriptor_path)?;

    Ok(ExtractedBuildpack {
        root,
        version: descriptor.version().to_string(),
        kind,
    })
}

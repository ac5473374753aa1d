//! Container engine abstraction
//!
//! The extractor only needs two things from an engine: pulling an image
//! into the local store and exporting it as a layered archive.

pub mod cli;
pub mod image;

pub use cli::CliEngine;
pub use image::{ExportedImage, ImageLayer};

use crate::error::StoreResult;
use async_trait::async_trait;

/// Abstract container engine interface
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Pull an image into the engine's local store
    async fn pull(&self, reference: &str) -> StoreResult<()>;

    /// Export a pulled image from the local store
    async fn export_image(&self, reference: &str) -> StoreResult<ExportedImage>;

    /// Human-readable engine name for log lines
    fn engine_name(&self) -> &str;
}

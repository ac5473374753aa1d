//! Content checksums for buildpack source directories
//!
//! Same directory contents = same checksum, so an unchanged buildpack is
//! never repackaged.

use crate::error::{StoreError, StoreResult};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

/// SHA256 over the sorted relative paths and contents of every file under `dir`
pub fn directory_checksum(dir: &Path) -> StoreResult<String> {
    let mut files = Vec::new();
    collect_files(dir, &mut files)?;
    files.sort();

    let mut hasher = Sha256::new();
    for path in &files {
        let relative = path.strip_prefix(dir).unwrap_or(path);
        hasher.update(relative.to_string_lossy().as_bytes());
        hasher.update([0u8]);

        let meta = fs::symlink_metadata(path)
            .map_err(|e| StoreError::io(format!("reading {}", path.display()), e))?;
        if meta.file_type().is_symlink() {
            let target = fs::read_link(path)
                .map_err(|e| StoreError::io(format!("reading link {}", path.display()), e))?;
            hasher.update(target.to_string_lossy().as_bytes());
        } else {
            let contents = fs::read(path)
                .map_err(|e| StoreError::io(format!("reading {}", path.display()), e))?;
            hasher.update(&contents);
        }
        hasher.update([0u8]);
    }

    Ok(hex::encode(hasher.finalize()))
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> StoreResult<()> {
    let entries =
        fs::read_dir(dir).map_err(|e| StoreError::io(format!("listing {}", dir.display()), e))?;

    for entry in entries {
        let entry = entry.map_err(|e| StoreError::io(format!("listing {}", dir.display()), e))?;
        let file_type = entry
            .file_type()
            .map_err(|e| StoreError::io(format!("inspecting {}", entry.path().display()), e))?;
        if file_type.is_dir() {
            collect_files(&entry.path(), files)?;
        } else {
            files.push(entry.path());
        }
    }
    Ok(())
}

//! Tar archive helpers shared by image extraction and packaging
//!
//! Archives may be plain tar or gzip-compressed tar; compression is detected
//! from the stream's magic bytes rather than the file name.

use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use tar::Archive;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Wrap `reader` in a gzip decoder when its first bytes carry the gzip magic
pub fn decompressing<R: Read + Send + 'static>(reader: R) -> io::Result<Box<dyn Read + Send>> {
    let mut buffered = BufReader::new(reader);
    let is_gzip = buffered.fill_buf()?.starts_with(&GZIP_MAGIC);
    if is_gzip {
        Ok(Box::new(GzDecoder::new(buffered)))
    } else {
        Ok(Box::new(buffered))
    }
}

/// Unpack a tar stream into `destination`, preserving its directory structure
pub fn unpack<R: Read>(reader: R, destination: &Path) -> io::Result<()> {
    std::fs::create_dir_all(destination)?;
    let mut archive = Archive::new(reader);
    archive.set_preserve_permissions(true);
    archive.unpack(destination)
}

/// Unpack a (possibly gzip-compressed) tar file into `destination`
pub fn unpack_file(archive: &Path, destination: &Path) -> io::Result<()> {
    let file = File::open(archive)?;
    unpack(decompressing(file)?, destination)
}

/// The single top-level directory of an unpacked tree, or the tree itself
///
/// Source tarballs usually wrap everything in one `<name>-<rev>/` directory.
pub fn single_root(dir: &Path) -> io::Result<PathBuf> {
    let entries = std::fs::read_dir(dir)?.collect::<Result<Vec<_>, _>>()?;
    match entries.as_slice() {
        [only] if only.file_type()?.is_dir() => Ok(only.path()),
        _ => Ok(dir.to_path_buf()),
    }
}

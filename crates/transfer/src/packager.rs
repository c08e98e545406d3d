//! Directory packaging into content-addressed archives.
//!
//! A directory source is shipped as a single zip archive and unpacked by
//! the remote decode script. Packaging is deterministic (sorted entries,
//! fixed timestamps) so byte-identical trees produce byte-identical
//! archives and collapse under content-hash de-duplication.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::{NamedTempFile, TempPath};
use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

use crate::TransferError;

/// A packaged directory: archive path plus the owned scratch handle that
/// deletes it on drop.
#[derive(Debug)]
pub struct PackagedArchive {
    pub path: PathBuf,
    pub scratch: TempPath,
}

/// Turns a local directory into a single archive payload.
pub trait DirectoryPackager: Send + Sync {
    fn package(&self, dir: &Path) -> Result<PackagedArchive, TransferError>;
}

/// Default packager: zip archive in the system temp directory.
#[derive(Debug, Default)]
pub struct ZipPackager;

impl DirectoryPackager for ZipPackager {
    fn package(&self, dir: &Path) -> Result<PackagedArchive, TransferError> {
        let (file, scratch) = NamedTempFile::new()?.into_parts();
        let mut zip = zip::ZipWriter::new(file);
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(zip::DateTime::default());

        let mut files = Vec::new();
        let mut empty_dirs = Vec::new();
        collect_entries(dir, dir, &mut files, &mut empty_dirs)?;
        files.sort();
        empty_dirs.sort();

        for rel in &empty_dirs {
            zip.add_directory(rel.clone(), options)
                .map_err(|e| TransferError::Archive(e.to_string()))?;
        }
        for rel in &files {
            zip.start_file(rel.clone(), options)
                .map_err(|e| TransferError::Archive(e.to_string()))?;
            let mut src = std::fs::File::open(dir.join(rel.replace('/', std::path::MAIN_SEPARATOR_STR)))?;
            std::io::copy(&mut src, &mut zip)?;
        }

        let mut file = zip
            .finish()
            .map_err(|e| TransferError::Archive(e.to_string()))?;
        file.flush()?;

        Ok(PackagedArchive {
            path: scratch.to_path_buf(),
            scratch,
        })
    }
}

/// Recursively collects relative paths, normalized to forward slashes.
fn collect_entries(
    root: &Path,
    current: &Path,
    files: &mut Vec<String>,
    empty_dirs: &mut Vec<String>,
) -> Result<(), TransferError> {
    let mut seen_any = false;
    for entry in std::fs::read_dir(current)? {
        seen_any = true;
        let entry = entry?;
        let path = entry.path();
        let metadata = entry.metadata()?;
        if metadata.is_dir() {
            collect_entries(root, &path, files, empty_dirs)?;
        } else if metadata.is_file() {
            let rel = path.strip_prefix(root).map_err(std::io::Error::other)?;
            files.push(rel.to_string_lossy().replace('\\', "/"));
        }
    }
    if !seen_any && current != root {
        let rel = current.strip_prefix(root).map_err(std::io::Error::other)?;
        empty_dirs.push(rel.to_string_lossy().replace('\\', "/"));
    }
    Ok(())
}

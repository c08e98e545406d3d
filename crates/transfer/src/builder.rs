//! Manifest construction from local sources.
//!
//! Files contribute their own bytes; directories are packaged into a
//! zip archive first. Items are keyed by an MD5 digest of the exact
//! payload bytes, which doubles as the transport-level checksum the
//! remote scripts verify against (ubiquity, not security).

use std::io::Read;
use std::path::{Path, PathBuf};

use md5::{Digest, Md5};
use tracing::debug;

use crate::manifest::{TransferItem, TransferManifest};
use crate::packager::DirectoryPackager;
use crate::TransferError;

/// MD5 of `data`, hex encoded.
pub fn content_hash_bytes(data: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Streamed MD5 of an entire file, hex encoded.
pub fn content_hash_file(path: &Path) -> Result<String, TransferError> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Md5::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Builds the manifest for one batch of sources.
///
/// Fail-fast: any source that is neither a regular file nor a directory
/// aborts the whole call with [`TransferError::SourceNotFound`] and no
/// partial manifest is returned.
pub fn build_manifest(
    sources: &[PathBuf],
    remote_root: &str,
    packager: &dyn DirectoryPackager,
) -> Result<TransferManifest, TransferError> {
    let mut manifest = TransferManifest::new();

    for source in sources {
        let destination = remote_join(remote_root, basename(source)?);
        let item = if source.is_file() {
            let hash = content_hash_file(source)?;
            let size = std::fs::metadata(source)?.len();
            TransferItem::new(hash, source, destination, size)
        } else if source.is_dir() {
            let archive = packager.package(source)?;
            let hash = content_hash_file(&archive.path)?;
            let size = std::fs::metadata(&archive.path)?.len();
            TransferItem::new(hash, source, destination, size)
                .with_archive(archive.path, archive.scratch)
        } else {
            return Err(TransferError::SourceNotFound(source.clone()));
        };
        manifest.insert(item);
    }

    debug!(items = manifest.len(), remote_root, "manifest built");
    Ok(manifest)
}

/// Joins a name onto a remote root, matching the root's separator style.
pub(crate) fn remote_join(root: &str, name: &str) -> String {
    let sep = if root.contains('\\') { '\\' } else { '/' };
    if root.ends_with(['\\', '/']) {
        format!("{root}{name}")
    } else {
        format!("{root}{sep}{name}")
    }
}

fn basename(source: &Path) -> Result<&str, TransferError> {
    source
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| TransferError::SourceNotFound(source.to_path_buf()))
}

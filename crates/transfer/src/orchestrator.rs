//! End-to-end transfer pipeline.
//!
//! One `upload` call runs the phases in a fixed order: build the
//! manifest, ask the remote what it already has, stream the dirty
//! payloads, tell the remote to materialize them, and report. No phase
//! starts before the previous one finished, and a failed phase aborts
//! the rest of the batch.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::TransferError;
use crate::builder::{build_manifest, remote_join};
use crate::encoder::ChunkedStreamEncoder;
use crate::exchange::RemoteExchange;
use crate::manifest::TransferReport;
use crate::packager::{DirectoryPackager, ZipPackager};
use crate::session::{CommandSession, IdSource, SessionConfig, UuidSource};

/// Progress callback: `(wire_bytes_done, wire_bytes_total, src, dst)`.
///
/// Totals are wire bytes for the whole batch, counting only items that
/// actually transfer, so a bar driven by this reaches 100% exactly when
/// the last chunk lands. The lifetime parameter lets callers pass
/// closures that borrow local state for the duration of one `upload`.
pub type ProgressFn<'p> = dyn Fn(u64, u64, &str, &str) + Send + Sync + 'p;

/// Drives complete transfer batches over one command session.
pub struct TransferOrchestrator<'a> {
    session: &'a dyn CommandSession,
    config: SessionConfig,
    packager: Box<dyn DirectoryPackager>,
    ids: Box<dyn IdSource>,
}

impl<'a> TransferOrchestrator<'a> {
    pub fn new(session: &'a dyn CommandSession) -> Self {
        Self::with_parts(
            session,
            SessionConfig::default(),
            Box::new(ZipPackager),
            Box::new(UuidSource),
        )
    }

    pub fn with_parts(
        session: &'a dyn CommandSession,
        config: SessionConfig,
        packager: Box<dyn DirectoryPackager>,
        ids: Box<dyn IdSource>,
    ) -> Self {
        Self {
            session,
            config,
            packager,
            ids,
        }
    }

    /// Transfers `sources` into the remote `remote_root` directory.
    ///
    /// Returns the total wire bytes written and the per-item report.
    /// Items whose content already matches the remote are skipped
    /// entirely; an empty batch issues no remote calls at all.
    pub async fn upload(
        &self,
        sources: &[PathBuf],
        remote_root: &str,
        progress: Option<&ProgressFn<'_>>,
    ) -> Result<(u64, TransferReport), TransferError> {
        let manifest = build_manifest(sources, remote_root, self.packager.as_ref())?;
        if manifest.is_empty() {
            return Ok((0, manifest.to_report()));
        }

        let exchange = RemoteExchange::new(self.session, &self.config, self.ids.as_ref());
        let mut manifest = exchange.check(manifest).await?;

        let total = manifest.pending_wire_bytes();
        let encoder = ChunkedStreamEncoder::new(self.session, self.config.command_limit);
        let mut done: u64 = 0;
        for hash in manifest.hashes() {
            let (payload, src, dst, temp_path) = {
                let Some(item) = manifest.get(&hash) else {
                    continue;
                };
                if item.dirty != Some(true) {
                    continue;
                }
                let temp_path = remote_join(
                    &self.config.remote_temp_dir,
                    &format!("shellcopy-{}.b64", self.ids.next_id()),
                );
                (
                    item.payload_path().to_path_buf(),
                    item.source.display().to_string(),
                    item.destination.clone(),
                    temp_path,
                )
            };

            let mut file = std::fs::File::open(&payload)?;
            let base = done;
            let stats = encoder
                .upload(&mut file, &temp_path, |chunk_bytes| {
                    if let Some(cb) = progress {
                        cb(base + chunk_bytes, total, &src, &dst);
                    }
                })
                .await?;
            done += stats.bytes;
            manifest = manifest.apply_upload(&hash, temp_path, stats);
        }

        let manifest = exchange.decode(manifest).await?;

        let total_bytes = manifest.transferred_wire_bytes();
        let report = manifest.to_report();
        info!(
            items = report.len(),
            wire_bytes = total_bytes,
            remote_root,
            "transfer complete"
        );
        Ok((total_bytes, report))
    }

    /// Convenience wrapper for a single source without progress.
    pub async fn upload_one(
        &self,
        source: &Path,
        remote_root: &str,
    ) -> Result<(u64, TransferReport), TransferError> {
        self.upload(&[source.to_path_buf()], remote_root, None).await
    }
}

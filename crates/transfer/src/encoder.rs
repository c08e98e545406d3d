//! Chunked text-safe upload of a byte stream to a remote file.
//!
//! A payload is pushed through successive append commands, each carrying
//! one base64 block sized so the full command text stays under the
//! transport's line ceiling.

use std::io::Read;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use shellcopy_protocol::{command, decode_error_stream};
use tracing::debug;

use crate::session::{CommandOutput, CommandSession};
use crate::TransferError;

/// Counters for one encoded upload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkStats {
    /// Number of append commands issued.
    pub chunks: u64,
    /// Total wire bytes written: base64 characters, not source bytes.
    pub bytes: u64,
}

/// Base64-expanded length of a payload of `size` bytes.
pub fn encoded_len(size: u64) -> u64 {
    size.div_ceil(3) * 4
}

/// Writes byte streams to remote files through size-bounded commands.
pub struct ChunkedStreamEncoder<'a> {
    session: &'a dyn CommandSession,
    command_limit: usize,
}

impl<'a> ChunkedStreamEncoder<'a> {
    pub fn new(session: &'a dyn CommandSession, command_limit: usize) -> Self {
        Self {
            session,
            command_limit,
        }
    }

    /// Uploads `reader` to the remote file `dest`.
    ///
    /// The destination is truncated first so a failed prior run can never
    /// leave stale content behind, then grown one base64 block per
    /// command. `on_chunk` is invoked after each block with cumulative
    /// wire bytes.
    ///
    /// Fails with [`TransferError::CommandTooLong`] when even an empty
    /// block cannot fit the budget (an oversized destination path is a
    /// configuration problem, not a transient fault, so there is no
    /// retry with smaller chunks).
    pub async fn upload(
        &self,
        reader: &mut dyn Read,
        dest: &str,
        mut on_chunk: impl FnMut(u64),
    ) -> Result<ChunkStats, TransferError> {
        let block_size = self.block_size(dest)?;

        let output = self
            .session
            .run_command(&command::truncate_file(dest))
            .await?;
        ensure_write_ok(&output)?;

        let mut stats = ChunkStats::default();
        let mut buf = vec![0u8; block_size];
        loop {
            let n = read_block(reader, &mut buf)?;
            if n == 0 {
                break;
            }
            let block = STANDARD.encode(&buf[..n]);
            let output = self
                .session
                .run_command(&command::append_chunk(dest, &block))
                .await?;
            ensure_write_ok(&output)?;
            stats.chunks += 1;
            stats.bytes += block.len() as u64;
            on_chunk(stats.bytes);
        }

        debug!(dest, chunks = stats.chunks, wire_bytes = stats.bytes, "upload encoded");
        Ok(stats)
    }

    /// Raw bytes per block such that the base64 expansion plus command
    /// overhead for `dest` fits the limit.
    fn block_size(&self, dest: &str) -> Result<usize, TransferError> {
        let overhead = command::append_overhead(dest);
        let available = self.command_limit.saturating_sub(overhead);
        if available < 4 {
            return Err(TransferError::CommandTooLong {
                len: overhead + 4,
                limit: self.command_limit,
            });
        }
        // 4 output characters per 3 input bytes.
        Ok(available / 4 * 3)
    }
}

/// Classifies one write command's result. A remote write that fails
/// loudly (nonzero exit or anything on stderr) aborts the upload rather
/// than surfacing later as an unverified item.
fn ensure_write_ok(output: &CommandOutput) -> Result<(), TransferError> {
    let stderr = decode_error_stream(&output.stderr);
    if output.exit_code != 0 || !stderr.is_empty() {
        return Err(TransferError::CommandFailed {
            exit_code: output.exit_code,
            stderr,
        });
    }
    Ok(())
}

/// Reads until `buf` is full or the stream ends.
fn read_block(reader: &mut dyn Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

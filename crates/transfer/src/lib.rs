//! Batched file transfer over a remote command-execution channel.
//!
//! The only remote primitives available are "run this command or script
//! and collect {stdout, stderr, exitcode}", with a hard ceiling on the
//! characters one command may carry. This crate layers a verifiable copy
//! protocol on top: content-addressed dirty checking, base64 chunked
//! uploads, a hash-file driven check/decode exchange, and directory
//! packaging, all driven by [`TransferOrchestrator::upload`].

mod builder;
mod encoder;
mod exchange;
mod manifest;
mod orchestrator;
mod packager;
mod session;

#[cfg(test)]
mod testutil;

pub use builder::{build_manifest, content_hash_bytes, content_hash_file};
pub use encoder::{ChunkStats, ChunkedStreamEncoder, encoded_len};
pub use exchange::RemoteExchange;
pub use manifest::{
    CheckOutcome, CheckRecord, DecodeOutcome, DecodeRecord, ItemReport, TransferItem,
    TransferManifest, TransferReport,
};
pub use orchestrator::{ProgressFn, TransferOrchestrator};
pub use packager::{DirectoryPackager, PackagedArchive, ZipPackager};
pub use session::{CommandOutput, CommandSession, IdSource, SessionConfig, UuidSource};

use shellcopy_protocol::ProtocolError;

/// Errors produced by the transfer engine.
///
/// All variants abort the whole `upload` call; there is no per-item
/// continuation once a phase fails. Local scratch archives are still
/// released on every exit path.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("source not found: {0}")]
    SourceNotFound(std::path::PathBuf),

    #[error("command line too long: {len} characters exceeds the {limit} limit")]
    CommandTooLong { len: usize, limit: usize },

    #[error("remote command failed (exitcode: {exit_code}): {stderr}")]
    CommandFailed { exit_code: i32, stderr: String },

    #[error("remote script failed (exitcode: {exit_code}): {stderr}")]
    ScriptFailed { exit_code: i32, stderr: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("archive error: {0}")]
    Archive(String),
}

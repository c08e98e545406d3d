//! Wire contracts for the shellcopy check/decode exchange.
//!
//! The remote side of a transfer is a pair of scripts (check and decode)
//! that consume a "hash-file": a scratch text file holding a literal-table
//! rendering of the transfer manifest. The scripts answer with CSV on
//! stdout and a structured error stream on stderr. This crate owns those
//! formats plus the text of the individual write commands the engine
//! issues; it performs no I/O itself.

pub mod command;
pub mod literal;
pub mod response;
pub mod stderr;

pub use literal::{LiteralTable, LiteralValue};
pub use response::{Record, index_records, parse_csv, parse_flag};
pub use stderr::decode_error_stream;

/// Errors produced while interpreting remote script output.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("response has no header row")]
    MissingHeader,

    #[error("response is missing column: {0}")]
    MissingColumn(String),

    #[error("malformed CSV: {0}")]
    MalformedCsv(String),
}

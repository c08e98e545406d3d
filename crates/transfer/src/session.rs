//! Remote session trait and per-call configuration.
//!
//! The actual transport (connection, auth, timeouts) lives outside this
//! crate. Using a trait keeps the engine decoupled from it and testable
//! with mocks.

use std::future::Future;
use std::pin::Pin;

use shellcopy_protocol::command::COMMAND_BUDGET;

use crate::TransferError;

/// Result of one remote command or script invocation.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    /// Output of a command that succeeded silently.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: 0,
        }
    }
}

/// Abstract command-execution channel to the remote machine.
///
/// One session serves one `upload` call; calls on it are strictly
/// sequential. Implementations surface their own failures as
/// [`TransferError::Transport`] and must reject commands longer than the
/// transport's line ceiling with [`TransferError::CommandTooLong`].
pub trait CommandSession: Send + Sync {
    /// Runs a single shell command and collects its output.
    fn run_command(
        &self,
        command: &str,
    ) -> Pin<Box<dyn Future<Output = Result<CommandOutput, TransferError>> + Send + '_>>;

    /// Runs a remote script, passing the path of an uploaded hash-file.
    fn run_script(
        &self,
        script: &str,
        hash_file: &str,
    ) -> Pin<Box<dyn Future<Output = Result<CommandOutput, TransferError>> + Send + '_>>;
}

/// Per-call protocol configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Remote directory for scratch files. `$env:TEMP` is expanded by the
    /// remote shell because commands embed paths in double quotes.
    pub remote_temp_dir: String,
    /// Remote path of the check script.
    pub check_script: String,
    /// Remote path of the decode script.
    pub decode_script: String,
    /// Ceiling on the characters one command may carry.
    pub command_limit: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            remote_temp_dir: "$env:TEMP".into(),
            check_script: "$env:TEMP\\check_files.ps1".into(),
            decode_script: "$env:TEMP\\decode_files.ps1".into(),
            command_limit: COMMAND_BUDGET,
        }
    }
}

/// Source of scratch-file identifiers.
///
/// Identifiers only need to be unique within the process; the default
/// uses random UUIDs. Tests substitute a deterministic source.
pub trait IdSource: Send + Sync {
    fn next_id(&self) -> String;
}

/// Default identifier source backed by UUIDv4.
#[derive(Debug, Default)]
pub struct UuidSource;

impl IdSource for UuidSource {
    fn next_id(&self) -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_command_budget() {
        let config = SessionConfig::default();
        assert_eq!(config.command_limit, COMMAND_BUDGET);
        assert_eq!(config.remote_temp_dir, "$env:TEMP");
    }

    #[test]
    fn uuid_source_yields_unique_ids() {
        let ids = UuidSource;
        let a = ids.next_id();
        let b = ids.next_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
    }
}

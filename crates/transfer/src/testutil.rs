//! Shared test doubles.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::TransferError;
use crate::session::{CommandOutput, CommandSession, IdSource};

/// Records every command and script call; script outputs are scripted
/// ahead of time with [`MockSession::push_script_output`].
#[derive(Default)]
pub struct MockSession {
    limit: Option<usize>,
    commands: Mutex<Vec<String>>,
    scripts: Mutex<Vec<(String, String)>>,
    outputs: Mutex<VecDeque<CommandOutput>>,
    command_output: Mutex<CommandOutput>,
}

impl MockSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// A session that rejects commands longer than `limit` characters,
    /// like a real transport would.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    /// Queues the output for the next `run_script` call.
    pub fn push_script_output(&self, output: CommandOutput) {
        self.outputs.lock().unwrap().push_back(output);
    }

    /// Makes every subsequent `run_command` answer with `output`.
    pub fn set_command_output(&self, output: CommandOutput) {
        *self.command_output.lock().unwrap() = output;
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    pub fn command_count(&self) -> usize {
        self.commands.lock().unwrap().len()
    }

    /// `(script, hash_file)` pairs in call order.
    pub fn scripts(&self) -> Vec<(String, String)> {
        self.scripts.lock().unwrap().clone()
    }

    pub fn script_count(&self) -> usize {
        self.scripts.lock().unwrap().len()
    }

    /// Replays the command log against `dest` and returns the decoded
    /// payload the remote file would hold.
    pub fn uploaded_bytes(&self, dest: &str) -> Vec<u8> {
        let truncate_prefix = format!("Set-Content -Path \"{dest}\" ");
        let append_prefix = format!("Add-Content -Path \"{dest}\" -Value \"");
        let mut bytes = Vec::new();
        for cmd in self.commands.lock().unwrap().iter() {
            if cmd.starts_with(&truncate_prefix) {
                bytes.clear();
            } else if let Some(rest) = cmd.strip_prefix(&append_prefix) {
                let block = rest
                    .strip_suffix("\" -Encoding Ascii")
                    .unwrap_or_else(|| panic!("malformed append command: {cmd}"));
                bytes.extend(STANDARD.decode(block).expect("valid base64 block"));
            }
        }
        bytes
    }

    /// UTF-8 view of [`MockSession::uploaded_bytes`].
    pub fn uploaded_text(&self, dest: &str) -> String {
        String::from_utf8(self.uploaded_bytes(dest)).expect("utf-8 payload")
    }
}

impl CommandSession for MockSession {
    fn run_command(
        &self,
        command: &str,
    ) -> Pin<Box<dyn Future<Output = Result<CommandOutput, TransferError>> + Send + '_>> {
        let command = command.to_string();
        Box::pin(async move {
            if let Some(limit) = self.limit {
                if command.len() > limit {
                    return Err(TransferError::CommandTooLong {
                        len: command.len(),
                        limit,
                    });
                }
            }
            self.commands.lock().unwrap().push(command);
            Ok(self.command_output.lock().unwrap().clone())
        })
    }

    fn run_script(
        &self,
        script: &str,
        hash_file: &str,
    ) -> Pin<Box<dyn Future<Output = Result<CommandOutput, TransferError>> + Send + '_>> {
        let script = script.to_string();
        let hash_file = hash_file.to_string();
        Box::pin(async move {
            self.scripts.lock().unwrap().push((script, hash_file));
            self.outputs
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| TransferError::Transport("no scripted output queued".into()))
        })
    }
}

/// Deterministic identifiers: `id1`, `id2`, ...
#[derive(Default)]
pub struct SequentialIds(Mutex<u32>);

impl SequentialIds {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdSource for SequentialIds {
    fn next_id(&self) -> String {
        let mut n = self.0.lock().unwrap();
        *n += 1;
        format!("id{n}")
    }
}

/// Builds the CSV a check script answers with.
pub fn check_csv(rows: &[(&str, &str, &str, &str, &str)]) -> String {
    let mut out = String::from("hash,chk_exists,dst_md5,chk_dirty,verifies\r\n");
    for (hash, exists, md5, dirty, verifies) in rows {
        out.push_str(&format!("{hash},{exists},{md5},{dirty},{verifies}\r\n"));
    }
    out
}

/// Builds the CSV a decode script answers with.
pub fn decode_csv(rows: &[(&str, &str, &str)]) -> String {
    let mut out = String::from("tmpfile,dst_md5,verifies\r\n");
    for (tmpfile, md5, verifies) in rows {
        out.push_str(&format!("{tmpfile},{md5},{verifies}\r\n"));
    }
    out
}

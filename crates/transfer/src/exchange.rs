//! The hash-file exchange with the remote check and decode scripts.
//!
//! Both phases follow the same shape: render a literal table describing
//! the batch, push it to a fresh remote scratch file, invoke the script
//! against that path, and fold the CSV answer back into the manifest.
//!
//! # Hash-file contracts
//!
//! Check, keyed by content hash:
//! `hash -> @{ target; basename; dst }` where `target` is the path whose
//! current content the script hashes — the destination itself for files,
//! the content-addressed remote zip target for directories. The script
//! answers CSV `hash, chk_exists, dst_md5, chk_dirty, verifies`.
//!
//! Decode, keyed by the remote scratch file holding the payload:
//! `tmpfile -> @{ dst; hash; unpack?; tmpzip? }`. The script decodes the
//! base64 scratch into `dst` (or into `tmpzip` and expands into `dst`
//! when `unpack` is set), then answers CSV `tmpfile, dst_md5, verifies`.
//! A clean directory item has no base64 scratch and is keyed by its
//! retained zip target instead; `key == tmpzip` tells the script to skip
//! the base64 pass and only re-expand.

use tracing::debug;

use shellcopy_protocol::{
    LiteralTable, decode_error_stream, index_records, parse_csv, parse_flag,
};

use crate::builder::remote_join;
use crate::encoder::ChunkedStreamEncoder;
use crate::manifest::{
    CheckOutcome, CheckRecord, DecodeOutcome, DecodeRecord, TransferItem, TransferManifest,
};
use crate::session::{CommandOutput, CommandSession, IdSource, SessionConfig};
use crate::TransferError;

/// Drives the check/decode scripts for one transfer batch.
pub struct RemoteExchange<'a> {
    session: &'a dyn CommandSession,
    config: &'a SessionConfig,
    ids: &'a dyn IdSource,
}

impl<'a> RemoteExchange<'a> {
    pub fn new(
        session: &'a dyn CommandSession,
        config: &'a SessionConfig,
        ids: &'a dyn IdSource,
    ) -> Self {
        Self {
            session,
            config,
            ids,
        }
    }

    /// Asks the remote which items already hold matching content.
    pub async fn check(&self, manifest: TransferManifest) -> Result<TransferManifest, TransferError> {
        let mut table = LiteralTable::new();
        for item in manifest.iter() {
            let mut entry = LiteralTable::new();
            entry.insert("target", self.check_target(item));
            entry.insert("basename", dest_basename(&item.destination));
            entry.insert("dst", item.destination.clone());
            table.insert(item.content_hash.clone(), entry);
        }

        let hash_file = self.push_hash_file("check", &table).await?;
        let output = self
            .session
            .run_script(&self.config.check_script, &hash_file)
            .await?;
        ensure_script_ok(&output)?;

        let records = index_records(parse_csv(&output.stdout)?, "hash")?;
        let mut outcome = CheckOutcome::default();
        for (hash, record) in records {
            outcome.records.insert(
                hash,
                CheckRecord {
                    exists: parse_flag(field(&record, "chk_exists")),
                    remote_hash: field(&record, "dst_md5").map(str::to_string),
                    dirty: parse_flag(field(&record, "chk_dirty")),
                    verified: parse_flag(field(&record, "verifies")),
                },
            );
        }
        debug!(items = manifest.len(), "check phase merged");
        Ok(manifest.apply_check(&outcome))
    }

    /// Tells the remote to materialize the payloads.
    ///
    /// Covers every uploaded item plus every directory item: a directory
    /// must be re-expanded even when its content was clean, so a
    /// destination tree removed behind the engine's back is restored from
    /// the retained zip. Clean directories are keyed by that zip target
    /// (`key == tmpzip`, no base64 pass); an empty table skips the script
    /// invocation entirely.
    pub async fn decode(&self, manifest: TransferManifest) -> Result<TransferManifest, TransferError> {
        let mut table = LiteralTable::new();
        let mut keys: Vec<(String, String)> = Vec::new();
        for item in manifest.iter() {
            let key = match &item.remote_temp_path {
                Some(temp) => temp.clone(),
                None if item.is_directory() => self.zip_target(item),
                None => continue,
            };
            let mut entry = LiteralTable::new();
            entry.insert("dst", item.destination.clone());
            entry.insert("hash", item.content_hash.clone());
            if item.is_directory() {
                entry.insert("unpack", "True");
                entry.insert("tmpzip", self.zip_target(item));
            }
            table.insert(key.clone(), entry);
            keys.push((key, item.content_hash.clone()));
        }

        if table.is_empty() {
            debug!("nothing to decode; skipping remote call");
            return Ok(manifest);
        }

        let hash_file = self.push_hash_file("decode", &table).await?;
        let output = self
            .session
            .run_script(&self.config.decode_script, &hash_file)
            .await?;
        ensure_script_ok(&output)?;

        let records = index_records(parse_csv(&output.stdout)?, "tmpfile")?;
        let mut outcome = DecodeOutcome::default();
        for (key, hash) in keys {
            if let Some(record) = records.get(&key) {
                outcome.records.insert(
                    hash,
                    DecodeRecord {
                        remote_hash: field(record, "dst_md5").map(str::to_string),
                        verified: parse_flag(field(record, "verifies")),
                    },
                );
            }
        }
        debug!(decoded = table.len(), "decode phase merged");
        Ok(manifest.apply_decode(&outcome))
    }

    /// Path whose content the check script hashes for this item.
    ///
    /// Directory payloads are compared against their content-addressed
    /// remote zip target: a changed tree hashes to a new name that will
    /// not exist, an unchanged one finds the zip a prior decode left.
    fn check_target(&self, item: &TransferItem) -> String {
        if item.is_directory() {
            self.zip_target(item)
        } else {
            item.destination.clone()
        }
    }

    fn zip_target(&self, item: &TransferItem) -> String {
        remote_join(
            &self.config.remote_temp_dir,
            &format!("shellcopy-{}.zip", item.content_hash),
        )
    }

    /// Renders the table and uploads it to a fresh remote scratch file.
    async fn push_hash_file(
        &self,
        phase: &str,
        table: &LiteralTable,
    ) -> Result<String, TransferError> {
        let name = format!("shellcopy-{phase}-{}.txt", self.ids.next_id());
        let path = remote_join(&self.config.remote_temp_dir, &name);
        let text = table.render();
        ChunkedStreamEncoder::new(self.session, self.config.command_limit)
            .upload(&mut text.as_bytes(), &path, |_| {})
            .await?;
        Ok(path)
    }
}

/// Classifies a script result. Any stderr is untrusted: a zero exit with
/// error output still fails the batch.
fn ensure_script_ok(output: &CommandOutput) -> Result<(), TransferError> {
    let stderr = decode_error_stream(&output.stderr);
    if output.exit_code != 0 {
        return Err(TransferError::ScriptFailed {
            exit_code: output.exit_code,
            stderr,
        });
    }
    if !stderr.is_empty() {
        return Err(TransferError::ScriptFailed {
            exit_code: 0,
            stderr,
        });
    }
    Ok(())
}

fn field<'r>(record: &'r shellcopy_protocol::Record, name: &str) -> Option<&'r str> {
    record.get(name).and_then(|v| v.as_deref())
}

fn dest_basename(destination: &str) -> String {
    destination
        .rsplit(['\\', '/'])
        .next()
        .unwrap_or(destination)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::ChunkStats;
    use crate::manifest::TransferItem;
    use crate::testutil::{MockSession, SequentialIds};

    fn config() -> SessionConfig {
        SessionConfig::default()
    }

    fn manifest_with_file() -> TransferManifest {
        let mut m = TransferManifest::new();
        m.insert(TransferItem::new("aaa111", "/local/f.txt", "C:\\dest\\f.txt", 12));
        m
    }

    #[tokio::test]
    async fn check_uploads_hash_file_and_merges_flags() {
        let session = MockSession::new();
        session.push_script_output(CommandOutput::ok(
            "hash,chk_exists,dst_md5,chk_dirty,verifies\naaa111,True,aaa111,False,True\n",
        ));
        let config = config();
        let ids = SequentialIds::new();
        let exchange = RemoteExchange::new(&session, &config, &ids);

        let m = exchange.check(manifest_with_file()).await.unwrap();

        let scripts = session.scripts();
        assert_eq!(scripts.len(), 1);
        assert_eq!(scripts[0].0, config.check_script);
        assert_eq!(scripts[0].1, "$env:TEMP/shellcopy-check-id1.txt");

        let uploaded = session.uploaded_text(&scripts[0].1);
        assert!(uploaded.contains("\"aaa111\" = @{"));
        assert!(uploaded.contains("\"target\" = \"C:\\dest\\f.txt\""));
        assert!(uploaded.contains("\"basename\" = \"f.txt\""));
        assert!(uploaded.contains("\"dst\" = \"C:\\dest\\f.txt\""));

        let item = m.get("aaa111").unwrap();
        assert_eq!(item.remote_exists, Some(true));
        assert_eq!(item.dirty, Some(false));
        assert_eq!(item.verified, Some(true));
        assert_eq!(item.remote_hash.as_deref(), Some("aaa111"));
    }

    #[tokio::test]
    async fn decode_skips_remote_call_when_nothing_uploaded() {
        let session = MockSession::new();
        let config = config();
        let ids = SequentialIds::new();
        let exchange = RemoteExchange::new(&session, &config, &ids);

        let m = exchange.decode(manifest_with_file()).await.unwrap();

        assert_eq!(session.script_count(), 0);
        assert_eq!(session.command_count(), 0);
        assert_eq!(m.len(), 1);
    }

    #[tokio::test]
    async fn decode_merges_by_temp_path() {
        let session = MockSession::new();
        session.push_script_output(CommandOutput::ok(
            "tmpfile,dst_md5,verifies\n$env:TEMP/t1.b64,aaa111,True\n",
        ));
        let config = config();
        let ids = SequentialIds::new();
        let exchange = RemoteExchange::new(&session, &config, &ids);

        let m = manifest_with_file().apply_upload(
            "aaa111",
            "$env:TEMP/t1.b64".into(),
            ChunkStats { chunks: 1, bytes: 16 },
        );
        let m = exchange.decode(m).await.unwrap();

        let scripts = session.scripts();
        assert_eq!(scripts.len(), 1);
        assert_eq!(scripts[0].0, config.decode_script);

        let uploaded = session.uploaded_text(&scripts[0].1);
        assert!(uploaded.contains("\"$env:TEMP/t1.b64\" = @{"));
        assert!(uploaded.contains("\"dst\" = \"C:\\dest\\f.txt\""));
        assert!(uploaded.contains("\"hash\" = \"aaa111\""));
        assert!(!uploaded.contains("unpack"));

        assert_eq!(m.get("aaa111").unwrap().verified, Some(true));
    }

    #[tokio::test]
    async fn directory_entries_carry_unpack_and_zip_target() {
        let session = MockSession::new();
        session.push_script_output(CommandOutput::ok(
            "tmpfile,dst_md5,verifies\n$env:TEMP/t1.b64,dddzip,True\n",
        ));
        let config = config();
        let ids = SequentialIds::new();
        let exchange = RemoteExchange::new(&session, &config, &ids);

        let scratch = tempfile::NamedTempFile::new().unwrap().into_temp_path();
        let archive_path = scratch.to_path_buf();
        let mut m = TransferManifest::new();
        m.insert(
            TransferItem::new("dddzip", "/local/assets", "C:\\dest\\assets", 64)
                .with_archive(archive_path, scratch),
        );
        let m = m.apply_upload(
            "dddzip",
            "$env:TEMP/t1.b64".into(),
            ChunkStats { chunks: 1, bytes: 88 },
        );
        let m = exchange.decode(m).await.unwrap();

        let uploaded = session.uploaded_text(&session.scripts()[0].1);
        assert!(uploaded.contains("\"unpack\" = \"True\""));
        assert!(uploaded.contains("\"tmpzip\" = \"$env:TEMP/shellcopy-dddzip.zip\""));
        assert_eq!(m.get("dddzip").unwrap().verified, Some(true));
    }

    #[tokio::test]
    async fn clean_directory_is_decoded_from_its_retained_zip() {
        let session = MockSession::new();
        session.push_script_output(CommandOutput::ok(
            "tmpfile,dst_md5,verifies\n$env:TEMP/shellcopy-dddzip.zip,dddzip,True\n",
        ));
        let config = config();
        let ids = SequentialIds::new();
        let exchange = RemoteExchange::new(&session, &config, &ids);

        let scratch = tempfile::NamedTempFile::new().unwrap().into_temp_path();
        let archive_path = scratch.to_path_buf();
        let mut m = TransferManifest::new();
        m.insert(
            TransferItem::new("dddzip", "/local/assets", "C:\\dest\\assets", 64)
                .with_archive(archive_path, scratch),
        );
        // No upload happened: the item is clean, yet it must still decode.
        let m = exchange.decode(m).await.unwrap();

        assert_eq!(session.script_count(), 1);
        let uploaded = session.uploaded_text(&session.scripts()[0].1);
        assert!(uploaded.contains("\"$env:TEMP/shellcopy-dddzip.zip\" = @{"));
        assert!(uploaded.contains("\"unpack\" = \"True\""));
        assert!(uploaded.contains("\"tmpzip\" = \"$env:TEMP/shellcopy-dddzip.zip\""));
        assert_eq!(m.get("dddzip").unwrap().verified, Some(true));
    }

    #[tokio::test]
    async fn nonzero_exit_fails_with_decoded_stderr() {
        let session = MockSession::new();
        session.push_script_output(CommandOutput {
            stdout: String::new(),
            stderr: "Oh_x0020_noes".into(),
            exit_code: 10,
        });
        let config = config();
        let ids = SequentialIds::new();
        let exchange = RemoteExchange::new(&session, &config, &ids);

        let err = exchange.check(manifest_with_file()).await.unwrap_err();
        match err {
            TransferError::ScriptFailed { exit_code, stderr } => {
                assert_eq!(exit_code, 10);
                assert_eq!(stderr, "Oh noes");
            }
            other => panic!("expected ScriptFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn zero_exit_with_stderr_still_fails() {
        let session = MockSession::new();
        session.push_script_output(CommandOutput {
            stdout: "hash,chk_exists\naaa111,True\n".into(),
            stderr: "warning: something".into(),
            exit_code: 0,
        });
        let config = config();
        let ids = SequentialIds::new();
        let exchange = RemoteExchange::new(&session, &config, &ids);

        let err = exchange.check(manifest_with_file()).await.unwrap_err();
        assert!(matches!(
            err,
            TransferError::ScriptFailed { exit_code: 0, .. }
        ));
    }
}

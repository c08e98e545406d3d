//! In-memory model of one transfer batch.
//!
//! A manifest maps content hash to transfer item, in insertion order,
//! and lives for the duration of one `upload` call. Phase results are
//! immutable values merged functionally: each `apply_*` consumes the
//! manifest and returns the updated snapshot.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::ser::SerializeMap;
use tempfile::TempPath;
use tracing::warn;

use crate::encoder::ChunkStats;

/// One file, or one directory-as-archive, being moved.
#[derive(Debug)]
pub struct TransferItem {
    /// MD5 of the exact payload bytes; the manifest key.
    pub content_hash: String,
    /// Local source path (file, or the directory itself).
    pub source: PathBuf,
    /// Other sources that collapsed into this item by content.
    pub also_from: Vec<PathBuf>,
    /// Local path of the packaged archive; directory items only.
    pub archive_path: Option<PathBuf>,
    /// Remote target path.
    pub destination: String,
    /// Payload length in bytes.
    pub size: u64,
    /// Remote scratch file holding the encoded payload; dirty items only.
    pub remote_temp_path: Option<String>,
    /// Whether a file already exists at the check target.
    pub remote_exists: Option<bool>,
    /// Content hash the remote reported for the target.
    pub remote_hash: Option<String>,
    /// Whether the payload must be transferred.
    pub dirty: Option<bool>,
    /// Whether the remote confirmed matching content.
    pub verified: Option<bool>,
    /// Append commands issued for this item.
    pub chunk_count: u64,
    /// Wire bytes written for this item.
    pub bytes_transferred: u64,
    /// Owned scratch archive; deleting it on drop guarantees release on
    /// every exit path.
    archive: Option<TempPath>,
}

impl TransferItem {
    pub fn new(
        content_hash: impl Into<String>,
        source: impl Into<PathBuf>,
        destination: impl Into<String>,
        size: u64,
    ) -> Self {
        Self {
            content_hash: content_hash.into(),
            source: source.into(),
            also_from: Vec::new(),
            archive_path: None,
            destination: destination.into(),
            size,
            remote_temp_path: None,
            remote_exists: None,
            remote_hash: None,
            dirty: None,
            verified: None,
            chunk_count: 0,
            bytes_transferred: 0,
            archive: None,
        }
    }

    /// Attaches a packaged archive as the item's payload.
    pub fn with_archive(mut self, path: PathBuf, scratch: TempPath) -> Self {
        self.archive_path = Some(path);
        self.archive = Some(scratch);
        self
    }

    /// Path of the payload to stream: the archive for directories, the
    /// source file otherwise.
    pub fn payload_path(&self) -> &Path {
        self.archive_path.as_deref().unwrap_or(&self.source)
    }

    pub fn is_directory(&self) -> bool {
        self.archive_path.is_some()
    }
}

/// Insertion-ordered mapping from content hash to item.
#[derive(Debug, Default)]
pub struct TransferManifest {
    order: Vec<String>,
    items: HashMap<String, TransferItem>,
}

impl TransferManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an item, collapsing duplicates by content hash.
    ///
    /// Identical content is transferred once; the first-seen destination
    /// wins. The collision is not silent: the extra source is recorded on
    /// the surviving item and logged.
    pub fn insert(&mut self, item: TransferItem) {
        match self.items.get_mut(&item.content_hash) {
            Some(existing) => {
                warn!(
                    hash = %item.content_hash,
                    kept = %existing.source.display(),
                    dropped = %item.source.display(),
                    "identical content from two sources; keeping first destination"
                );
                existing.also_from.push(item.source);
            }
            None => {
                self.order.push(item.content_hash.clone());
                self.items.insert(item.content_hash.clone(), item);
            }
        }
    }

    pub fn get(&self, hash: &str) -> Option<&TransferItem> {
        self.items.get(hash)
    }

    pub fn get_mut(&mut self, hash: &str) -> Option<&mut TransferItem> {
        self.items.get_mut(hash)
    }

    /// Items in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &TransferItem> {
        self.order.iter().filter_map(|h| self.items.get(h))
    }

    /// Content hashes in insertion order.
    pub fn hashes(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Merges check-phase results into a new snapshot.
    ///
    /// An item the script did not report on is treated as dirty: absence
    /// of evidence that the remote content matches means it must be sent.
    pub fn apply_check(mut self, outcome: &CheckOutcome) -> Self {
        for hash in &self.order {
            let item = self.items.get_mut(hash).expect("ordered key");
            match outcome.records.get(hash) {
                Some(record) => {
                    item.remote_exists = record.exists;
                    item.remote_hash = record.remote_hash.clone();
                    item.dirty = Some(record.dirty.unwrap_or(true));
                    item.verified = record.verified;
                }
                None => {
                    item.dirty = Some(true);
                }
            }
        }
        self
    }

    /// Records upload-phase statistics for one item.
    pub fn apply_upload(mut self, hash: &str, temp_path: String, stats: ChunkStats) -> Self {
        if let Some(item) = self.items.get_mut(hash) {
            item.remote_temp_path = Some(temp_path);
            item.chunk_count = stats.chunks;
            item.bytes_transferred = stats.bytes;
        }
        self
    }

    /// Merges decode-phase results, matched by content hash.
    pub fn apply_decode(mut self, outcome: &DecodeOutcome) -> Self {
        for (hash, record) in &outcome.records {
            if let Some(item) = self.items.get_mut(hash) {
                item.remote_hash = record.remote_hash.clone();
                item.verified = record.verified;
            }
        }
        self
    }

    /// Wire bytes that the dirty items will occupy once encoded.
    pub fn pending_wire_bytes(&self) -> u64 {
        self.iter()
            .filter(|i| i.dirty == Some(true))
            .map(|i| crate::encoder::encoded_len(i.size))
            .sum()
    }

    /// Total wire bytes actually written.
    pub fn transferred_wire_bytes(&self) -> u64 {
        self.iter().map(|i| i.bytes_transferred).sum()
    }

    /// Snapshot of per-item state for the caller.
    pub fn to_report(&self) -> TransferReport {
        let entries = self
            .iter()
            .map(|item| (item.content_hash.clone(), ItemReport::from_item(item)))
            .collect();
        TransferReport { entries }
    }
}

/// Check-phase result for one item.
#[derive(Debug, Clone, Default)]
pub struct CheckRecord {
    pub exists: Option<bool>,
    pub remote_hash: Option<String>,
    pub dirty: Option<bool>,
    pub verified: Option<bool>,
}

/// Check-phase results keyed by content hash.
#[derive(Debug, Clone, Default)]
pub struct CheckOutcome {
    pub records: HashMap<String, CheckRecord>,
}

/// Decode-phase result for one item.
#[derive(Debug, Clone, Default)]
pub struct DecodeRecord {
    pub remote_hash: Option<String>,
    pub verified: Option<bool>,
}

/// Decode-phase results keyed by content hash.
///
/// The exchange translates the script's per-scratch-file rows back to
/// content hashes before merging, so clean directory items (decoded from
/// their retained remote zip, never uploaded) merge like any other.
#[derive(Debug, Clone, Default)]
pub struct DecodeOutcome {
    pub records: HashMap<String, DecodeRecord>,
}

/// Per-item entry in the final report.
///
/// Clean items carry only identity and verification fields; transfer
/// statistics appear only when the item was actually sent.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ItemReport {
    pub src: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub also_from: Vec<String>,
    pub dst: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tmpfile: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tmpzip: Option<String>,
    pub src_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dst_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exists: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dirty: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_transferred: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunks: Option<u64>,
}

impl ItemReport {
    fn from_item(item: &TransferItem) -> Self {
        let transferred = item.dirty == Some(true);
        Self {
            src: item.source.display().to_string(),
            also_from: item
                .also_from
                .iter()
                .map(|p| p.display().to_string())
                .collect(),
            dst: item.destination.clone(),
            tmpfile: item.remote_temp_path.clone(),
            tmpzip: item
                .archive_path
                .as_ref()
                .map(|p| p.display().to_string()),
            src_hash: item.content_hash.clone(),
            dst_hash: item.remote_hash.clone(),
            exists: item.remote_exists,
            dirty: item.dirty,
            verified: item.verified,
            size: transferred.then_some(item.size),
            bytes_transferred: transferred.then_some(item.bytes_transferred),
            chunks: transferred.then_some(item.chunk_count),
        }
    }
}

/// Final report: content hash to item entry, in manifest order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransferReport {
    entries: Vec<(String, ItemReport)>,
}

impl TransferReport {
    pub fn get(&self, hash: &str) -> Option<&ItemReport> {
        self.entries
            .iter()
            .find(|(h, _)| h == hash)
            .map(|(_, r)| r)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ItemReport)> {
        self.entries.iter().map(|(h, r)| (h.as_str(), r))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for TransferReport {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (hash, report) in &self.entries {
            map.serialize_entry(hash, report)?;
        }
        map.end()
    }
}

//! Curation queue and JSONL log streams
//!
//! Append-only JSONL streams under the `logs/` tree. The curation queue
//! deduplicates on textual equality of the serialized line (SHA-256 of
//! the line) so re-running the same ingestion never queues duplicates,
//! even across restarts.
//!
//! Stream writes follow the WAL's I/O policy: failures are logged and
//! counted, never propagated.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File name of the curation queue stream
pub const CURATION_QUEUE_FILE: &str = "curation_queue.jsonl";

/// File name of the UI snapshot stream
pub const UI_SNAPSHOT_STREAM: &str = "ui_snapshots.jsonl";

/// File name of the LLM call stream
pub const LLM_CALL_STREAM: &str = "llm_calls.jsonl";

/// Source kind of a curation record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CurationKind {
    Llm,
    Tool,
    Memory,
}

/// One entry of the curation queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurationEntry {
    /// Where the record came from
    pub kind: CurationKind,

    /// Dedup-friendly logical key (e.g. prompt hash, selector name)
    pub key: String,

    /// Path of the stream or artifact the record refers to
    pub path: String,

    /// The record itself, opaque JSON
    pub record: Value,
}

/// An append-only JSONL stream with swallow-and-count I/O failures
#[derive(Debug)]
pub struct JsonlStream {
    path: PathBuf,
    io_errors: Cell<u64>,
}

impl JsonlStream {
    /// Open a stream at the given path; the file and its parent directory
    /// are created lazily on first append.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            io_errors: Cell::new(0),
        }
    }

    /// Path of the stream file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of append failures swallowed so far
    pub fn io_error_count(&self) -> u64 {
        self.io_errors.get()
    }

    /// Append one JSON value as a line. Returns the serialized line on
    /// success so callers can hash it.
    pub fn append(&self, value: &Value) -> Option<String> {
        let line = value.to_string();
        if self.append_raw(&line) {
            Some(line)
        } else {
            None
        }
    }

    fn append_raw(&self, line: &str) -> bool {
        let result = ensure_parent(&self.path).and_then(|_| {
            OpenOptions::new()
                .append(true)
                .create(true)
                .open(&self.path)
                .and_then(|mut f| writeln!(f, "{}", line))
        });
        match result {
            Ok(()) => true,
            Err(e) => {
                self.io_errors.set(self.io_errors.get() + 1);
                warn!(error = %e, path = %self.path.display(), "jsonl append failed");
                false
            }
        }
    }
}

/// The append-only, line-deduplicated curation queue
#[derive(Debug)]
pub struct CurationQueue {
    stream: JsonlStream,
    seen: RefCell<HashSet<String>>,
}

impl CurationQueue {
    /// Open the queue at `logs_dir/curation_queue.jsonl`, priming the
    /// dedup set from any existing lines.
    pub fn open(logs_dir: &Path) -> Self {
        let path = logs_dir.join(CURATION_QUEUE_FILE);
        let mut seen = HashSet::new();
        if let Ok(existing) = fs::read_to_string(&path) {
            for line in existing.lines().filter(|l| !l.trim().is_empty()) {
                seen.insert(line_hash(line));
            }
        }
        Self {
            stream: JsonlStream::new(path),
            seen: RefCell::new(seen),
        }
    }

    /// Path of the queue file
    pub fn path(&self) -> &Path {
        self.stream.path()
    }

    /// Number of distinct lines seen (queued now or in a prior run)
    pub fn len(&self) -> usize {
        self.seen.borrow().len()
    }

    /// Whether nothing has ever been queued
    pub fn is_empty(&self) -> bool {
        self.seen.borrow().is_empty()
    }

    /// Append an entry unless an identical line is already queued.
    /// Returns whether the entry was written.
    pub fn push(&self, entry: &CurationEntry) -> bool {
        let line = match serde_json::to_string(entry) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "curation entry not serializable");
                return false;
            }
        };
        let hash = line_hash(&line);
        if self.seen.borrow().contains(&hash) {
            debug!(key = %entry.key, "curation entry deduplicated");
            return false;
        }
        if self.stream.append_raw(&line) {
            self.seen.borrow_mut().insert(hash);
            true
        } else {
            false
        }
    }
}

fn line_hash(line: &str) -> String {
    hex::encode(Sha256::digest(line.as_bytes()))
}

fn ensure_parent(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

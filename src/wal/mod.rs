//! Write-ahead log
//!
//! Append path for the framed transaction log plus rotation. Every write
//! is open-append-write-close, so a crash mid-write leaves at most one
//! torn trailing line, which the scanner discards.
//!
//! I/O failures on the append path are logged and counted but never
//! propagated: the in-memory mutation already happened, and the world must
//! stay consistent with what the user saw.

pub mod frame;
pub mod replay;

pub use frame::{
    list_complete_frames, scan_stats, Frame, FrameSummary, ScanResult, SetLine, WalLine, WalStats,
};
pub use replay::{ReplayOutcome, ReplayStats};

use serde_json::{json, Value};
use std::cell::Cell;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// The write-ahead log for one world.
///
/// One logical agent owns the log; writes serialize through it in
/// mutation commit order. The `replaying` flag suppresses every write
/// while a replay is in flight so replayed mutations cannot echo back
/// into the file.
#[derive(Debug)]
pub struct Wal {
    path: PathBuf,
    replaying: Cell<bool>,
    io_errors: Cell<u64>,
}

impl Wal {
    /// Open a WAL at the given path. The file is created lazily on first
    /// append.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            replaying: Cell::new(false),
            io_errors: Cell::new(0),
        }
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a replay is currently in flight
    pub fn is_replaying(&self) -> bool {
        self.replaying.get()
    }

    pub(crate) fn set_replaying(&self, value: bool) {
        self.replaying.set(value);
    }

    /// Number of append failures swallowed so far
    pub fn io_error_count(&self) -> u64 {
        self.io_errors.get()
    }

    /// Append one line. Suppressed during replay; failures are logged and
    /// counted, never propagated.
    pub fn append(&self, line: &str) {
        if self.replaying.get() {
            debug!(line, "wal write suppressed during replay");
            return;
        }
        let result = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .and_then(|mut file| writeln!(file, "{}", line));
        if let Err(e) = result {
            self.io_errors.set(self.io_errors.get() + 1);
            warn!(error = %e, path = %self.path.display(), "wal append failed");
        }
    }

    /// Open a frame: `BEGIN <tag> <json-info>` with a `t` timestamp merged
    /// into the info blob
    pub fn begin(&self, tag: &str, info: &Value) {
        self.append(&format!("BEGIN {} {}", tag, stamp(info)));
    }

    /// Close a frame: `END <tag>`
    pub fn end(&self, tag: &str) {
        self.append(&format!("END {}", tag));
    }

    /// Emit a standalone informational marker. Never part of the state
    /// contract.
    pub fn mark(&self, tag: &str, info: &Value) {
        self.append(&format!("MARK {} {}", tag, stamp(info)));
    }

    /// Emit a `SET` line for a single slot assignment
    pub fn set(&self, target: &str, slot: &str, value: &str) {
        self.append(&format!("SET {}.{} TO {}", target, slot, value));
    }

    /// Run `body` inside a `BEGIN`/`END` frame.
    ///
    /// The `END` line is written through a drop guard, so the frame closes
    /// even when `body` returns early through `?` or panics. A frame
    /// closed around a failed body may carry partial state; replay still
    /// applies it because the framing is intact.
    pub fn commit<F, R>(&self, tag: &str, info: &Value, body: F) -> R
    where
        F: FnOnce() -> R,
    {
        self.begin(tag, info);
        let _guard = FrameGuard {
            wal: self,
            tag: tag.to_string(),
        };
        body()
    }

    /// Current size of the log file in bytes; 0 when absent
    pub fn size(&self) -> u64 {
        std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
    }

    /// Rotate the log when it exceeds `max_bytes`.
    ///
    /// Renames to `<path>.1` (replacing any previous backup; atomic on
    /// POSIX) and truncates the live file. Returns whether a rotation
    /// happened; at or under the threshold this is a no-op.
    pub fn rotate(&self, max_bytes: u64) -> crate::error::Result<bool> {
        if self.size() <= max_bytes {
            return Ok(false);
        }
        let backup = backup_path(&self.path);
        std::fs::rename(&self.path, &backup)?;
        std::fs::File::create(&self.path)?;
        debug!(backup = %backup.display(), "wal rotated");
        Ok(true)
    }
}

/// `<path>.1`, the single rotated backup slot
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".1");
    PathBuf::from(name)
}

/// Closes a frame on drop
struct FrameGuard<'a> {
    wal: &'a Wal,
    tag: String,
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        self.wal.end(&self.tag);
    }
}

/// Merge a `t` unix timestamp into an info blob and render it.
///
/// The result is emitted but never re-parsed; replay treats it as opaque.
fn stamp(info: &Value) -> String {
    let mut merged = match info {
        Value::Object(map) => map.clone(),
        Value::Null => serde_json::Map::new(),
        other => {
            let mut map = serde_json::Map::new();
            map.insert("info".to_string(), other.clone());
            map
        }
    };
    merged.insert("t".to_string(), json!(crate::now_unix()));
    Value::Object(merged).to_string()
}

//! Configuration for the TelOS core
//!
//! All knobs load from environment variables with sensible defaults, so a
//! process dropped into an empty working directory comes up with a usable
//! layout: `telos.wal` next to the binary and a `logs/` tree for JSONL
//! streams.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default WAL file name
pub const DEFAULT_WAL_PATH: &str = "telos.wal";

/// Default rotation threshold (1 MiB)
pub const DEFAULT_WAL_MAX_BYTES: u64 = 1_048_576;

/// Default hypervector dimensionality
pub const DEFAULT_HV_DIM: usize = 10_000;

/// TelOS core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path of the write-ahead log
    pub wal_path: PathBuf,

    /// Rotation threshold in bytes for `rotateWal`
    pub wal_max_bytes: u64,

    /// Directory for JSONL log streams (curation queue, snapshots, memory index)
    pub logs_dir: PathBuf,

    /// Path of the persisted memory index (JSONL)
    pub memory_path: PathBuf,

    /// Hypervector dimensionality
    pub hv_dim: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn load() -> Self {
        dotenvy::dotenv().ok();

        let logs_dir = std::env::var("TELOS_LOGS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("logs"));

        let memory_path = std::env::var("TELOS_MEMORY_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| logs_dir.join("memory_index.jsonl"));

        Self {
            wal_path: std::env::var("TELOS_WAL_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_WAL_PATH)),
            wal_max_bytes: std::env::var("TELOS_WAL_MAX_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_WAL_MAX_BYTES),
            logs_dir,
            memory_path,
            hv_dim: std::env::var("TELOS_HV_DIM")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_HV_DIM),
        }
    }

    /// Configuration rooted at a specific working directory.
    ///
    /// Used by tests and by the CLI `--dir` flag so multiple independent
    /// instances never share a WAL.
    pub fn rooted(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let logs_dir = dir.join("logs");
        Self {
            wal_path: dir.join(DEFAULT_WAL_PATH),
            wal_max_bytes: DEFAULT_WAL_MAX_BYTES,
            memory_path: logs_dir.join("memory_index.jsonl"),
            logs_dir,
            hv_dim: DEFAULT_HV_DIM,
        }
    }

    /// Override the hypervector dimensionality (tests use small dims)
    pub fn with_hv_dim(mut self, dim: usize) -> Self {
        self.hv_dim = dim;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            wal_path: PathBuf::from(DEFAULT_WAL_PATH),
            wal_max_bytes: DEFAULT_WAL_MAX_BYTES,
            logs_dir: PathBuf::from("logs"),
            memory_path: PathBuf::from("logs/memory_index.jsonl"),
            hv_dim: DEFAULT_HV_DIM,
        }
    }
}

//! # TelOS - Live Computational Substrate
//!
//! A live, self-describing object world backed by a transactional
//! write-ahead log and a VSA hypervector memory core.
//!
//! ## Features
//!
//! - **Prototypal World**: Morphs cloned from kind templates, indexed by
//!   id, with event dispatch and drag interaction
//! - **Transactional WAL**: Framed `BEGIN`/`END` commits, crash-safe
//!   append, rotation, and idempotent replay
//! - **VSA Memory**: Deterministic text encoding, bind/bundle/unbind
//!   algebra, and the noisy-unbind to clean-prototype cleanup dialogue
//! - **Hybrid Search**: Substring presence, length affinity, cosine
//!   similarity, and tag overlap in one ranker
//! - **Generative Kernel**: Unknown messages classified and synthesized
//!   instead of rejected
//!
//! ## Architecture
//!
//! Mutations flow through [`core::TelosCore`], the only surface that
//! writes the WAL. Replay streams committed frames back into the world.
//! Memory persists as JSONL with vectors recomputed on load. All
//! subsystems are per-core singletons; independent cores never share
//! state.
//!
//! ## Quick start
//!
//! ```no_run
//! use telos::{commands, Config, TelosCore};
//!
//! let mut core = TelosCore::new(Config::load());
//! core.replay();
//!
//! let id = commands::dispatch(&mut core, "newRect 10 20 80 60 1 0 0 1");
//! commands::dispatch(&mut core, &format!("move {} 30 40", id));
//! println!("{}", commands::dispatch(&mut core, "snapshot"));
//! ```

pub mod commands;
pub mod config;
pub mod core;
pub mod curation;
pub mod error;
pub mod hv;
pub mod kernel;
pub mod memory;
pub mod snapshot;
pub mod wal;
pub mod world;

pub use self::core::TelosCore;
pub use commands::dispatch;
pub use config::Config;
pub use curation::{CurationEntry, CurationKind, CurationQueue, JsonlStream};
pub use error::{Result, TelosError};
pub use hv::{bind, bundle, encode_text, generate_hypervector, similarity, unbind, Hypervector};
pub use kernel::{classify, Category, KernelState, LearnedStub, Synthesis};
pub use memory::{MemoryEntry, MemoryStats, MemoryStore, RankedMatch};
pub use wal::{
    list_complete_frames, scan_stats, FrameSummary, ReplayOutcome, ReplayStats, Wal, WalStats,
};
pub use world::{
    Event, EventKind, Morph, MorphId, MorphTemplate, World, BASE_KIND, ROOT_ID, WORLD_KIND,
};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::commands::dispatch;
    pub use crate::config::Config;
    pub use crate::core::TelosCore;
    pub use crate::error::{Result, TelosError};
    pub use crate::hv::{bind, bundle, encode_text, similarity, unbind, Hypervector};
    pub use crate::kernel::Synthesis;
    pub use crate::memory::MemoryStore;
    pub use crate::wal::{ReplayOutcome, Wal};
    pub use crate::world::{Event, EventKind, World};
}

/// Current wall-clock time as unix seconds
pub fn now_unix() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

//! WAL replay
//!
//! Reconstructs world state by streaming the log, grouping lines into
//! committed frames, and applying their `SET` lines in file order. Replay
//! is idempotent: `SET` is absolute assignment, so replaying twice lands
//! in the same state.
//!
//! While a replay is in flight the owning [`Wal`] suppresses every write,
//! so replayed mutations never echo back into the file.

use super::frame;
use super::Wal;
use crate::world::{SetOutcome, World};
use serde::{Deserialize, Serialize};
use std::fs;
use tracing::{info, warn};

/// Counters from one replay pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplayStats {
    /// Committed frames found in the file
    pub frames: usize,
    /// `SET` lines applied
    pub sets_applied: usize,
    /// `SET` lines skipped (unknown slot, malformed value, missing morph)
    pub sets_skipped: usize,
    /// Whether the file predates framing and loose sets were applied
    pub legacy: bool,
}

/// Result of a replay attempt
#[derive(Debug, Clone)]
pub enum ReplayOutcome {
    /// The WAL file does not exist; the world was not touched
    NoWal,
    /// The file was replayed
    Applied(ReplayStats),
}

/// Clears the replaying flag even when application panics
struct ReplayFlagGuard<'a>(&'a Wal);

impl Drop for ReplayFlagGuard<'_> {
    fn drop(&mut self) {
        self.0.set_replaying(false);
    }
}

/// Replay the log into a world.
///
/// Applies `SET` lines from committed frames in file order; a file that
/// never saw a `BEGIN` is legacy and replays every `SET`. Malformed lines
/// skip without failing the pass; the world is mutated in place.
pub fn replay(wal: &Wal, world: &mut World) -> ReplayOutcome {
    let content = match fs::read_to_string(wal.path()) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %wal.path().display(), "no wal to replay");
            return ReplayOutcome::NoWal;
        }
        Err(e) => {
            warn!(error = %e, path = %wal.path().display(), "wal unreadable, treating as absent");
            return ReplayOutcome::NoWal;
        }
    };

    wal.set_replaying(true);
    let _guard = ReplayFlagGuard(wal);

    let scan = frame::scan_text(&content);
    let mut stats = ReplayStats {
        frames: scan.frames.len(),
        legacy: !scan.saw_begin,
        ..Default::default()
    };

    for set in scan.replayable_sets() {
        match world.apply_set(&set.target, &set.slot, &set.value) {
            SetOutcome::Applied => stats.sets_applied += 1,
            SetOutcome::UnknownSlot | SetOutcome::Malformed | SetOutcome::MissingMorph => {
                stats.sets_skipped += 1;
            }
        }
    }

    info!(
        frames = stats.frames,
        applied = stats.sets_applied,
        skipped = stats.sets_skipped,
        legacy = stats.legacy,
        "wal replayed"
    );
    ReplayOutcome::Applied(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn wal_with(temp: &TempDir, content: &str) -> Wal {
        let path = temp.path().join("telos.wal");
        fs::write(&path, content).unwrap();
        Wal::new(path)
    }

    #[test]
    fn test_replay_missing_file_is_no_wal() {
        let temp = TempDir::new().unwrap();
        let wal = Wal::new(temp.path().join("absent.wal"));
        let mut world = World::new();
        assert!(matches!(replay(&wal, &mut world), ReplayOutcome::NoWal));
        assert!(world.is_empty());
    }

    #[test]
    fn test_replay_committed_frame_reconstructs_morph() {
        let temp = TempDir::new().unwrap();
        let wal = wal_with(
            &temp,
            concat!(
                "BEGIN ui.plan {}\n",
                "SET m42.type TO RectangleMorph\n",
                "SET m42.position TO (120,40)\n",
                "SET m42.size TO (80x60)\n",
                "SET m42.color TO [0.8,0.2,0.2,1]\n",
                "END ui.plan\n",
            ),
        );
        let mut world = World::new();
        let ReplayOutcome::Applied(stats) = replay(&wal, &mut world) else {
            panic!("expected applied outcome");
        };
        assert_eq!(stats.frames, 1);
        assert_eq!(stats.sets_applied, 4);
        let m = world.get("m42").unwrap();
        assert_eq!((m.x, m.y, m.width, m.height), (120.0, 40.0, 80.0, 60.0));
        assert_eq!(m.color, [0.8, 0.2, 0.2, 1.0]);
        world.verify_integrity().unwrap();
    }

    #[test]
    fn test_replay_skips_uncommitted_frame() {
        let temp = TempDir::new().unwrap();
        let wal = wal_with(
            &temp,
            concat!(
                "BEGIN a {}\nSET m1.type TO Morph\nEND a\n",
                "BEGIN b {}\nSET m2.type TO Morph\n", // torn before END
            ),
        );
        let mut world = World::new();
        replay(&wal, &mut world);
        assert!(world.get("m1").is_some());
        assert!(world.get("m2").is_none());
    }

    #[test]
    fn test_replay_legacy_file_applies_loose_sets() {
        let temp = TempDir::new().unwrap();
        let wal = wal_with(
            &temp,
            "SET m1.type TO RectangleMorph\nSET m1.position TO (5,6)\n",
        );
        let mut world = World::new();
        let ReplayOutcome::Applied(stats) = replay(&wal, &mut world) else {
            panic!("expected applied outcome");
        };
        assert!(stats.legacy);
        assert_eq!(world.get("m1").unwrap().x, 5.0);
    }

    #[test]
    fn test_replay_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let wal = wal_with(
            &temp,
            "BEGIN a {}\nSET m1.type TO Morph\nSET m1.position TO (7,8)\nEND a\n",
        );
        let mut world = World::new();
        replay(&wal, &mut world);
        replay(&wal, &mut world);
        assert_eq!(world.len(), 2); // root + m1
        assert_eq!(world.get("m1").unwrap().x, 7.0);
    }

    #[test]
    fn test_replay_clears_flag_and_counts_skips() {
        let temp = TempDir::new().unwrap();
        let wal = wal_with(
            &temp,
            concat!(
                "BEGIN a {}\n",
                "SET m1.type TO Morph\n",
                "SET m1.position TO (bad,value)\n",
                "SET m1.sparkle TO yes\n",
                "END a\n",
            ),
        );
        let mut world = World::new();
        let ReplayOutcome::Applied(stats) = replay(&wal, &mut world) else {
            panic!("expected applied outcome");
        };
        assert_eq!(stats.sets_applied, 1);
        assert_eq!(stats.sets_skipped, 2);
        assert!(!wal.is_replaying());
    }
}

//! The TelOS core context
//!
//! [`TelosCore`] owns the five subsystems and is the only mutation
//! surface that writes the WAL. World, memory, and WAL are singletons
//! *within* a core, never process-wide: tests construct independent
//! instances rooted in temp directories.
//!
//! Slot setters follow a strict shape: mutate in memory first, then emit
//! the `SET` line (suppressed during replay). The identity (`type`) line
//! is emitted lazily, immediately before a morph's first persisted slot,
//! so a morph that is never mutated never reaches the log.

use crate::config::Config;
use crate::curation::{CurationQueue, JsonlStream, UI_SNAPSHOT_STREAM};
use crate::error::{Result, TelosError};
use crate::kernel::KernelState;
use crate::memory::MemoryStore;
use crate::wal::{self, ReplayOutcome, Wal};
use crate::world::{Event, MorphId, World};
use serde_json::{json, Value};
use tracing::{debug, info};

/// The assembled substrate: configuration, world, WAL, memory, curation,
/// and generative-kernel state.
#[derive(Debug)]
pub struct TelosCore {
    pub config: Config,
    pub wal: Wal,
    pub world: World,
    pub memory: MemoryStore,
    pub curation: CurationQueue,
    pub kernel: KernelState,
    ui_stream: JsonlStream,
}

impl TelosCore {
    /// Assemble a core from configuration. Nothing touches the disk until
    /// the first append or an explicit load.
    pub fn new(config: Config) -> Self {
        let wal = Wal::new(&config.wal_path);
        let curation = CurationQueue::open(&config.logs_dir);
        let ui_stream = JsonlStream::new(config.logs_dir.join(UI_SNAPSHOT_STREAM));
        let memory = MemoryStore::new(config.hv_dim);
        Self {
            config,
            wal,
            world: World::new(),
            memory,
            curation,
            kernel: KernelState::default(),
            ui_stream,
        }
    }

    /// Core rooted in a directory, with a small hypervector dimension.
    /// Test constructor.
    pub fn rooted(dir: impl Into<std::path::PathBuf>, hv_dim: usize) -> Self {
        Self::new(Config::rooted(dir).with_hv_dim(hv_dim))
    }

    /// The UI snapshot JSONL stream
    pub fn ui_stream(&self) -> &JsonlStream {
        &self.ui_stream
    }

    // -----------------------------------------------------------------------
    // Morph mutation surface (WAL-emitting)
    // -----------------------------------------------------------------------

    /// Create a morph of the given kind, attached to the root.
    ///
    /// Nothing is persisted yet; the identity line is deferred until the
    /// first slot mutation.
    pub fn create_morph(&mut self, kind: &str) -> MorphId {
        let id = self.world.create_morph(kind);
        debug!(id = %id, kind, "morph created");
        id
    }

    /// Emit the lazy identity line for a morph if it has not been
    /// persisted yet
    fn ensure_identity(&mut self, id: &str) {
        if self.wal.is_replaying() {
            return;
        }
        let Some(morph) = self.world.get_mut(id) else {
            return;
        };
        if !morph.persisted_identity {
            morph.persisted_identity = true;
            let kind = morph.kind.clone();
            self.wal.set(id, "type", &kind);
        }
    }

    fn require(&self, id: &str) -> Result<()> {
        if self.world.get(id).is_some() {
            Ok(())
        } else {
            Err(TelosError::MorphNotFound(id.to_string()))
        }
    }

    /// Move a morph and persist its position
    pub fn move_to(&mut self, id: &str, x: f64, y: f64) -> Result<()> {
        self.require(id)?;
        self.ensure_identity(id);
        let morph = self.world.get_mut(id).ok_or_else(|| TelosError::MorphNotFound(id.into()))?;
        morph.x = x;
        morph.y = y;
        self.wal.set(id, "position", &format!("({},{})", x, y));
        Ok(())
    }

    /// Resize a morph and persist its extent
    pub fn resize_to(&mut self, id: &str, width: f64, height: f64) -> Result<()> {
        self.require(id)?;
        self.ensure_identity(id);
        let morph = self.world.get_mut(id).ok_or_else(|| TelosError::MorphNotFound(id.into()))?;
        morph.width = width;
        morph.height = height;
        self.wal.set(id, "size", &format!("({}x{})", width, height));
        Ok(())
    }

    /// Recolor a morph. Alpha is canonicalized to f64 and always written.
    pub fn set_color(&mut self, id: &str, r: f64, g: f64, b: f64, a: f64) -> Result<()> {
        self.require(id)?;
        self.ensure_identity(id);
        let color = [r, g, b, a];
        let morph = self.world.get_mut(id).ok_or_else(|| TelosError::MorphNotFound(id.into()))?;
        morph.color = color;
        self.wal.set(id, "color", &crate::world::format_color(color));
        Ok(())
    }

    /// Set a morph's z-index and persist it
    pub fn set_z_index(&mut self, id: &str, z: i32) -> Result<()> {
        self.require(id)?;
        self.ensure_identity(id);
        let morph = self.world.get_mut(id).ok_or_else(|| TelosError::MorphNotFound(id.into()))?;
        morph.z_index = z;
        self.wal.set(id, "zIndex", &z.to_string());
        Ok(())
    }

    /// Set a morph's text and persist it
    pub fn set_text(&mut self, id: &str, text: &str) -> Result<()> {
        self.require(id)?;
        self.ensure_identity(id);
        let morph = self.world.get_mut(id).ok_or_else(|| TelosError::MorphNotFound(id.into()))?;
        morph.text = Some(text.to_string());
        self.wal.set(id, "text", text);
        Ok(())
    }

    /// Raise a morph above its siblings; persists the new z-index
    pub fn bring_to_front(&mut self, id: &str) -> Result<i32> {
        self.require(id)?;
        self.ensure_identity(id);
        let z = self.world.bring_to_front(id)?;
        self.wal.set(id, "zIndex", &z.to_string());
        Ok(z)
    }

    /// Dispatch a pointer event. A completed drag persists the final
    /// position with a single `SET`.
    pub fn dispatch_event(&mut self, event: &Event) -> bool {
        let outcome = self.world.dispatch_event(event);
        if let Some(id) = outcome.completed_drag {
            if let Some((x, y)) = self.world.get(&id).map(|m| (m.x, m.y)) {
                self.ensure_identity(&id);
                self.wal.set(&id, "position", &format!("({},{})", x, y));
            }
        }
        outcome.handled
    }

    // -----------------------------------------------------------------------
    // Framed mutation
    // -----------------------------------------------------------------------

    /// Run `body` inside a `BEGIN tag ... END tag` frame.
    ///
    /// The frame closes even when `body` returns an error value or
    /// panics; replay then applies whatever partial state the frame
    /// carries, because the framing is intact.
    pub fn with_frame<R>(
        &mut self,
        tag: &str,
        info: &Value,
        body: impl FnOnce(&mut Self) -> R,
    ) -> R {
        self.wal.begin(tag, info);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| body(self)));
        self.wal.end(tag);
        match result {
            Ok(value) => value,
            Err(payload) => std::panic::resume_unwind(payload),
        }
    }

    // -----------------------------------------------------------------------
    // Persistence operations
    // -----------------------------------------------------------------------

    /// Replay the WAL into this core's world
    pub fn replay(&mut self) -> ReplayOutcome {
        wal::replay::replay(&self.wal, &mut self.world)
    }

    /// Rotate the WAL if it exceeds `max_bytes`
    pub fn rotate_wal(&self, max_bytes: u64) -> Result<bool> {
        self.wal.rotate(max_bytes)
    }

    /// Load the persisted memory index; emits an informational `MARK`
    pub fn load_memory(&mut self) -> Result<usize> {
        let path = self.config.memory_path.clone();
        let loaded = self.memory.load(&path)?;
        self.wal.mark("memory.load", &json!({ "loaded": loaded }));
        Ok(loaded)
    }

    /// Save the memory index; emits an informational `MARK`
    pub fn save_memory(&self) -> Result<usize> {
        let saved = self.memory.save(&self.config.memory_path)?;
        self.wal.mark("memory.save", &json!({ "saved": saved }));
        Ok(saved)
    }

    // -----------------------------------------------------------------------
    // Ingestion and plans
    // -----------------------------------------------------------------------

    /// Grow the memory with `n` persona-flavored contexts derived from a
    /// prompt.
    ///
    /// The remote LLM bridge is an external collaborator; this is the
    /// deterministic offline stand-in. Every ingested context is queued
    /// for curation, and the batch is marked on the WAL.
    pub fn rag_grow(&mut self, prompt: &str, persona: &str, n: usize) -> usize {
        for i in 0..n {
            let text = format!("[{} tags:rag,{}] {} (angle {})", persona, persona.to_lowercase(), prompt, i + 1);
            let id = self.memory.add_context(&text);
            self.curation.push(&crate::curation::CurationEntry {
                kind: crate::curation::CurationKind::Llm,
                key: format!("rag:{}:{}", persona, id),
                path: self.config.memory_path.display().to_string(),
                record: json!({ "prompt": prompt, "persona": persona, "entry": id }),
            });
        }
        self.wal
            .mark("memory.grow", &json!({ "persona": persona, "count": n }));
        n
    }

    /// Apply a textual UI plan: one framed `ui.plan` commit laying out a
    /// labelled card for the goal. Returns the card's morph id.
    pub fn ui_plan_apply(&mut self, persona: &str, goal: &str) -> MorphId {
        let info = json!({ "persona": persona, "goal": goal });
        self.with_frame("ui.plan", &info, |core| {
            let card = core.create_morph("RectangleMorph");
            let _ = core.move_to(&card, 20.0, 20.0);
            let _ = core.resize_to(&card, 200.0, 80.0);
            let label = core.create_morph("TextMorph");
            let _ = core.move_to(&label, 30.0, 30.0);
            let _ = core.set_text(&label, goal);
            let _ = core.world.add_submorph(&card, &label);
            card
        })
    }

    // -----------------------------------------------------------------------
    // Liveness
    // -----------------------------------------------------------------------

    /// Tick the heartbeat `n` times; returns the running count
    pub fn heartbeat(&mut self, n: u64) -> u64 {
        self.kernel.heartbeats += n;
        self.wal
            .mark("ui.heartbeat", &json!({ "count": self.kernel.heartbeats }));
        self.kernel.heartbeats
    }

    /// Append a JSON document to the UI snapshot stream
    pub fn record_ui_snapshot(&self, doc: &Value) {
        self.ui_stream.append(doc);
    }

    /// Graceful shutdown: persist memory, mark the exit, report `ok`
    pub fn run_exit(&mut self, reason: &str) -> String {
        if let Err(e) = self.save_memory() {
            tracing::warn!(error = %e, "memory save on exit failed");
        }
        self.wal.mark("run.exit", &json!({ "reason": reason }));
        info!(reason, "graceful exit");
        "ok".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wal::list_complete_frames;
    use crate::world::{EventKind, ROOT_ID};
    use tempfile::TempDir;

    const DIM: usize = 64;

    #[test]
    fn test_setters_emit_identity_lazily() {
        let temp = TempDir::new().unwrap();
        let mut core = TelosCore::rooted(temp.path(), DIM);
        let id = core.create_morph("RectangleMorph");
        // Creation alone writes nothing
        assert_eq!(core.wal.size(), 0);

        core.move_to(&id, 10.0, 20.0).unwrap();
        let content = std::fs::read_to_string(core.wal.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], format!("SET {}.type TO RectangleMorph", id));
        assert_eq!(lines[1], format!("SET {}.position TO (10,20)", id));

        // Identity line only once
        core.resize_to(&id, 80.0, 60.0).unwrap();
        let content = std::fs::read_to_string(core.wal.path()).unwrap();
        assert_eq!(content.matches(".type TO").count(), 1);
    }

    #[test]
    fn test_setter_on_missing_morph_fails() {
        let temp = TempDir::new().unwrap();
        let mut core = TelosCore::rooted(temp.path(), DIM);
        assert!(core.move_to("ghost", 1.0, 2.0).is_err());
        assert_eq!(core.wal.size(), 0);
    }

    #[test]
    fn test_with_frame_brackets_mutations() {
        let temp = TempDir::new().unwrap();
        let mut core = TelosCore::rooted(temp.path(), DIM);
        let id = core.create_morph("RectangleMorph");
        core.with_frame("ui.plan", &json!({"goal": "demo"}), |core| {
            core.move_to(&id, 30.0, 40.0).unwrap();
            core.resize_to(&id, 90.0, 70.0).unwrap();
        });
        let frames = list_complete_frames(core.wal.path()).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].set_count, 3); // identity + position + size
    }

    #[test]
    fn test_with_frame_closes_frame_on_panic() {
        let temp = TempDir::new().unwrap();
        let mut core = TelosCore::rooted(temp.path(), DIM);
        let id = core.create_morph("RectangleMorph");
        let caught = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            core.with_frame("ui.plan", &json!({}), |core| {
                core.move_to(&id, 1.0, 2.0).unwrap();
                panic!("boom");
            });
        }));
        assert!(caught.is_err());
        // The frame closed anyway; its partial state replays
        let frames = list_complete_frames(core.wal.path()).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].set_count, 2); // identity + position
    }

    #[test]
    fn test_drag_completion_persists_position() {
        let temp = TempDir::new().unwrap();
        let mut core = TelosCore::rooted(temp.path(), DIM);
        let id = core.create_morph("RectangleMorph");
        core.world.get_mut(&id).unwrap().x = 10.0;
        core.world.get_mut(&id).unwrap().y = 10.0;

        assert!(core.dispatch_event(&Event::new(EventKind::MouseDown, 15.0, 15.0)));
        assert!(core.dispatch_event(&Event::new(EventKind::MouseMove, 50.0, 50.0)));
        // Drag movement itself writes nothing
        assert_eq!(core.wal.size(), 0);

        assert!(core.dispatch_event(&Event::new(EventKind::MouseUp, 50.0, 50.0)));
        let content = std::fs::read_to_string(core.wal.path()).unwrap();
        assert!(content.contains(&format!("SET {}.position TO (45,45)", id)));
    }

    #[test]
    fn test_replay_round_trips_setters() {
        let temp = TempDir::new().unwrap();
        let mut core = TelosCore::rooted(temp.path(), DIM);
        let id = core.create_morph("RectangleMorph");
        core.move_to(&id, 10.0, 20.0).unwrap();
        core.resize_to(&id, 80.0, 60.0).unwrap();
        core.set_color(&id, 1.0, 0.0, 0.0, 1.0).unwrap();

        let mut restored = TelosCore::rooted(temp.path(), DIM);
        assert!(matches!(restored.replay(), ReplayOutcome::Applied(_)));
        let m = restored.world.get(&id).unwrap();
        assert_eq!((m.x, m.y, m.width, m.height), (10.0, 20.0, 80.0, 60.0));
        assert_eq!(m.color, [1.0, 0.0, 0.0, 1.0]);
        restored.world.verify_integrity().unwrap();
        assert_eq!(restored.world.children_of(ROOT_ID).len(), 1);
    }

    #[test]
    fn test_heartbeat_accumulates() {
        let temp = TempDir::new().unwrap();
        let mut core = TelosCore::rooted(temp.path(), DIM);
        assert_eq!(core.heartbeat(3), 3);
        assert_eq!(core.heartbeat(2), 5);
    }

    #[test]
    fn test_run_exit_saves_memory() {
        let temp = TempDir::new().unwrap();
        let mut core = TelosCore::rooted(temp.path(), DIM);
        core.memory.add_context("parting thought");
        assert_eq!(core.run_exit("test"), "ok");
        assert!(core.config.memory_path.exists());
    }
}

//! Generative kernel
//!
//! When a message reaches the world with no explicit handler, the kernel
//! synthesizes a response instead of failing: classify the selector,
//! consult memory for a similar pattern, route to a category
//! synthesizer, and fall back to a learning placeholder that records the
//! invocation for later curation.
//!
//! Everything here is deterministic for a given world and memory state;
//! the only sanctioned randomness is the `spawn` action.

use crate::core::TelosCore;
use crate::memory::RankedMatch;
use crate::snapshot;
use crate::wal::{self, FrameSummary, ReplayOutcome};
use crate::world::{Event, EventKind, MorphId};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

/// Selector categories, checked in this order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Creation,
    Query,
    Action,
    Morphic,
    Persistence,
    Unknown,
}

/// Classify a selector into its synthesis category
pub fn classify(selector: &str) -> Category {
    let lower = selector.to_lowercase();
    if lower.starts_with("create") || lower.starts_with("new") || lower.starts_with("make") {
        Category::Creation
    } else if ["find", "search", "get", "query"].iter().any(|n| lower.contains(n)) {
        Category::Query
    } else if selector.ends_with("Action")
        || ["do", "execute", "run"].iter().any(|n| lower.contains(n))
    {
        Category::Action
    } else if ["morph", "ui", "draw"].iter().any(|n| lower.contains(n)) {
        Category::Morphic
    } else if ["save", "load", "persist", "wal"].iter().any(|n| lower.contains(n)) {
        Category::Persistence
    } else {
        Category::Unknown
    }
}

/// A synthesized placeholder for a message the kernel could not ground.
/// Recording the invocation is the learning step; the curation queue
/// picks these up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnedStub {
    /// Unique id of this invocation
    pub invocation_id: Uuid,
    /// The unhandled selector
    pub selector: String,
    /// Arguments as given
    pub args: Vec<Value>,
    /// Top memory hit attached as context, if any
    pub memory_pattern: Option<String>,
    /// Unix timestamp of the invocation
    pub created_at: f64,
}

/// Mutable kernel state carried by the core
#[derive(Debug)]
pub struct KernelState {
    /// Active persona name
    pub persona: String,
    /// Placeholders synthesized for unknown messages
    pub learned: Vec<LearnedStub>,
    /// Heartbeat tick counter
    pub heartbeats: u64,
}

impl Default for KernelState {
    fn default() -> Self {
        Self {
            persona: "ROBIN".to_string(),
            learned: Vec::new(),
            heartbeats: 0,
        }
    }
}

/// What the kernel produced for a message
#[derive(Debug, Clone)]
pub enum Synthesis {
    /// A morph was created
    Created { id: MorphId, kind: String },
    /// Morph ids answering a query
    Morphs(Vec<MorphId>),
    /// Memory hits answering a query
    Matches(Vec<RankedMatch>),
    /// Committed WAL frames
    Frames(Vec<FrameSummary>),
    /// A plain textual result
    Text(String),
    /// Unknown message, recorded for learning
    Placeholder(LearnedStub),
}

impl Synthesis {
    /// Render the result as the short textual form the command surface
    /// returns
    pub fn render(&self) -> String {
        match self {
            Synthesis::Created { id, .. } => id.clone(),
            Synthesis::Morphs(ids) => {
                if ids.is_empty() {
                    "[no-morph]".to_string()
                } else {
                    ids.join(",")
                }
            }
            Synthesis::Matches(hits) => {
                if hits.is_empty() {
                    "[no-match]".to_string()
                } else {
                    hits.iter()
                        .map(|h| h.text.as_str())
                        .collect::<Vec<_>>()
                        .join(" | ")
                }
            }
            Synthesis::Frames(frames) => format!("{} frames", frames.len()),
            Synthesis::Text(text) => text.clone(),
            Synthesis::Placeholder(stub) => format!("[learned]{}", stub.selector),
        }
    }
}

impl TelosCore {
    /// Synthesize a response for a message with no explicit handler.
    ///
    /// The pipeline is fixed: mark the invocation, classify, consult
    /// memory (context only, never the answer), route to the category
    /// synthesizer, fall back to a learning placeholder.
    pub fn synthesize(&mut self, selector: &str, args: &[Value]) -> Synthesis {
        self.wal.mark(
            "telos.generative.invoke",
            &json!({ "selector": selector, "argc": args.len() }),
        );

        let category = classify(selector);
        let query = consult_query(selector, args);
        let memory_pattern = self
            .memory
            .search(&query, 3)
            .first()
            .map(|hit| hit.text.clone());
        debug!(selector, ?category, pattern = ?memory_pattern, "generative dispatch");

        let result = match category {
            Category::Creation => Some(self.synthesize_creation(selector, args)),
            Category::Query => Some(self.synthesize_query(selector, args, &query)),
            Category::Action => self.synthesize_action(selector, args),
            Category::Morphic => self.synthesize_morphic(selector, args),
            Category::Persistence => Some(self.synthesize_persistence(selector)),
            Category::Unknown => None,
        };

        result.unwrap_or_else(|| self.placeholder(selector, args, memory_pattern))
    }

    // -----------------------------------------------------------------------
    // Category synthesizers
    // -----------------------------------------------------------------------

    fn synthesize_creation(&mut self, selector: &str, args: &[Value]) -> Synthesis {
        let kind = infer_kind(selector);
        let id = self.create_morph(kind);
        let nums = numeric_args(args);
        if nums.len() >= 2 {
            let _ = self.move_to(&id, nums[0], nums[1]);
        }
        if nums.len() >= 4 {
            let _ = self.resize_to(&id, nums[2], nums[3]);
        }
        Synthesis::Created {
            id,
            kind: kind.to_string(),
        }
    }

    fn synthesize_query(&mut self, selector: &str, args: &[Value], query: &str) -> Synthesis {
        let lower = selector.to_lowercase();
        let nums = numeric_args(args);

        if selector.contains("At") && nums.len() >= 2 {
            return Synthesis::Morphs(self.world.hit_test(nums[0], nums[1]));
        }
        if lower.contains("kind") {
            let fragment = string_args(args).into_iter().next().unwrap_or_default();
            return Synthesis::Morphs(self.world.morphs_of_kind(&fragment));
        }
        if lower.contains("color") && nums.len() >= 3 {
            return Synthesis::Morphs(self.morphs_of_color(nums[0], nums[1], nums[2]));
        }
        if lower.contains("persona") {
            return Synthesis::Text(self.kernel.persona.clone());
        }
        if lower.contains("stats") {
            let stats = self.memory.stats();
            return Synthesis::Text(format!(
                "{} entries, {} concepts, {} tags",
                stats.entries, stats.concepts, stats.distinct_tags
            ));
        }
        if lower.contains("wal") || lower.contains("frame") {
            let frames = wal::list_complete_frames(self.wal.path()).unwrap_or_default();
            return Synthesis::Frames(frames);
        }
        Synthesis::Matches(self.memory.search(query, 5))
    }

    fn synthesize_action(&mut self, selector: &str, args: &[Value]) -> Option<Synthesis> {
        let lower = selector.to_lowercase();
        if lower.contains("clear") || lower.contains("reset") {
            let children = self.world.children_of(self.world.root_id().as_str()).to_vec();
            let count = children.len();
            for child in children {
                let _ = self.world.remove_submorph("root", &child);
            }
            return Some(Synthesis::Text(format!("cleared {}", count)));
        }
        if lower.contains("layout") {
            let children = self.world.children_of("root").to_vec();
            for (i, id) in children.iter().enumerate() {
                let x = 10.0 + 100.0 * i as f64;
                let _ = self.move_to(id, x, 10.0);
            }
            return Some(Synthesis::Text("ok".to_string()));
        }
        if lower.contains("animate") {
            let children = self.world.children_of("root").to_vec();
            for id in children {
                if let Some((x, y)) = self.world.get(&id).map(|m| (m.x, m.y)) {
                    let _ = self.move_to(&id, x + 5.0, y);
                }
            }
            return Some(Synthesis::Text("ok".to_string()));
        }
        if lower.contains("spawn") {
            // The one sanctioned use of non-seeded randomness
            let mut rng = rand::thread_rng();
            let id = self.create_morph("RectangleMorph");
            let x = rng.gen_range(0.0..400.0);
            let y = rng.gen_range(0.0..300.0);
            let _ = self.move_to(&id, x, y);
            return Some(Synthesis::Created {
                id,
                kind: "RectangleMorph".to_string(),
            });
        }
        if lower.contains("persona") {
            if let Some(name) = string_args(args).into_iter().next() {
                self.kernel.persona = name;
            }
            return Some(Synthesis::Text(self.kernel.persona.clone()));
        }
        if lower.contains("save") {
            return Some(match self.save_memory() {
                Ok(count) => Synthesis::Text(format!("saved {}", count)),
                Err(_) => Synthesis::Text("[io-error]".to_string()),
            });
        }
        None
    }

    fn synthesize_morphic(&mut self, selector: &str, args: &[Value]) -> Option<Synthesis> {
        let lower = selector.to_lowercase();
        if lower.contains("draw") || lower.contains("render") {
            return Some(Synthesis::Text(snapshot::render_text(&self.world)));
        }
        if lower.contains("click") {
            let nums = numeric_args(args);
            if nums.len() >= 2 {
                let handled =
                    self.dispatch_event(&Event::new(EventKind::Click, nums[0], nums[1]));
                return Some(Synthesis::Text(
                    if handled { "handled" } else { "[no-morph]" }.to_string(),
                ));
            }
        }
        if lower.contains("heartbeat") {
            let count = self.heartbeat(1);
            return Some(Synthesis::Text(format!("tick {}", count)));
        }
        None
    }

    fn synthesize_persistence(&mut self, selector: &str) -> Synthesis {
        let lower = selector.to_lowercase();
        if lower.contains("replay") {
            return Synthesis::Text(match self.replay() {
                ReplayOutcome::NoWal => "[no-wal]".to_string(),
                ReplayOutcome::Applied(stats) => {
                    format!("replayed {} frames, {} sets", stats.frames, stats.sets_applied)
                }
            });
        }
        if lower.contains("snapshot") {
            return match snapshot::write_json_snapshot(self, None) {
                Ok(path) => Synthesis::Text(path.display().to_string()),
                Err(_) => Synthesis::Text("[io-error]".to_string()),
            };
        }
        // save / persist / wal: drop a checkpoint frame
        self.with_frame("telos.checkpoint", &json!({ "selector": selector }), |_| {});
        Synthesis::Text("ok".to_string())
    }

    fn placeholder(
        &mut self,
        selector: &str,
        args: &[Value],
        memory_pattern: Option<String>,
    ) -> Synthesis {
        let stub = LearnedStub {
            invocation_id: Uuid::new_v4(),
            selector: selector.to_string(),
            args: args.to_vec(),
            memory_pattern,
            created_at: crate::now_unix(),
        };
        self.curation.push(&crate::curation::CurationEntry {
            kind: crate::curation::CurationKind::Tool,
            key: format!("selector:{}", selector),
            path: self.curation.path().display().to_string(),
            record: json!({
                "selector": stub.selector,
                "args": stub.args,
                "memoryPattern": stub.memory_pattern,
            }),
        });
        self.kernel.learned.push(stub.clone());
        Synthesis::Placeholder(stub)
    }

    fn morphs_of_color(&self, r: f64, g: f64, b: f64) -> Vec<MorphId> {
        let mut ids: Vec<MorphId> = self
            .world
            .morph_ids()
            .filter(|id| id.as_str() != "root")
            .filter(|id| {
                self.world
                    .get(id)
                    .map(|m| {
                        (m.color[0] - r).abs() < 1e-6
                            && (m.color[1] - g).abs() < 1e-6
                            && (m.color[2] - b).abs() < 1e-6
                    })
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        ids.sort();
        ids
    }
}

/// Build the memory-consultation query from the selector and arguments
fn consult_query(selector: &str, args: &[Value]) -> String {
    let mut parts = vec![selector.to_string()];
    parts.extend(args.iter().map(value_text));
    parts.join(" ")
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Numeric arguments, in order, accepting both JSON numbers and numeric
/// strings (the command surface passes strings)
fn numeric_args(args: &[Value]) -> Vec<f64> {
    args.iter()
        .filter_map(|v| match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        })
        .collect()
}

fn string_args(args: &[Value]) -> Vec<String> {
    args.iter()
        .filter_map(|v| match v {
            Value::String(s) => Some(s.clone()),
            _ => None,
        })
        .collect()
}

/// Infer the nearest built-in kind from a selector by substring
fn infer_kind(selector: &str) -> &'static str {
    let lower = selector.to_lowercase();
    for (needle, kind) in [
        ("rect", "RectangleMorph"),
        ("text", "TextMorph"),
        ("label", "TextMorph"),
        ("button", "ButtonMorph"),
    ] {
        if lower.contains(needle) {
            return kind;
        }
    }
    crate::world::BASE_KIND
}

//! VSA memory store
//!
//! Tagged hypervector store with a hybrid ranker, JSONL persistence, and
//! the nearest-neighbor `cleanup` operator that completes the
//! unbind-then-cleanup dialogue.
//!
//! Persistence stores only `(text, tags)` lines; vectors are recomputed on
//! load, which is why the codec in [`crate::hv`] must be deterministic.

use crate::error::Result;
use crate::hv::{self, Hypervector};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::{debug, warn};

/// Tag-hint prefix: `[NAME tags:t1,t2] actual query`
static TAG_HINT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[([A-Za-z0-9._-]+)\s+tags:([^\]]*)\]\s*(.*)$").unwrap());

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A single immutable memory record.
///
/// Created by `add_context`/`add_concept`, never mutated, destroyed only by
/// `clear`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Monotonically assigned, stable id
    pub id: u64,

    /// Original text; the vector is always `encode_text(text)`
    pub text: String,

    /// Recomputable hypervector
    #[serde(skip)]
    pub vector: Hypervector,

    /// Tags; may be empty but never absent
    pub tags: BTreeSet<String>,

    /// Unix timestamp (seconds) at insertion
    pub timestamp: f64,
}

/// One line of the JSONL snapshot. Vectors are never stored.
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotLine {
    text: String,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    tags: BTreeSet<String>,
}

/// Aggregate statistics about the store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStats {
    /// Total entries
    pub entries: usize,
    /// Entries tagged `concept`
    pub concepts: usize,
    /// Distinct tags in use
    pub distinct_tags: usize,
    /// Hypervector dimensionality
    pub dim: usize,
}

/// A scored search hit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedMatch {
    /// Id of the matched entry
    pub id: u64,

    /// Text of the matched entry
    pub text: String,

    /// Hybrid ranking score
    pub score: f64,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// In-memory hypervector store with hybrid search
#[derive(Debug)]
pub struct MemoryStore {
    entries: Vec<MemoryEntry>,
    next_id: u64,
    dim: usize,
}

impl MemoryStore {
    /// Create an empty store with the given hypervector dimensionality
    pub fn new(dim: usize) -> Self {
        Self {
            entries: Vec::new(),
            next_id: 0,
            dim,
        }
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Hypervector dimensionality of this store
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// All entries, in insertion order
    pub fn entries(&self) -> &[MemoryEntry] {
        &self.entries
    }

    /// Look up an entry by id
    pub fn get(&self, id: u64) -> Option<&MemoryEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Drop every entry and reset the id counter
    pub fn clear(&mut self) {
        self.entries.clear();
        self.next_id = 0;
    }

    /// Aggregate statistics over the current entries
    pub fn stats(&self) -> MemoryStats {
        let mut tags = BTreeSet::new();
        let mut concepts = 0;
        for entry in &self.entries {
            if entry.tags.contains("concept") {
                concepts += 1;
            }
            tags.extend(entry.tags.iter().cloned());
        }
        MemoryStats {
            entries: self.entries.len(),
            concepts,
            distinct_tags: tags.len(),
            dim: self.dim,
        }
    }

    fn insert(&mut self, text: &str, tags: BTreeSet<String>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push(MemoryEntry {
            id,
            text: text.to_string(),
            vector: hv::encode_text(text, self.dim),
            tags,
            timestamp: crate::now_unix(),
        });
        id
    }

    /// Add a context string; returns the new entry id.
    ///
    /// A leading `[NAME tags:t1,t2]` hint is stripped into the entry's tag
    /// set before encoding.
    pub fn add_context(&mut self, text: &str) -> u64 {
        let (body, tags) = split_tag_hint(text);
        self.insert(&body, tags)
    }

    /// Add a named concept; tagged `concept` so role/filler prototypes are
    /// distinguishable from free-form contexts.
    pub fn add_concept(&mut self, concept: &str) -> u64 {
        let mut tags = BTreeSet::new();
        tags.insert("concept".to_string());
        self.insert(concept, tags)
    }

    /// Bulk insert; returns the number of entries added
    pub fn index(&mut self, items: &[String]) -> usize {
        for item in items {
            self.add_context(item);
        }
        items.len()
    }

    // -----------------------------------------------------------------------
    // Search
    // -----------------------------------------------------------------------

    /// Hybrid search: substring presence + length affinity + cosine
    /// similarity + tag overlap.
    ///
    /// Returns at most `k` hits sorted by score descending, ties broken by
    /// insertion order. Empty index or `k == 0` returns an empty vec.
    pub fn search(&self, query: &str, k: usize) -> Vec<RankedMatch> {
        if self.entries.is_empty() || k == 0 {
            return Vec::new();
        }
        let (body, hint_tags) = split_tag_hint(query);
        let query_lower = body.to_lowercase();
        let query_vec = hv::encode_text(&body, self.dim);

        let mut scored: Vec<RankedMatch> = self
            .entries
            .iter()
            .map(|entry| {
                let presence = if entry.text.to_lowercase().contains(&query_lower) {
                    2.0
                } else {
                    0.0
                };
                let length_bonus =
                    1.0 / (1.0 + (entry.text.len() as f64 - body.len() as f64).abs());
                let cosine = hv::similarity(&query_vec, &entry.vector);
                let overlap = entry.tags.intersection(&hint_tags).count().min(3);
                let tag_boost = 0.2 * overlap as f64;
                RankedMatch {
                    id: entry.id,
                    text: entry.text.clone(),
                    score: presence + length_bonus + cosine + tag_boost,
                }
            })
            .collect();

        // Stable sort keeps insertion order for equal scores
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
    }

    /// Nearest-neighbor cleanup: the entry whose vector has the highest
    /// cosine similarity to the (typically noisy) input.
    ///
    /// Returns `None` on an empty store.
    pub fn cleanup(&self, noisy: &Hypervector) -> Option<&MemoryEntry> {
        self.entries.iter().max_by(|a, b| {
            hv::similarity(noisy, &a.vector)
                .partial_cmp(&hv::similarity(noisy, &b.vector))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    }

    /// Compositional query over role-filler structure.
    ///
    /// Builds `composite = bundle(base, bind(role, filler)...)`, unbinds
    /// with the target role, and cleans the noisy result against the
    /// store. The confidence is the cosine between the noisy vector and
    /// the winning prototype.
    pub fn compositional_query(
        &self,
        base: &str,
        relations: &[(String, String)],
        target: &str,
    ) -> Option<RankedMatch> {
        let mut parts = vec![hv::encode_text(base, self.dim)];
        for (role, filler) in relations {
            parts.push(hv::bind(
                &hv::encode_text(role, self.dim),
                &hv::encode_text(filler, self.dim),
            ));
        }
        let composite = hv::bundle(&parts);
        let noisy = hv::unbind(&composite, &hv::encode_text(target, self.dim));
        let winner = self.cleanup(&noisy)?;
        Some(RankedMatch {
            id: winner.id,
            text: winner.text.clone(),
            score: hv::similarity(&noisy, &winner.vector),
        })
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Save the store as JSONL, one `{"text", "tags"}` object per line
    pub fn save(&self, path: &Path) -> Result<usize> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut file = fs::File::create(path)?;
        for entry in &self.entries {
            let line = SnapshotLine {
                text: entry.text.clone(),
                tags: entry.tags.clone(),
            };
            writeln!(file, "{}", serde_json::to_string(&line)?)?;
        }
        debug!(count = self.entries.len(), path = %path.display(), "memory snapshot saved");
        Ok(self.entries.len())
    }

    /// Load entries from a JSONL snapshot, recomputing vectors.
    ///
    /// A missing file loads zero entries without error; malformed lines are
    /// skipped with a warning.
    pub fn load(&mut self, path: &Path) -> Result<usize> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no memory snapshot to load");
                return Ok(0);
            }
            Err(e) => return Err(e.into()),
        };

        let mut loaded = 0;
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str::<SnapshotLine>(line) {
                Ok(snap) => {
                    self.insert(&snap.text, snap.tags);
                    loaded += 1;
                }
                Err(e) => warn!(error = %e, "skipping malformed memory line"),
            }
        }
        Ok(loaded)
    }
}

/// Split an optional `[NAME tags:t1,t2]` hint off the front of a query or
/// context string, returning the remaining body and the tag set.
fn split_tag_hint(text: &str) -> (String, BTreeSet<String>) {
    if let Some(caps) = TAG_HINT_RE.captures(text) {
        let tags = caps[2]
            .split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        (caps[3].to_string(), tags)
    } else {
        (text.to_string(), BTreeSet::new())
    }
}

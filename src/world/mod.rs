//! The object world
//!
//! A tree of morphs flattened into an id-indexed arena. `parent` and
//! `children` are stored as ids, never pointers, which keeps both
//! directions of the containment cycle O(1) without ownership knots.
//!
//! Everything here is pure state manipulation: structural operations and
//! slot setters never touch the WAL. The WAL-emitting mutation surface
//! lives on [`crate::core::TelosCore`], and replay drives [`World::apply_set`]
//! directly.

pub mod events;
pub mod morph;

pub use events::{DispatchOutcome, Event, EventKind};
pub use morph::{known_kinds, template_for, Morph, MorphId, MorphTemplate, BASE_KIND, WORLD_KIND};

use crate::error::{Result, TelosError};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Id of the world root morph
pub const ROOT_ID: &str = "root";

/// Outcome of applying one `SET` line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    /// Slot assigned (or morph created, for `type`)
    Applied,
    /// Slot name not recognized; skipped for forward compatibility
    UnknownSlot,
    /// Value failed to parse; skipped, frame still committed
    Malformed,
    /// Target morph does not exist and the slot cannot create it
    MissingMorph,
}

/// The morph arena: one world, one root, a flat index of every morph
/// reachable from it.
#[derive(Debug)]
pub struct World {
    morphs: HashMap<MorphId, Morph>,
    root: MorphId,
    next_seq: u64,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    /// Create a world with a single root morph and nothing else
    pub fn new() -> Self {
        let root = Morph {
            id: ROOT_ID.to_string(),
            kind: WORLD_KIND.to_string(),
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
            color: [1.0, 1.0, 1.0, 1.0],
            z_index: 0,
            text: None,
            children: Vec::new(),
            parent: None,
            persisted_identity: true,
            dragging: false,
            drag_dx: 0.0,
            drag_dy: 0.0,
        };
        let mut morphs = HashMap::new();
        morphs.insert(root.id.clone(), root);
        Self {
            morphs,
            root: ROOT_ID.to_string(),
            next_seq: 1,
        }
    }

    /// Id of the root morph
    pub fn root_id(&self) -> &MorphId {
        &self.root
    }

    /// Number of morphs in the index, root included
    pub fn len(&self) -> usize {
        self.morphs.len()
    }

    /// Whether the world holds only the root
    pub fn is_empty(&self) -> bool {
        self.morphs.len() == 1
    }

    /// Look up a morph by id
    pub fn get(&self, id: &str) -> Option<&Morph> {
        self.morphs.get(id)
    }

    /// Look up a morph mutably by id
    pub fn get_mut(&mut self, id: &str) -> Option<&mut Morph> {
        self.morphs.get_mut(id)
    }

    /// Direct children of a morph, in draw order
    pub fn children_of(&self, id: &str) -> &[MorphId] {
        self.morphs.get(id).map(|m| m.children.as_slice()).unwrap_or(&[])
    }

    /// Every morph id in the index (unordered)
    pub fn morph_ids(&self) -> impl Iterator<Item = &MorphId> {
        self.morphs.keys()
    }

    /// Morphs whose kind contains the given fragment, case-insensitive
    pub fn morphs_of_kind(&self, fragment: &str) -> Vec<MorphId> {
        let fragment = fragment.to_lowercase();
        let mut ids: Vec<MorphId> = self
            .morphs
            .values()
            .filter(|m| m.id != self.root && m.kind.to_lowercase().contains(&fragment))
            .map(|m| m.id.clone())
            .collect();
        ids.sort();
        ids
    }

    // -----------------------------------------------------------------------
    // Creation and structure
    // -----------------------------------------------------------------------

    fn fresh_id(&mut self) -> MorphId {
        loop {
            let id = format!("m{}", self.next_seq);
            self.next_seq += 1;
            if !self.morphs.contains_key(&id) {
                return id;
            }
        }
    }

    /// Bump the id counter past a replayed id so later `create_morph`
    /// calls never collide with morphs reconstructed from the log.
    fn note_external_id(&mut self, id: &str) {
        if let Some(n) = id.strip_prefix('m').and_then(|n| n.parse::<u64>().ok()) {
            self.next_seq = self.next_seq.max(n + 1);
        }
    }

    /// Clone the template for `kind` into a fresh morph attached to the
    /// root. Returns the new id.
    pub fn create_morph(&mut self, kind: &str) -> MorphId {
        let id = self.fresh_id();
        self.insert_with_id(id.clone(), kind);
        id
    }

    /// Insert a morph with a caller-chosen id (replay path). Attaches to
    /// the root and records the id so fresh ids skip past it.
    pub fn insert_with_id(&mut self, id: MorphId, kind: &str) -> &mut Morph {
        self.note_external_id(&id);
        let mut morph = template_for(kind).instantiate(id.clone(), kind);
        morph.parent = Some(self.root.clone());
        self.morphs.insert(id.clone(), morph);
        let root = self.root.clone();
        if let Some(root_morph) = self.morphs.get_mut(&root) {
            root_morph.children.push(id.clone());
        }
        self.morphs.get_mut(&id).unwrap()
    }

    /// Reparent `child` under `parent`, maintaining both links and draw
    /// order. Structural only; emits nothing.
    pub fn add_submorph(&mut self, parent: &str, child: &str) -> Result<()> {
        if !self.morphs.contains_key(parent) {
            warn!(parent, "add_submorph: no parent");
            debug_assert!(false, "add_submorph: no parent {parent}");
            return Err(TelosError::MorphNotFound(parent.to_string()));
        }
        if !self.morphs.contains_key(child) {
            warn!(child, "add_submorph: no child");
            debug_assert!(false, "add_submorph: no child {child}");
            return Err(TelosError::MorphNotFound(child.to_string()));
        }
        self.detach(child);
        self.morphs.get_mut(child).unwrap().parent = Some(parent.to_string());
        self.morphs
            .get_mut(parent)
            .unwrap()
            .children
            .push(child.to_string());
        Ok(())
    }

    /// Remove `child` (and its subtree) from `parent` and from the index.
    /// Structural only; emits nothing.
    pub fn remove_submorph(&mut self, parent: &str, child: &str) -> Result<()> {
        let actual = self.morphs.get(child).and_then(|m| m.parent.clone());
        if actual.as_deref() != Some(parent) {
            return Err(TelosError::MorphNotFound(child.to_string()));
        }
        self.detach(child);
        self.remove_subtree(child);
        Ok(())
    }

    fn detach(&mut self, child: &str) {
        if let Some(parent_id) = self.morphs.get(child).and_then(|m| m.parent.clone()) {
            if let Some(parent) = self.morphs.get_mut(&parent_id) {
                parent.children.retain(|c| c != child);
            }
        }
        if let Some(morph) = self.morphs.get_mut(child) {
            morph.parent = None;
        }
    }

    fn remove_subtree(&mut self, id: &str) {
        let children = self
            .morphs
            .get(id)
            .map(|m| m.children.clone())
            .unwrap_or_default();
        for child in children {
            self.remove_subtree(&child);
        }
        self.morphs.remove(id);
    }

    /// Raise a morph above its siblings: z becomes `max(sibling z) + 1`
    /// and the morph moves to the end of its parent's children list.
    /// Returns the new z-index.
    pub fn bring_to_front(&mut self, id: &str) -> Result<i32> {
        let parent_id = self
            .morphs
            .get(id)
            .and_then(|m| m.parent.clone())
            .ok_or_else(|| TelosError::MorphNotFound(id.to_string()))?;
        let siblings = self.children_of(&parent_id).to_vec();
        let max_z = siblings
            .iter()
            .filter_map(|s| self.morphs.get(s))
            .map(|m| m.z_index)
            .max()
            .unwrap_or(0);
        let new_z = max_z + 1;
        if let Some(parent) = self.morphs.get_mut(&parent_id) {
            parent.children.retain(|c| c != id);
            parent.children.push(id.to_string());
        }
        if let Some(morph) = self.morphs.get_mut(id) {
            morph.z_index = new_z;
        }
        Ok(new_z)
    }

    // -----------------------------------------------------------------------
    // Hit testing
    // -----------------------------------------------------------------------

    /// Depth-first pre-order traversal collecting every morph whose
    /// rectangle contains the point. The last entry is the topmost
    /// visible morph. The root never participates.
    pub fn hit_test(&self, x: f64, y: f64) -> Vec<MorphId> {
        let mut hits = Vec::new();
        self.hit_test_into(&self.root, x, y, &mut hits);
        hits
    }

    fn hit_test_into(&self, id: &str, x: f64, y: f64, hits: &mut Vec<MorphId>) {
        let Some(morph) = self.morphs.get(id) else {
            return;
        };
        if morph.id != self.root && morph.contains(x, y) {
            hits.push(morph.id.clone());
        }
        for child in &morph.children {
            self.hit_test_into(child, x, y, hits);
        }
    }

    // -----------------------------------------------------------------------
    // Replay surface
    // -----------------------------------------------------------------------

    /// Apply one `SET` line. The `type` slot creates the morph from its
    /// kind template when absent; every other slot requires the morph to
    /// exist already. Unknown slots and malformed values are skipped.
    pub fn apply_set(&mut self, target: &str, slot: &str, value: &str) -> SetOutcome {
        if slot == "type" {
            if !self.morphs.contains_key(target) {
                let morph = self.insert_with_id(target.to_string(), value);
                // Identity came from the log; do not re-emit it later
                morph.persisted_identity = true;
                debug!(id = target, kind = value, "morph created from wal");
            }
            return SetOutcome::Applied;
        }

        if !self.morphs.contains_key(target) {
            warn!(target, slot, "set for unknown morph skipped");
            return SetOutcome::MissingMorph;
        }

        match slot {
            "position" => match parse_pair(value, ',') {
                Some((x, y)) => {
                    let morph = self.morphs.get_mut(target).unwrap();
                    morph.x = x;
                    morph.y = y;
                    SetOutcome::Applied
                }
                None => SetOutcome::Malformed,
            },
            "size" => match parse_pair(value, 'x') {
                Some((w, h)) => {
                    let morph = self.morphs.get_mut(target).unwrap();
                    morph.width = w;
                    morph.height = h;
                    SetOutcome::Applied
                }
                None => SetOutcome::Malformed,
            },
            "color" => match parse_color(value) {
                Some(color) => {
                    self.morphs.get_mut(target).unwrap().color = color;
                    SetOutcome::Applied
                }
                None => SetOutcome::Malformed,
            },
            "zIndex" => match value.trim().parse::<i32>() {
                Ok(z) => {
                    self.morphs.get_mut(target).unwrap().z_index = z;
                    SetOutcome::Applied
                }
                Err(_) => SetOutcome::Malformed,
            },
            "text" => {
                self.morphs.get_mut(target).unwrap().text = Some(value.to_string());
                SetOutcome::Applied
            }
            _ => SetOutcome::UnknownSlot,
        }
    }

    /// Check the arena invariants: every morph reachable from the root is
    /// indexed under its own id, appears in exactly one children list, and
    /// nothing unreachable lingers in the index.
    pub fn verify_integrity(&self) -> Result<()> {
        let mut seen: HashMap<&str, usize> = HashMap::new();
        let mut stack = vec![self.root.as_str()];
        while let Some(id) = stack.pop() {
            let morph = self
                .morphs
                .get(id)
                .ok_or_else(|| TelosError::MorphNotFound(id.to_string()))?;
            if morph.id != id {
                return Err(TelosError::other(format!("index key {id} holds morph {}", morph.id)));
            }
            for child in &morph.children {
                *seen.entry(child.as_str()).or_insert(0) += 1;
                stack.push(child);
            }
        }
        for (id, count) in &seen {
            if *count != 1 {
                return Err(TelosError::other(format!(
                    "morph {id} appears in {count} children lists"
                )));
            }
        }
        // seen + root must cover the whole index
        if seen.len() + 1 != self.morphs.len() {
            return Err(TelosError::other(format!(
                "index holds {} morphs but {} are reachable",
                self.morphs.len(),
                seen.len() + 1
            )));
        }
        Ok(())
    }
}

/// Parse `(a<sep>b)` into two floats
fn parse_pair(value: &str, sep: char) -> Option<(f64, f64)> {
    let inner = value.trim().strip_prefix('(')?.strip_suffix(')')?;
    let (a, b) = inner.split_once(sep)?;
    Some((a.trim().parse().ok()?, b.trim().parse().ok()?))
}

/// Parse `[r,g,b]` or `[r,g,b,a]`; omitted alpha defaults to 1.0
fn parse_color(value: &str) -> Option<[f64; 4]> {
    let inner = value.trim().strip_prefix('[')?.strip_suffix(']')?;
    let parts: Vec<f64> = inner
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<std::result::Result<_, _>>()
        .ok()?;
    match parts.as_slice() {
        [r, g, b] => Some([*r, *g, *b, 1.0]),
        [r, g, b, a] => Some([*r, *g, *b, *a]),
        _ => None,
    }
}

/// Render a color the way setters write it: always four channels
pub(crate) fn format_color(color: [f64; 4]) -> String {
    format!("[{},{},{},{}]", color[0], color[1], color[2], color[3])
}

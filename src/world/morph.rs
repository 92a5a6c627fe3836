//! Morph records and the kind template registry
//!
//! A morph is the unit of the world tree: a rectangle with color, z-order,
//! optional text, and containment links. Kinds resolve through a template
//! registry; cloning a template is the prototypal "clone the prototype"
//! step, and unknown kinds fall back to the base `Morph` template.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// Stable morph identifier. Fresh ids are `m<N>`; the world root is
/// `"root"`.
pub type MorphId = String;

/// Kind name of the world root
pub const WORLD_KIND: &str = "World";

/// Kind name of the base template every unknown kind falls back to
pub const BASE_KIND: &str = "Morph";

/// A node of the world tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Morph {
    /// Globally unique id, assigned at creation and immutable
    pub id: MorphId,

    /// Kind name; immutable after creation
    pub kind: String,

    /// Position
    pub x: f64,
    pub y: f64,

    /// Extent
    pub width: f64,
    pub height: f64,

    /// RGBA, each channel in [0, 1]
    pub color: [f64; 4],

    /// Draw order among siblings; higher is in front
    pub z_index: i32,

    /// Text content, where the kind carries any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Child morphs in draw order
    pub children: Vec<MorphId>,

    /// Inverse of the containment link
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<MorphId>,

    /// Whether the identity (`type`) line has been written to the WAL.
    /// Identity is emitted lazily, just before the first persisted slot.
    #[serde(skip)]
    pub persisted_identity: bool,

    /// Transient drag state; never persisted
    #[serde(skip)]
    pub dragging: bool,
    #[serde(skip)]
    pub drag_dx: f64,
    #[serde(skip)]
    pub drag_dy: f64,
}

impl Morph {
    /// Whether this morph's rectangle contains the point
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x && x <= self.x + self.width && y >= self.y && y <= self.y + self.height
    }
}

/// Default slots cloned into a freshly created morph of a kind
#[derive(Debug, Clone)]
pub struct MorphTemplate {
    pub kind: &'static str,
    pub width: f64,
    pub height: f64,
    pub color: [f64; 4],
    pub text: Option<&'static str>,
}

impl MorphTemplate {
    /// Clone this template into a concrete morph
    pub fn instantiate(&self, id: MorphId, kind: &str) -> Morph {
        Morph {
            id,
            kind: kind.to_string(),
            x: 0.0,
            y: 0.0,
            width: self.width,
            height: self.height,
            color: self.color,
            z_index: 0,
            text: self.text.map(|t| t.to_string()),
            children: Vec::new(),
            parent: None,
            persisted_identity: false,
            dragging: false,
            drag_dx: 0.0,
            drag_dy: 0.0,
        }
    }
}

/// Built-in kind registry
static TEMPLATES: Lazy<HashMap<&'static str, MorphTemplate>> = Lazy::new(|| {
    let mut map = HashMap::new();
    map.insert(
        BASE_KIND,
        MorphTemplate {
            kind: BASE_KIND,
            width: 50.0,
            height: 40.0,
            color: [0.8, 0.8, 0.8, 1.0],
            text: None,
        },
    );
    map.insert(
        "RectangleMorph",
        MorphTemplate {
            kind: "RectangleMorph",
            width: 80.0,
            height: 60.0,
            color: [0.2, 0.4, 0.8, 1.0],
            text: None,
        },
    );
    map.insert(
        "TextMorph",
        MorphTemplate {
            kind: "TextMorph",
            width: 120.0,
            height: 20.0,
            color: [0.1, 0.1, 0.1, 1.0],
            text: Some(""),
        },
    );
    map.insert(
        "ButtonMorph",
        MorphTemplate {
            kind: "ButtonMorph",
            width: 90.0,
            height: 30.0,
            color: [0.3, 0.7, 0.3, 1.0],
            text: Some("Button"),
        },
    );
    map
});

/// Resolve a kind to its template, falling back to the base `Morph`
/// template for kinds with no registration.
pub fn template_for(kind: &str) -> &'static MorphTemplate {
    TEMPLATES.get(kind).unwrap_or_else(|| {
        warn!(kind, "no template for kind, using base Morph");
        &TEMPLATES[BASE_KIND]
    })
}

/// Kind names with registered templates, for nearest-kind inference
pub fn known_kinds() -> Vec<&'static str> {
    let mut kinds: Vec<&'static str> = TEMPLATES.keys().copied().collect();
    kinds.sort_unstable();
    kinds
}

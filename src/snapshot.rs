//! Snapshots and exports
//!
//! Renders the world as an indented textual tree or a JSON document, and
//! dumps committed WAL frames for external tooling. Snapshot files land
//! in the `logs/` tree under timestamped names unless a path is given;
//! every write is also noted on the UI snapshot JSONL stream.

use crate::core::TelosCore;
use crate::error::Result;
use crate::wal;
use crate::world::{Morph, World};
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};

/// Render the world as an indented textual tree, pre-order, children in
/// draw order.
pub fn render_text(world: &World) -> String {
    let mut out = String::new();
    render_into(world, world.root_id(), 0, &mut out);
    out
}

fn render_into(world: &World, id: &str, depth: usize, out: &mut String) {
    let Some(morph) = world.get(id) else {
        return;
    };
    out.push_str(&"  ".repeat(depth));
    out.push_str(&describe(morph));
    out.push('\n');
    for child in &morph.children {
        render_into(world, child, depth + 1, out);
    }
}

fn describe(morph: &Morph) -> String {
    let mut line = format!(
        "{} {} @({},{}) {}x{} z{}",
        morph.kind, morph.id, morph.x, morph.y, morph.width, morph.height, morph.z_index
    );
    if let Some(text) = &morph.text {
        if !text.is_empty() {
            line.push_str(&format!(" {:?}", text));
        }
    }
    line
}

/// The world as a nested JSON document
pub fn world_document(world: &World) -> Value {
    json!({
        "generatedAt": crate::now_unix(),
        "morphCount": world.len(),
        "world": morph_node(world, world.root_id()),
    })
}

fn morph_node(world: &World, id: &str) -> Value {
    let Some(morph) = world.get(id) else {
        return Value::Null;
    };
    json!({
        "id": morph.id,
        "kind": morph.kind,
        "position": [morph.x, morph.y],
        "size": [morph.width, morph.height],
        "color": morph.color,
        "zIndex": morph.z_index,
        "text": morph.text,
        "children": morph
            .children
            .iter()
            .map(|c| morph_node(world, c))
            .collect::<Vec<_>>(),
    })
}

/// Flat creation-ready specs for every non-root morph, sorted by id
pub fn morph_specs(world: &World) -> Value {
    let mut ids: Vec<&String> = world
        .morph_ids()
        .filter(|id| id.as_str() != world.root_id().as_str())
        .collect();
    ids.sort();
    Value::Array(
        ids.into_iter()
            .filter_map(|id| world.get(id))
            .map(|m| {
                json!({
                    "id": m.id,
                    "kind": m.kind,
                    "x": m.x,
                    "y": m.y,
                    "width": m.width,
                    "height": m.height,
                    "color": m.color,
                    "zIndex": m.z_index,
                    "text": m.text,
                })
            })
            .collect(),
    )
}

/// Write the textual snapshot; defaults to a timestamped file in `logs/`
pub fn write_text_snapshot(core: &TelosCore, path: Option<&Path>) -> Result<PathBuf> {
    let path = resolve(core, path, "snapshot", "txt");
    write_file(&path, render_text(&core.world))?;
    core.record_ui_snapshot(&json!({
        "kind": "text",
        "path": path.display().to_string(),
        "morphCount": core.world.len(),
    }));
    Ok(path)
}

/// Write the JSON snapshot; defaults to a timestamped file in `logs/`
pub fn write_json_snapshot(core: &TelosCore, path: Option<&Path>) -> Result<PathBuf> {
    let path = resolve(core, path, "snapshot", "json");
    let doc = world_document(&core.world);
    write_file(&path, serde_json::to_string_pretty(&doc)?)?;
    core.record_ui_snapshot(&json!({
        "kind": "json",
        "path": path.display().to_string(),
        "morphCount": core.world.len(),
    }));
    Ok(path)
}

/// Export flat morph specs; defaults to a timestamped file in `logs/`
pub fn write_morph_export(core: &TelosCore, path: Option<&Path>) -> Result<PathBuf> {
    let path = resolve(core, path, "morphs", "json");
    write_file(&path, serde_json::to_string_pretty(&morph_specs(&core.world))?)?;
    Ok(path)
}

/// Dump the committed frames of a WAL file as JSON, with aggregate
/// statistics alongside
pub fn write_wal_export(wal_path: &Path, out_path: &Path) -> Result<usize> {
    let frames = wal::list_complete_frames(wal_path)?;
    let stats = wal::scan_stats(wal_path)?;
    let doc = json!({
        "wal": wal_path.display().to_string(),
        "stats": stats,
        "frames": frames,
    });
    write_file(out_path, serde_json::to_string_pretty(&doc)?)?;
    Ok(frames.len())
}

fn resolve(core: &TelosCore, path: Option<&Path>, stem: &str, ext: &str) -> PathBuf {
    match path {
        Some(path) => path.to_path_buf(),
        None => {
            let stamp = chrono::Utc::now().format("%Y%m%d-%H%M%S");
            core.config.logs_dir.join(format!("{}-{}.{}", stem, stamp, ext))
        }
    }
}

fn write_file(path: &Path, content: String) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DIM: usize = 64;

    #[test]
    fn test_render_text_indents_children() {
        let temp = TempDir::new().unwrap();
        let mut core = TelosCore::rooted(temp.path(), DIM);
        let a = core.create_morph("RectangleMorph");
        let b = core.create_morph("TextMorph");
        core.world.add_submorph(&a, &b).unwrap();

        let text = render_text(&core.world);
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("World root"));
        assert!(lines[1].starts_with("  RectangleMorph"));
        assert!(lines[2].starts_with("    TextMorph"));
    }

    #[test]
    fn test_world_document_nests_children() {
        let temp = TempDir::new().unwrap();
        let mut core = TelosCore::rooted(temp.path(), DIM);
        core.create_morph("RectangleMorph");
        let doc = world_document(&core.world);
        assert_eq!(doc["world"]["kind"], "World");
        assert_eq!(doc["world"]["children"][0]["kind"], "RectangleMorph");
    }

    #[test]
    fn test_morph_specs_exclude_root() {
        let temp = TempDir::new().unwrap();
        let mut core = TelosCore::rooted(temp.path(), DIM);
        core.create_morph("RectangleMorph");
        let specs = morph_specs(&core.world);
        assert_eq!(specs.as_array().unwrap().len(), 1);
        assert_eq!(specs[0]["kind"], "RectangleMorph");
    }

    #[test]
    fn test_snapshots_write_and_log() {
        let temp = TempDir::new().unwrap();
        let mut core = TelosCore::rooted(temp.path(), DIM);
        core.create_morph("RectangleMorph");

        let text_path = write_text_snapshot(&core, None).unwrap();
        let json_path = write_json_snapshot(&core, None).unwrap();
        assert!(text_path.exists());
        assert!(json_path.exists());

        let stream = fs::read_to_string(core.ui_stream().path()).unwrap();
        assert_eq!(stream.lines().count(), 2);
    }

    #[test]
    fn test_wal_export_counts_frames() {
        let temp = TempDir::new().unwrap();
        let wal_path = temp.path().join("telos.wal");
        fs::write(&wal_path, "BEGIN a {}\nSET m1.type TO Morph\nEND a\n").unwrap();
        let out = temp.path().join("frames.json");
        assert_eq!(write_wal_export(&wal_path, &out).unwrap(), 1);
        let content = fs::read_to_string(&out).unwrap();
        assert!(content.contains("\"set_count\": 1"));
    }
}

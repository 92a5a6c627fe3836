//! Textual command dispatch
//!
//! The command surface external collaborators (CLI, chat console,
//! scripts) talk to. Commands return a short textual result: `ok`, an
//! id, a count, or a `[`-prefixed failure such as `[no-morph]` or
//! `[no-such-command]heartbeatX`. The core never crashes on user input;
//! bad arguments come back as failure strings.

use crate::core::TelosCore;
use crate::snapshot;
use crate::wal::{self, ReplayOutcome, Wal};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Dispatch one command line against the core and return its textual
/// result.
pub fn dispatch(core: &mut TelosCore, line: &str) -> String {
    let mut parts = line.split_whitespace();
    let Some(name) = parts.next() else {
        return "[no-such-command]".to_string();
    };
    let args: Vec<&str> = parts.collect();
    debug!(command = name, argc = args.len(), "dispatch");

    match name {
        "snapshot" => path_result(snapshot::write_text_snapshot(core, opt_path(&args, 0).as_deref())),
        "snapshot.json" => {
            path_result(snapshot::write_json_snapshot(core, opt_path(&args, 0).as_deref()))
        }
        "export.json" => {
            path_result(snapshot::write_morph_export(core, opt_path(&args, 0).as_deref()))
        }
        "replay" => cmd_replay(core, &args),
        "rotateWal" => cmd_rotate(core, &args),
        "wal.export.json" => cmd_wal_export(core, &args),
        "heartbeat" => {
            let n = args.first().and_then(|a| a.parse().ok()).unwrap_or(1);
            core.heartbeat(n).to_string()
        }
        "newRect" => cmd_new_rect(core, &args),
        "newText" => cmd_new_text(core, &args),
        "move" => cmd_move(core, &args),
        "resize" => cmd_resize(core, &args),
        "color" => cmd_color(core, &args),
        "front" => match args.first() {
            Some(id) => match core.bring_to_front(id) {
                Ok(_) => "ok".to_string(),
                Err(_) => "[no-morph]".to_string(),
            },
            None => "[bad-args]".to_string(),
        },
        "rag.grow" => cmd_rag_grow(core, &args),
        "ui.plan.apply" => cmd_ui_plan(core, &args),
        "run.exit" => core.run_exit(args.first().copied().unwrap_or("requested")),
        other => format!("[no-such-command]{}", other),
    }
}

fn opt_path(args: &[&str], index: usize) -> Option<PathBuf> {
    args.get(index).map(PathBuf::from)
}

fn path_result(result: crate::error::Result<PathBuf>) -> String {
    match result {
        Ok(path) => path.display().to_string(),
        Err(_) => "[io-error]".to_string(),
    }
}

fn cmd_replay(core: &mut TelosCore, args: &[&str]) -> String {
    let outcome = match args.first() {
        Some(path) => {
            // Replay an explicit file (e.g. a rotated backup) into this world
            let other = Wal::new(Path::new(path));
            wal::replay::replay(&other, &mut core.world)
        }
        None => core.replay(),
    };
    match outcome {
        ReplayOutcome::NoWal => "[no-wal]".to_string(),
        ReplayOutcome::Applied(stats) => {
            format!("replayed {} frames, {} sets", stats.frames, stats.sets_applied)
        }
    }
}

fn cmd_rotate(core: &mut TelosCore, args: &[&str]) -> String {
    let max_bytes = args
        .get(1)
        .and_then(|a| a.parse().ok())
        .unwrap_or(core.config.wal_max_bytes);
    let result = match args.first() {
        Some(path) => Wal::new(Path::new(path)).rotate(max_bytes),
        None => core.rotate_wal(max_bytes),
    };
    match result {
        Ok(true) => "rotated".to_string(),
        Ok(false) => "ok".to_string(),
        Err(_) => "[io-error]".to_string(),
    }
}

fn cmd_wal_export(core: &mut TelosCore, args: &[&str]) -> String {
    let out = opt_path(args, 0)
        .unwrap_or_else(|| core.config.logs_dir.join("wal_frames.json"));
    let wal_path = opt_path(args, 1).unwrap_or_else(|| core.config.wal_path.clone());
    match snapshot::write_wal_export(&wal_path, &out) {
        Ok(count) => format!("{} frames", count),
        Err(_) => "[io-error]".to_string(),
    }
}

fn cmd_new_rect(core: &mut TelosCore, args: &[&str]) -> String {
    let nums: Vec<f64> = args.iter().filter_map(|a| a.parse().ok()).collect();
    if nums.len() < 4 {
        return "[bad-args]".to_string();
    }
    let id = core.create_morph("RectangleMorph");
    let _ = core.move_to(&id, nums[0], nums[1]);
    let _ = core.resize_to(&id, nums[2], nums[3]);
    if nums.len() >= 7 {
        let a = nums.get(7).copied().unwrap_or(1.0);
        let _ = core.set_color(&id, nums[4], nums[5], nums[6], a);
    }
    id
}

fn cmd_new_text(core: &mut TelosCore, args: &[&str]) -> String {
    let (Some(x), Some(y)) = (
        args.first().and_then(|a| a.parse::<f64>().ok()),
        args.get(1).and_then(|a| a.parse::<f64>().ok()),
    ) else {
        return "[bad-args]".to_string();
    };
    let text = args[2..].join(" ");
    let id = core.create_morph("TextMorph");
    let _ = core.move_to(&id, x, y);
    let _ = core.set_text(&id, &text);
    id
}

fn cmd_move(core: &mut TelosCore, args: &[&str]) -> String {
    let (Some(id), Some(x), Some(y)) = (
        args.first(),
        args.get(1).and_then(|a| a.parse().ok()),
        args.get(2).and_then(|a| a.parse().ok()),
    ) else {
        return "[bad-args]".to_string();
    };
    match core.move_to(id, x, y) {
        Ok(()) => "ok".to_string(),
        Err(_) => "[no-morph]".to_string(),
    }
}

fn cmd_resize(core: &mut TelosCore, args: &[&str]) -> String {
    let (Some(id), Some(w), Some(h)) = (
        args.first(),
        args.get(1).and_then(|a| a.parse().ok()),
        args.get(2).and_then(|a| a.parse().ok()),
    ) else {
        return "[bad-args]".to_string();
    };
    match core.resize_to(id, w, h) {
        Ok(()) => "ok".to_string(),
        Err(_) => "[no-morph]".to_string(),
    }
}

fn cmd_color(core: &mut TelosCore, args: &[&str]) -> String {
    let id = match args.first() {
        Some(id) => *id,
        None => return "[bad-args]".to_string(),
    };
    let nums: Vec<f64> = args[1..].iter().filter_map(|a| a.parse().ok()).collect();
    if nums.len() < 3 {
        return "[bad-args]".to_string();
    }
    let a = nums.get(3).copied().unwrap_or(1.0);
    match core.set_color(id, nums[0], nums[1], nums[2], a) {
        Ok(()) => "ok".to_string(),
        Err(_) => "[no-morph]".to_string(),
    }
}

fn cmd_rag_grow(core: &mut TelosCore, args: &[&str]) -> String {
    let (Some(prompt), Some(persona)) = (args.first(), args.get(1)) else {
        return "[bad-args]".to_string();
    };
    let n = args.get(2).and_then(|a| a.parse().ok()).unwrap_or(1);
    core.rag_grow(prompt, persona, n).to_string()
}

fn cmd_ui_plan(core: &mut TelosCore, args: &[&str]) -> String {
    let Some(persona) = args.first() else {
        return "[bad-args]".to_string();
    };
    let goal = args[1..].join(" ");
    if goal.is_empty() {
        return "[bad-args]".to_string();
    }
    core.ui_plan_apply(persona, &goal)
}

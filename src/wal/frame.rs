//! WAL line grammar and frame grouping
//!
//! The log is UTF-8 text, one record per `\n`-terminated line:
//!
//! ```text
//! BEGIN <tag> <json-info>
//! SET <id>.<slot> TO <value>
//! MARK <tag> <json-info>
//! END <tag>
//! ```
//!
//! A frame is a maximal `BEGIN tag ... END tag` region. Replay applies
//! `SET` lines from committed frames only; everything else here is
//! structure recovery. Info blobs are emitted by the writer but treated as
//! opaque strings on the way back in.

use crate::error::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

static SET_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^SET\s+([^.\s]+)\.(\S+)\s+TO\s(.*)$").unwrap());
static TAGGED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(BEGIN|END|MARK)\s+([A-Za-z0-9._-]+)\s*(.*)$").unwrap());

/// One parsed WAL record
#[derive(Debug, Clone, PartialEq)]
pub enum WalLine {
    /// Frame open, info blob kept opaque
    Begin { tag: String, info: String },
    /// Frame close
    End { tag: String },
    /// Idempotent single-slot assignment
    Set {
        target: String,
        slot: String,
        value: String,
    },
    /// Standalone informational marker; never carries state
    Mark { tag: String, info: String },
    /// Anything else, preserved for forward compatibility
    Other(String),
}

/// Parse a single line of WAL text
pub fn parse_line(line: &str) -> WalLine {
    if let Some(caps) = SET_RE.captures(line) {
        return WalLine::Set {
            target: caps[1].to_string(),
            slot: caps[2].to_string(),
            value: caps[3].to_string(),
        };
    }
    if let Some(caps) = TAGGED_RE.captures(line) {
        let tag = caps[2].to_string();
        let info = caps[3].to_string();
        return match &caps[1] {
            "BEGIN" => WalLine::Begin { tag, info },
            "END" => WalLine::End { tag },
            _ => WalLine::Mark { tag, info },
        };
    }
    WalLine::Other(line.to_string())
}

/// A `SET` line with its position in the file, so frame application can
/// preserve file order even across nested frames
#[derive(Debug, Clone, PartialEq)]
pub struct SetLine {
    /// 0-based line number in the file
    pub line_no: usize,
    pub target: String,
    pub slot: String,
    pub value: String,
}

/// A committed `BEGIN ... END` region
#[derive(Debug, Clone)]
pub struct Frame {
    /// Frame tag
    pub tag: String,
    /// Opaque info blob from the `BEGIN` line
    pub info: String,
    /// Line number of the `BEGIN`
    pub begin_line: usize,
    /// `SET` lines directly inside this frame
    pub sets: Vec<SetLine>,
}

/// Summary of a committed frame, as produced by [`list_complete_frames`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameSummary {
    /// Frame tag
    pub tag: String,
    /// Number of `SET` lines the frame carries
    pub set_count: usize,
}

/// Result of scanning a WAL file into frames
#[derive(Debug, Default)]
pub struct ScanResult {
    /// Committed frames, in completion order
    pub frames: Vec<Frame>,
    /// `SET` lines outside any frame (legacy logs)
    pub loose_sets: Vec<SetLine>,
    /// Whether any `BEGIN` was seen at all; when false the file predates
    /// framing and loose sets are authoritative
    pub saw_begin: bool,
}

impl ScanResult {
    /// The `SET` lines replay should apply, in file order.
    ///
    /// Committed frames win when any exist; a file with frames but none
    /// committed yields nothing; a file that never saw `BEGIN` falls back
    /// to every loose `SET`.
    pub fn replayable_sets(&self) -> Vec<&SetLine> {
        let mut sets: Vec<&SetLine> = if !self.frames.is_empty() {
            self.frames.iter().flat_map(|f| f.sets.iter()).collect()
        } else if !self.saw_begin {
            self.loose_sets.iter().collect()
        } else {
            Vec::new()
        };
        sets.sort_by_key(|s| s.line_no);
        sets
    }
}

/// Group the lines of a WAL file into committed frames.
///
/// Open frames form a stack: `BEGIN` pushes, an `END` matching an open tag
/// commits that frame and discards anything still open above it, an `END`
/// matching nothing is ignored, and frames left open at end-of-file are
/// discarded. A torn trailing line (no final `\n`) is discarded before
/// scanning.
pub fn scan_text(content: &str) -> ScanResult {
    let mut lines: Vec<&str> = content.split('\n').collect();
    // split always yields a final element; with a trailing \n it is empty,
    // without one it is a torn partial write
    lines.pop();

    let mut result = ScanResult::default();
    let mut open: Vec<Frame> = Vec::new();

    for (line_no, raw) in lines.iter().enumerate() {
        match parse_line(raw) {
            WalLine::Begin { tag, info } => {
                result.saw_begin = true;
                open.push(Frame {
                    tag,
                    info,
                    begin_line: line_no,
                    sets: Vec::new(),
                });
            }
            WalLine::End { tag } => {
                if let Some(pos) = open.iter().rposition(|f| f.tag == tag) {
                    // Unclosed frames stacked above the match are discarded
                    open.truncate(pos + 1);
                    result.frames.push(open.pop().unwrap());
                }
            }
            WalLine::Set {
                target,
                slot,
                value,
            } => {
                let set = SetLine {
                    line_no,
                    target,
                    slot,
                    value,
                };
                match open.last_mut() {
                    Some(frame) => frame.sets.push(set),
                    None => result.loose_sets.push(set),
                }
            }
            WalLine::Mark { .. } | WalLine::Other(_) => {}
        }
    }

    result
}

/// Aggregate statistics about a WAL file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WalStats {
    /// Total complete lines (a torn tail is excluded)
    pub lines: usize,
    /// Committed frames
    pub frames: usize,
    /// `SET` lines inside committed frames
    pub committed_sets: usize,
    /// `SET` lines outside any frame
    pub loose_sets: usize,
    /// `MARK` lines
    pub marks: usize,
    /// Whether the file ends in a torn partial line
    pub torn_tail: bool,
}

/// Scan a WAL file into aggregate statistics. A missing file reads as
/// empty.
pub fn scan_stats(path: &Path) -> Result<WalStats> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(WalStats::default()),
        Err(e) => return Err(e.into()),
    };
    let torn_tail = !content.is_empty() && !content.ends_with('\n');
    let mut lines: Vec<&str> = content.split('\n').collect();
    lines.pop();
    let marks = lines
        .iter()
        .filter(|l| matches!(parse_line(l), WalLine::Mark { .. }))
        .count();

    let scan = scan_text(&content);
    Ok(WalStats {
        lines: lines.len(),
        frames: scan.frames.len(),
        committed_sets: scan.frames.iter().map(|f| f.sets.len()).sum(),
        loose_sets: scan.loose_sets.len(),
        marks,
        torn_tail,
    })
}

/// Scan a WAL file and summarize its committed frames.
///
/// Partial frames never appear; a missing file yields an empty list.
pub fn list_complete_frames(path: &Path) -> Result<Vec<FrameSummary>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    Ok(scan_text(&content)
        .frames
        .iter()
        .map(|f| FrameSummary {
            tag: f.tag.clone(),
            set_count: f.sets.len(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_set_line() {
        let line = parse_line("SET m42.position TO (120,40)");
        assert_eq!(
            line,
            WalLine::Set {
                target: "m42".into(),
                slot: "position".into(),
                value: "(120,40)".into(),
            }
        );
    }

    #[test]
    fn test_parse_set_text_keeps_rest_of_line() {
        let line = parse_line("SET m1.text TO hello framed world");
        assert_eq!(
            line,
            WalLine::Set {
                target: "m1".into(),
                slot: "text".into(),
                value: "hello framed world".into(),
            }
        );
    }

    #[test]
    fn test_parse_begin_end_mark() {
        assert_eq!(
            parse_line(r#"BEGIN ui.plan {"persona":"ROBIN","t":1.5}"#),
            WalLine::Begin {
                tag: "ui.plan".into(),
                info: r#"{"persona":"ROBIN","t":1.5}"#.into(),
            }
        );
        assert_eq!(parse_line("END ui.plan"), WalLine::End { tag: "ui.plan".into() });
        assert!(matches!(parse_line("MARK memory.load {}"), WalLine::Mark { .. }));
        assert!(matches!(parse_line("garbage line"), WalLine::Other(_)));
    }

    #[test]
    fn test_scan_commits_matched_frames() {
        let text = "BEGIN a {}\nSET m1.position TO (1,2)\nEND a\n";
        let result = scan_text(text);
        assert_eq!(result.frames.len(), 1);
        assert_eq!(result.frames[0].tag, "a");
        assert_eq!(result.frames[0].sets.len(), 1);
    }

    #[test]
    fn test_scan_discards_unclosed_frame() {
        let text = "BEGIN a {}\nSET m1.position TO (1,2)\n";
        let result = scan_text(text);
        assert!(result.frames.is_empty());
        assert!(result.saw_begin);
        assert!(result.replayable_sets().is_empty());
    }

    #[test]
    fn test_scan_discards_torn_trailing_line() {
        let text = "BEGIN a {}\nSET m1.position TO (1,2)\nEND a\nSET m1.siz";
        let result = scan_text(text);
        assert_eq!(result.frames.len(), 1);
        assert!(result.loose_sets.is_empty());
    }

    #[test]
    fn test_scan_legacy_mode_without_frames() {
        let text = "SET m1.position TO (1,2)\nSET m1.size TO (3x4)\n";
        let result = scan_text(text);
        assert!(!result.saw_begin);
        assert_eq!(result.replayable_sets().len(), 2);
    }

    #[test]
    fn test_loose_sets_ignored_once_frames_exist() {
        let text = "SET m0.position TO (9,9)\nBEGIN a {}\nSET m1.position TO (1,2)\nEND a\n";
        let result = scan_text(text);
        let sets: Vec<_> = result.replayable_sets();
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].target, "m1");
    }

    #[test]
    fn test_nested_frames_apply_in_file_order() {
        let text = concat!(
            "BEGIN outer {}\n",
            "SET m1.position TO (1,1)\n",
            "BEGIN inner {}\n",
            "SET m2.position TO (2,2)\n",
            "END inner\n",
            "SET m3.position TO (3,3)\n",
            "END outer\n",
        );
        let result = scan_text(text);
        assert_eq!(result.frames.len(), 2);
        let targets: Vec<&str> = result
            .replayable_sets()
            .iter()
            .map(|s| s.target.as_str())
            .collect();
        assert_eq!(targets, vec!["m1", "m2", "m3"]);
    }

    #[test]
    fn test_mismatched_end_is_ignored() {
        let text = "BEGIN a {}\nSET m1.position TO (1,2)\nEND b\nEND a\n";
        let result = scan_text(text);
        assert_eq!(result.frames.len(), 1);
        assert_eq!(result.frames[0].tag, "a");
    }

    #[test]
    fn test_list_complete_frames_missing_file() {
        let frames = list_complete_frames(Path::new("/nonexistent/telos.wal")).unwrap();
        assert!(frames.is_empty());
    }

    #[test]
    fn test_scan_stats_counts_everything() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            concat!(
                "MARK memory.load {{}}\n",
                "SET m0.position TO (9,9)\n",
                "BEGIN a {{}}\n",
                "SET m1.type TO Morph\n",
                "SET m1.position TO (1,2)\n",
                "END a\n",
                "SET m2.siz", // torn
            )
        )
        .unwrap();
        let stats = scan_stats(file.path()).unwrap();
        assert_eq!(stats.lines, 6);
        assert_eq!(stats.frames, 1);
        assert_eq!(stats.committed_sets, 2);
        assert_eq!(stats.loose_sets, 1);
        assert_eq!(stats.marks, 1);
        assert!(stats.torn_tail);
    }

    #[test]
    fn test_scan_stats_missing_file_is_empty() {
        let stats = scan_stats(Path::new("/nonexistent/telos.wal")).unwrap();
        assert_eq!(stats.lines, 0);
        assert!(!stats.torn_tail);
    }
}

//! Caret lines tracked across a sync, and how merges shift them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::line_diff::LineHunk;

/// `{file path -> 1-based line}` handed to a storage sync by mutable
/// reference; the merge step rewrites the lines of files it changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CursorMap(BTreeMap<SmolStr, u32>);

impl CursorMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<u32> {
        self.0.get(path).copied()
    }

    pub fn insert(&mut self, path: impl Into<SmolStr>, line: u32) -> Option<u32> {
        self.0.insert(path.into(), line.max(1))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SmolStr, u32)> {
        self.0.iter().map(|(path, line)| (path, *line))
    }

    /// Shift the tracked line of `path` through the hunks of a content change.
    /// Returns the new line, or `None` if `path` is not tracked.
    pub fn remap(&mut self, path: &str, hunks: &[LineHunk]) -> Option<u32> {
        let line = self.0.get_mut(path)?;
        *line = remap_line(hunks, *line);
        Some(*line)
    }
}

/// Map a 1-based line through `hunks` (ordered, from a diff of the old text
/// against the new one).
///
/// Hunks entirely above the line, including insertions directly before it,
/// shift it by their net size. Hunks below leave it alone. A hunk that
/// rewrites the line itself keeps the caret at the same offset into the
/// replacement, clamped to its last line.
pub fn remap_line(hunks: &[LineHunk], line: u32) -> u32 {
    let idx = line.saturating_sub(1) as usize;
    let mut shift: isize = 0;
    for hunk in hunks {
        if hunk.old.start > idx {
            break;
        }
        if hunk.old.end <= idx {
            shift += hunk.delta();
            continue;
        }
        let within = (idx - hunk.old.start).min(hunk.new.len().saturating_sub(1));
        return to_line(hunk.new.start + within);
    }
    to_line((idx as isize + shift).max(0) as usize)
}

fn to_line(idx: usize) -> u32 {
    u32::try_from(idx + 1).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line_diff::{LcsLineDiffer, LineDiffer};

    fn remap(old: &str, new: &str, line: u32) -> u32 {
        remap_line(&LcsLineDiffer.diff(old, new), line)
    }

    #[test]
    fn test_insert_above_shifts() {
        // Two lines inserted above line 3.
        assert_eq!(remap("a\nb\nc\nd", "x\ny\na\nb\nc\nd", 3), 5);
        // Directly before the caret line.
        assert_eq!(remap("a\nb\nc\nd", "a\nb\nx\nc\nd", 3), 4);
    }

    #[test]
    fn test_change_below_keeps_line() {
        assert_eq!(remap("a\nb\nc\nd", "a\nb\nc\nx\ny\nd", 2), 2);
        assert_eq!(remap("a\nb\nc\nd", "a\nb\nc", 2), 2);
    }

    #[test]
    fn test_delete_above_shifts_up() {
        assert_eq!(remap("a\nb\nc\nd\ne", "a\nd\ne", 5), 3);
    }

    #[test]
    fn test_rewritten_line_clamps() {
        // Lines 2-4 collapse into one; a caret on line 4 lands on it.
        assert_eq!(remap("a\nb\nc\nd\ne", "a\nX\ne", 4), 2);
        // Caret line deleted outright lands on the following line.
        assert_eq!(remap("a\nb\nc", "a\nc", 2), 2);
    }

    #[test]
    fn test_cursor_map_remap() {
        let mut cursors = CursorMap::new();
        cursors.insert("/doc.mdk", 3);
        let hunks = LcsLineDiffer.diff("a\nb\nc", "new\na\nb\nc");
        assert_eq!(cursors.remap("/doc.mdk", &hunks), Some(4));
        assert_eq!(cursors.get("/doc.mdk"), Some(4));
        assert_eq!(cursors.remap("/other.mdk", &hunks), None);
    }

    #[test]
    fn test_cursor_map_serde_transparent() {
        let mut cursors = CursorMap::new();
        cursors.insert("/a.mdk", 7);
        let json = serde_json::to_string(&cursors).unwrap();
        assert_eq!(json, r#"{"/a.mdk":7}"#);
    }
}

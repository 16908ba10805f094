//! Best-effort three-way line merge.
//!
//! Non-overlapping changes from both sides are applied. Overlapping changes
//! that are not identical become a conflict block holding the local lines
//! followed by the remote lines; nothing is ever rejected.

use std::ops::Range;

use smol_str::SmolStr;

use crate::line_diff::{LineDiffer, LineHunk, split_lines};
use crate::types::{MergeKind, MergeResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub text: String,
    /// 0-based line ranges of conflict blocks in `text`.
    pub conflicts: Vec<Range<usize>>,
}

impl MergeOutcome {
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Side {
    Local,
    Remote,
}

/// Merge `local` and `remote`, both derived from `base`.
pub fn merge3(differ: &dyn LineDiffer, base: &str, local: &str, remote: &str) -> MergeOutcome {
    if local == remote || remote == base {
        return MergeOutcome {
            text: local.to_string(),
            conflicts: Vec::new(),
        };
    }
    if local == base {
        return MergeOutcome {
            text: remote.to_string(),
            conflicts: Vec::new(),
        };
    }

    let base_lines = split_lines(base);
    let local_lines = split_lines(local);
    let remote_lines = split_lines(remote);

    let mut hunks: Vec<(Side, LineHunk)> = differ
        .diff(base, local)
        .into_iter()
        .map(|h| (Side::Local, h))
        .chain(differ.diff(base, remote).into_iter().map(|h| (Side::Remote, h)))
        .collect();
    // Insertions sort ahead of edits that start at the same base line.
    hunks.sort_by_key(|(_, h)| (h.old.start, h.old.end));

    let mut out: Vec<&str> = Vec::with_capacity(base_lines.len());
    let mut conflicts = Vec::new();
    let mut pos = 0;
    let mut i = 0;
    while i < hunks.len() {
        let start = hunks[i].1.old.start;
        let mut end = hunks[i].1.old.end;
        let mut j = i + 1;
        while j < hunks.len() && (hunks[j].1.old.start < end || hunks[j].1.old.start == start) {
            end = end.max(hunks[j].1.old.end);
            j += 1;
        }
        let cluster = &hunks[i..j];

        out.extend_from_slice(&base_lines[pos..start]);
        let local_side = apply_side(&base_lines, start, end, cluster, Side::Local, &local_lines);
        let remote_side = apply_side(&base_lines, start, end, cluster, Side::Remote, &remote_lines);

        let has_local = cluster.iter().any(|(side, _)| *side == Side::Local);
        let has_remote = cluster.iter().any(|(side, _)| *side == Side::Remote);
        if !has_remote || local_side == remote_side {
            out.extend(local_side);
        } else if !has_local {
            out.extend(remote_side);
        } else {
            let first = out.len();
            out.extend(local_side);
            out.extend(remote_side);
            conflicts.push(first..out.len());
        }

        pos = end;
        i = j;
    }
    out.extend_from_slice(&base_lines[pos..]);

    MergeOutcome {
        text: out.join("\n"),
        conflicts,
    }
}

/// Base lines `start..end` with one side's hunks from `cluster` applied.
fn apply_side<'a>(
    base: &[&'a str],
    start: usize,
    end: usize,
    cluster: &[(Side, LineHunk)],
    side: Side,
    side_lines: &[&'a str],
) -> Vec<&'a str> {
    let mut lines = Vec::new();
    let mut p = start;
    for (_, hunk) in cluster.iter().filter(|(s, _)| *s == side) {
        lines.extend_from_slice(&base[p..hunk.old.start]);
        lines.extend_from_slice(&side_lines[hunk.new.clone()]);
        p = hunk.old.end;
    }
    lines.extend_from_slice(&base[p..end]);
    lines
}

/// Describe how `after` differs from `before` as merge results for `path`.
///
/// Blocks touching a conflict range of `after` are reported as conflicts.
/// Deletions are anchored at the line following the removed block and carry
/// the removed text.
pub fn merge_results(
    differ: &dyn LineDiffer,
    path: &SmolStr,
    before: &str,
    after: &str,
    conflicts: &[Range<usize>],
) -> Vec<MergeResult> {
    let before_lines = split_lines(before);
    let after_lines = split_lines(after);
    differ
        .diff(before, after)
        .into_iter()
        .map(|hunk| {
            let in_conflict = conflicts
                .iter()
                .any(|c| hunk.new.start < c.end && c.start < hunk.new.end.max(hunk.new.start + 1));
            let kind = if in_conflict {
                MergeKind::Conflict
            } else if hunk.is_insertion() {
                MergeKind::Insertion
            } else if hunk.is_deletion() {
                MergeKind::Deletion
            } else {
                MergeKind::Modification
            };
            let content = if hunk.new.is_empty() {
                before_lines[hunk.old.clone()].join("\n")
            } else {
                after_lines[hunk.new.clone()].join("\n")
            };
            let start_line = hunk.new.start as u32 + 1;
            MergeResult {
                path: path.clone(),
                start_line,
                end_line: (hunk.new.end as u32).max(start_line),
                kind,
                content: Some(content),
            }
        })
        .collect()
}

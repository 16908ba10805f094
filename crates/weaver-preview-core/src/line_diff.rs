//! Line-based diffing used by storage merges and cursor remapping.
//!
//! Texts are split on `\n`, so joining the lines with `\n` gives back the
//! original text exactly. Hunks use 0-based, half-open line ranges.

use std::ops::Range;

/// One differing region: `old` lines were replaced by `new` lines.
///
/// An empty `old` range is a pure insertion before line `old.start`; an empty
/// `new` range is a pure deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineHunk {
    pub old: Range<usize>,
    pub new: Range<usize>,
}

impl LineHunk {
    /// Net change in line count.
    pub fn delta(&self) -> isize {
        self.new.len() as isize - self.old.len() as isize
    }

    pub fn is_insertion(&self) -> bool {
        self.old.is_empty() && !self.new.is_empty()
    }

    pub fn is_deletion(&self) -> bool {
        self.new.is_empty() && !self.old.is_empty()
    }
}

/// Computes line hunks between two texts.
pub trait LineDiffer: Send + Sync {
    /// Hunks ordered by `old.start`, non-overlapping.
    fn diff(&self, old: &str, new: &str) -> Vec<LineHunk>;
}

/// Longest-common-subsequence line differ.
///
/// Common leading and trailing lines are stripped before the quadratic table
/// is built, so typical edits only pay for the changed window.
#[derive(Debug, Clone, Copy, Default)]
pub struct LcsLineDiffer;

impl LineDiffer for LcsLineDiffer {
    fn diff(&self, old: &str, new: &str) -> Vec<LineHunk> {
        if old == new {
            return Vec::new();
        }
        diff_line_slices(&split_lines(old), &split_lines(new))
    }
}

pub(crate) fn split_lines(text: &str) -> Vec<&str> {
    text.split('\n').collect()
}

fn diff_line_slices(old: &[&str], new: &[&str]) -> Vec<LineHunk> {
    let head = old
        .iter()
        .zip(new.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let max_tail = old.len().min(new.len()) - head;
    let tail = old[head..]
        .iter()
        .rev()
        .zip(new[head..].iter().rev())
        .take(max_tail)
        .take_while(|(a, b)| a == b)
        .count();

    let old_mid = &old[head..old.len() - tail];
    let new_mid = &new[head..new.len() - tail];

    let matches = longest_common_subsequence(old_mid, new_mid);

    let mut hunks = Vec::new();
    let (mut oi, mut ni) = (0, 0);
    for (mo, mn) in matches.into_iter().chain(std::iter::once((old_mid.len(), new_mid.len()))) {
        if mo > oi || mn > ni {
            hunks.push(LineHunk {
                old: head + oi..head + mo,
                new: head + ni..head + mn,
            });
        }
        oi = mo + 1;
        ni = mn + 1;
    }
    hunks
}

/// Matched `(old, new)` index pairs in increasing order.
fn longest_common_subsequence(old: &[&str], new: &[&str]) -> Vec<(usize, usize)> {
    let n = old.len();
    let m = new.len();
    if n == 0 || m == 0 {
        return Vec::new();
    }

    // dp[i][j] = LCS length of old[i..] and new[j..]
    let mut dp = vec![vec![0u32; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            dp[i][j] = if old[i] == new[j] {
                dp[i + 1][j + 1] + 1
            } else {
                dp[i + 1][j].max(dp[i][j + 1])
            };
        }
    }

    let mut out = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if old[i] == new[j] {
            out.push((i, j));
            i += 1;
            j += 1;
        } else if dp[i + 1][j] >= dp[i][j + 1] {
            i += 1;
        } else {
            j += 1;
        }
    }
    out
}

//! Line-level change summary between two versions of stage content.

use serde::{Deserialize, Serialize};

/// Number of lines added and removed between two texts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    /// Lines present only in the new text.
    pub added: usize,
    /// Lines present only in the old text.
    pub removed: usize,
}

/// Summarizes the line changes from `old` to `new`.
///
/// Lines shared by both texts are those of their longest common
/// subsequence; every other line counts as added or removed.
#[must_use]
pub fn diff_summary(old: &str, new: &str) -> DiffSummary {
    let old_lines: Vec<&str> = old.lines().collect();
    let new_lines: Vec<&str> = new.lines().collect();
    let common = lcs_len(&old_lines, &new_lines);
    DiffSummary {
        added: new_lines.len() - common,
        removed: old_lines.len() - common,
    }
}

fn lcs_len(a: &[&str], b: &[&str]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for line in a {
        for (j, other) in b.iter().enumerate() {
            curr[j + 1] = if line == other {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

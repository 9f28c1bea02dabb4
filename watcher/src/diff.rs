//! Line-level diffing based on a longest-common-subsequence table.
//!
//! Both texts are split on `'\n'`. A trailing newline leaves an empty last
//! line, so `"a\n"` and `"a"` differ. An empty text has no lines at all.
//!
//! The backward walk over the table prefers recording an addition when the
//! cell to the left is at least as large as the cell above. Read forwards, a
//! substituted line therefore comes out as a removal followed by an addition.
//!
//! Cost is `O(m·n)` in time and memory, which is why callers cap file sizes
//! before diffing.

use crate::event::LineChange;

/// Compare two texts line by line.
///
/// Returns the changes that turn `old_text` into `new_text`, ordered from the
/// top of the file to the bottom. Identical texts produce no changes.
pub fn compare_lines(old_text: &str, new_text: &str) -> Vec<LineChange> {
    let old_lines = split_lines(old_text);
    let new_lines = split_lines(new_text);

    // The walk starts by matching equal trailing lines, so they can be
    // skipped before the table is built without changing the result.
    let suffix = old_lines
        .iter()
        .rev()
        .zip(new_lines.iter().rev())
        .take_while(|(a, b)| a == b)
        .count();
    let old_lines = &old_lines[..old_lines.len() - suffix];
    let new_lines = &new_lines[..new_lines.len() - suffix];

    let table = LcsTable::build(old_lines, new_lines);

    let mut changes = Vec::new();
    let (mut i, mut j) = (old_lines.len(), new_lines.len());
    while i > 0 || j > 0 {
        if i > 0 && j > 0 && old_lines[i - 1] == new_lines[j - 1] {
            i -= 1;
            j -= 1;
        } else if j > 0 && (i == 0 || table.get(i, j - 1) >= table.get(i - 1, j)) {
            changes.push(LineChange::added(j, new_lines[j - 1]));
            j -= 1;
        } else {
            changes.push(LineChange::removed(i, old_lines[i - 1]));
            i -= 1;
        }
    }

    changes.reverse();
    changes
}

fn split_lines(text: &str) -> Vec<&str> {
    if text.is_empty() {
        Vec::new()
    } else {
        text.split('\n').collect()
    }
}

/// Row-major `(m+1) x (n+1)` table of LCS lengths.
struct LcsTable {
    width: usize,
    cells: Vec<u32>,
}

impl LcsTable {
    fn build(old_lines: &[&str], new_lines: &[&str]) -> Self {
        let width = new_lines.len() + 1;
        let mut cells = vec![0u32; (old_lines.len() + 1) * width];

        for i in 1..=old_lines.len() {
            for j in 1..=new_lines.len() {
                cells[i * width + j] = if old_lines[i - 1] == new_lines[j - 1] {
                    cells[(i - 1) * width + (j - 1)] + 1
                } else {
                    cells[(i - 1) * width + j].max(cells[i * width + (j - 1)])
                };
            }
        }

        Self { width, cells }
    }

    fn get(&self, i: usize, j: usize) -> u32 {
        self.cells[i * self.width + j]
    }
}

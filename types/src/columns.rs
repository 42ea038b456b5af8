//! Column ownership for one worker.

use serde::{Deserialize, Serialize};

/// The global columns one worker owns, in ascending order.
///
/// Local slice index `i` on the worker holds global column `global_index(i)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ColumnSet {
    /// `start, start + 1, ..., start + count - 1`
    Range { start: usize, count: usize },
    /// `first, first + step, ..., first + (count - 1) * step`
    Stride {
        first: usize,
        step: usize,
        count: usize,
    },
}

impl ColumnSet {
    pub fn len(&self) -> usize {
        match *self {
            ColumnSet::Range { count, .. } | ColumnSet::Stride { count, .. } => count,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, column: usize) -> bool {
        self.local_index(column).is_some()
    }

    pub fn local_index(&self, column: usize) -> Option<usize> {
        match *self {
            ColumnSet::Range { start, count } => {
                (column >= start && column - start < count).then(|| column - start)
            }
            ColumnSet::Stride { first, step, count } => {
                if column < first || step == 0 {
                    return None;
                }
                let offset = column - first;
                (offset % step == 0 && offset / step < count).then(|| offset / step)
            }
        }
    }

    pub fn global_index(&self, local: usize) -> Option<usize> {
        if local >= self.len() {
            return None;
        }
        Some(match *self {
            ColumnSet::Range { start, .. } => start + local,
            ColumnSet::Stride { first, step, .. } => first + local * step,
        })
    }

    /// First local index whose global column is `>= column`; `len()` if none.
    pub fn first_local_at_or_after(&self, column: usize) -> usize {
        let local = match *self {
            ColumnSet::Range { start, .. } => column.saturating_sub(start),
            ColumnSet::Stride { first, step, .. } => {
                column.saturating_sub(first).div_ceil(step.max(1))
            }
        };
        local.min(self.len())
    }

    /// Largest global column in the set.
    pub fn last(&self) -> Option<usize> {
        self.len().checked_sub(1).and_then(|l| self.global_index(l))
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len()).filter_map(|local| self.global_index(local))
    }
}

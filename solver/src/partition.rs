//! Column ownership across the worker pool.

use gauss_types::ColumnSet;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionPolicy {
    /// Consecutive column ranges; the first `columns % nodes` nodes take one extra.
    #[default]
    Contiguous,
    /// Round-robin: node `i` owns every column `c` with `c % nodes == i`.
    Striped,
}

/// Disjoint column sets covering `0..columns`, one per participating node.
///
/// When there are more nodes than columns only the first `columns` nodes
/// participate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    sets: Vec<ColumnSet>,
}

impl Partition {
    pub fn new(policy: PartitionPolicy, columns: usize, nodes: usize) -> Self {
        let parts = nodes.min(columns);
        if parts == 0 {
            return Self { sets: Vec::new() };
        }

        let sets = match policy {
            PartitionPolicy::Contiguous => {
                let base = columns / parts;
                let extra = columns % parts;
                let mut start = 0;
                (0..parts)
                    .map(|i| {
                        let count = base + usize::from(i < extra);
                        let set = ColumnSet::Range { start, count };
                        start += count;
                        set
                    })
                    .collect()
            }
            PartitionPolicy::Striped => (0..parts)
                .map(|i| ColumnSet::Stride {
                    first: i,
                    step: parts,
                    count: (columns - i).div_ceil(parts),
                })
                .collect(),
        };
        Self { sets }
    }

    /// Column sets in node order.
    pub fn sets(&self) -> &[ColumnSet] {
        &self.sets
    }

    /// Index of the set that owns `column`.
    pub fn owner_of(&self, column: usize) -> Option<usize> {
        self.sets.iter().position(|s| s.contains(column))
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_exact(p: &Partition, columns: usize) {
        let mut seen = vec![0u32; columns];
        for set in p.sets() {
            assert!(!set.is_empty());
            for c in set.iter() {
                seen[c] += 1;
            }
        }
        assert!(seen.iter().all(|&n| n == 1), "{p:?}");
    }

    #[test]
    fn test_every_node_count_covers_all_columns() {
        for policy in [PartitionPolicy::Contiguous, PartitionPolicy::Striped] {
            for columns in 1..=12 {
                for nodes in 1..=columns + 2 {
                    let p = Partition::new(policy, columns, nodes);
                    assert_eq!(p.len(), nodes.min(columns));
                    assert_exact(&p, columns);
                    for c in 0..columns {
                        let owner = p.owner_of(c).unwrap();
                        assert!(p.sets()[owner].contains(c));
                    }
                }
            }
        }
    }

    #[test]
    fn test_contiguous_remainder_goes_first() {
        let p = Partition::new(PartitionPolicy::Contiguous, 7, 3);
        assert_eq!(
            p.sets(),
            &[
                ColumnSet::Range { start: 0, count: 3 },
                ColumnSet::Range { start: 3, count: 2 },
                ColumnSet::Range { start: 5, count: 2 },
            ]
        );
    }

    #[test]
    fn test_striped_layout() {
        let p = Partition::new(PartitionPolicy::Striped, 5, 2);
        assert_eq!(p.sets()[0].iter().collect::<Vec<_>>(), vec![0, 2, 4]);
        assert_eq!(p.sets()[1].iter().collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(p.owner_of(3), Some(1));
    }

    #[test]
    fn test_no_nodes() {
        let p = Partition::new(PartitionPolicy::Contiguous, 4, 0);
        assert!(p.is_empty());
        assert_eq!(p.owner_of(0), None);
    }
}

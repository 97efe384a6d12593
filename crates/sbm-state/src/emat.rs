//! Block-pair aggregate index.
//!
//! Stores, for every ordered (directed) or unordered (undirected) block pair,
//! the aggregate edge weight `mrs` together with the per-channel covariate
//! sums. Two physical layouts are provided: a dense `B x B` matrix for small
//! block counts and a hash index for sparse occupancy. Iteration order of the
//! hash layout is insertion order, which keeps full-entropy sums and checks
//! deterministic.

use indexmap::IndexMap;

/// Aggregates held for one block pair.
#[derive(Debug, Clone, PartialEq)]
pub struct PairRecord {
    /// Aggregate edge weight. On the undirected diagonal this holds twice
    /// the internal edge weight.
    pub mrs: i64,
    /// Per-channel covariate sums (never doubled on the diagonal).
    pub brec: Vec<f64>,
    /// Per-channel auxiliary sums (squares for the normal channel).
    pub bdrec: Vec<f64>,
}

impl PairRecord {
    fn zero(channels: usize) -> Self {
        PairRecord {
            mrs: 0,
            brec: vec![0.0; channels],
            bdrec: vec![0.0; channels],
        }
    }

    fn is_zero(&self) -> bool {
        self.mrs == 0
            && self.brec.iter().all(|&x| x == 0.0)
            && self.bdrec.iter().all(|&x| x == 0.0)
    }
}

/// Index from block pairs to their [`PairRecord`] aggregates.
#[derive(Debug, Clone)]
pub enum BlockEdgeIndex {
    /// Dense `B x B` (directed) or upper-triangular-normalized (undirected)
    /// matrix layout.
    Dense {
        /// Number of blocks per side.
        size: usize,
        /// Whether the keys are ordered pairs.
        directed: bool,
        /// Number of covariate channels per record.
        channels: usize,
        /// Row-major cells, `None` where no aggregate is held.
        cells: Vec<Option<PairRecord>>,
    },
    /// Hash layout keyed on normalized pairs.
    Hash {
        /// Whether the keys are ordered pairs.
        directed: bool,
        /// Number of covariate channels per record.
        channels: usize,
        /// Pair aggregates in insertion order.
        recs: IndexMap<(usize, usize), PairRecord>,
    },
}

impl BlockEdgeIndex {
    /// Creates a dense index over `size` blocks.
    pub fn new_dense(size: usize, directed: bool, channels: usize) -> Self {
        BlockEdgeIndex::Dense {
            size,
            directed,
            channels,
            cells: vec![None; size * size],
        }
    }

    /// Creates an empty hash index.
    pub fn new_hash(directed: bool, channels: usize) -> Self {
        BlockEdgeIndex::Hash {
            directed,
            channels,
            recs: IndexMap::new(),
        }
    }

    /// Normalizes an undirected pair to `(min, max)`.
    pub fn key(&self, r: usize, s: usize) -> (usize, usize) {
        let directed = match self {
            BlockEdgeIndex::Dense { directed, .. } => *directed,
            BlockEdgeIndex::Hash { directed, .. } => *directed,
        };
        if directed || r <= s {
            (r, s)
        } else {
            (s, r)
        }
    }

    /// Aggregate record for a pair, if present.
    pub fn get(&self, r: usize, s: usize) -> Option<&PairRecord> {
        let (r, s) = self.key(r, s);
        match self {
            BlockEdgeIndex::Dense { size, cells, .. } => {
                cells.get(r * size + s).and_then(|c| c.as_ref())
            }
            BlockEdgeIndex::Hash { recs, .. } => recs.get(&(r, s)),
        }
    }

    /// Aggregate edge weight for a pair, zero if absent.
    pub fn get_mrs(&self, r: usize, s: usize) -> i64 {
        self.get(r, s).map_or(0, |rec| rec.mrs)
    }

    /// Mutable aggregate record for a pair, created zeroed on first access.
    pub fn entry(&mut self, r: usize, s: usize) -> &mut PairRecord {
        let (r, s) = self.key(r, s);
        match self {
            BlockEdgeIndex::Dense {
                size,
                channels,
                cells,
                ..
            } => {
                debug_assert!(r < *size && s < *size, "block pair out of range");
                cells[r * *size + s].get_or_insert_with(|| PairRecord::zero(*channels))
            }
            BlockEdgeIndex::Hash { channels, recs, .. } => recs
                .entry((r, s))
                .or_insert_with(|| PairRecord::zero(*channels)),
        }
    }

    /// Drops the pair's record when its aggregates have all returned to zero.
    pub fn prune(&mut self, r: usize, s: usize) {
        let (r, s) = self.key(r, s);
        match self {
            BlockEdgeIndex::Dense { size, cells, .. } => {
                let cell = &mut cells[r * *size + s];
                if cell.as_ref().is_some_and(|rec| rec.is_zero()) {
                    *cell = None;
                }
            }
            BlockEdgeIndex::Hash { recs, .. } => {
                if recs.get(&(r, s)).is_some_and(|rec| rec.is_zero()) {
                    // swap_remove keeps lookups O(1); iteration order is
                    // still deterministic afterwards.
                    recs.swap_remove(&(r, s));
                }
            }
        }
    }

    /// Iterates over all held pairs and their records.
    pub fn iter(&self) -> Box<dyn Iterator<Item = ((usize, usize), &PairRecord)> + '_> {
        match self {
            BlockEdgeIndex::Dense { size, cells, .. } => {
                let size = *size;
                Box::new(cells.iter().enumerate().filter_map(move |(i, cell)| {
                    cell.as_ref().map(|rec| ((i / size, i % size), rec))
                }))
            }
            BlockEdgeIndex::Hash { recs, .. } => {
                Box::new(recs.iter().map(|(&k, rec)| (k, rec)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undirected_keys_normalize() {
        let mut idx = BlockEdgeIndex::new_hash(false, 0);
        idx.entry(3, 1).mrs += 2;
        assert_eq!(idx.get_mrs(1, 3), 2);
        assert_eq!(idx.get_mrs(3, 1), 2);
        idx.entry(1, 3).mrs -= 2;
        idx.prune(3, 1);
        assert!(idx.get(1, 3).is_none());
    }

    #[test]
    fn dense_and_hash_agree() {
        let mut dense = BlockEdgeIndex::new_dense(4, true, 1);
        let mut hash = BlockEdgeIndex::new_hash(true, 1);
        for (r, s, w, x) in [(0, 1, 3, 0.5), (1, 0, 1, 0.25), (2, 2, 2, 1.0)] {
            for idx in [&mut dense, &mut hash] {
                let rec = idx.entry(r, s);
                rec.mrs += w;
                rec.brec[0] += x;
            }
        }
        for r in 0..4 {
            for s in 0..4 {
                assert_eq!(dense.get_mrs(r, s), hash.get_mrs(r, s));
            }
        }
        assert_eq!(dense.iter().count(), 3);
    }
}

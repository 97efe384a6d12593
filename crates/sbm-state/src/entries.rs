//! Per-move block-pair deltas.
//!
//! A single vertex move from block `r` to block `nr` touches only the block
//! pairs incident to the moved vertex. [`EntrySet`] gathers the aggregate
//! deltas for those pairs in one pass over the vertex's edges, so a virtual
//! move can be priced without mutating the state.

use indexmap::IndexMap;

use sbm_graph::{AdjGraph, EdgeCovariates, EdgeWeights};

use crate::NULL_BLOCK;

/// Aggregate deltas for one block pair.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryDelta {
    /// Change in the pair's aggregate edge weight.
    pub dmrs: i64,
    /// Change in the pair's covariate sums, one per channel.
    pub drec: Vec<f64>,
    /// Change in the pair's auxiliary sums, one per channel.
    pub ddrec: Vec<f64>,
}

impl EntryDelta {
    fn zero(channels: usize) -> Self {
        EntryDelta {
            dmrs: 0,
            drec: vec![0.0; channels],
            ddrec: vec![0.0; channels],
        }
    }
}

/// Block-pair deltas of one candidate vertex move.
#[derive(Debug, Clone)]
pub struct EntrySet {
    directed: bool,
    channels: usize,
    deltas: IndexMap<(usize, usize), EntryDelta>,
}

impl EntrySet {
    /// Creates an empty delta set.
    pub fn new(directed: bool, channels: usize) -> Self {
        EntrySet {
            directed,
            channels,
            deltas: IndexMap::new(),
        }
    }

    fn key(&self, r: usize, s: usize) -> (usize, usize) {
        if self.directed || r <= s {
            (r, s)
        } else {
            (s, r)
        }
    }

    fn delta_mut(&mut self, r: usize, s: usize) -> &mut EntryDelta {
        let key = self.key(r, s);
        let channels = self.channels;
        self.deltas
            .entry(key)
            .or_insert_with(|| EntryDelta::zero(channels))
    }

    /// Gathers the deltas of moving `v` from `r` to `nr` given the current
    /// labels `b`. Edges for which `efilt` returns true are skipped. Either
    /// side may be [`NULL_BLOCK`] for a pure removal or insertion.
    #[allow(clippy::too_many_arguments)]
    pub fn collect<F>(
        &mut self,
        g: &AdjGraph,
        ew: &EdgeWeights,
        recs: &EdgeCovariates,
        b: &[usize],
        v: usize,
        r: usize,
        nr: usize,
        mut efilt: F,
    ) where
        F: FnMut(usize) -> bool,
    {
        self.deltas.clear();
        if r == nr {
            return;
        }
        for &e in g.out_edges(v) {
            if efilt(e) {
                continue;
            }
            let u = g.opposite(e, v);
            let w = ew.get(e);
            if u == v {
                self.apply_edge(e, recs, r, r, nr, nr, w);
            } else {
                let s = b[u];
                if s == NULL_BLOCK {
                    continue;
                }
                self.apply_edge(e, recs, r, s, nr, s, w);
            }
        }
        if self.directed {
            for &e in g.in_edges(v) {
                if efilt(e) {
                    continue;
                }
                let u = g.opposite(e, v);
                if u == v {
                    // self-loops were handled in the out pass
                    continue;
                }
                let w = ew.get(e);
                let s = b[u];
                if s == NULL_BLOCK {
                    continue;
                }
                self.apply_edge(e, recs, s, r, s, nr, w);
            }
        }
    }

    fn apply_edge(
        &mut self,
        e: usize,
        recs: &EdgeCovariates,
        or: usize,
        os: usize,
        nr: usize,
        ns: usize,
        w: i64,
    ) {
        let channels = self.channels;
        // Undirected diagonal aggregates hold twice the internal weight.
        if or != NULL_BLOCK && os != NULL_BLOCK {
            let old_w = if !self.directed && or == os { 2 * w } else { w };
            let d = self.delta_mut(or, os);
            d.dmrs -= old_w;
            if channels > 0 {
                for (i, (&x, &x2)) in recs.rec(e).iter().zip(recs.drec(e)).enumerate() {
                    d.drec[i] -= x;
                    d.ddrec[i] -= x2;
                }
            }
        }
        if nr != NULL_BLOCK && ns != NULL_BLOCK {
            let new_w = if !self.directed && nr == ns { 2 * w } else { w };
            let d = self.delta_mut(nr, ns);
            d.dmrs += new_w;
            if channels > 0 {
                for (i, (&x, &x2)) in recs.rec(e).iter().zip(recs.drec(e)).enumerate() {
                    d.drec[i] += x;
                    d.ddrec[i] += x2;
                }
            }
        }
    }

    /// The aggregate weight delta for a pair, zero if untouched.
    pub fn get_delta(&self, r: usize, s: usize) -> i64 {
        let key = self.key(r, s);
        self.deltas.get(&key).map_or(0, |d| d.dmrs)
    }

    /// Iterates over all touched pairs and their deltas.
    pub fn iter(&self) -> impl Iterator<Item = ((usize, usize), &EntryDelta)> {
        self.deltas.iter().map(|(&k, d)| (k, d))
    }

    /// Whether the move touches no pairs.
    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path_graph() -> AdjGraph {
        let mut g = AdjGraph::new(3, false);
        g.add_edge(0, 1).unwrap();
        g.add_edge(1, 2).unwrap();
        g.add_edge(1, 1).unwrap();
        g
    }

    #[test]
    fn undirected_move_deltas() {
        let g = path_graph();
        let ew = EdgeWeights::Unit;
        let recs = EdgeCovariates::new(0, Vec::new(), Vec::new()).unwrap();
        let b = vec![0, 0, 1];
        let mut entries = EntrySet::new(false, 0);
        entries.collect(&g, &ew, &recs, &b, 1, 0, 1, |_| false);
        // edge (0,1) leaves the diagonal of 0 and becomes a cross pair
        assert_eq!(entries.get_delta(0, 0), -2 - 2); // internal edge + self-loop
        assert_eq!(entries.get_delta(0, 1), 1 - 1); // gains (0,1), loses (1,2)
        assert_eq!(entries.get_delta(1, 1), 2 + 2); // (1,2) now internal + self-loop
    }

    #[test]
    fn noop_move_is_empty() {
        let g = path_graph();
        let ew = EdgeWeights::Unit;
        let recs = EdgeCovariates::new(0, Vec::new(), Vec::new()).unwrap();
        let b = vec![0, 0, 1];
        let mut entries = EntrySet::new(false, 0);
        entries.collect(&g, &ew, &recs, &b, 1, 0, 0, |_| false);
        assert!(entries.is_empty());
    }
}

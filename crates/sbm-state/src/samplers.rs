//! Sampling structures behind the mixture move proposal.

use indexmap::IndexMap;
use rand::Rng;

use sbm_graph::{AdjGraph, EdgeWeights};

/// Per-vertex weighted neighbour lists, excluding self-loops.
///
/// Directed graphs include both in- and out-neighbours, so a proposal can
/// flow against edge orientation.
#[derive(Debug, Clone)]
pub struct NeighbourSampler {
    lists: Vec<Vec<(usize, i64)>>,
    totals: Vec<i64>,
}

impl NeighbourSampler {
    /// Builds the sampler from the graph's current incidence lists.
    pub fn new(g: &AdjGraph, ew: &EdgeWeights) -> Self {
        let n = g.num_vertices();
        let mut lists = vec![Vec::new(); n];
        let mut totals = vec![0; n];
        for v in 0..n {
            for &e in g.out_edges(v) {
                let u = g.opposite(e, v);
                if u == v {
                    continue;
                }
                let w = ew.get(e);
                if w > 0 {
                    lists[v].push((u, w));
                    totals[v] += w;
                }
            }
            for &e in g.in_edges(v) {
                let u = g.opposite(e, v);
                if u == v {
                    continue;
                }
                let w = ew.get(e);
                if w > 0 {
                    lists[v].push((u, w));
                    totals[v] += w;
                }
            }
        }
        NeighbourSampler { lists, totals }
    }

    /// Whether `v` has any sampleable neighbour.
    pub fn is_empty(&self, v: usize) -> bool {
        self.totals[v] == 0
    }

    /// Draws a neighbour of `v` with probability proportional to the
    /// connecting edge weight. `None` for isolated vertices.
    pub fn sample<R: Rng + ?Sized>(&self, v: usize, rng: &mut R) -> Option<usize> {
        let total = self.totals[v];
        if total == 0 {
            return None;
        }
        let mut x = rng.gen_range(0..total);
        for &(u, w) in &self.lists[v] {
            if x < w {
                return Some(u);
            }
            x -= w;
        }
        unreachable!("neighbour weights sum to the sampled range")
    }
}

/// A half-edge handle: the edge index and which endpoint it stands for.
///
/// `side == false` is the stored source endpoint, `true` the target.
pub type HalfEdge = (usize, bool);

/// Per-block weighted multisets of incident half-edges.
///
/// Every live edge is registered once under each endpoint's block, so a
/// self-loop places both of its half-edges in the same group. Removal is
/// index-swap through the handle map, keeping membership updates O(1).
#[derive(Debug, Clone)]
pub struct EdgeGroups {
    groups: Vec<Vec<HalfEdge>>,
    totals: Vec<i64>,
    pos: IndexMap<HalfEdge, usize>,
}

impl EdgeGroups {
    /// Creates empty groups for `blocks` blocks.
    pub fn new(blocks: usize) -> Self {
        EdgeGroups {
            groups: vec![Vec::new(); blocks],
            totals: vec![0; blocks],
            pos: IndexMap::new(),
        }
    }

    /// Registers the half-edge `(e, side)` of weight `w` under `block`.
    pub fn insert(&mut self, block: usize, e: usize, side: bool, w: i64) {
        if w <= 0 {
            return;
        }
        let group = &mut self.groups[block];
        self.pos.insert((e, side), group.len());
        group.push((e, side));
        self.totals[block] += w;
    }

    /// Withdraws the half-edge `(e, side)` of weight `w` from `block`.
    pub fn remove(&mut self, block: usize, e: usize, side: bool, w: i64) {
        if w <= 0 {
            return;
        }
        let Some(idx) = self.pos.swap_remove(&(e, side)) else {
            debug_assert!(false, "half-edge not registered");
            return;
        };
        let group = &mut self.groups[block];
        debug_assert_eq!(group[idx], (e, side), "handle map out of sync");
        let last = group.len() - 1;
        group.swap(idx, last);
        group.pop();
        if idx < last {
            self.pos.insert(group[idx], idx);
        }
        self.totals[block] -= w;
    }

    /// Total half-edge weight registered under `block`.
    pub fn total(&self, block: usize) -> i64 {
        self.totals[block]
    }

    /// Draws a half-edge from `block`'s group with probability proportional
    /// to edge weight. `None` when the group is empty.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        block: usize,
        ew: &EdgeWeights,
        rng: &mut R,
    ) -> Option<HalfEdge> {
        let total = self.totals[block];
        if total == 0 {
            return None;
        }
        let mut x = rng.gen_range(0..total);
        for &(e, side) in &self.groups[block] {
            let w = ew.get(e);
            if x < w {
                return Some((e, side));
            }
            x -= w;
        }
        unreachable!("group weights sum to the sampled range")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn neighbour_sampler_skips_self_loops() {
        let mut g = AdjGraph::new(2, false);
        g.add_edge(0, 0).unwrap();
        g.add_edge(0, 1).unwrap();
        let sampler = NeighbourSampler::new(&g, &EdgeWeights::Unit);
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..16 {
            assert_eq!(sampler.sample(0, &mut rng), Some(1));
        }
    }

    #[test]
    fn groups_swap_remove_keeps_handles_valid() {
        let mut groups = EdgeGroups::new(2);
        groups.insert(0, 0, false, 1);
        groups.insert(0, 1, false, 1);
        groups.insert(0, 2, false, 1);
        groups.remove(0, 0, false, 1);
        groups.remove(0, 2, false, 1);
        assert_eq!(groups.total(0), 1);
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(groups.sample(0, &EdgeWeights::Unit, &mut rng), Some((1, false)));
    }
}

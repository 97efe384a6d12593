//! Per-vertex degree records.

use serde::{Deserialize, Serialize};

use crate::graph::AdjGraph;
use crate::weights::{EdgeWeights, VertexWeights};

/// Degree representation backing the degree-corrected entropy terms.
///
/// `Simple` recomputes a single `(kin, kout)` pair from the graph on demand.
/// `Multiset` stores, per vertex, the exact multiset of degrees of the
/// original vertices it aggregates — needed once merging folds several
/// vertices (with distinct degrees) into one weighted super-vertex.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Degrees {
    /// One `(kin, kout)` pair per vertex, derived from the graph.
    Simple,
    /// Per-vertex `(kin, kout, multiplicity)` triples; multiplicities sum to
    /// the vertex weight.
    Multiset(Vec<Vec<(i64, i64, i64)>>),
}

impl Degrees {
    /// Builds a multiset record where every vertex starts with its own
    /// degree at multiplicity equal to its weight.
    pub fn multiset_from_graph(g: &AdjGraph, ew: &EdgeWeights, vw: &VertexWeights) -> Self {
        let mut per_vertex = Vec::with_capacity(g.num_vertices());
        for v in 0..g.num_vertices() {
            let kin = g.in_degree_weighted(v, ew);
            let kout = g.out_degree_weighted(v, ew);
            let n = vw.get(v);
            per_vertex.push(if n > 0 { vec![(kin, kout, n)] } else { Vec::new() });
        }
        Degrees::Multiset(per_vertex)
    }

    /// Degree triples of `v`, with multiplicities summing to `v`'s weight.
    pub fn entries(
        &self,
        v: usize,
        g: &AdjGraph,
        ew: &EdgeWeights,
        vw: &VertexWeights,
    ) -> Vec<(i64, i64, i64)> {
        match self {
            Degrees::Simple => {
                let kin = g.in_degree_weighted(v, ew);
                let kout = g.out_degree_weighted(v, ew);
                vec![(kin, kout, vw.get(v))]
            }
            Degrees::Multiset(per_vertex) => per_vertex[v].clone(),
        }
    }

    /// Folds `u`'s degree multiset into `v`'s (no-op for `Simple`, which
    /// always reflects the current graph).
    pub fn merge(&mut self, u: usize, v: usize) {
        if let Degrees::Multiset(per_vertex) = self {
            let mut hist: Vec<(i64, i64, i64)> = Vec::new();
            let taken = std::mem::take(&mut per_vertex[u]);
            for (kin, kout, n) in taken.into_iter().chain(std::mem::take(&mut per_vertex[v])) {
                match hist.iter_mut().find(|(ki, ko, _)| *ki == kin && *ko == kout) {
                    Some((_, _, m)) => *m += n,
                    None => hist.push((kin, kout, n)),
                }
            }
            per_vertex[v] = hist;
        }
    }
}

//! Adjacency-list multigraph with stable vertex and edge indices.

use sbm_core::errors::{ErrorInfo, SbmError};
use serde::{Deserialize, Serialize};

use crate::weights::EdgeWeights;

/// A directed or undirected multigraph with stable `usize` indices.
///
/// Vertices and edges are addressed by plain numeric identifiers so callers
/// can drive the engine through flat arrays. Parallel edges and self-loops
/// are allowed. Edge indices are never reused: detaching a vertex leaves its
/// edge records in place (at zero weight) so that attribute maps keyed by
/// edge index stay valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjGraph {
    directed: bool,
    edges: Vec<(usize, usize)>,
    out_adj: Vec<Vec<usize>>,
    in_adj: Vec<Vec<usize>>,
}

impl AdjGraph {
    /// Creates an edgeless graph with `n` vertices.
    pub fn new(n: usize, directed: bool) -> Self {
        Self {
            directed,
            edges: Vec::new(),
            out_adj: vec![Vec::new(); n],
            in_adj: if directed { vec![Vec::new(); n] } else { Vec::new() },
        }
    }

    /// Returns whether edges are directed.
    pub fn is_directed(&self) -> bool {
        self.directed
    }

    /// Number of vertices.
    pub fn num_vertices(&self) -> usize {
        self.out_adj.len()
    }

    /// Number of edge records, including detached (zero-weight) ones.
    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// Appends a fresh isolated vertex and returns its index.
    pub fn add_vertex(&mut self) -> usize {
        let v = self.out_adj.len();
        self.out_adj.push(Vec::new());
        if self.directed {
            self.in_adj.push(Vec::new());
        }
        v
    }

    /// Adds an edge from `u` to `v` and returns its index.
    ///
    /// For undirected graphs the orientation is only a storage artifact; the
    /// edge is registered in both endpoints' incidence lists (once for a
    /// self-loop).
    pub fn add_edge(&mut self, u: usize, v: usize) -> Result<usize, SbmError> {
        let n = self.num_vertices();
        if u >= n || v >= n {
            return Err(SbmError::Graph(
                ErrorInfo::new("vertex-out-of-range", "edge endpoint is not a vertex")
                    .with_context("source", u.to_string())
                    .with_context("target", v.to_string())
                    .with_context("vertices", n.to_string()),
            ));
        }
        let e = self.edges.len();
        self.edges.push((u, v));
        self.out_adj[u].push(e);
        if self.directed {
            self.in_adj[v].push(e);
        } else if v != u {
            self.out_adj[v].push(e);
        }
        Ok(e)
    }

    /// Returns the stored `(source, target)` pair of an edge.
    pub fn endpoints(&self, e: usize) -> (usize, usize) {
        self.edges[e]
    }

    /// Returns the endpoint of `e` opposite to `v` (which is `v` itself for a
    /// self-loop).
    pub fn opposite(&self, e: usize, v: usize) -> usize {
        let (u, w) = self.edges[e];
        if u == v {
            w
        } else {
            u
        }
    }

    /// Edges leaving `v`. For undirected graphs this enumerates every
    /// incident edge exactly once, self-loops included.
    pub fn out_edges(&self, v: usize) -> &[usize] {
        &self.out_adj[v]
    }

    /// Edges entering `v`. Empty for undirected graphs, where [`out_edges`]
    /// already covers all incidences.
    ///
    /// [`out_edges`]: AdjGraph::out_edges
    pub fn in_edges(&self, v: usize) -> &[usize] {
        if self.directed {
            &self.in_adj[v]
        } else {
            &[]
        }
    }

    /// Weighted out-degree of `v`. For undirected graphs this is the total
    /// incident edge weight with self-loops counted twice, matching the
    /// block-level aggregate convention (`mrp[r]` sums to the block degree).
    pub fn out_degree_weighted(&self, v: usize, ew: &EdgeWeights) -> i64 {
        let mut k = 0;
        for &e in &self.out_adj[v] {
            let w = ew.get(e);
            let (u, t) = self.edges[e];
            if !self.directed && u == t {
                k += 2 * w;
            } else {
                k += w;
            }
        }
        k
    }

    /// Weighted in-degree of `v`; equals the weighted out-degree for
    /// undirected graphs.
    pub fn in_degree_weighted(&self, v: usize, ew: &EdgeWeights) -> i64 {
        if !self.directed {
            return self.out_degree_weighted(v, ew);
        }
        self.in_adj[v].iter().map(|&e| ew.get(e)).sum()
    }

    /// Sums an out-edge attribute over `v`'s incidences with the same
    /// self-loop convention as [`out_degree_weighted`].
    ///
    /// [`out_degree_weighted`]: AdjGraph::out_degree_weighted
    pub fn out_sum(&self, v: usize, value: impl Fn(usize) -> f64) -> f64 {
        let mut total = 0.0;
        for &e in &self.out_adj[v] {
            let x = value(e);
            let (u, t) = self.edges[e];
            if !self.directed && u == t {
                total += 2.0 * x;
            } else {
                total += x;
            }
        }
        total
    }

    /// Detaches `v` from the graph, removing all of its incidences, and
    /// returns the affected edge indices. Edge records are kept so weights
    /// and covariates keyed by edge index can be zeroed by the caller.
    pub fn clear_vertex(&mut self, v: usize) -> Vec<usize> {
        let cleared: Vec<usize> = self.out_adj[v]
            .iter()
            .chain(self.in_edges_raw(v).iter())
            .copied()
            .collect();
        for &e in &cleared {
            let (u, w) = self.edges[e];
            let other = if u == v { w } else { u };
            if other != v {
                self.out_adj[other].retain(|&x| x != e);
                if self.directed {
                    self.in_adj[other].retain(|&x| x != e);
                }
            }
        }
        self.out_adj[v].clear();
        if self.directed {
            self.in_adj[v].clear();
        }
        let mut unique = cleared;
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    fn in_edges_raw(&self, v: usize) -> &[usize] {
        if self.directed {
            &self.in_adj[v]
        } else {
            &[]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weights::EdgeWeights;

    #[test]
    fn undirected_degree_counts_self_loops_twice() {
        let mut g = AdjGraph::new(3, false);
        g.add_edge(0, 1).unwrap();
        g.add_edge(0, 0).unwrap();
        let ew = EdgeWeights::Unit;
        assert_eq!(g.out_degree_weighted(0, &ew), 3);
        assert_eq!(g.out_degree_weighted(1, &ew), 1);
        assert_eq!(g.in_degree_weighted(0, &ew), 3);
    }

    #[test]
    fn clear_vertex_detaches_both_sides() {
        let mut g = AdjGraph::new(3, false);
        let e0 = g.add_edge(0, 1).unwrap();
        let e1 = g.add_edge(1, 2).unwrap();
        let cleared = g.clear_vertex(1);
        assert_eq!(cleared, vec![e0, e1]);
        assert!(g.out_edges(0).is_empty());
        assert!(g.out_edges(1).is_empty());
        assert!(g.out_edges(2).is_empty());
    }
}

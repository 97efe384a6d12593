//! The partitioned block state and its move machinery.

use rand::Rng;

use sbm_core::{ErrorInfo, SbmError};
use sbm_graph::{AdjGraph, Degrees, EdgeCovariates, EdgeWeights, VertexWeights};

use crate::config::{ChannelParams, EntropyArgs, StateConfig, WeightType};
use crate::emat::BlockEdgeIndex;
use crate::entries::EntrySet;
use crate::partition_stats::{edges_dl, PartitionStats};
use crate::samplers::{EdgeGroups, NeighbourSampler};
use crate::terms::{
    binomial_ll, edge_term, edge_term_dense, edge_term_exact, exponential_ll, geometric_ll,
    lbinom, lgamma, lgamma_fast, normal_ll, poisson_ll, vertex_term, vertex_term_exact,
};
use crate::NULL_BLOCK;

/// Optional per-vertex and per-edge attributes a state is built with.
#[derive(Debug, Clone)]
pub struct StateInputs {
    /// Vertex weights (unit by default).
    pub vweight: VertexWeights,
    /// Edge weights (unit by default).
    pub eweight: EdgeWeights,
    /// Per-edge covariate channels.
    pub recs: EdgeCovariates,
    /// Degree records; `Simple` unless merging is planned.
    pub degs: Degrees,
    /// Per-block move barrier labels (all zero by default).
    pub bclabel: Option<Vec<usize>>,
    /// Per-vertex partition-statistics class labels (all zero by default).
    pub pclabel: Option<Vec<usize>>,
    /// Per-vertex degree-likelihood switches: 0 keeps the full degree terms,
    /// 1 drops them, 2 keeps the out-degree only.
    pub ignore_degrees: Option<Vec<u8>>,
}

impl Default for StateInputs {
    fn default() -> Self {
        StateInputs {
            vweight: VertexWeights::Unit,
            eweight: EdgeWeights::Unit,
            recs: EdgeCovariates::empty(),
            degs: Degrees::Simple,
            bclabel: None,
            pclabel: None,
            ignore_degrees: None,
        }
    }
}

/// The stochastic block model partition state.
///
/// Owns the graph and every aggregate needed to price and commit single
/// vertex moves in time proportional to the vertex degree: block weights,
/// block degree sums, the block-pair edge index, covariate accumulators,
/// occupancy pools, and (once enabled) per-class partition statistics and
/// the proposal samplers.
pub struct BlockState {
    g: AdjGraph,
    b: Vec<usize>,
    vweight: VertexWeights,
    eweight: EdgeWeights,
    recs: EdgeCovariates,
    rec_params: Vec<ChannelParams>,
    dt_channel: Option<usize>,
    degs: Degrees,
    deg_corr: bool,
    allow_empty: bool,
    total_b: usize,
    total_e: i64,
    wr: Vec<i64>,
    mrp: Vec<i64>,
    mrm: Vec<i64>,
    emat: BlockEdgeIndex,
    brecsum: Vec<f64>,
    bignore_degrees: Vec<i64>,
    bclabel: Vec<usize>,
    pclabel: Vec<usize>,
    merge_map: Vec<usize>,
    ignore_degrees: Vec<u8>,
    empty_blocks: Vec<usize>,
    empty_pos: Vec<usize>,
    candidate_blocks: Vec<usize>,
    candidate_pos: Vec<usize>,
    neighbour_sampler: NeighbourSampler,
    egroups: Option<EdgeGroups>,
    partition_stats: Vec<PartitionStats>,
    coupled: Option<Box<(BlockState, EntropyArgs)>>,
}

impl BlockState {
    /// Builds a state over `g` with the initial partition `b`.
    pub fn new(
        g: AdjGraph,
        b: Vec<usize>,
        inputs: StateInputs,
        cfg: StateConfig,
    ) -> Result<Self, SbmError> {
        let n = g.num_vertices();
        let directed = g.is_directed();
        let StateInputs {
            vweight,
            mut eweight,
            mut recs,
            degs,
            bclabel,
            pclabel,
            ignore_degrees,
        } = inputs;
        cfg.validate(recs.channels())?;
        if b.len() != n {
            return Err(SbmError::State(
                ErrorInfo::new("partition-length", "one block label is required per vertex")
                    .with_context("vertices", n.to_string())
                    .with_context("labels", b.len().to_string()),
            ));
        }
        if let Some(&bad) = b.iter().find(|&&r| r >= cfg.block_count) {
            return Err(SbmError::State(
                ErrorInfo::new("block-out-of-range", "block label exceeds the block count")
                    .with_context("label", bad.to_string())
                    .with_context("blocks", cfg.block_count.to_string()),
            ));
        }
        if let VertexWeights::Map(w) = &vweight {
            if w.len() != n {
                return Err(SbmError::Graph(
                    ErrorInfo::new("weight-length", "one vertex weight is required per vertex")
                        .with_context("vertices", n.to_string())
                        .with_context("weights", w.len().to_string()),
                ));
            }
        }
        eweight.ensure_len(g.num_edges());
        recs.ensure_len(g.num_edges());
        let total_b = cfg.block_count;
        let bclabel = match bclabel {
            Some(l) if l.len() != total_b => {
                return Err(SbmError::State(
                    ErrorInfo::new("bclabel-length", "one barrier label is required per block"),
                ))
            }
            Some(l) => l,
            None => vec![0; total_b],
        };
        let pclabel = match pclabel {
            Some(l) if l.len() != n => {
                return Err(SbmError::State(
                    ErrorInfo::new("pclabel-length", "one class label is required per vertex"),
                ))
            }
            Some(l) => l,
            None => vec![0; n],
        };
        let ignore_degrees = match ignore_degrees {
            Some(l) if l.len() != n => {
                return Err(SbmError::State(ErrorInfo::new(
                    "ignore-degrees-length",
                    "one degree switch is required per vertex",
                )))
            }
            Some(l) => l,
            None => vec![0; n],
        };
        let dt_channel = cfg
            .rec_params
            .iter()
            .position(|p| p.kind == WeightType::DeltaT);

        let channels = recs.channels();
        let emat = if cfg.use_dense_matrix {
            BlockEdgeIndex::new_dense(total_b, directed, channels)
        } else {
            BlockEdgeIndex::new_hash(directed, channels)
        };
        let neighbour_sampler = NeighbourSampler::new(&g, &eweight);
        let mut state = BlockState {
            g,
            b,
            vweight,
            eweight,
            recs,
            rec_params: cfg.rec_params.clone(),
            dt_channel,
            degs,
            deg_corr: cfg.deg_corr,
            allow_empty: cfg.allow_empty,
            total_b,
            total_e: 0,
            wr: vec![0; total_b],
            mrp: vec![0; total_b],
            mrm: vec![0; total_b],
            emat,
            brecsum: vec![0.0; total_b],
            bignore_degrees: vec![0; total_b],
            bclabel,
            pclabel,
            merge_map: (0..n).collect(),
            ignore_degrees,
            empty_blocks: Vec::new(),
            empty_pos: vec![usize::MAX; total_b],
            candidate_blocks: vec![NULL_BLOCK],
            candidate_pos: vec![usize::MAX; total_b],
            neighbour_sampler,
            egroups: None,
            partition_stats: Vec::new(),
            coupled: None,
        };
        state.rebuild_aggregates();
        Ok(state)
    }

    fn rebuild_aggregates(&mut self) {
        let directed = self.g.is_directed();
        self.total_e = 0;
        for e in 0..self.g.num_edges() {
            let w = self.eweight.get(e);
            if w == 0 {
                continue;
            }
            self.total_e += w;
            let (u, v) = self.g.endpoints(e);
            let (r, s) = (self.b[u], self.b[v]);
            let sym = if !directed && r == s { 2 * w } else { w };
            let rec = self.emat.entry(r, s);
            rec.mrs += sym;
            for (i, (&x, &x2)) in self
                .recs
                .rec(e)
                .iter()
                .zip(self.recs.drec(e))
                .enumerate()
            {
                rec.brec[i] += x;
                rec.bdrec[i] += x2;
            }
            if directed {
                self.mrp[r] += w;
                self.mrm[s] += w;
            } else if u == v {
                self.mrp[r] += 2 * w;
            } else {
                self.mrp[r] += w;
                self.mrp[s] += w;
            }
        }
        for v in 0..self.g.num_vertices() {
            let r = self.b[v];
            self.wr[r] += self.vweight.get(v);
            if self.ignore_degrees[v] > 0 {
                self.bignore_degrees[r] += 1;
                if let Some(i) = self.dt_channel {
                    let dt = self.g.out_sum(v, |e| {
                        if self.eweight.get(e) > 0 {
                            self.recs.rec(e)[i]
                        } else {
                            0.0
                        }
                    });
                    self.brecsum[r] += dt;
                }
            }
        }
        for r in 0..self.total_b {
            if self.wr[r] == 0 {
                self.empty_pool_add(r);
            } else {
                self.candidate_add(r);
            }
        }
    }

    // -- accessors ---------------------------------------------------------

    /// The underlying graph.
    pub fn graph(&self) -> &AdjGraph {
        &self.g
    }

    /// Current block labels; detached vertices hold [`NULL_BLOCK`].
    pub fn partition(&self) -> &[usize] {
        &self.b
    }

    /// Block label of `v`.
    pub fn block(&self, v: usize) -> usize {
        self.b[v]
    }

    /// Total number of blocks, occupied or not.
    pub fn num_blocks(&self) -> usize {
        self.total_b
    }

    /// Weighted vertex count of block `r`.
    pub fn block_weight(&self, r: usize) -> i64 {
        self.wr[r]
    }

    /// Aggregate (symmetrized) edge weight between blocks `r` and `s`.
    pub fn block_edge_count(&self, r: usize, s: usize) -> i64 {
        self.emat.get_mrs(r, s)
    }

    /// Weighted out-degree aggregate of block `r`.
    pub fn block_out_degree(&self, r: usize) -> i64 {
        self.mrp[r]
    }

    /// Weighted in-degree aggregate of block `r`; equals the out aggregate
    /// for undirected graphs.
    pub fn block_in_degree(&self, r: usize) -> i64 {
        self.mrm_of(r)
    }

    /// Blocks with zero weighted vertex count.
    pub fn empty_blocks(&self) -> &[usize] {
        &self.empty_blocks
    }

    /// Proposal candidate blocks including the leading sentinel.
    pub fn candidate_blocks(&self) -> &[usize] {
        &self.candidate_blocks
    }

    /// Total once-counted edge weight.
    pub fn total_edge_weight(&self) -> i64 {
        self.total_e
    }

    /// Weight of vertex `v` (1 for unit-weighted states).
    pub fn node_weight(&self, v: usize) -> i64 {
        self.vweight.get(v)
    }

    /// Merge target recorded for `v` (itself if never merged).
    pub fn merge_target(&self, v: usize) -> usize {
        self.merge_map[v]
    }

    /// Remaining weight of `v`'s block after a hypothetical removal of `v`.
    pub fn virtual_remove_size(&self, v: usize) -> i64 {
        self.wr[self.b[v]] - self.node_weight(v)
    }

    /// Whether `v` is the last weighted member of its block.
    pub fn is_last(&self, v: usize) -> bool {
        self.virtual_remove_size(v) == 0
    }

    /// Whether a move from `r` into `nr` is permitted: the barrier labels
    /// must match, except that an empty target is always admissible.
    pub fn allow_move(&self, r: usize, nr: usize) -> bool {
        self.bclabel[r] == self.bclabel[nr] || self.wr[nr] == 0
    }

    /// Number of occupied blocks.
    pub fn active_blocks(&self) -> usize {
        self.wr.iter().filter(|&&w| w > 0).count()
    }

    fn mrm_of(&self, r: usize) -> i64 {
        if self.g.is_directed() {
            self.mrm[r]
        } else {
            self.mrp[r]
        }
    }

    fn once_counted(&self, r: usize, s: usize, mrs: i64) -> i64 {
        if !self.g.is_directed() && r == s {
            mrs / 2
        } else {
            mrs
        }
    }

    // -- pools -------------------------------------------------------------

    fn candidate_add(&mut self, r: usize) {
        if self.candidate_pos[r] == usize::MAX {
            self.candidate_pos[r] = self.candidate_blocks.len();
            self.candidate_blocks.push(r);
        }
    }

    fn candidate_remove(&mut self, r: usize) {
        let pos = self.candidate_pos[r];
        if pos == usize::MAX {
            return;
        }
        let last = self.candidate_blocks.len() - 1;
        self.candidate_blocks.swap(pos, last);
        self.candidate_blocks.pop();
        if pos < last {
            let moved = self.candidate_blocks[pos];
            self.candidate_pos[moved] = pos;
        }
        self.candidate_pos[r] = usize::MAX;
    }

    fn empty_pool_add(&mut self, r: usize) {
        if self.empty_pos[r] == usize::MAX {
            self.empty_pos[r] = self.empty_blocks.len();
            self.empty_blocks.push(r);
        }
    }

    fn empty_pool_remove(&mut self, r: usize) {
        let pos = self.empty_pos[r];
        if pos == usize::MAX {
            return;
        }
        let last = self.empty_blocks.len() - 1;
        self.empty_blocks.swap(pos, last);
        self.empty_blocks.pop();
        if pos < last {
            let moved = self.empty_blocks[pos];
            self.empty_pos[moved] = pos;
        }
        self.empty_pos[r] = usize::MAX;
    }

    // -- move machinery ----------------------------------------------------

    fn apply_entries(&mut self, entries: &EntrySet) {
        let directed = self.g.is_directed();
        for ((t, s), d) in entries.iter() {
            let untouched = d.dmrs == 0
                && d.drec.iter().all(|&x| x == 0.0)
                && d.ddrec.iter().all(|&x| x == 0.0);
            if untouched {
                continue;
            }
            let rec = self.emat.entry(t, s);
            rec.mrs += d.dmrs;
            debug_assert!(rec.mrs >= 0, "negative block pair aggregate");
            for (i, (&dx, &dx2)) in d.drec.iter().zip(&d.ddrec).enumerate() {
                rec.brec[i] += dx;
                rec.bdrec[i] += dx2;
            }
            // Degree aggregates follow the pair deltas. Undirected diagonal
            // deltas are already doubled, so a single mrp update suffices.
            if directed {
                self.mrp[t] += d.dmrs;
                self.mrm[s] += d.dmrs;
            } else if t != s {
                self.mrp[t] += d.dmrs;
                self.mrp[s] += d.dmrs;
            } else {
                self.mrp[t] += d.dmrs;
            }
            self.emat.prune(t, s);
        }
    }

    fn filtered_waiting_time(&self, v: usize, efilt: &mut dyn FnMut(usize) -> bool) -> f64 {
        let Some(i) = self.dt_channel else {
            return 0.0;
        };
        let directed = self.g.is_directed();
        let mut dt = 0.0;
        for &e in self.g.out_edges(v) {
            if efilt(e) {
                continue;
            }
            if self.eweight.get(e) == 0 {
                continue;
            }
            let (a, b2) = self.g.endpoints(e);
            let x = self.recs.rec(e)[i];
            dt += if !directed && a == b2 { 2.0 * x } else { x };
        }
        dt
    }

    fn modify_vertex(
        &mut self,
        v: usize,
        r: usize,
        nr: usize,
        efilt: &mut dyn FnMut(usize) -> bool,
    ) {
        let mut entries = EntrySet::new(self.g.is_directed(), self.recs.channels());
        entries.collect(
            &self.g,
            &self.eweight,
            &self.recs,
            &self.b,
            v,
            r,
            nr,
            &mut *efilt,
        );
        self.apply_entries(&entries);
        if self.dt_channel.is_some() && self.ignore_degrees[v] > 0 {
            let dt = self.filtered_waiting_time(v, efilt);
            if r != NULL_BLOCK {
                self.brecsum[r] -= dt;
            }
            if nr != NULL_BLOCK {
                self.brecsum[nr] += dt;
            }
        }
    }

    /// Registers `v` as a member of block `r`, updating block weight, pools,
    /// partition statistics, and sampler membership. The block aggregates
    /// must already reflect `v`'s edges.
    pub fn add_partition_node(&mut self, v: usize, r: usize) {
        let n = self.node_weight(v);
        if n > 0 && self.wr[r] == 0 {
            self.empty_pool_remove(r);
            self.candidate_add(r);
        }
        self.wr[r] += n;
        self.b[v] = r;
        if self.ignore_degrees[v] > 0 {
            self.bignore_degrees[r] += 1;
        }
        if !self.partition_stats.is_empty() && n > 0 {
            let degs = self.degs.entries(v, &self.g, &self.eweight, &self.vweight);
            self.partition_stats[self.pclabel[v]].add_vertex(r, n, &degs);
        }
        self.egroups_register(v, r, true);
    }

    /// Withdraws `v` from block `r`, the inverse of [`add_partition_node`].
    ///
    /// [`add_partition_node`]: BlockState::add_partition_node
    pub fn remove_partition_node(&mut self, v: usize, r: usize) {
        let n = self.node_weight(v);
        self.egroups_register(v, r, false);
        if !self.partition_stats.is_empty() && n > 0 {
            let degs = self.degs.entries(v, &self.g, &self.eweight, &self.vweight);
            self.partition_stats[self.pclabel[v]].remove_vertex(r, n, &degs);
        }
        if self.ignore_degrees[v] > 0 {
            self.bignore_degrees[r] -= 1;
        }
        self.wr[r] -= n;
        debug_assert!(self.wr[r] >= 0, "negative block weight");
        if n > 0 && self.wr[r] == 0 {
            self.empty_pool_add(r);
            self.candidate_remove(r);
        }
        self.b[v] = NULL_BLOCK;
    }

    fn egroups_register(&mut self, v: usize, r: usize, insert: bool) {
        let Some(eg) = &mut self.egroups else {
            return;
        };
        for &e in self.g.out_edges(v) {
            let w = self.eweight.get(e);
            if w == 0 {
                continue;
            }
            let (a, b2) = self.g.endpoints(e);
            if a == b2 {
                if insert {
                    eg.insert(r, e, false, w);
                    eg.insert(r, e, true, w);
                } else {
                    eg.remove(r, e, false, w);
                    eg.remove(r, e, true, w);
                }
            } else {
                let side = b2 == v;
                if insert {
                    eg.insert(r, e, side, w);
                } else {
                    eg.remove(r, e, side, w);
                }
            }
        }
        for &e in self.g.in_edges(v) {
            let (a, b2) = self.g.endpoints(e);
            if a == b2 {
                continue;
            }
            let w = self.eweight.get(e);
            if w == 0 {
                continue;
            }
            if insert {
                eg.insert(r, e, true, w);
            } else {
                eg.remove(r, e, true, w);
            }
        }
    }

    /// Inserts `v` (currently detached) into block `r`.
    pub fn add_vertex(&mut self, v: usize, r: usize) -> Result<(), SbmError> {
        self.add_vertex_filtered(v, r, &mut |_| false)
    }

    fn add_vertex_filtered(
        &mut self,
        v: usize,
        r: usize,
        efilt: &mut dyn FnMut(usize) -> bool,
    ) -> Result<(), SbmError> {
        if r >= self.total_b {
            return Err(SbmError::State(
                ErrorInfo::new("block-out-of-range", "block label exceeds the block count")
                    .with_context("label", r.to_string())
                    .with_context("blocks", self.total_b.to_string()),
            ));
        }
        if self.b[v] != NULL_BLOCK {
            return Err(SbmError::State(
                ErrorInfo::new("vertex-present", "vertex is already assigned to a block")
                    .with_context("vertex", v.to_string())
                    .with_context("block", self.b[v].to_string()),
            ));
        }
        self.modify_vertex(v, NULL_BLOCK, r, efilt);
        self.add_partition_node(v, r);
        Ok(())
    }

    /// Detaches `v` from its current block.
    pub fn remove_vertex(&mut self, v: usize) -> Result<(), SbmError> {
        self.remove_vertex_filtered(v, &mut |_| false)
    }

    fn remove_vertex_filtered(
        &mut self,
        v: usize,
        efilt: &mut dyn FnMut(usize) -> bool,
    ) -> Result<(), SbmError> {
        let r = self.b[v];
        if r == NULL_BLOCK {
            return Err(SbmError::State(
                ErrorInfo::new("vertex-absent", "vertex is not assigned to a block")
                    .with_context("vertex", v.to_string()),
            ));
        }
        self.remove_partition_node(v, r);
        // collect with the pre-removal label, which the node removal has
        // already cleared from b
        self.modify_vertex(v, r, NULL_BLOCK, efilt);
        Ok(())
    }

    /// Moves `v` into block `nr`, propagating occupancy changes to a coupled
    /// parent level.
    pub fn move_vertex(&mut self, v: usize, nr: usize) -> Result<(), SbmError> {
        let r = self.b[v];
        if r == NULL_BLOCK {
            return Err(SbmError::State(
                ErrorInfo::new("vertex-absent", "vertex is not assigned to a block")
                    .with_context("vertex", v.to_string()),
            ));
        }
        if nr >= self.total_b {
            return Err(SbmError::State(
                ErrorInfo::new("block-out-of-range", "block label exceeds the block count")
                    .with_context("label", nr.to_string())
                    .with_context("blocks", self.total_b.to_string()),
            ));
        }
        if r == nr {
            return Ok(());
        }
        if !self.allow_move(r, nr) {
            return Err(SbmError::State(
                ErrorInfo::new("label-constraint", "barrier labels forbid the move")
                    .with_context("from", r.to_string())
                    .with_context("to", nr.to_string())
                    .with_hint("blocks can only exchange vertices within a bclabel class"),
            ));
        }
        let n = self.node_weight(v);
        let vacate = n > 0 && self.wr[r] == n;
        let occupy = n > 0 && self.wr[nr] == 0;
        self.remove_vertex(v)?;
        self.add_vertex(v, nr)?;
        if let Some(mut bx) = self.coupled.take() {
            if !(vacate || occupy) {
                self.coupled = Some(bx);
                return Ok(());
            }
            let bcl = self.bclabel[r];
            let res = (|| -> Result<(), SbmError> {
                let (parent, _) = &mut *bx;
                if vacate {
                    let pr = parent.b[r];
                    if pr != NULL_BLOCK {
                        parent.remove_partition_node(r, pr);
                    }
                    parent.set_vertex_weight(r, 0)?;
                }
                if occupy {
                    parent.set_vertex_weight(nr, 1)?;
                    parent.add_partition_node(nr, bcl);
                }
                Ok(())
            })();
            self.coupled = Some(bx);
            res?;
            if occupy {
                self.bclabel[nr] = bcl;
            }
        }
        Ok(())
    }

    /// Moves every vertex to the block given in `assignment`.
    pub fn set_partition(&mut self, assignment: &[usize]) -> Result<(), SbmError> {
        if assignment.len() != self.g.num_vertices() {
            return Err(SbmError::State(
                ErrorInfo::new("partition-length", "one block label is required per vertex")
                    .with_context("vertices", self.g.num_vertices().to_string())
                    .with_context("labels", assignment.len().to_string()),
            ));
        }
        for (v, &nr) in assignment.iter().enumerate() {
            if self.b[v] != nr {
                self.move_vertex(v, nr)?;
            }
        }
        Ok(())
    }

    /// Sets the weight of `v`, keeping block weights, pools, statistics, and
    /// sampler membership in sync. Errors on unit-weighted states.
    pub fn set_vertex_weight(&mut self, v: usize, w: i64) -> Result<(), SbmError> {
        if self.vweight.is_unit() {
            return Err(SbmError::State(
                ErrorInfo::new(
                    "unweighted-state",
                    "cannot set the weight of an unweighted state",
                )
                .with_hint("build the state with VertexWeights::Map"),
            ));
        }
        let r = self.b[v];
        if r != NULL_BLOCK {
            self.remove_partition_node(v, r);
        }
        self.vweight.set(v, w)?;
        if r != NULL_BLOCK {
            self.add_partition_node(v, r);
        }
        Ok(())
    }

    fn batch_filter(&self, vs: &[usize]) -> Result<(Vec<bool>, Vec<bool>), SbmError> {
        let mut in_batch = vec![false; self.g.num_vertices()];
        for &v in vs {
            if v >= self.g.num_vertices() {
                return Err(SbmError::State(
                    ErrorInfo::new("vertex-out-of-range", "batch names an unknown vertex")
                        .with_context("vertex", v.to_string()),
                ));
            }
            if in_batch[v] {
                return Err(SbmError::State(
                    ErrorInfo::new("duplicate-vertex", "batch names a vertex twice")
                        .with_context("vertex", v.to_string()),
                ));
            }
            in_batch[v] = true;
        }
        let mut internal = vec![false; self.g.num_edges()];
        for &v in vs {
            for &e in self.g.out_edges(v) {
                let (a, b2) = self.g.endpoints(e);
                if in_batch[a] && in_batch[b2] {
                    internal[e] = true;
                }
            }
        }
        Ok((in_batch, internal))
    }

    fn internal_edges(&self, vs: &[usize], internal: &[bool]) -> Vec<usize> {
        let mut seen = vec![false; self.g.num_edges()];
        let mut out = Vec::new();
        for &v in vs {
            for &e in self.g.out_edges(v) {
                if internal[e] && !seen[e] {
                    seen[e] = true;
                    out.push(e);
                }
            }
        }
        out
    }

    fn apply_edge_direct(&mut self, e: usize, sign: i64) {
        let w = self.eweight.get(e);
        if w == 0 {
            return;
        }
        let directed = self.g.is_directed();
        let (u, v) = self.g.endpoints(e);
        let (r, s) = (self.b[u], self.b[v]);
        debug_assert!(r != NULL_BLOCK && s != NULL_BLOCK, "direct pass before labels");
        let sym = if !directed && r == s { 2 * w } else { w };
        let rec = self.emat.entry(r, s);
        rec.mrs += sign * sym;
        debug_assert!(rec.mrs >= 0, "negative block pair aggregate");
        let fsign = sign as f64;
        for (i, (&x, &x2)) in self.recs.rec(e).iter().zip(self.recs.drec(e)).enumerate() {
            rec.brec[i] += fsign * x;
            rec.bdrec[i] += fsign * x2;
        }
        self.emat.prune(r, s);
        if directed {
            self.mrp[r] += sign * w;
            self.mrm[s] += sign * w;
        } else if u == v {
            self.mrp[r] += sign * 2 * w;
        } else {
            self.mrp[r] += sign * w;
            self.mrp[s] += sign * w;
        }
        if let Some(i) = self.dt_channel {
            let x = self.recs.rec(e)[i];
            if self.ignore_degrees[u] > 0 {
                let mult = if !directed && u == v { 2.0 } else { 1.0 };
                self.brecsum[r] += fsign * mult * x;
            }
            if !directed && u != v && self.ignore_degrees[v] > 0 {
                self.brecsum[s] += fsign * x;
            }
        }
    }

    /// Inserts a batch of detached vertices, pricing intra-batch edges once.
    pub fn add_vertices(&mut self, vs: &[usize], rs: &[usize]) -> Result<(), SbmError> {
        if vs.len() != rs.len() {
            return Err(SbmError::State(
                ErrorInfo::new("bulk-length-mismatch", "one block is required per vertex")
                    .with_context("vertices", vs.len().to_string())
                    .with_context("blocks", rs.len().to_string()),
            ));
        }
        let (_, internal) = self.batch_filter(vs)?;
        for (&v, &r) in vs.iter().zip(rs) {
            self.add_vertex_filtered(v, r, &mut |e| internal[e])?;
        }
        for e in self.internal_edges(vs, &internal) {
            self.apply_edge_direct(e, 1);
        }
        Ok(())
    }

    /// Detaches a batch of vertices, pricing intra-batch edges once.
    pub fn remove_vertices(&mut self, vs: &[usize]) -> Result<(), SbmError> {
        let (_, internal) = self.batch_filter(vs)?;
        for e in self.internal_edges(vs, &internal) {
            self.apply_edge_direct(e, -1);
        }
        for &v in vs {
            self.remove_vertex_filtered(v, &mut |e| internal[e])?;
        }
        Ok(())
    }

    /// Folds vertex `u` into vertex `v`: their edges are unified (summing
    /// weights and covariates), `u` is detached at zero weight, and the
    /// merge is recorded in the merge map. Irreversible.
    pub fn merge_vertices(&mut self, u: usize, v: usize) -> Result<(), SbmError> {
        if self.vweight.is_unit() || self.eweight.is_unit() {
            return Err(SbmError::State(
                ErrorInfo::new("unweighted-state", "cannot merge vertices of an unweighted state")
                    .with_hint("build the state with VertexWeights::Map and EdgeWeights::Map"),
            ));
        }
        if u == v {
            return Ok(());
        }
        let r_u = self.b[u];
        let r_v = self.b[v];
        self.remove_vertex(u)?;
        self.remove_vertex(v)?;
        let directed = self.g.is_directed();
        // (source, target, weight, rec, drec) records to fold into v
        let mut moved: Vec<(usize, usize, i64, Vec<f64>, Vec<f64>)> = Vec::new();
        for &e in self.g.out_edges(u) {
            let w = self.eweight.get(e);
            if w == 0 {
                continue;
            }
            let (a, b2) = self.g.endpoints(e);
            let (src, tgt) = if a == u { (v, self.remap_merge(b2, u, v)) } else {
                (self.remap_merge(a, u, v), v)
            };
            moved.push((src, tgt, w, self.recs.rec(e).to_vec(), self.recs.drec(e).to_vec()));
        }
        if directed {
            for &e in self.g.in_edges(u) {
                let (a, b2) = self.g.endpoints(e);
                if a == b2 {
                    continue;
                }
                let w = self.eweight.get(e);
                if w == 0 {
                    continue;
                }
                debug_assert_eq!(b2, u);
                moved.push((a, v, w, self.recs.rec(e).to_vec(), self.recs.drec(e).to_vec()));
            }
        }
        let cleared = self.g.clear_vertex(u);
        for e in cleared {
            self.eweight.set(e, 0)?;
            self.recs.clear_edge(e);
        }
        for (src, tgt, w, rec, drec) in moved {
            let existing = self.find_edge(src, tgt);
            match existing {
                Some(e) => {
                    self.eweight.set(e, self.eweight.get(e) + w)?;
                    self.recs.accumulate(e, &rec, &drec);
                }
                None => {
                    let e = self.g.add_edge(src, tgt)?;
                    self.eweight.ensure_len(self.g.num_edges());
                    self.recs.ensure_len(self.g.num_edges());
                    self.eweight.set(e, w)?;
                    self.recs.assign(e, rec, drec);
                }
            }
        }
        self.degs.merge(u, v);
        let wu = self.vweight.get(u);
        let wv = self.vweight.get(v);
        self.vweight.set(v, wu + wv)?;
        self.vweight.set(u, 0)?;
        self.merge_map[u] = v;
        self.add_vertex(v, r_v)?;
        // the folded vertex stays in the partition at zero weight
        self.add_vertex(u, r_u)?;
        self.neighbour_sampler = NeighbourSampler::new(&self.g, &self.eweight);
        if self.egroups.is_some() {
            self.rebuild_egroups();
        }
        Ok(())
    }

    fn remap_merge(&self, t: usize, u: usize, v: usize) -> usize {
        if t == u {
            v
        } else {
            t
        }
    }

    fn find_edge(&self, src: usize, tgt: usize) -> Option<usize> {
        for &e in self.g.out_edges(src) {
            if self.eweight.get(e) == 0 {
                continue;
            }
            let (a, b2) = self.g.endpoints(e);
            if self.g.is_directed() {
                if a == src && b2 == tgt {
                    return Some(e);
                }
            } else if (a == src && b2 == tgt) || (a == tgt && b2 == src) {
                return Some(e);
            }
        }
        None
    }

    // -- partition statistics ----------------------------------------------

    /// Enables per-class partition statistics if they are not already live.
    pub fn enable_partition_stats(&mut self) {
        if !self.partition_stats.is_empty() {
            return;
        }
        let classes = self.pclabel.iter().copied().max().unwrap_or(0) + 1;
        let mut stats: Vec<PartitionStats> = (0..classes)
            .map(|_| PartitionStats::new(self.total_b, self.allow_empty))
            .collect();
        for v in 0..self.g.num_vertices() {
            let r = self.b[v];
            if r == NULL_BLOCK {
                continue;
            }
            let n = self.node_weight(v);
            if n == 0 {
                continue;
            }
            let degs = self.degs.entries(v, &self.g, &self.eweight, &self.vweight);
            stats[self.pclabel[v]].add_vertex(r, n, &degs);
        }
        self.partition_stats = stats;
    }

    // -- entropy -----------------------------------------------------------

    /// Degree log-factorial contribution of `v` to the sparse entropy,
    /// honouring its `ignore_degrees` switch.
    pub fn get_deg_entropy(&self, v: usize) -> f64 {
        if self.ignore_degrees[v] == 1 {
            return 0.0;
        }
        let directed = self.g.is_directed();
        let out_only = self.ignore_degrees[v] == 2;
        let mut s = 0.0;
        for (kin, kout, mult) in self.degs.entries(v, &self.g, &self.eweight, &self.vweight) {
            let mut term = -lgamma_fast(kout + 1);
            if directed && !out_only {
                term -= lgamma_fast(kin + 1);
            }
            s += mult as f64 * term;
        }
        s
    }

    fn parallel_entropy(&self) -> f64 {
        let directed = self.g.is_directed();
        let mut mult: indexmap::IndexMap<(usize, usize), i64> = indexmap::IndexMap::new();
        for e in 0..self.g.num_edges() {
            let w = self.eweight.get(e);
            if w == 0 {
                continue;
            }
            let (u, v) = self.g.endpoints(e);
            let key = if directed || u <= v { (u, v) } else { (v, u) };
            *mult.entry(key).or_insert(0) += w;
        }
        let mut s = 0.0;
        for (&(u, v), &m) in &mult {
            s += lgamma_fast(m + 1);
            if u == v && !directed {
                s += m as f64 * std::f64::consts::LN_2;
            }
        }
        s
    }

    fn channel_ll(&self, p: &ChannelParams, n: i64, x: f64, x2: f64) -> f64 {
        match p.kind {
            WeightType::RealExponential => exponential_ll(n, x, p.alpha, p.beta),
            WeightType::RealNormal => {
                let v = if n > 0 { (x2 - x * (x / n as f64)).max(0.0) } else { 0.0 };
                normal_ll(n, x, v, p.alpha, p.beta, p.gamma, p.delta)
            }
            WeightType::DiscreteGeometric => geometric_ll(n, x, p.alpha, p.beta),
            WeightType::DiscretePoisson => poisson_ll(n, x, p.alpha, p.beta),
            WeightType::DiscreteBinomial => binomial_ll(n, x, p.alpha, p.beta, p.gamma),
            WeightType::DeltaT => 0.0,
        }
    }

    fn covariate_entropy(&self) -> f64 {
        let mut s = 0.0;
        for (i, p) in self.rec_params.iter().enumerate() {
            if p.kind == WeightType::DeltaT {
                for r in 0..self.total_b {
                    if self.bignore_degrees[r] > 0 {
                        s -= exponential_ll(self.mrp[r], self.brecsum[r], p.alpha, p.beta);
                    }
                }
                continue;
            }
            for ((t, s2), rec) in self.emat.iter() {
                let n = self.once_counted(t, s2, rec.mrs);
                s -= self.channel_ll(p, n, rec.brec[i], rec.bdrec[i]);
            }
            match p.kind {
                WeightType::DiscretePoisson => {
                    for e in 0..self.g.num_edges() {
                        if self.eweight.get(e) > 0 {
                            s += lgamma(self.recs.rec(e)[i] + 1.0);
                        }
                    }
                }
                WeightType::DiscreteBinomial => {
                    for e in 0..self.g.num_edges() {
                        if self.eweight.get(e) > 0 {
                            s -= lbinom(p.gamma, self.recs.rec(e)[i]);
                        }
                    }
                }
                _ => {}
            }
        }
        s
    }

    /// Full description length of the current state under `args`.
    pub fn entropy(&mut self, args: EntropyArgs) -> Result<f64, SbmError> {
        if args.partition_dl || args.degree_dl || args.edges_dl {
            self.enable_partition_stats();
        }
        let directed = self.g.is_directed();
        let mut s = 0.0;
        if args.adjacency {
            if args.dense {
                if self.deg_corr {
                    return Err(dense_deg_corr_error());
                }
                for ((r, s2), rec) in self.emat.iter() {
                    let ers = self.once_counted(r, s2, rec.mrs);
                    s += edge_term_dense(
                        r,
                        s2,
                        ers,
                        self.wr[r],
                        self.wr[s2],
                        args.multigraph,
                        directed,
                    );
                }
            } else {
                for ((r, s2), rec) in self.emat.iter() {
                    s += if args.exact {
                        edge_term_exact(r, s2, rec.mrs, directed)
                    } else {
                        edge_term(r, s2, rec.mrs, directed)
                    };
                }
                for r in 0..self.total_b {
                    s += if args.exact {
                        vertex_term_exact(
                            self.mrp[r],
                            self.mrm_of(r),
                            self.wr[r],
                            self.deg_corr,
                            directed,
                        )
                    } else {
                        vertex_term(
                            self.mrp[r],
                            self.mrm_of(r),
                            self.wr[r],
                            self.deg_corr,
                            directed,
                        )
                    };
                }
                if self.deg_corr && args.deg_entropy {
                    for v in 0..self.g.num_vertices() {
                        if self.b[v] != NULL_BLOCK {
                            s += self.get_deg_entropy(v);
                        }
                    }
                }
                if args.multigraph {
                    s += self.parallel_entropy();
                }
            }
        }
        if args.recs && self.recs.channels() > 0 {
            s += self.covariate_entropy();
        }
        if args.partition_dl {
            for ps in &self.partition_stats {
                s += ps.get_partition_dl();
            }
        }
        if args.degree_dl && self.deg_corr {
            for ps in &self.partition_stats {
                s += ps.get_deg_dl(args.degree_dl_kind, directed);
            }
        }
        if args.edges_dl {
            s += edges_dl(self.active_blocks(), self.total_e, directed);
        }
        if args.recurse {
            if let Some(mut bx) = self.coupled.take() {
                let res = bx.0.entropy(bx.1);
                self.coupled = Some(bx);
                s += res?;
            }
        }
        Ok(s)
    }

    /// Block-pair deltas that committing `v`'s move from `r` to `nr` would
    /// apply; used for reverse proposal probabilities.
    pub fn move_entries(&self, v: usize, r: usize, nr: usize) -> EntrySet {
        let mut entries = EntrySet::new(self.g.is_directed(), self.recs.channels());
        entries.collect(
            &self.g,
            &self.eweight,
            &self.recs,
            &self.b,
            v,
            r,
            nr,
            |_| false,
        );
        entries
    }

    fn sparse_delta(&self, v: usize, r: usize, nr: usize, entries: &EntrySet, exact: bool) -> f64 {
        let directed = self.g.is_directed();
        let mut ds = 0.0;
        for ((t, s2), d) in entries.iter() {
            if d.dmrs == 0 {
                continue;
            }
            let old = self.emat.get_mrs(t, s2);
            let new = old + d.dmrs;
            debug_assert!(new >= 0, "virtual move drives a pair negative");
            ds += if exact {
                edge_term_exact(t, s2, new, directed) - edge_term_exact(t, s2, old, directed)
            } else {
                edge_term(t, s2, new, directed) - edge_term(t, s2, old, directed)
            };
        }
        let n = self.node_weight(v);
        let kout = self.g.out_degree_weighted(v, &self.eweight);
        let kin = if directed {
            self.g.in_degree_weighted(v, &self.eweight)
        } else {
            kout
        };
        let dwr = n;
        // Attaching a zero-weight vertex still occupies the target block.
        let dwnr = if r == NULL_BLOCK && n == 0 { 1 } else { n };
        for (blk, sgn, dw) in [(r, -1i64, dwr), (nr, 1i64, dwnr)] {
            if blk == NULL_BLOCK {
                continue;
            }
            let mrp0 = self.mrp[blk];
            let mrm0 = self.mrm_of(blk);
            let wr0 = self.wr[blk];
            let (mrp1, mrm1, wr1) = (mrp0 + sgn * kout, mrm0 + sgn * kin, wr0 + sgn * dw);
            ds += if exact {
                vertex_term_exact(mrp1, mrm1, wr1, self.deg_corr, directed)
                    - vertex_term_exact(mrp0, mrm0, wr0, self.deg_corr, directed)
            } else {
                vertex_term(mrp1, mrm1, wr1, self.deg_corr, directed)
                    - vertex_term(mrp0, mrm0, wr0, self.deg_corr, directed)
            };
        }
        ds
    }

    fn dense_pair_delta(
        &self,
        a: usize,
        t: usize,
        entries: &EntrySet,
        dwr: &dyn Fn(usize) -> i64,
        multigraph: bool,
    ) -> f64 {
        let directed = self.g.is_directed();
        let m0 = self.emat.get_mrs(a, t);
        let d = entries.get_delta(a, t);
        let ers0 = self.once_counted(a, t, m0);
        let ers1 = self.once_counted(a, t, m0 + d);
        let (wa0, wt0) = (self.wr[a], self.wr[t]);
        let (wa1, wt1) = (wa0 + dwr(a), wt0 + dwr(t));
        edge_term_dense(a, t, ers1, wa1, wt1, multigraph, directed)
            - edge_term_dense(a, t, ers0, wa0, wt0, multigraph, directed)
    }

    fn dense_delta(
        &self,
        v: usize,
        r: usize,
        nr: usize,
        entries: &EntrySet,
        multigraph: bool,
    ) -> f64 {
        let directed = self.g.is_directed();
        let n = self.node_weight(v);
        // Attaching a zero-weight vertex still occupies the target block.
        let dwnr = if r == NULL_BLOCK && n == 0 { 1 } else { n };
        let dwr = move |blk: usize| -> i64 {
            if blk == r {
                -n
            } else if blk == nr {
                dwnr
            } else {
                0
            }
        };
        let mut ds = 0.0;
        for t in 0..self.total_b {
            if t == r || t == nr {
                continue;
            }
            for a in [r, nr] {
                if a == NULL_BLOCK {
                    continue;
                }
                ds += self.dense_pair_delta(a, t, entries, &dwr, multigraph);
                if directed {
                    ds += self.dense_pair_delta(t, a, entries, &dwr, multigraph);
                }
            }
        }
        for a in [r, nr] {
            if a == NULL_BLOCK {
                continue;
            }
            ds += self.dense_pair_delta(a, a, entries, &dwr, multigraph);
        }
        if r != NULL_BLOCK && nr != NULL_BLOCK {
            ds += self.dense_pair_delta(r, nr, entries, &dwr, multigraph);
            if directed {
                ds += self.dense_pair_delta(nr, r, entries, &dwr, multigraph);
            }
        }
        ds
    }

    fn covariate_delta(&self, v: usize, r: usize, nr: usize, entries: &EntrySet) -> f64 {
        let mut ds = 0.0;
        for (i, p) in self.rec_params.iter().enumerate() {
            if p.kind == WeightType::DeltaT {
                if self.ignore_degrees[v] > 0 {
                    let kout = self.g.out_degree_weighted(v, &self.eweight);
                    let dt = self.g.out_sum(v, |e| {
                        if self.eweight.get(e) > 0 {
                            self.recs.rec(e)[i]
                        } else {
                            0.0
                        }
                    });
                    for (blk, sgn) in [(r, -1i64), (nr, 1i64)] {
                        if blk == NULL_BLOCK {
                            continue;
                        }
                        let n0 = self.mrp[blk];
                        let x0 = self.brecsum[blk];
                        let n1 = n0 + sgn * kout;
                        let x1 = x0 + sgn as f64 * dt;
                        ds += exponential_ll(n0, x0, p.alpha, p.beta)
                            - exponential_ll(n1, x1, p.alpha, p.beta);
                    }
                }
                continue;
            }
            for ((t, s2), d) in entries.iter() {
                let (m0, x0, x20) = match self.emat.get(t, s2) {
                    Some(rec) => (rec.mrs, rec.brec[i], rec.bdrec[i]),
                    None => (0, 0.0, 0.0),
                };
                let m1 = m0 + d.dmrs;
                let x1 = x0 + d.drec[i];
                let x21 = x20 + d.ddrec[i];
                let n0 = self.once_counted(t, s2, m0);
                let n1 = self.once_counted(t, s2, m1);
                ds += self.channel_ll(p, n0, x0, x20) - self.channel_ll(p, n1, x1, x21);
            }
        }
        ds
    }

    /// Entropy difference of moving `v` from `r` to `nr`, without mutating
    /// the state. Either side may be [`NULL_BLOCK`] for a pure removal or
    /// insertion (used by the coupled hierarchy).
    pub fn virtual_move(
        &mut self,
        v: usize,
        r: usize,
        nr: usize,
        args: EntropyArgs,
    ) -> Result<f64, SbmError> {
        if r == nr {
            return Ok(0.0);
        }
        if r != NULL_BLOCK && nr != NULL_BLOCK && !self.allow_move(r, nr) {
            return Ok(f64::INFINITY);
        }
        if args.partition_dl || args.degree_dl || args.edges_dl {
            self.enable_partition_stats();
        }
        let entries = self.move_entries(v, r, nr);
        let mut ds = 0.0;
        if args.adjacency {
            if args.dense {
                if self.deg_corr {
                    return Err(dense_deg_corr_error());
                }
                ds += self.dense_delta(v, r, nr, &entries, args.multigraph);
            } else {
                ds += self.sparse_delta(v, r, nr, &entries, args.exact);
            }
        }
        let n = self.node_weight(v);
        let class = self.pclabel[v];
        if args.partition_dl {
            ds += self.partition_stats[class].get_delta_partition_dl(r, nr, n);
        }
        if args.degree_dl && self.deg_corr {
            let degs = self.degs.entries(v, &self.g, &self.eweight, &self.vweight);
            ds += self.partition_stats[class].get_delta_deg_dl(
                r,
                nr,
                n,
                &degs,
                args.degree_dl_kind,
                self.g.is_directed(),
            );
        }
        if args.edges_dl {
            let b_active = self.active_blocks();
            ds += self.partition_stats[class].get_delta_edges_dl(
                r,
                nr,
                n,
                b_active,
                self.total_e,
                self.g.is_directed(),
            );
        }
        if args.recs && self.recs.channels() > 0 {
            ds += self.covariate_delta(v, r, nr, &entries);
        }
        if let Some(mut bx) = self.coupled.take() {
            let vacate = r != NULL_BLOCK && n > 0 && self.wr[r] == n;
            let occupy = nr != NULL_BLOCK && n > 0 && self.wr[nr] == 0;
            // A simultaneous vacate and occupy swaps one parent member for
            // another, leaving the parent description length unchanged.
            if vacate == occupy {
                self.coupled = Some(bx);
            } else {
                let pargs = bx.1;
                let res = if vacate {
                    let pr = bx.0.b[r];
                    bx.0.virtual_move(r, pr, NULL_BLOCK, pargs)
                } else {
                    let bcl = if r != NULL_BLOCK {
                        self.bclabel[r]
                    } else {
                        self.bclabel[nr]
                    };
                    bx.0.virtual_move(nr, NULL_BLOCK, bcl, pargs)
                };
                self.coupled = Some(bx);
                ds += res?;
            }
        }
        Ok(ds)
    }

    // -- proposals ---------------------------------------------------------

    /// Prepares the proposal samplers for a run with coupling strength `c`.
    /// Finite `c` builds the per-block edge groups, infinite `c` drops them.
    pub fn init_mcmc(&mut self, c: f64) {
        if c.is_finite() {
            self.rebuild_egroups();
        } else {
            self.egroups = None;
        }
    }

    fn rebuild_egroups(&mut self) {
        self.egroups = Some(EdgeGroups::new(self.total_b));
        for v in 0..self.g.num_vertices() {
            let r = self.b[v];
            if r != NULL_BLOCK {
                self.egroups_register(v, r, true);
            }
        }
    }

    fn random_candidate<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        let cand_len = self.candidate_blocks.len();
        let bn = if self.empty_blocks.is_empty() {
            cand_len - 1
        } else {
            cand_len
        };
        let idx = rng.gen_range(1..=bn);
        if idx < cand_len {
            self.candidate_blocks[idx]
        } else {
            self.empty_blocks[rng.gen_range(0..self.empty_blocks.len())]
        }
    }

    /// Proposes a block for `v`: a mixture of a degree-biased local proposal
    /// through a random neighbour's block and a uniform draw over candidate
    /// blocks (plus one currently empty block when any exists).
    pub fn sample_block<R: Rng + ?Sized>(&self, v: usize, c: f64, rng: &mut R) -> usize {
        if c.is_infinite() {
            return self.random_candidate(rng);
        }
        let Some(u) = self.neighbour_sampler.sample(v, rng) else {
            return self.random_candidate(rng);
        };
        let t = self.b[u];
        if t == NULL_BLOCK {
            return self.random_candidate(rng);
        }
        let cand_len = self.candidate_blocks.len();
        let bn = if self.empty_blocks.is_empty() {
            cand_len - 1
        } else {
            cand_len
        } as f64;
        let mt = if self.g.is_directed() {
            (self.mrp[t] + self.mrm[t]) as f64
        } else {
            self.mrp[t] as f64
        };
        let p_rand = if c > 0.0 { c * bn / (mt + c * bn) } else { 0.0 };
        if p_rand > 0.0 && rng.gen::<f64>() < p_rand {
            return self.random_candidate(rng);
        }
        let sampled = self
            .egroups
            .as_ref()
            .and_then(|eg| eg.sample(t, &self.eweight, rng));
        match sampled {
            Some((e, side)) => {
                let (a, b2) = self.g.endpoints(e);
                // the opposite endpoint of the sampled half-edge
                let w = if side { a } else { b2 };
                match self.b[w] {
                    NULL_BLOCK => self.random_candidate(rng),
                    s => s,
                }
            }
            None => self.random_candidate(rng),
        }
    }

    /// Probability that [`sample_block`] proposes `s` for `v` currently in
    /// `r`. With `reverse`, the probability is evaluated in the state the
    /// forward move (whose deltas are `entries`) would produce; callers pass
    /// the swapped blocks `(v, nr, r)` for the return move.
    ///
    /// [`sample_block`]: BlockState::sample_block
    pub fn get_move_prob(
        &self,
        v: usize,
        r: usize,
        s: usize,
        c: f64,
        reverse: bool,
        entries: Option<&EntrySet>,
    ) -> f64 {
        let directed = self.g.is_directed();
        let cand_len = self.candidate_blocks.len() as i64;
        let empties = self.empty_blocks.len() as i64;
        let (cand_eff, empt_eff) = if reverse {
            let n = self.node_weight(v);
            let vacated = n > 0 && self.wr[s] == n;
            let occupied = n > 0 && self.wr[r] == 0;
            let mut ce = cand_len;
            let mut ee = empties;
            if vacated {
                ee += 1;
                ce -= 1;
            }
            if occupied {
                ee -= 1;
                ce += 1;
            }
            (ce, ee)
        } else {
            (cand_len, empties)
        };
        let bn = if empt_eff == 0 { cand_eff - 1 } else { cand_eff } as f64;
        if c.is_infinite() {
            return 1.0 / bn;
        }
        let kout = self.g.out_degree_weighted(v, &self.eweight);
        let kin = if directed {
            self.g.in_degree_weighted(v, &self.eweight)
        } else {
            kout
        };
        let mut p = 0.0;
        let mut wtot = 0i64;
        let mut scan = |edges: &[usize], state: &BlockState| {
            for &e in edges {
                let u = state.g.opposite(e, v);
                if u == v {
                    continue;
                }
                let w = state.eweight.get(e);
                if w == 0 {
                    continue;
                }
                let t = state.b[u];
                if t == NULL_BLOCK {
                    continue;
                }
                wtot += w;
                let mut mts = state.emat.get_mrs(t, s) as f64;
                let mut mtp = state.mrp[t] as f64;
                let (mut mst, mut mtm) = if directed {
                    (state.emat.get_mrs(s, t) as f64, state.mrm[t] as f64)
                } else {
                    (0.0, 0.0)
                };
                if reverse {
                    if let Some(en) = entries {
                        mts += en.get_delta(t, s) as f64;
                        if directed {
                            mst += en.get_delta(s, t) as f64;
                        }
                    }
                    if t == r {
                        mtp += kout as f64;
                        if directed {
                            mtm += kin as f64;
                        }
                    } else if t == s {
                        mtp -= kout as f64;
                        if directed {
                            mtm -= kin as f64;
                        }
                    }
                }
                let (num, denom) = if directed {
                    (mts + mst + c, mtp + mtm + c * bn)
                } else {
                    (mts + c, mtp + c * bn)
                };
                if denom > 0.0 {
                    p += w as f64 * num / denom;
                }
            }
        };
        scan(self.g.out_edges(v), self);
        if directed {
            scan(self.g.in_edges(v), self);
        }
        if wtot == 0 {
            return 1.0 / bn;
        }
        p / wtot as f64
    }

    // -- hierarchy ---------------------------------------------------------

    /// Attaches a parent level whose vertices are this state's blocks.
    /// Commits that vacate or occupy a block propagate upward, priced with
    /// `parent_args`.
    pub fn couple(&mut self, parent: BlockState, parent_args: EntropyArgs) {
        self.coupled = Some(Box::new((parent, parent_args)));
    }

    /// Detaches and returns the parent level, if any.
    pub fn decouple(&mut self) -> Option<(BlockState, EntropyArgs)> {
        self.coupled.take().map(|bx| *bx)
    }

    /// The attached parent level, if any.
    pub fn coupled_state(&self) -> Option<&BlockState> {
        self.coupled.as_ref().map(|bx| &bx.0)
    }

    // -- consistency hooks -------------------------------------------------

    /// Recomputes every edge-level aggregate from scratch and compares it
    /// with the maintained values.
    pub fn check_edge_counts(&self) -> bool {
        let directed = self.g.is_directed();
        let channels = self.recs.channels();
        let mut fresh = BlockEdgeIndex::new_hash(directed, channels);
        let mut mrp = vec![0i64; self.total_b];
        let mut mrm = vec![0i64; self.total_b];
        let mut brecsum = vec![0.0; self.total_b];
        for e in 0..self.g.num_edges() {
            let w = self.eweight.get(e);
            if w == 0 {
                continue;
            }
            let (u, v) = self.g.endpoints(e);
            let (r, s) = (self.b[u], self.b[v]);
            if r == NULL_BLOCK || s == NULL_BLOCK {
                continue;
            }
            let sym = if !directed && r == s { 2 * w } else { w };
            let rec = fresh.entry(r, s);
            rec.mrs += sym;
            for (i, (&x, &x2)) in self.recs.rec(e).iter().zip(self.recs.drec(e)).enumerate() {
                rec.brec[i] += x;
                rec.bdrec[i] += x2;
            }
            if directed {
                mrp[r] += w;
                mrm[s] += w;
            } else if u == v {
                mrp[r] += 2 * w;
            } else {
                mrp[r] += w;
                mrp[s] += w;
            }
        }
        if let Some(i) = self.dt_channel {
            for v in 0..self.g.num_vertices() {
                if self.b[v] != NULL_BLOCK && self.ignore_degrees[v] > 0 {
                    brecsum[self.b[v]] += self.g.out_sum(v, |e| {
                        if self.eweight.get(e) > 0 {
                            self.recs.rec(e)[i]
                        } else {
                            0.0
                        }
                    });
                }
            }
        }
        let close = |a: f64, b: f64| (a - b).abs() < 1e-8;
        for ((r, s), rec) in fresh.iter() {
            let held = self.emat.get(r, s);
            let Some(held) = held else {
                if rec.mrs != 0 {
                    return false;
                }
                continue;
            };
            if held.mrs != rec.mrs {
                return false;
            }
            for i in 0..channels {
                if !close(held.brec[i], rec.brec[i]) || !close(held.bdrec[i], rec.bdrec[i]) {
                    return false;
                }
            }
        }
        for ((r, s), rec) in self.emat.iter() {
            if fresh.get_mrs(r, s) != rec.mrs {
                return false;
            }
        }
        for r in 0..self.total_b {
            if self.mrp[r] != mrp[r] {
                return false;
            }
            if directed && self.mrm[r] != mrm[r] {
                return false;
            }
            if self.dt_channel.is_some() && !close(self.brecsum[r], brecsum[r]) {
                return false;
            }
        }
        true
    }

    /// Recomputes block weights from the partition and compares them and the
    /// occupancy pools with the maintained values.
    pub fn check_node_counts(&self) -> bool {
        let mut wr = vec![0i64; self.total_b];
        for v in 0..self.g.num_vertices() {
            if self.b[v] != NULL_BLOCK {
                wr[self.b[v]] += self.vweight.get(v);
            }
        }
        if wr != self.wr {
            return false;
        }
        for r in 0..self.total_b {
            let in_empty = self.empty_pos[r] != usize::MAX;
            if in_empty != (self.wr[r] == 0) {
                return false;
            }
            let in_cand = self.candidate_pos[r] != usize::MAX;
            if in_cand != (self.wr[r] > 0) {
                return false;
            }
        }
        true
    }
}

fn dense_deg_corr_error() -> SbmError {
    SbmError::Config(
        ErrorInfo::new(
            "dense-deg-corr",
            "the dense model does not support degree correction",
        )
        .with_hint("disable degree correction or use the sparse evaluator"),
    )
}

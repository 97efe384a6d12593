//! Description lengths of the partition, degree sequence, and edge counts.
//!
//! One [`PartitionStats`] instance covers one partition-label class: the
//! vertices sharing a `pclabel` value and the blocks they may occupy. All
//! description-length deltas are evaluated against the class the moved
//! vertex belongs to.

use indexmap::IndexMap;

use crate::config::DegDlKind;
use crate::terms::{lbinom, lgamma_fast, xlogx};
use crate::NULL_BLOCK;

/// Prior cost of the block-pair edge counts given `b_active` occupied blocks
/// and total edge weight `e_total`.
pub fn edges_dl(b_active: usize, e_total: i64, directed: bool) -> f64 {
    let b = b_active as f64;
    let x = if directed { b * b } else { b * (b + 1.0) / 2.0 };
    lbinom(x + e_total as f64 - 1.0, e_total as f64)
}

/// Partition and degree-sequence bookkeeping for one label class.
#[derive(Debug, Clone)]
pub struct PartitionStats {
    /// Total vertex weight of the class.
    n_total: i64,
    /// Blocks the class may occupy, empty or not.
    total_b: usize,
    /// Occupied block count.
    actual_b: usize,
    /// Whether moves may leave blocks empty.
    allow_empty: bool,
    /// Per-block vertex weight.
    counts: IndexMap<usize, i64>,
    /// Per-block weighted out-degree totals.
    ep: IndexMap<usize, i64>,
    /// Per-block weighted in-degree totals.
    em: IndexMap<usize, i64>,
    /// Per-block degree histograms, keyed on `(kin, kout)`.
    hist: IndexMap<usize, IndexMap<(i64, i64), i64>>,
}

impl PartitionStats {
    /// Creates empty bookkeeping for a class spanning `total_b` blocks.
    pub fn new(total_b: usize, allow_empty: bool) -> Self {
        PartitionStats {
            n_total: 0,
            total_b,
            actual_b: 0,
            allow_empty,
            counts: IndexMap::new(),
            ep: IndexMap::new(),
            em: IndexMap::new(),
            hist: IndexMap::new(),
        }
    }

    /// Total vertex weight registered in the class.
    pub fn total_weight(&self) -> i64 {
        self.n_total
    }

    /// Number of occupied blocks.
    pub fn get_actual_b(&self) -> usize {
        self.actual_b
    }

    /// Vertex weight held by block `r`.
    pub fn count(&self, r: usize) -> i64 {
        self.counts.get(&r).copied().unwrap_or(0)
    }

    /// Registers a vertex of weight `n` with degree histogram `degs` in
    /// block `r`.
    pub fn add_vertex(&mut self, r: usize, n: i64, degs: &[(i64, i64, i64)]) {
        if n == 0 && degs.is_empty() {
            return;
        }
        let cnt = self.counts.entry(r).or_insert(0);
        if *cnt == 0 && n > 0 {
            self.actual_b += 1;
        }
        *cnt += n;
        self.n_total += n;
        let hist = self.hist.entry(r).or_insert_with(IndexMap::new);
        let mut kout_sum = 0;
        let mut kin_sum = 0;
        for &(kin, kout, mult) in degs {
            kout_sum += kout * mult;
            kin_sum += kin * mult;
            *hist.entry((kin, kout)).or_insert(0) += mult;
        }
        *self.ep.entry(r).or_insert(0) += kout_sum;
        *self.em.entry(r).or_insert(0) += kin_sum;
    }

    /// Removes a vertex of weight `n` with degree histogram `degs` from
    /// block `r`.
    pub fn remove_vertex(&mut self, r: usize, n: i64, degs: &[(i64, i64, i64)]) {
        if n == 0 && degs.is_empty() {
            return;
        }
        if let Some(cnt) = self.counts.get_mut(&r) {
            *cnt -= n;
            debug_assert!(*cnt >= 0, "negative block count");
            if *cnt == 0 && n > 0 {
                self.actual_b -= 1;
            }
        }
        self.n_total -= n;
        if let Some(hist) = self.hist.get_mut(&r) {
            for &(kin, kout, mult) in degs {
                if let Some(c) = hist.get_mut(&(kin, kout)) {
                    *c -= mult;
                    if *c == 0 {
                        hist.swap_remove(&(kin, kout));
                    }
                }
            }
        }
        let mut kout_sum = 0;
        let mut kin_sum = 0;
        for &(kin, kout, mult) in degs {
            kout_sum += kout * mult;
            kin_sum += kin * mult;
        }
        if let Some(ep) = self.ep.get_mut(&r) {
            *ep -= kout_sum;
        }
        if let Some(em) = self.em.get_mut(&r) {
            *em -= kin_sum;
        }
    }

    /// Description length of the class partition: block occupancy prior plus
    /// the multinomial term over block sizes.
    pub fn get_partition_dl(&self) -> f64 {
        let n = self.n_total as f64;
        let mut s = if self.allow_empty {
            lbinom(self.total_b as f64 + n - 1.0, n)
        } else {
            lbinom(n - 1.0, self.actual_b as f64 - 1.0)
        };
        s += lgamma_fast(self.n_total + 1);
        for &cnt in self.counts.values() {
            s -= lgamma_fast(cnt + 1);
        }
        s
    }

    /// Change in [`get_partition_dl`] when a vertex of weight `n` moves from
    /// `r` to `nr`. Either side may be [`NULL_BLOCK`], meaning the vertex
    /// enters or leaves the class.
    ///
    /// [`get_partition_dl`]: PartitionStats::get_partition_dl
    pub fn get_delta_partition_dl(&self, r: usize, nr: usize, n: i64) -> f64 {
        if r == nr {
            return 0.0;
        }
        let n = if n == 0 { 1 } else { n };
        let mut ds = 0.0;
        let mut dn = 0i64;
        let mut db = 0i64;
        if r != NULL_BLOCK {
            let cnt = self.count(r);
            ds += lgamma_fast(cnt + 1) - lgamma_fast(cnt - n + 1);
            if cnt == n {
                db -= 1;
            }
        } else {
            dn += n;
        }
        if nr != NULL_BLOCK {
            let cnt = self.count(nr);
            ds += lgamma_fast(cnt + 1) - lgamma_fast(cnt + n + 1);
            if cnt == 0 {
                db += 1;
            }
        } else {
            dn -= n;
        }
        if dn != 0 {
            ds += lgamma_fast(self.n_total + dn + 1) - lgamma_fast(self.n_total + 1);
        }
        let n_before = self.n_total as f64;
        let n_after = (self.n_total + dn) as f64;
        if self.allow_empty {
            ds += lbinom(self.total_b as f64 + n_after - 1.0, n_after)
                - lbinom(self.total_b as f64 + n_before - 1.0, n_before);
        } else {
            let b_before = self.actual_b as f64;
            let b_after = (self.actual_b as i64 + db) as f64;
            ds += lbinom(n_after - 1.0, b_after - 1.0) - lbinom(n_before - 1.0, b_before - 1.0);
        }
        ds
    }

    fn deg_dl_term(
        &self,
        cnt: i64,
        ep: i64,
        em: i64,
        hist: Option<&IndexMap<(i64, i64), i64>>,
        kind: DegDlKind,
        directed: bool,
    ) -> f64 {
        match kind {
            DegDlKind::Entropy => {
                let mut s = xlogx(cnt as f64);
                if let Some(hist) = hist {
                    for &c in hist.values() {
                        s -= xlogx(c as f64);
                    }
                }
                s
            }
            DegDlKind::Uniform => {
                let mut s = lbinom(cnt as f64 + ep as f64 - 1.0, ep as f64);
                if directed {
                    s += lbinom(cnt as f64 + em as f64 - 1.0, em as f64);
                }
                s
            }
        }
    }

    /// Description length of the within-block degree sequences.
    pub fn get_deg_dl(&self, kind: DegDlKind, directed: bool) -> f64 {
        let mut s = 0.0;
        for (&r, &cnt) in &self.counts {
            if cnt == 0 {
                continue;
            }
            let ep = self.ep.get(&r).copied().unwrap_or(0);
            let em = self.em.get(&r).copied().unwrap_or(0);
            s += self.deg_dl_term(cnt, ep, em, self.hist.get(&r), kind, directed);
        }
        s
    }

    /// Change in [`get_deg_dl`] when a vertex of weight `n` and degree
    /// histogram `degs` moves from `r` to `nr`.
    ///
    /// [`get_deg_dl`]: PartitionStats::get_deg_dl
    pub fn get_delta_deg_dl(
        &self,
        r: usize,
        nr: usize,
        n: i64,
        degs: &[(i64, i64, i64)],
        kind: DegDlKind,
        directed: bool,
    ) -> f64 {
        if r == nr {
            return 0.0;
        }
        let n = if n == 0 { 1 } else { n };
        let mut kout_sum = 0;
        let mut kin_sum = 0;
        for &(kin, kout, mult) in degs {
            kout_sum += kout * mult;
            kin_sum += kin * mult;
        }
        let mut ds = 0.0;
        if r != NULL_BLOCK {
            ds += self.delta_deg_dl_side(r, -n, -kout_sum, -kin_sum, degs, -1, kind, directed);
        }
        if nr != NULL_BLOCK {
            ds += self.delta_deg_dl_side(nr, n, kout_sum, kin_sum, degs, 1, kind, directed);
        }
        ds
    }

    #[allow(clippy::too_many_arguments)]
    fn delta_deg_dl_side(
        &self,
        r: usize,
        dn: i64,
        dkout: i64,
        dkin: i64,
        degs: &[(i64, i64, i64)],
        sign: i64,
        kind: DegDlKind,
        directed: bool,
    ) -> f64 {
        let cnt = self.count(r);
        let ep = self.ep.get(&r).copied().unwrap_or(0);
        let em = self.em.get(&r).copied().unwrap_or(0);
        match kind {
            DegDlKind::Uniform => {
                self.deg_dl_term(cnt + dn, ep + dkout, em + dkin, None, kind, directed)
                    - self.deg_dl_term(cnt, ep, em, None, kind, directed)
            }
            DegDlKind::Entropy => {
                let mut ds = xlogx((cnt + dn) as f64) - xlogx(cnt as f64);
                let hist = self.hist.get(&r);
                for &(kin, kout, mult) in degs {
                    let c = hist
                        .and_then(|h| h.get(&(kin, kout)))
                        .copied()
                        .unwrap_or(0);
                    ds -= xlogx((c + sign * mult) as f64) - xlogx(c as f64);
                }
                ds
            }
        }
    }

    /// Change in the edge-count prior when the move changes the occupied
    /// block count. `b_active` is the occupied block total across all
    /// classes and `e_total` the total edge weight.
    pub fn get_delta_edges_dl(
        &self,
        r: usize,
        nr: usize,
        n: i64,
        b_active: usize,
        e_total: i64,
        directed: bool,
    ) -> f64 {
        if r == nr || self.allow_empty {
            return 0.0;
        }
        let n = if n == 0 { 1 } else { n };
        let mut db = 0i64;
        if r != NULL_BLOCK && self.count(r) == n {
            db -= 1;
        }
        if nr != NULL_BLOCK && self.count(nr) == 0 {
            db += 1;
        }
        if db == 0 {
            return 0.0;
        }
        edges_dl((b_active as i64 + db) as usize, e_total, directed)
            - edges_dl(b_active, e_total, directed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple_deg(k: i64) -> Vec<(i64, i64, i64)> {
        vec![(k, k, 1)]
    }

    #[test]
    fn partition_dl_delta_matches_recompute() {
        let mut ps = PartitionStats::new(3, false);
        ps.add_vertex(0, 1, &simple_deg(2));
        ps.add_vertex(0, 1, &simple_deg(1));
        ps.add_vertex(1, 1, &simple_deg(3));
        let before = ps.get_partition_dl();
        let delta = ps.get_delta_partition_dl(0, 2, 1);
        let degs = simple_deg(1);
        ps.remove_vertex(0, 1, &degs);
        ps.add_vertex(2, 1, &degs);
        let after = ps.get_partition_dl();
        assert!((after - before - delta).abs() < 1e-10);
    }

    #[test]
    fn deg_dl_delta_matches_recompute() {
        for kind in [DegDlKind::Uniform, DegDlKind::Entropy] {
            let mut ps = PartitionStats::new(2, false);
            ps.add_vertex(0, 1, &simple_deg(2));
            ps.add_vertex(0, 1, &simple_deg(2));
            ps.add_vertex(1, 1, &simple_deg(1));
            let degs = simple_deg(2);
            let before = ps.get_deg_dl(kind, false);
            let delta = ps.get_delta_deg_dl(0, 1, 1, &degs, kind, false);
            ps.remove_vertex(0, 1, &degs);
            ps.add_vertex(1, 1, &degs);
            let after = ps.get_deg_dl(kind, false);
            assert!((after - before - delta).abs() < 1e-10, "{kind:?}");
        }
    }

    #[test]
    fn vacating_a_block_changes_edges_dl() {
        let mut ps = PartitionStats::new(2, false);
        ps.add_vertex(0, 1, &simple_deg(1));
        ps.add_vertex(1, 1, &simple_deg(1));
        let ds = ps.get_delta_edges_dl(0, 1, 1, 2, 1, false);
        let expected = edges_dl(1, 1, false) - edges_dl(2, 1, false);
        assert!((ds - expected).abs() < 1e-12);
    }
}

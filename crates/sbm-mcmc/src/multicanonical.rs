//! Multicanonical sampling over the description length.
//!
//! The sampler random-walks across a fixed entropy window `[s_min, s_max)`
//! divided into uniform bins, reweighting proposals by the running density
//! of states estimate so that the walk visits all entropy levels with
//! near-uniform frequency. With the 1/t refinement enabled the density
//! updates shrink over time and the estimate converges.

use rand::Rng;
use serde::{Deserialize, Serialize};

use sbm_core::{ErrorInfo, SbmError};
use sbm_state::{BlockState, EntropyArgs};

/// Parameters of a multicanonical run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MulticanonicalConfig {
    /// Lower edge of the entropy window.
    pub s_min: f64,
    /// Upper edge of the entropy window (exclusive).
    pub s_max: f64,
    /// Number of uniform histogram bins across the window.
    pub bins: usize,
    /// Initial density increment per visit.
    pub f_initial: f64,
    /// Apply the 1/t refinement schedule to the increment.
    pub refine: bool,
    /// Stop a sweep as soon as the walk enters this bin.
    pub target_bin: Option<usize>,
    /// Proposals attempted per sweep.
    pub niter: usize,
    /// Coupling strength of the block proposal mixture; infinite means
    /// uniform proposals.
    pub c: f64,
    /// Entropy terms priced during the walk.
    pub entropy_args: EntropyArgs,
}

impl Default for MulticanonicalConfig {
    fn default() -> Self {
        MulticanonicalConfig {
            s_min: 0.0,
            s_max: 1.0,
            bins: 1000,
            f_initial: 1.0,
            refine: false,
            target_bin: None,
            niter: 1000,
            c: 1.0,
            entropy_args: EntropyArgs::default(),
        }
    }
}

impl MulticanonicalConfig {
    /// Validates the window geometry and schedule parameters.
    pub fn validate(&self) -> Result<(), SbmError> {
        if !(self.s_max > self.s_min) {
            return Err(SbmError::Sweep(
                ErrorInfo::new("empty-window", "the entropy window is empty")
                    .with_context("s_min", self.s_min.to_string())
                    .with_context("s_max", self.s_max.to_string()),
            ));
        }
        if self.bins == 0 {
            return Err(SbmError::Sweep(ErrorInfo::new(
                "empty-histogram",
                "at least one histogram bin is required",
            )));
        }
        if !(self.f_initial > 0.0) {
            return Err(SbmError::Sweep(ErrorInfo::new(
                "bad-increment",
                "the density increment must be positive",
            )));
        }
        if let Some(t) = self.target_bin {
            if t >= self.bins {
                return Err(SbmError::Sweep(
                    ErrorInfo::new("target-out-of-range", "target bin exceeds the histogram")
                        .with_context("target", t.to_string())
                        .with_context("bins", self.bins.to_string()),
                ));
            }
        }
        Ok(())
    }
}

/// Running state of a multicanonical walk over a [`BlockState`].
pub struct MulticanonicalState<'a> {
    state: &'a mut BlockState,
    vlist: &'a [usize],
    cfg: MulticanonicalConfig,
    hist: Vec<u64>,
    dens: Vec<f64>,
    s: f64,
    f: f64,
    time: f64,
}

impl<'a> MulticanonicalState<'a> {
    /// Wraps `state` for a walk over the vertices in `vlist`, computing the
    /// entering entropy and preparing the proposal samplers.
    pub fn new(
        state: &'a mut BlockState,
        vlist: &'a [usize],
        cfg: MulticanonicalConfig,
    ) -> Result<Self, SbmError> {
        cfg.validate()?;
        if vlist.is_empty() {
            return Err(SbmError::Sweep(ErrorInfo::new(
                "empty-vertex-list",
                "the candidate vertex list is empty",
            )));
        }
        state.init_mcmc(cfg.c);
        let s = state.entropy(cfg.entropy_args)?;
        let bins = cfg.bins;
        Ok(MulticanonicalState {
            state,
            vlist,
            f: cfg.f_initial,
            cfg,
            hist: vec![0; bins],
            dens: vec![0.0; bins],
            s,
            time: 0.0,
        })
    }

    /// Histogram bin holding entropy `s`, clamped at the window edges.
    pub fn get_bin(&self, s: f64) -> usize {
        let width = (self.cfg.s_max - self.cfg.s_min) / self.cfg.bins as f64;
        let i = ((s - self.cfg.s_min) / width).floor() as i64;
        i.clamp(0, self.cfg.bins as i64 - 1) as usize
    }

    /// Visit counts per bin.
    pub fn hist(&self) -> &[u64] {
        &self.hist
    }

    /// Density of states estimate per bin (log scale, up to a constant).
    pub fn dens(&self) -> &[f64] {
        &self.dens
    }

    /// Entropy of the current partition.
    pub fn entropy(&self) -> f64 {
        self.s
    }

    /// Current density increment.
    pub fn f(&self) -> f64 {
        self.f
    }

    /// Elapsed walk time in units of full histogram passes.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Ratio of the least visited to the mean visit count over visited
    /// bins; 1 for a perfectly flat histogram, 0 before any visit.
    pub fn flatness(&self) -> f64 {
        let visited: Vec<u64> = self.hist.iter().copied().filter(|&h| h > 0).collect();
        if visited.is_empty() {
            return 0.0;
        }
        let min = visited.iter().copied().min().unwrap_or(0) as f64;
        let mean = visited.iter().sum::<u64>() as f64 / visited.len() as f64;
        min / mean
    }

    /// Clears the visit histogram, keeping the density estimate.
    pub fn reset_hist(&mut self) {
        self.hist.iter_mut().for_each(|h| *h = 0);
    }

    /// The wrapped partition state.
    pub fn block_state(&self) -> &BlockState {
        self.state
    }
}

/// Runs one sweep of `niter` proposals, returning the final entropy and the
/// number of accepted moves.
///
/// Fails with [`SbmError::Sweep`] when the entering entropy lies outside
/// the window. Inside the sweep, proposals leaving the window are rejected
/// and everything else is accepted with probability
/// `min(1, exp(dens[i] - dens[j] + bias))` where `bias` is the proposal
/// log-ratio of the reverse and forward moves.
pub fn multicanonical_sweep<R: Rng + ?Sized>(
    mc: &mut MulticanonicalState<'_>,
    rng: &mut R,
) -> Result<(f64, usize), SbmError> {
    if mc.s < mc.cfg.s_min || mc.s >= mc.cfg.s_max {
        return Err(SbmError::Sweep(
            ErrorInfo::new(
                "entropy-out-of-range",
                "current entropy lies outside the sampling window",
            )
            .with_context("entropy", mc.s.to_string())
            .with_context("s_min", mc.cfg.s_min.to_string())
            .with_context("s_max", mc.cfg.s_max.to_string())
            .with_hint("widen the window or start from a partition inside it"),
        ));
    }
    let m = mc.cfg.bins as f64;
    let mut nmoves = 0usize;
    let mut i = mc.get_bin(mc.s);
    for _ in 0..mc.cfg.niter {
        let v = mc.vlist[rng.gen_range(0..mc.vlist.len())];
        if mc.state.node_weight(v) == 0 {
            continue;
        }
        let r = mc.state.block(v);
        let s_prop = mc.state.sample_block(v, mc.cfg.c, rng);
        let ds = mc.state.virtual_move(v, r, s_prop, mc.cfg.entropy_args)?;
        let bias = if mc.cfg.c.is_finite() && s_prop != r {
            let entries = mc.state.move_entries(v, r, s_prop);
            let pf = mc.state.get_move_prob(v, r, s_prop, mc.cfg.c, false, None);
            let pb = mc.state.get_move_prob(v, s_prop, r, mc.cfg.c, true, Some(&entries));
            pb.ln() - pf.ln()
        } else {
            0.0
        };
        let ns = mc.s + ds;
        let j = mc.get_bin(ns);
        let accept = if ns < mc.cfg.s_min || ns >= mc.cfg.s_max {
            false
        } else {
            let a = (mc.dens[i] - mc.dens[j]) + bias;
            a > 0.0 || rng.gen::<f64>() < a.exp()
        };
        if accept {
            mc.state.move_vertex(v, s_prop)?;
            nmoves += 1;
            mc.s = ns;
            i = j;
        }
        mc.hist[i] += 1;
        mc.dens[i] += mc.f;
        mc.time += 1.0 / m;
        if mc.cfg.refine {
            mc.f *= (mc.time - 1.0 / m) / mc.time;
        }
        if Some(i) == mc.cfg.target_bin {
            break;
        }
    }
    Ok((mc.s, nmoves))
}

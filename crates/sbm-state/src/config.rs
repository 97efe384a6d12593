//! Model configuration for block states.

use serde::{Deserialize, Serialize};

use sbm_core::{ErrorInfo, SbmError};

/// Marginal-likelihood family attached to one edge covariate channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WeightType {
    /// Positive real weights, Gamma-exponential marginal.
    RealExponential,
    /// Signed real weights, normal marginal with conjugate prior.
    RealNormal,
    /// Non-negative integer counts, Beta-geometric marginal.
    DiscreteGeometric,
    /// Non-negative integer counts, Gamma-Poisson marginal.
    DiscretePoisson,
    /// Bounded integer counts, Beta-binomial marginal.
    DiscreteBinomial,
    /// Waiting times of an absorbing chain, shared per-block accumulator.
    DeltaT,
}

/// Hyperparameters of one covariate channel.
///
/// The interpretation of the fields depends on the channel's [`WeightType`]:
/// the normal family reads all four (`m0`, `k0`, `v0`, `nu0` mapped onto
/// `alpha`, `beta`, `gamma`, `delta`), the binomial family reads `gamma` as
/// the trial count, and the remaining families use `alpha`/`beta` only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelParams {
    /// Kind of marginal likelihood for this channel.
    pub kind: WeightType,
    /// First shape hyperparameter.
    #[serde(default = "one")]
    pub alpha: f64,
    /// Second shape hyperparameter.
    #[serde(default = "one")]
    pub beta: f64,
    /// Third hyperparameter (prior scatter, or binomial trial count).
    #[serde(default = "one")]
    pub gamma: f64,
    /// Fourth hyperparameter (prior pseudo-observations).
    #[serde(default = "one")]
    pub delta: f64,
}

fn one() -> f64 {
    1.0
}

impl ChannelParams {
    /// A channel with all hyperparameters at their unit defaults.
    pub fn new(kind: WeightType) -> Self {
        ChannelParams {
            kind,
            alpha: 1.0,
            beta: 1.0,
            gamma: 1.0,
            delta: 1.0,
        }
    }
}

/// Flavour of the degree-sequence description length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DegDlKind {
    /// Entropy of the empirical within-block degree histograms.
    Entropy,
    /// Uniform prior over degree sequences with fixed block edge totals.
    Uniform,
}

/// Which terms enter an entropy evaluation, and how.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntropyArgs {
    /// Include the adjacency likelihood.
    pub adjacency: bool,
    /// Evaluate the adjacency term with the dense (Bernoulli/multinomial)
    /// model instead of the sparse Poisson one.
    pub dense: bool,
    /// Allow parallel edges in the dense model.
    pub multigraph: bool,
    /// Use exact log-factorials instead of Stirling asymptotics.
    pub exact: bool,
    /// Include the per-vertex degree log-factorials under degree correction.
    pub deg_entropy: bool,
    /// Include the partition description length.
    pub partition_dl: bool,
    /// Include the degree-sequence description length.
    pub degree_dl: bool,
    /// Flavour of the degree-sequence description length.
    pub degree_dl_kind: DegDlKind,
    /// Include the block-pair edge-count description length.
    pub edges_dl: bool,
    /// Include the covariate channel likelihoods.
    pub recs: bool,
    /// Include description lengths of states coupled above this one.
    pub recurse: bool,
}

impl Default for EntropyArgs {
    fn default() -> Self {
        EntropyArgs {
            adjacency: true,
            dense: false,
            multigraph: false,
            exact: true,
            deg_entropy: true,
            partition_dl: true,
            degree_dl: true,
            degree_dl_kind: DegDlKind::Uniform,
            edges_dl: true,
            recs: true,
            recurse: false,
        }
    }
}

/// Structural configuration of a [`crate::BlockState`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// Total number of blocks, occupied or not.
    pub block_count: usize,
    /// Use the degree-corrected model.
    pub deg_corr: bool,
    /// Permit moves that leave a block empty.
    pub allow_empty: bool,
    /// Covariate channel models, one entry per channel.
    pub rec_params: Vec<ChannelParams>,
    /// Use a dense matrix for the block pair index instead of a hash map.
    pub use_dense_matrix: bool,
}

impl Default for StateConfig {
    fn default() -> Self {
        StateConfig {
            block_count: 1,
            deg_corr: false,
            allow_empty: false,
            rec_params: Vec::new(),
            use_dense_matrix: false,
        }
    }
}

impl StateConfig {
    /// Validates the configuration against the channel count of the graph's
    /// covariates.
    pub fn validate(&self, covariate_channels: usize) -> Result<(), SbmError> {
        if self.block_count == 0 {
            return Err(SbmError::Config(
                ErrorInfo::new("empty-block-count", "block count must be at least one")
                    .with_hint("pass block_count >= 1"),
            ));
        }
        if self.rec_params.len() != covariate_channels {
            return Err(SbmError::Config(
                ErrorInfo::new(
                    "covariate-arity",
                    "one channel model is required per covariate channel",
                )
                .with_context("channels", covariate_channels.to_string())
                .with_context("models", self.rec_params.len().to_string()),
            ));
        }
        for (i, p) in self.rec_params.iter().enumerate() {
            if p.kind == WeightType::DiscreteBinomial && p.gamma < 1.0 {
                return Err(SbmError::Config(
                    ErrorInfo::new("binomial-trials", "binomial channel needs a trial count")
                        .with_context("channel", i.to_string()),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_args_round_trip() {
        let args = EntropyArgs::default();
        let json = serde_json::to_string(&args).unwrap();
        let back: EntropyArgs = serde_json::from_str(&json).unwrap();
        assert_eq!(args, back);
    }

    #[test]
    fn validate_rejects_channel_mismatch() {
        let cfg = StateConfig {
            block_count: 2,
            ..Default::default()
        };
        assert!(cfg.validate(0).is_ok());
        assert!(cfg.validate(1).is_err());
    }
}

//! Stochastic block model partition state.
//!
//! The centrepiece is [`BlockState`]: a graph partitioned into blocks
//! together with every aggregate needed to evaluate description lengths and
//! to price and commit vertex moves in degree-proportional time. Supporting
//! modules provide the scalar entropy terms, the block-pair edge index, the
//! move delta collector, per-class partition statistics, and the proposal
//! samplers.

#![deny(missing_docs)]

pub mod config;
pub mod emat;
pub mod entries;
pub mod partition_stats;
pub mod samplers;
pub mod state;
pub mod terms;

pub use config::{ChannelParams, DegDlKind, EntropyArgs, StateConfig, WeightType};
pub use emat::{BlockEdgeIndex, PairRecord};
pub use entries::{EntryDelta, EntrySet};
pub use partition_stats::{edges_dl, PartitionStats};
pub use samplers::{EdgeGroups, HalfEdge, NeighbourSampler};
pub use state::{BlockState, StateInputs};

/// Sentinel block label for vertices that are not part of the partition.
pub const NULL_BLOCK: usize = usize::MAX;

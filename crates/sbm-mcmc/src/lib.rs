#![deny(missing_docs)]
#![doc = "Multicanonical sampling loop over stochastic block model states."]

/// Density-of-states walk and its sweep loop.
pub mod multicanonical;

pub use multicanonical::{multicanonical_sweep, MulticanonicalConfig, MulticanonicalState};

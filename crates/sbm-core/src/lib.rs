#![deny(missing_docs)]
#![doc = "Shared error and RNG types for the stochastic block model engine."]

pub mod errors;
pub mod rng;

pub use errors::{ErrorInfo, SbmError};
pub use rng::RngHandle;

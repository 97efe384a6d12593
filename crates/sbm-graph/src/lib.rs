#![deny(missing_docs)]
#![doc = "Weighted multigraph collaborator and attribute maps for the SBM engine."]

pub mod degrees;
pub mod graph;
pub mod weights;

pub use degrees::Degrees;
pub use graph::AdjGraph;
pub use weights::{EdgeCovariates, EdgeWeights, VertexWeights};

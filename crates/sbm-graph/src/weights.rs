//! Vertex/edge weight maps and per-edge covariate channels.

use sbm_core::errors::{ErrorInfo, SbmError};
use serde::{Deserialize, Serialize};

/// Per-vertex integer weight map.
///
/// `Unit` stands in for the implicit all-ones map of an unweighted state;
/// `Map` carries explicit weights and is required for vertex merging. The two
/// variants replace the original compile-time unity-map/checked-map dispatch
/// with a single runtime switch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum VertexWeights {
    /// Every vertex weighs 1.
    Unit,
    /// Explicit per-vertex weights.
    Map(Vec<i64>),
}

impl VertexWeights {
    /// Weight of vertex `v`.
    pub fn get(&self, v: usize) -> i64 {
        match self {
            VertexWeights::Unit => 1,
            VertexWeights::Map(w) => w[v],
        }
    }

    /// Sets the weight of `v`; fails on the unit map.
    pub fn set(&mut self, v: usize, weight: i64) -> Result<(), SbmError> {
        match self {
            VertexWeights::Unit => Err(SbmError::State(ErrorInfo::new(
                "unweighted-state",
                "cannot set the weight of an unweighted state",
            ))),
            VertexWeights::Map(w) => {
                w[v] = weight;
                Ok(())
            }
        }
    }

    /// Whether this is the implicit all-ones map.
    pub fn is_unit(&self) -> bool {
        matches!(self, VertexWeights::Unit)
    }
}

/// Per-edge integer weight map, mirroring [`VertexWeights`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EdgeWeights {
    /// Every edge weighs 1.
    Unit,
    /// Explicit per-edge weights.
    Map(Vec<i64>),
}

impl EdgeWeights {
    /// Weight of edge `e`.
    pub fn get(&self, e: usize) -> i64 {
        match self {
            EdgeWeights::Unit => 1,
            EdgeWeights::Map(w) => w[e],
        }
    }

    /// Sets the weight of `e`; fails on the unit map.
    pub fn set(&mut self, e: usize, weight: i64) -> Result<(), SbmError> {
        match self {
            EdgeWeights::Unit => Err(SbmError::State(ErrorInfo::new(
                "unweighted-state",
                "cannot set the weight of an unweighted state",
            ))),
            EdgeWeights::Map(w) => {
                w[e] = weight;
                Ok(())
            }
        }
    }

    /// Grows the map with zero-weight slots up to `len` edges (no-op for the
    /// unit map; fresh edges created by merging start at weight zero and are
    /// assigned explicitly).
    pub fn ensure_len(&mut self, len: usize) {
        if let EdgeWeights::Map(w) = self {
            if w.len() < len {
                w.resize(len, 0);
            }
        }
    }

    /// Whether this is the implicit all-ones map.
    pub fn is_unit(&self) -> bool {
        matches!(self, EdgeWeights::Unit)
    }
}

/// Per-edge covariate channels: first-moment (`rec`) and second-moment
/// (`drec`) accumulators, one value per channel per edge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EdgeCovariates {
    channels: usize,
    rec: Vec<Vec<f64>>,
    drec: Vec<Vec<f64>>,
}

impl EdgeCovariates {
    /// Creates covariate storage with the given channel count, one row per
    /// edge.
    pub fn new(channels: usize, rec: Vec<Vec<f64>>, drec: Vec<Vec<f64>>) -> Result<Self, SbmError> {
        for row in rec.iter().chain(drec.iter()) {
            if row.len() != channels {
                return Err(SbmError::Config(
                    ErrorInfo::new("covariate-arity", "covariate row does not match channel count")
                        .with_context("channels", channels.to_string())
                        .with_context("row", row.len().to_string()),
                ));
            }
        }
        if drec.len() != rec.len() {
            return Err(SbmError::Config(ErrorInfo::new(
                "covariate-arity",
                "first and second moment tables differ in length",
            )));
        }
        Ok(Self { channels, rec, drec })
    }

    /// Creates storage with no channels and no rows.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of covariate channels.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Number of edge rows.
    pub fn len(&self) -> usize {
        self.rec.len()
    }

    /// Whether any covariates are attached.
    pub fn is_empty(&self) -> bool {
        self.rec.is_empty()
    }

    /// First-moment values of edge `e`.
    pub fn rec(&self, e: usize) -> &[f64] {
        &self.rec[e]
    }

    /// Second-moment values of edge `e`.
    pub fn drec(&self, e: usize) -> &[f64] {
        &self.drec[e]
    }

    /// Adds `other`'s values into edge `e`, channel-wise.
    pub fn accumulate(&mut self, e: usize, rec: &[f64], drec: &[f64]) {
        for (slot, x) in self.rec[e].iter_mut().zip(rec) {
            *slot += x;
        }
        for (slot, x) in self.drec[e].iter_mut().zip(drec) {
            *slot += x;
        }
    }

    /// Overwrites edge `e` with the given values.
    pub fn assign(&mut self, e: usize, rec: Vec<f64>, drec: Vec<f64>) {
        self.rec[e] = rec;
        self.drec[e] = drec;
    }

    /// Zeroes edge `e`'s values (used when an edge is detached by a merge).
    pub fn clear_edge(&mut self, e: usize) {
        for slot in self.rec[e].iter_mut().chain(self.drec[e].iter_mut()) {
            *slot = 0.0;
        }
    }

    /// Grows the tables with zero rows up to `len` edges.
    pub fn ensure_len(&mut self, len: usize) {
        while self.rec.len() < len {
            self.rec.push(vec![0.0; self.channels]);
            self.drec.push(vec![0.0; self.channels]);
        }
    }
}

//! Scoring interface around an opaque reconstruction model.
//!
//! The pipeline only needs one capability from a model: take a window batch of
//! shape [N, channels, window_length] and return a reconstruction of the same
//! shape. Everything else (error reduction, thresholds, hot-swap) lives here.

pub mod evaluator;
pub mod manager;
pub mod models;

use std::panic::{self, AssertUnwindSafe};

use ndarray::{Array3, ArrayView3};
use thiserror::Error;

use crate::processing::window::WindowBatch;

#[derive(Debug, Error, PartialEq)]
pub enum ScoringError {
    #[error("reconstruction shape {got:?} does not match input shape {expected:?}")]
    ShapeMismatch { expected: [usize; 3], got: [usize; 3] },

    #[error("expected {expected} thresholds, got {got}")]
    ThresholdCount { expected: usize, got: usize },

    #[error("window batch is empty")]
    EmptyBatch,

    #[error("model fault: {0}")]
    ModelFault(String),

    #[error("unknown model '{0}'")]
    UnknownModel(String),
}

/// Model output, same shape as the WindowBatch it was produced from.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconstructionBatch {
    data: Array3<f64>,
}

impl ReconstructionBatch {
    pub fn from_array(data: Array3<f64>) -> Self {
        Self { data }
    }

    pub fn shape(&self) -> [usize; 3] {
        let s = self.data.shape();
        [s[0], s[1], s[2]]
    }

    pub fn view(&self) -> ArrayView3<'_, f64> {
        self.data.view()
    }
}

pub trait ReconstructionModel: Send + Sync {
    fn reconstruct(&self, batch: &WindowBatch) -> Result<ReconstructionBatch, ScoringError>;
}

/// Runs the model and enforces the shape contract. Panics inside the model are
/// reported as `ModelFault` so a faulty model only costs the current cycle.
pub fn score(
    model: &dyn ReconstructionModel,
    batch: &WindowBatch,
) -> Result<ReconstructionBatch, ScoringError> {
    let reconstruction = panic::catch_unwind(AssertUnwindSafe(|| model.reconstruct(batch)))
        .map_err(|payload| {
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "model panicked".to_string());
            ScoringError::ModelFault(msg)
        })??;

    if reconstruction.shape() != batch.shape() {
        return Err(ScoringError::ShapeMismatch {
            expected: batch.shape(),
            got: reconstruction.shape(),
        });
    }
    Ok(reconstruction)
}

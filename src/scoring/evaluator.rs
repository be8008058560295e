//! Reconstruction error → per-channel score → threshold verdict.
//!
//! error[c] = mean over windows ( mean over time |reconstruction - input| )
//! anomaly[c] = error[c] > threshold[c]

use ndarray::Axis;
use serde::Serialize;

use super::{ReconstructionBatch, ScoringError};
use crate::processing::window::WindowBatch;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub errors: Vec<f64>,
    pub anomalies: Vec<bool>,
}

impl Evaluation {
    pub fn is_anomalous(&self) -> bool {
        self.anomalies.iter().any(|&a| a)
    }

    pub fn flagged_channels(&self) -> Vec<usize> {
        self.anomalies
            .iter()
            .enumerate()
            .filter_map(|(c, &a)| a.then_some(c))
            .collect()
    }
}

pub fn evaluate(
    input: &WindowBatch,
    reconstruction: &ReconstructionBatch,
    thresholds: &[f64],
) -> Result<Evaluation, ScoringError> {
    if reconstruction.shape() != input.shape() {
        return Err(ScoringError::ShapeMismatch {
            expected: input.shape(),
            got: reconstruction.shape(),
        });
    }
    if thresholds.len() != input.channels() {
        return Err(ScoringError::ThresholdCount {
            expected: input.channels(),
            got: thresholds.len(),
        });
    }
    if input.is_empty() || input.window_length() == 0 {
        return Err(ScoringError::EmptyBatch);
    }

    let abs_error = (&reconstruction.view() - &input.view()).mapv(f64::abs);
    // [N, C, L] → [N, C] → [C]
    let per_window = abs_error.mean_axis(Axis(2));
    let per_channel = per_window.and_then(|w| w.mean_axis(Axis(0)));

    let errors: Vec<f64> = match per_channel {
        Some(e) => e.to_vec(),
        None => vec![0.0; input.channels()],
    };
    let anomalies = errors
        .iter()
        .zip(thresholds)
        .map(|(e, t)| e > t)
        .collect();

    Ok(Evaluation { errors, anomalies })
}

//! Built-in reconstruction models and the loader that resolves them by name.

use std::sync::Arc;

use log::info;

use super::manager::ModelDescriptor;
use super::{ReconstructionBatch, ReconstructionModel, ScoringError};
use crate::processing::window::WindowBatch;

pub const DEFAULT_SMOOTHING_WINDOW: usize = 10;

/// Returns its input unchanged.
#[derive(Debug, Default)]
pub struct IdentityModel;

impl ReconstructionModel for IdentityModel {
    fn reconstruct(&self, batch: &WindowBatch) -> Result<ReconstructionBatch, ScoringError> {
        Ok(ReconstructionBatch::from_array(batch.view().to_owned()))
    }
}

/// Trailing moving average along the time axis of each window and channel.
#[derive(Debug)]
pub struct MovingAverageModel {
    window: usize,
}

impl MovingAverageModel {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
        }
    }
}

impl ReconstructionModel for MovingAverageModel {
    fn reconstruct(&self, batch: &WindowBatch) -> Result<ReconstructionBatch, ScoringError> {
        let mut out = batch.view().to_owned();

        for mut lane in out.lanes_mut(ndarray::Axis(2)) {
            let input = lane.to_vec();
            let mut sum = 0.0;
            for (t, v) in input.iter().enumerate() {
                sum += v;
                if t >= self.window {
                    sum -= input[t - self.window];
                }
                lane[t] = sum / (t + 1).min(self.window) as f64;
            }
        }

        Ok(ReconstructionBatch::from_array(out))
    }
}

/// Resolves a (name, version) pair to a fully constructed model.
pub trait ModelLoader: Send + Sync {
    fn load(&self, descriptor: &ModelDescriptor) -> Result<Arc<dyn ReconstructionModel>, ScoringError>;
}

/// Models compiled into the binary; the version is informational.
#[derive(Debug, Default)]
pub struct BuiltinModelLoader;

impl ModelLoader for BuiltinModelLoader {
    fn load(&self, descriptor: &ModelDescriptor) -> Result<Arc<dyn ReconstructionModel>, ScoringError> {
        let model: Arc<dyn ReconstructionModel> = match descriptor.name.as_str() {
            "identity" => Arc::new(IdentityModel),
            "moving_average" => Arc::new(MovingAverageModel::new(DEFAULT_SMOOTHING_WINDOW)),
            other => return Err(ScoringError::UnknownModel(other.to_string())),
        };
        info!("Loaded built-in model {}", descriptor);
        Ok(model)
    }
}

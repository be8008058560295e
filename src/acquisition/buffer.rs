//! FIFO of feature vectors shared between the subscriber (appends) and the controller
//! (snapshot + single-oldest eviction per cycle).

use std::collections::VecDeque;

use parking_lot::Mutex;
use serde::Serialize;

use super::features::FeatureVector;

#[derive(Debug, Default)]
pub struct SampleBuffer {
    samples: Mutex<VecDeque<FeatureVector>>,
}

impl SampleBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, sample: FeatureVector) {
        self.samples.lock().push_back(sample);
    }

    /// Copies the buffer under the lock; appends may continue while the copy is processed.
    pub fn snapshot(&self) -> Vec<FeatureVector> {
        self.samples.lock().iter().copied().collect()
    }

    pub fn evict_oldest(&self) -> Option<FeatureVector> {
        self.samples.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn status(&self, min_fill: usize) -> BufferStatus {
        let current_size = self.len();
        BufferStatus {
            current_size,
            required_size: min_fill + 1,
            is_ready: current_size > min_fill,
            fill_percent: if min_fill > 0 {
                (current_size as f32 / (min_fill + 1) as f32 * 100.0).min(100.0)
            } else {
                100.0
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BufferStatus {
    pub current_size: usize,
    pub required_size: usize,
    pub is_ready: bool,
    pub fill_percent: f32,
}

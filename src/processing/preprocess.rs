//! Buffer snapshot → PreprocessedSeries.
//! 1. per-channel wavelet denoising with that channel's noise estimate
//! 2. z-normalization with the offline mean/std vectors (after every channel is denoised)
//! 3. truncation to the most recent `window_length + stride` rows

use ndarray::{Array2, ArrayView2, s};
use thiserror::Error;

use super::wavelet::wavelet_denoise;
use crate::acquisition::features::{FeatureVector, NUM_FEATURES};
use crate::config::PipelineConfig;

#[derive(Debug, Error, PartialEq)]
pub enum PreprocessError {
    #[error("need {required} rows after truncation, only {available} available")]
    InsufficientRows { required: usize, available: usize },

    #[error("expected {expected} channels, got {got}")]
    ChannelMismatch { expected: usize, got: usize },
}

/// Denoised, standardized series, rows = time, columns = channels.
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessedSeries {
    data: Array2<f64>,
}

impl PreprocessedSeries {
    pub fn from_array(data: Array2<f64>) -> Result<Self, PreprocessError> {
        if data.ncols() != NUM_FEATURES {
            return Err(PreprocessError::ChannelMismatch {
                expected: NUM_FEATURES,
                got: data.ncols(),
            });
        }
        Ok(Self { data })
    }

    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn channels(&self) -> usize {
        self.data.ncols()
    }

    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }
}

#[derive(Debug, Clone)]
pub struct Preprocessor {
    noise_sigma: [f64; NUM_FEATURES],
    mean: [f64; NUM_FEATURES],
    std: [f64; NUM_FEATURES],
    max_level: usize,
    series_length: usize,
}

impl Preprocessor {
    pub fn new(
        noise_sigma: [f64; NUM_FEATURES],
        mean: [f64; NUM_FEATURES],
        std: [f64; NUM_FEATURES],
        max_level: usize,
        series_length: usize,
    ) -> Self {
        Self {
            noise_sigma,
            mean,
            std,
            max_level,
            series_length,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        let stats = &config.statistics;
        Self::new(
            stats.noise_sigma,
            stats.mean,
            stats.std,
            config.wavelet.max_level,
            config.window.series_length(),
        )
    }

    pub fn series_length(&self) -> usize {
        self.series_length
    }

    pub fn run(&self, samples: &[FeatureVector]) -> Result<PreprocessedSeries, PreprocessError> {
        let n = samples.len();
        let mut data = Array2::<f64>::zeros((n, NUM_FEATURES));

        for c in 0..NUM_FEATURES {
            let channel: Vec<f64> = samples.iter().map(|s| s.channel(c)).collect();
            let denoised = wavelet_denoise(&channel, self.noise_sigma[c], self.max_level);
            data.column_mut(c)
                .iter_mut()
                .zip(denoised)
                .for_each(|(dst, v)| *dst = v);
        }

        for (c, mut column) in data.columns_mut().into_iter().enumerate() {
            let (mean, std) = (self.mean[c], self.std[c]);
            column.mapv_inplace(|v| (v - mean) / std);
        }

        let keep = n.min(self.series_length);
        if keep < self.series_length {
            return Err(PreprocessError::InsufficientRows {
                required: self.series_length,
                available: keep,
            });
        }

        Ok(PreprocessedSeries {
            data: data.slice(s![n - keep.., ..]).to_owned(),
        })
    }
}

//! Static pipeline configuration.
//!
//! Everything the pipeline needs is loaded once at startup and stays read-only:
//! - window geometry (window length, stride, minimum buffer fill)
//! - loop cadences (inter-cycle sleep, model/buffer poll intervals, power sampling)
//! - per-channel statistics computed offline (noise level, mean/std, thresholds)
//! - raw record layout (field count and the indices of the used fields)
//!
//! ## Loading order
//! 1. explicit path (`--config`)
//! 2. `TURBINE_EDGE_CONFIG` environment variable
//! 3. `turbine_edge.toml` in the working directory
//! 4. built-in defaults

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::acquisition::features::NUM_FEATURES;
use crate::scoring::manager::ModelDescriptor;

pub const CONFIG_ENV_VAR: &str = "TURBINE_EDGE_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "turbine_edge.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub window: WindowConfig,
    pub timing: TimingConfig,
    pub statistics: ChannelStatistics,
    pub wavelet: WaveletConfig,
    pub record: RecordLayout,
    pub fault_injection: FaultInjectionConfig,
    pub model: ModelConfig,
    pub logs: LogConfig,
    pub runtime: RuntimeConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Samples per window (time steps fed to the model).
    pub window_length: usize,
    pub stride: usize,
    /// Scoring starts once the buffer holds strictly more than this many samples.
    pub min_fill: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            window_length: 100,
            stride: 10,
            min_fill: 500,
        }
    }
}

impl WindowConfig {
    /// Rows kept after preprocessing: the most recent window plus one stride.
    pub fn series_length(&self) -> usize {
        self.window_length + self.stride
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub prediction_interval_ms: u64,
    pub model_poll_interval_ms: u64,
    pub buffering_poll_interval_ms: u64,
    pub power_sample_interval_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            prediction_interval_ms: 100,
            model_poll_interval_ms: 5_000,
            buffering_poll_interval_ms: 200,
            power_sample_interval_ms: 50,
        }
    }
}

impl TimingConfig {
    pub fn prediction_interval(&self) -> Duration {
        Duration::from_millis(self.prediction_interval_ms)
    }

    pub fn model_poll_interval(&self) -> Duration {
        Duration::from_millis(self.model_poll_interval_ms)
    }

    pub fn buffering_poll_interval(&self) -> Duration {
        Duration::from_millis(self.buffering_poll_interval_ms)
    }

    pub fn power_sample_interval(&self) -> Duration {
        Duration::from_millis(self.power_sample_interval_ms)
    }
}

/// Per-channel statistics computed offline from the training set.
/// Channel order: roll, pitch, yaw, rotational speed, wind, voltage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelStatistics {
    pub noise_sigma: [f64; NUM_FEATURES],
    pub mean: [f64; NUM_FEATURES],
    pub std: [f64; NUM_FEATURES],
    pub thresholds: [f64; NUM_FEATURES],
}

impl Default for ChannelStatistics {
    fn default() -> Self {
        Self {
            noise_sigma: [0.02, 0.02, 0.02, 0.05, 0.05, 0.05],
            mean: [0.0, 0.0, 0.0, 0.6, 0.5, 0.5],
            std: [0.05, 0.05, 0.05, 0.1, 0.1, 0.1],
            thresholds: [0.8; NUM_FEATURES],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaveletConfig {
    pub max_level: usize,
}

impl Default for WaveletConfig {
    fn default() -> Self {
        Self { max_level: 5 }
    }
}

/// Position of each used field inside a raw record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordLayout {
    pub field_count: usize,
    pub qx: usize,
    pub qy: usize,
    pub qz: usize,
    pub qw: usize,
    pub rotational_speed: usize,
    pub wind: usize,
    pub voltage: usize,
}

impl Default for RecordLayout {
    fn default() -> Self {
        Self {
            field_count: 20,
            qx: 6,
            qy: 7,
            qz: 8,
            qw: 5,
            rotational_speed: 3,
            wind: 2,
            voltage: 4,
        }
    }
}

impl RecordLayout {
    pub fn used_indices(&self) -> [usize; 7] {
        [
            self.qx,
            self.qy,
            self.qz,
            self.qw,
            self.rotational_speed,
            self.wind,
            self.voltage,
        ]
    }
}

/// Random corruption of incoming records, for demonstrating detections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultInjectionConfig {
    pub enabled: bool,
    pub orientation_probability: f64,
    pub wind_probability: f64,
    pub voltage_probability: f64,
}

impl Default for FaultInjectionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            orientation_probability: 1.0 / 50.0,
            wind_probability: 1.0 / 20.0,
            voltage_probability: 1.0 / 50.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Model deployed at startup; `None` waits for the first update notification.
    pub initial: Option<ModelDescriptor>,
    /// Manifest file polled for out-of-band model updates.
    pub manifest_path: Option<PathBuf>,
    pub manifest_poll_interval_ms: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            initial: Some(ModelDescriptor::new("moving_average", "1")),
            manifest_path: None,
            manifest_poll_interval_ms: 2_000,
        }
    }
}

impl ModelConfig {
    pub fn manifest_poll_interval(&self) -> Duration {
        Duration::from_millis(self.manifest_poll_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub output_dir: PathBuf,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("data/logs"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Pin the inference thread to this core.
    pub pin_core: Option<usize>,
    /// Spawn the inference thread with maximum OS priority.
    pub elevated_priority: bool,
}

impl PipelineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Resolves the config source and loads it.
    ///
    /// An explicit or env-provided path must exist; the working-directory file is optional.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            log::info!("Loading config from {}", path.display());
            return Self::from_file(path);
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            log::info!("Loading config from ${} = {}", CONFIG_ENV_VAR, path);
            return Self::from_file(Path::new(&path));
        }

        let local = Path::new(DEFAULT_CONFIG_FILE);
        if local.exists() {
            log::info!("Loading config from {}", local.display());
            return Self::from_file(local);
        }

        log::info!("No config file found, using built-in defaults");
        Ok(Self::default())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let w = &self.window;
        if w.window_length == 0 || w.stride == 0 {
            return Err(ConfigError::Invalid(
                "window_length and stride must be positive".into(),
            ));
        }
        if w.min_fill < w.series_length() {
            return Err(ConfigError::Invalid(format!(
                "min_fill ({}) must be at least window_length + stride ({})",
                w.min_fill,
                w.series_length()
            )));
        }

        let s = &self.statistics;
        if let Some(c) = s.std.iter().position(|v| !v.is_finite() || *v == 0.0) {
            return Err(ConfigError::Invalid(format!(
                "std for channel {} must be finite and non-zero",
                c
            )));
        }
        if let Some(c) = s.thresholds.iter().position(|v| !(*v > 0.0)) {
            return Err(ConfigError::Invalid(format!(
                "threshold for channel {} must be positive",
                c
            )));
        }
        if let Some(c) = s.noise_sigma.iter().position(|v| !(*v >= 0.0)) {
            return Err(ConfigError::Invalid(format!(
                "noise_sigma for channel {} must be non-negative",
                c
            )));
        }

        let r = &self.record;
        if let Some(idx) = r.used_indices().iter().find(|&&i| i >= r.field_count) {
            return Err(ConfigError::Invalid(format!(
                "record field index {} out of range for {} fields",
                idx, r.field_count
            )));
        }

        let f = &self.fault_injection;
        for p in [
            f.orientation_probability,
            f.wind_probability,
            f.voltage_probability,
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(ConfigError::Invalid(format!(
                    "fault probability {} outside [0, 1]",
                    p
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.window.series_length(), 110);
        assert_eq!(config.record.field_count, 20);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [window]
            min_fill = 800

            [statistics]
            thresholds = [0.1, 0.2, 0.3, 0.4, 0.5, 0.6]
            "#,
        )
        .unwrap();

        assert_eq!(config.window.min_fill, 800);
        assert_eq!(config.window.window_length, 100);
        assert_eq!(config.statistics.thresholds[5], 0.6);
        assert_eq!(config.timing, TimingConfig::default());
    }

    #[test]
    fn model_section_parses_descriptor() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [model]
            initial = { name = "identity", version = "7" }
            manifest_path = "models/manifest.toml"
            "#,
        )
        .unwrap();

        assert_eq!(
            config.model.initial,
            Some(ModelDescriptor::new("identity", "7"))
        );
        assert_eq!(
            config.model.manifest_path.as_deref(),
            Some(Path::new("models/manifest.toml"))
        );
    }

    #[test]
    fn shipped_sample_matches_defaults() {
        let sample =
            PipelineConfig::from_toml_str(include_str!("../config/turbine_edge.toml")).unwrap();
        assert!(sample.validate().is_ok());
        assert_eq!(sample.window, WindowConfig::default());
        assert_eq!(sample.statistics, ChannelStatistics::default());
        assert_eq!(sample.record, RecordLayout::default());
        assert_eq!(
            sample.model.manifest_path.as_deref(),
            Some(Path::new("config/model_manifest.toml"))
        );
    }

    #[test]
    fn rejects_zero_std() {
        let mut config = PipelineConfig::default();
        config.statistics.std[2] = 0.0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_min_fill_below_series_length() {
        let mut config = PipelineConfig::default();
        config.window.min_fill = 50;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_field_index() {
        let mut config = PipelineConfig::default();
        config.record.voltage = 25;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = PipelineConfig::load(Some(Path::new("/nonexistent/turbine.toml")));
        assert!(matches!(err, Err(ConfigError::Io { .. })));
    }
}

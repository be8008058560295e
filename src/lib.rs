//! # turbine_edge
//!
//! Edge-side anomaly detection for wind turbine telemetry.
//!
//! ## Data flow
//! - **Acquisition:** raw comma-separated records → six engineered features → shared buffer.
//! - **Processing:** wavelet denoising, per-channel standardization, sliding windows.
//! - **Scoring:** a hot-swappable reconstruction model; per-channel mean absolute error
//!   compared against fixed thresholds.
//! - **Pipeline:** the inference loop, lifecycle events, result publishing, shutdown.
//! - **Power:** a side-channel logger that tags power readings with the current inference,
//!   plus the offline energy-per-inference analysis.

pub mod acquisition;
pub mod clock;
pub mod config;
pub mod persistence;
pub mod pipeline;
pub mod power;
pub mod processing;
pub mod scoring;

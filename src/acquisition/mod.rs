//! Acquisition: raw transport payloads → feature vectors → sample buffer.

pub mod buffer;
pub mod features;
pub mod simulator;
pub mod subscriber;

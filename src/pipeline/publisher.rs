//! Outbound side of the pipeline: one anomaly result per scoring cycle, plus
//! forwarded raw token sets.
//! - `LogPublisher`: JSON payloads through the `log` facade
//! - `ChannelPublisher`: non-blocking `try_send` into bounded channels, drops on saturation

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam::channel::{Receiver, Sender, bounded};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::acquisition::subscriber::RawTokens;
use crate::scoring::evaluator::Evaluation;
use crate::scoring::manager::ModelDescriptor;

/// Per-cycle verdict as published on the results topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyResult {
    pub anomalies: Vec<bool>,
    pub values: Vec<f64>,
    pub model_name: String,
    pub model_version: String,
    #[serde(rename = "ts")]
    pub timestamp: String,
}

impl AnomalyResult {
    pub fn new(evaluation: Evaluation, model: &ModelDescriptor, timestamp: String) -> Self {
        Self {
            anomalies: evaluation.anomalies,
            values: evaluation.errors,
            model_name: model.name.clone(),
            model_version: model.version.clone(),
            timestamp,
        }
    }

    pub fn is_anomalous(&self) -> bool {
        self.anomalies.iter().any(|&a| a)
    }
}

pub trait ResultPublisher: Send {
    fn publish_inference(&self, result: &AnomalyResult);
    fn publish_raw(&self, tokens: &RawTokens);
}

/// Writes payloads to the log (results at info, raw tokens at debug).
#[derive(Debug, Default)]
pub struct LogPublisher;

impl ResultPublisher for LogPublisher {
    fn publish_inference(&self, result: &AnomalyResult) {
        match serde_json::to_string(result) {
            Ok(payload) => info!("[publish] inference {}", payload),
            Err(e) => warn!("[publish] could not encode result: {}", e),
        }
    }

    fn publish_raw(&self, tokens: &RawTokens) {
        if log::log_enabled!(log::Level::Debug) {
            match serde_json::to_string(tokens) {
                Ok(payload) => debug!("[publish] raw {}", payload),
                Err(e) => warn!("[publish] could not encode raw tokens: {}", e),
            }
        }
    }
}

pub struct ChannelPublisher {
    results: Sender<AnomalyResult>,
    raw: Sender<RawTokens>,
    dropped: AtomicU64,
}

impl ChannelPublisher {
    pub fn new(capacity: usize) -> (Self, Receiver<AnomalyResult>, Receiver<RawTokens>) {
        let (results, results_rx) = bounded(capacity);
        let (raw, raw_rx) = bounded(capacity);
        (
            Self {
                results,
                raw,
                dropped: AtomicU64::new(0),
            },
            results_rx,
            raw_rx,
        )
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl ResultPublisher for ChannelPublisher {
    fn publish_inference(&self, result: &AnomalyResult) {
        if self.results.try_send(result.clone()).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn publish_raw(&self, tokens: &RawTokens) {
        if self.raw.try_send(tokens.clone()).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result() -> AnomalyResult {
        AnomalyResult::new(
            Evaluation {
                errors: vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6],
                anomalies: vec![false, false, false, false, true, false],
            },
            &ModelDescriptor::new("identity", "3"),
            "2024-05-01T12:00:00.000+00:00".into(),
        )
    }

    #[test]
    fn payload_field_names() {
        let json: serde_json::Value = serde_json::to_value(result()).unwrap();
        assert_eq!(json["model_name"], "identity");
        assert_eq!(json["model_version"], "3");
        assert_eq!(json["ts"], "2024-05-01T12:00:00.000+00:00");
        assert_eq!(json["anomalies"][4], true);
        assert_eq!(json["values"].as_array().unwrap().len(), 6);
    }

    #[test]
    fn channel_publisher_drops_when_full() {
        let (publisher, rx, _raw) = ChannelPublisher::new(1);
        publisher.publish_inference(&result());
        publisher.publish_inference(&result());

        assert_eq!(publisher.dropped(), 1);
        assert!(rx.try_recv().unwrap().is_anomalous());
        assert!(rx.try_recv().is_err());
    }
}

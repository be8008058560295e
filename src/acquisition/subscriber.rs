//! Transport-side ingestion: raw payload strings → Feature Extractor → Sample Buffer.
//! - Non-blocking for producers: the transport only pushes onto an unbounded channel
//! - Malformed payloads are logged and dropped; the next message is independent
//! - Accepted token sets are queued (timestamped) for raw telemetry forwarding
//! - Optional fault injection corrupts records to exercise the detector

use std::{
    io,
    sync::Arc,
    thread::{self, JoinHandle},
};

use crossbeam::channel::{Receiver, select};
use crossbeam_queue::SegQueue;
use log::{debug, error, info};
use rand::Rng;
use serde::Serialize;

use super::buffer::SampleBuffer;
use super::features::{FeatureError, FeatureExtractor, RawRecord};
use crate::clock;
use crate::config::{FaultInjectionConfig, RecordLayout};
use crate::pipeline::shutdown::StopSignal;
use crate::pipeline::stats::PipelineStats;

/// One accepted record as forwarded to the raw telemetry sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawTokens {
    pub timestamp: String,
    pub tokens: Vec<String>,
}

pub type RawTokenQueue = SegQueue<RawTokens>;

// ============================================================================
// Fault injection
// ============================================================================

pub struct FaultInjector {
    config: FaultInjectionConfig,
    layout: RecordLayout,
}

impl FaultInjector {
    pub fn new(config: FaultInjectionConfig, layout: RecordLayout) -> Self {
        Self { config, layout }
    }

    /// Returns true if any field was replaced.
    pub fn inject<R: Rng>(&self, record: &mut RawRecord, rng: &mut R) -> bool {
        let mut injected = false;

        if rng.random_bool(self.config.orientation_probability) {
            for idx in [self.layout.qx, self.layout.qy, self.layout.qz, self.layout.qw] {
                record.set_value(idx, rng.random::<f64>() * 10.0);
            }
            injected = true;
        }
        if rng.random_bool(self.config.wind_probability) {
            record.set_value(self.layout.wind, rng.random::<f64>() * 10.0);
            injected = true;
        }
        if rng.random_bool(self.config.voltage_probability) {
            record.set_value(self.layout.voltage, rng.random_range(0..1000) as f64);
            injected = true;
        }

        injected
    }
}

// ============================================================================
// Subscriber
// ============================================================================

pub struct Subscriber {
    rx: Receiver<String>,
    extractor: FeatureExtractor,
    buffer: Arc<SampleBuffer>,
    raw_tokens: Arc<RawTokenQueue>,
    faults: Option<FaultInjector>,
    stats: Arc<PipelineStats>,
}

impl Subscriber {
    pub fn new(
        rx: Receiver<String>,
        extractor: FeatureExtractor,
        buffer: Arc<SampleBuffer>,
        raw_tokens: Arc<RawTokenQueue>,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            rx,
            extractor,
            buffer,
            raw_tokens,
            faults: None,
            stats,
        }
    }

    pub fn with_fault_injection(mut self, config: FaultInjectionConfig) -> Self {
        if config.enabled {
            self.faults = Some(FaultInjector::new(config, self.extractor.layout().clone()));
        }
        self
    }

    /// Handles one payload: parse, optionally corrupt, extract, append, forward.
    pub fn handle_payload<R: Rng>(&self, payload: &str, rng: &mut R) -> Result<(), FeatureError> {
        let mut record = self.extractor.parse(payload)?;

        if let Some(faults) = &self.faults {
            if faults.inject(&mut record, rng) {
                debug!("Injected fault into incoming record");
            }
        }

        let features = self.extractor.features(&record);
        self.buffer.append(features);
        self.raw_tokens.push(RawTokens {
            timestamp: clock::now_iso(),
            tokens: record.tokens().to_vec(),
        });
        Ok(())
    }

    pub fn run(&self, stop: &StopSignal) {
        info!("Subscriber started");
        let mut rng = rand::rng();

        loop {
            select! {
                recv(self.rx) -> msg => match msg {
                    Ok(payload) => match self.handle_payload(&payload, &mut rng) {
                        Ok(()) => self.stats.record_accepted(),
                        Err(e) => {
                            self.stats.record_dropped();
                            error!("Dropping record: {}", e);
                        }
                    },
                    Err(_) => {
                        info!("Transport channel closed");
                        break;
                    }
                },
                recv(stop.receiver()) -> _ => break,
            }
        }

        info!("Subscriber stopped");
    }

    pub fn spawn(self, stop: StopSignal) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("subscriber".into())
            .spawn(move || self.run(&stop))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::shutdown::stop_pair;
    use crossbeam::channel::unbounded;
    use rand::{SeedableRng, rngs::StdRng};

    fn line(layout: &RecordLayout) -> String {
        let mut fields = vec!["0".to_string(); layout.field_count];
        fields[layout.qw] = "1".into();
        fields[layout.wind] = "5.5".into();
        fields.join(",")
    }

    fn subscriber(rx: Receiver<String>) -> (Subscriber, Arc<SampleBuffer>, Arc<RawTokenQueue>) {
        let buffer = Arc::new(SampleBuffer::new());
        let raw = Arc::new(RawTokenQueue::new());
        let sub = Subscriber::new(
            rx,
            FeatureExtractor::new(RecordLayout::default()),
            Arc::clone(&buffer),
            Arc::clone(&raw),
            Arc::new(PipelineStats::new()),
        );
        (sub, buffer, raw)
    }

    #[test]
    fn accepted_payload_feeds_buffer_and_forwarding_queue() {
        let (_tx, rx) = unbounded();
        let (sub, buffer, raw) = subscriber(rx);
        let mut rng = StdRng::seed_from_u64(1);

        sub.handle_payload(&line(&RecordLayout::default()), &mut rng).unwrap();

        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.snapshot()[0].channel(4), 5.5);
        let forwarded = raw.pop().unwrap();
        assert_eq!(forwarded.tokens.len(), 20);
    }

    #[test]
    fn malformed_payload_is_dropped() {
        let (_tx, rx) = unbounded();
        let (sub, buffer, raw) = subscriber(rx);
        let mut rng = StdRng::seed_from_u64(1);

        assert!(sub.handle_payload("1,2,3", &mut rng).is_err());
        assert!(sub.handle_payload(&vec!["a"; 20].join(","), &mut rng).is_err());
        assert!(buffer.is_empty());
        assert!(raw.is_empty());
    }

    #[test]
    fn certain_faults_replace_every_targeted_field() {
        let layout = RecordLayout::default();
        let injector = FaultInjector::new(
            FaultInjectionConfig {
                enabled: true,
                orientation_probability: 1.0,
                wind_probability: 1.0,
                voltage_probability: 1.0,
            },
            layout.clone(),
        );
        let mut record = RawRecord::parse(&line(&layout), &layout).unwrap();
        let mut rng = StdRng::seed_from_u64(7);

        assert!(injector.inject(&mut record, &mut rng));
        assert!((0.0..10.0).contains(&record.value(layout.wind)));
        let volt = record.value(layout.voltage);
        assert_eq!(volt.fract(), 0.0);
        assert!((0.0..1000.0).contains(&volt));
    }

    #[test]
    fn disabled_injection_is_not_installed() {
        let (_tx, rx) = unbounded();
        let (sub, _, _) = subscriber(rx);
        let sub = sub.with_fault_injection(FaultInjectionConfig::default());
        assert!(sub.faults.is_none());
    }

    #[test]
    fn thread_consumes_until_stopped() {
        let (tx, rx) = unbounded();
        let (sub, buffer, _) = subscriber(rx);
        let (handle, signal) = stop_pair();
        let worker = sub.spawn(signal).unwrap();

        for _ in 0..25 {
            tx.send(line(&RecordLayout::default())).unwrap();
        }
        tx.send("garbage".into()).unwrap();

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while buffer.len() < 25 && std::time::Instant::now() < deadline {
            thread::sleep(std::time::Duration::from_millis(5));
        }
        handle.stop();
        worker.join().unwrap();
        assert_eq!(buffer.len(), 25);
    }
}

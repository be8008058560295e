//! Pipeline counters and bounded cycle-latency history.
//! Counters are atomics (touched from the subscriber and controller threads);
//! latency history keeps the 1000 most recent cycles.

use std::{
    collections::VecDeque,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use log::info;
use parking_lot::Mutex;

pub const MAX_POINTS: usize = 1_000;

/// Appends a value; drops the oldest once `MAX_POINTS` are held.
#[inline]
pub fn push_capped(buf: &mut VecDeque<u64>, val: u64) {
    if buf.len() >= MAX_POINTS {
        buf.pop_front();
    }
    buf.push_back(val);
}

#[derive(Debug, Default)]
pub struct PipelineStats {
    records_accepted: AtomicU64,
    records_dropped: AtomicU64,
    cycles_completed: AtomicU64,
    cycles_skipped: AtomicU64,
    anomalies: AtomicU64,
    latency_us: Mutex<VecDeque<u64>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LatencySummary {
    pub min_us: u64,
    pub max_us: u64,
    pub mean_us: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatsSnapshot {
    pub records_accepted: u64,
    pub records_dropped: u64,
    pub cycles_completed: u64,
    pub cycles_skipped: u64,
    pub anomalies: u64,
    pub latency: Option<LatencySummary>,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_accepted(&self) {
        self.records_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.records_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cycle_completed(&self, elapsed: Duration, anomalous: bool) {
        self.cycles_completed.fetch_add(1, Ordering::Relaxed);
        if anomalous {
            self.anomalies.fetch_add(1, Ordering::Relaxed);
        }
        push_capped(&mut self.latency_us.lock(), elapsed.as_micros() as u64);
    }

    pub fn cycle_skipped(&self) {
        self.cycles_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            records_accepted: self.records_accepted.load(Ordering::Relaxed),
            records_dropped: self.records_dropped.load(Ordering::Relaxed),
            cycles_completed: self.cycles_completed.load(Ordering::Relaxed),
            cycles_skipped: self.cycles_skipped.load(Ordering::Relaxed),
            anomalies: self.anomalies.load(Ordering::Relaxed),
            latency: summarize(&self.latency_us.lock()),
        }
    }

    pub fn log_summary(&self) {
        let s = self.snapshot();
        info!(
            "Records: {} accepted, {} dropped | Cycles: {} completed, {} skipped, {} anomalous",
            s.records_accepted, s.records_dropped, s.cycles_completed, s.cycles_skipped, s.anomalies
        );
        if let Some(l) = s.latency {
            info!(
                "Cycle latency over last {}: min {} us, mean {:.1} us, max {} us",
                l.count, l.min_us, l.mean_us, l.max_us
            );
        }
    }
}

fn summarize(data: &VecDeque<u64>) -> Option<LatencySummary> {
    if data.is_empty() {
        return None;
    }
    let count = data.len();
    Some(LatencySummary {
        min_us: data.iter().copied().min().unwrap_or_default(),
        max_us: data.iter().copied().max().unwrap_or_default(),
        mean_us: data.iter().sum::<u64>() as f64 / count as f64,
        count,
    })
}

//! Lifecycle events bracketing each inference cycle.
//!
//! Two consumers, two structures:
//! - the power logger reads events from an unbounded FIFO channel (attribution only)
//! - the inference log keeps every event with its wall-clock time, flushed at shutdown

use std::{fmt, sync::Arc};

use crossbeam::channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use serde::Serialize;

use crate::clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Start,
    End,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleEvent {
    pub inference: u64,
    pub phase: Phase,
}

impl LifecycleEvent {
    pub fn start(inference: u64) -> Self {
        Self {
            inference,
            phase: Phase::Start,
        }
    }

    pub fn end(inference: u64) -> Self {
        Self {
            inference,
            phase: Phase::End,
        }
    }

    /// `inference no.N start` / `inference no.N end`.
    pub fn label(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self.phase {
            Phase::Start => "start",
            Phase::End => "end",
        };
        write!(f, "inference no.{} {}", self.inference, phase)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InferenceLogRow {
    pub timestamp: String,
    pub event: String,
}

/// Chronological record of every emitted lifecycle event.
#[derive(Debug, Default)]
pub struct InferenceLog {
    rows: Mutex<Vec<InferenceLogRow>>,
}

impl InferenceLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: &LifecycleEvent) {
        self.rows.lock().push(InferenceLogRow {
            timestamp: clock::now_iso(),
            event: event.label(),
        });
    }

    pub fn rows(&self) -> Vec<InferenceLogRow> {
        self.rows.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Producer side: every emitted event goes to the inference log and the event queue.
#[derive(Clone)]
pub struct EventBus {
    tx: Sender<LifecycleEvent>,
    log: Arc<InferenceLog>,
}

impl EventBus {
    pub fn new(log: Arc<InferenceLog>) -> (Self, Receiver<LifecycleEvent>) {
        let (tx, rx) = unbounded();
        (Self { tx, log }, rx)
    }

    pub fn emit(&self, event: LifecycleEvent) {
        self.log.record(&event);
        // Consumer gone means no one attributes power anymore; the log still has it.
        let _ = self.tx.send(event);
    }

    pub fn log(&self) -> &Arc<InferenceLog> {
        &self.log
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_carry_counter_and_phase() {
        assert_eq!(LifecycleEvent::start(7).label(), "inference no.7 start");
        assert_eq!(LifecycleEvent::end(7).label(), "inference no.7 end");
    }

    #[test]
    fn emitted_events_reach_queue_and_log_in_order() {
        let (bus, rx) = EventBus::new(Arc::new(InferenceLog::new()));
        bus.emit(LifecycleEvent::start(1));
        bus.emit(LifecycleEvent::end(1));
        bus.emit(LifecycleEvent::start(2));

        let drained: Vec<LifecycleEvent> = rx.try_iter().collect();
        assert_eq!(
            drained,
            vec![
                LifecycleEvent::start(1),
                LifecycleEvent::end(1),
                LifecycleEvent::start(2)
            ]
        );

        let events: Vec<String> = bus.log().rows().into_iter().map(|r| r.event).collect();
        assert_eq!(
            events,
            vec!["inference no.1 start", "inference no.1 end", "inference no.2 start"]
        );
    }

    #[test]
    fn emit_survives_dropped_consumer() {
        let (bus, rx) = EventBus::new(Arc::new(InferenceLog::new()));
        drop(rx);
        bus.emit(LifecycleEvent::start(1));
        assert_eq!(bus.log().len(), 1);
    }
}

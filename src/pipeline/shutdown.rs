//! Cooperative stop signal shared by every long-running thread.
//! - `StopHandle::stop()` flips an atomic flag and disconnects a channel
//! - waits are `recv_timeout` on that channel, so sleeping loops wake immediately on stop

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender, bounded};
use parking_lot::Mutex;

#[derive(Clone)]
pub struct StopHandle {
    stopped: Arc<AtomicBool>,
    tx: Arc<Mutex<Option<Sender<()>>>>,
}

#[derive(Clone)]
pub struct StopSignal {
    stopped: Arc<AtomicBool>,
    rx: Receiver<()>,
}

pub fn stop_pair() -> (StopHandle, StopSignal) {
    let (tx, rx) = bounded(0);
    let stopped = Arc::new(AtomicBool::new(false));
    (
        StopHandle {
            stopped: Arc::clone(&stopped),
            tx: Arc::new(Mutex::new(Some(tx))),
        },
        StopSignal { stopped, rx },
    )
}

impl StopHandle {
    /// Idempotent.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        self.tx.lock().take();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

impl StopSignal {
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Sleeps for up to `timeout`. Returns `true` if the stop was requested.
    pub fn wait(&self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => self.is_stopped(),
            _ => true,
        }
    }

    /// Blocks until stop is requested.
    pub fn wait_forever(&self) {
        while !self.is_stopped() {
            let _ = self.rx.recv();
        }
    }

    /// For `select!` alongside other channels; becomes ready (disconnected) on stop.
    pub fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }
}

/// Trips the stop handle when dropped, including during a panic unwind.
pub struct StopOnExit(pub StopHandle);

impl Drop for StopOnExit {
    fn drop(&mut self) {
        self.0.stop();
    }
}

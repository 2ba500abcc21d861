//! Idempotent cancellation shared by a session's tasks.

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;

struct StopState {
    stopped: bool,
    /// Dropping this sender wakes every receiver of the stop signal.
    signal: Option<Sender<()>>,
}

/// Fires the consumer-stop signal at most once.
pub(crate) struct StopGate {
    state: Mutex<StopState>,
}

impl StopGate {
    /// Create a gate and the receiver that observes it.
    pub(crate) fn new() -> (Self, Receiver<()>) {
        let (tx, rx) = bounded(1);
        let gate = Self {
            state: Mutex::new(StopState {
                stopped: false,
                signal: Some(tx),
            }),
        };
        (gate, rx)
    }

    /// Signal stop. Returns true only for the call that actually fired it.
    pub(crate) fn stop(&self) -> bool {
        let mut state = self.state.lock();
        if state.stopped {
            return false;
        }
        state.stopped = true;
        state.signal.take();
        true
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.state.lock().stopped
    }
}

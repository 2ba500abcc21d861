//! Consumer side of a watch session.

use super::lifecycle::StopGate;
use crate::error::Result;
use crate::types::Event;
use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use std::sync::Arc;
use std::time::Duration;

/// Generic interface of anything that produces watch events.
pub trait WatchInterface<T> {
    /// Channel of events. Disconnects once the watch is over.
    fn result_chan(&self) -> &Receiver<Event<T>>;

    /// Stop watching. Safe to call any number of times.
    fn stop(&self);
}

/// Cloneable handle that stops a watch from anywhere.
#[derive(Clone)]
pub struct Stopper {
    gate: Arc<StopGate>,
}

impl Stopper {
    pub fn stop(&self) {
        if self.gate.stop() {
            tracing::debug!("watch stop requested");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.gate.is_stopped()
    }
}

/// Handle to a running watch session.
///
/// Events arrive in store order. The stream ends (`None` from the iterator)
/// when the store feed ends or after [`stop`](EventStream::stop). Dropping the
/// stream stops the watch.
pub struct EventStream<T> {
    receiver: Receiver<Event<T>>,
    stopper: Stopper,
    started: Option<Receiver<Result<()>>>,
}

impl<T> EventStream<T> {
    pub(crate) fn new(
        receiver: Receiver<Event<T>>,
        gate: Arc<StopGate>,
        started: Receiver<Result<()>>,
    ) -> Self {
        Self {
            receiver,
            stopper: Stopper { gate },
            started: Some(started),
        }
    }

    /// Block until the watch is acknowledged or fails to start.
    ///
    /// Success is reported once the feed has survived the grace window, so a
    /// watch that fails later still reports `Ok` here; its failure then ends
    /// the stream. Only the first call waits.
    pub fn wait_started(&mut self) -> Result<()> {
        match self.started.take() {
            Some(started) => started.recv().unwrap_or(Ok(())),
            None => Ok(()),
        }
    }

    /// Receive without blocking.
    pub fn try_next(&self) -> std::result::Result<Event<T>, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn next_timeout(&self, timeout: Duration) -> std::result::Result<Event<T>, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    pub fn stop(&self) {
        self.stopper.stop();
    }

    pub fn stopper(&self) -> Stopper {
        self.stopper.clone()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopper.is_stopped()
    }
}

impl<T> WatchInterface<T> for EventStream<T> {
    fn result_chan(&self) -> &Receiver<Event<T>> {
        &self.receiver
    }

    fn stop(&self) {
        self.stopper.stop();
    }
}

impl<T> Iterator for EventStream<T> {
    type Item = Event<T>;

    /// Receive the next event (blocking).
    fn next(&mut self) -> Option<Event<T>> {
        self.receiver.recv().ok()
    }
}

impl<T> Drop for EventStream<T> {
    fn drop(&mut self) {
        self.stopper.stop();
    }
}

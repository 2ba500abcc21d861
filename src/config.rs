//! Watch session configuration.

use std::time::Duration;

/// How long the feed gets to fail before a watch is reported as started.
pub const DEFAULT_GRACE_WINDOW: Duration = Duration::from_millis(100);

/// Configuration for a watch session.
#[derive(Clone, Debug)]
pub struct WatchConfig {
    /// Grace window for the startup acknowledgment.
    /// Default: 100ms
    pub grace_window: Duration,

    /// Capacity of the queue between the store feed and the translator.
    /// Default: 0 (direct handoff)
    pub incoming_capacity: usize,

    /// Capacity of the queue between the translator and the consumer.
    /// Default: 0 (direct handoff, the translator waits for the consumer)
    pub outgoing_capacity: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            grace_window: DEFAULT_GRACE_WINDOW,
            incoming_capacity: 0,
            outgoing_capacity: 0,
        }
    }
}

impl WatchConfig {
    pub fn with_grace_window(mut self, grace_window: Duration) -> Self {
        self.grace_window = grace_window;
        self
    }

    pub fn with_incoming_capacity(mut self, capacity: usize) -> Self {
        self.incoming_capacity = capacity;
        self
    }

    pub fn with_outgoing_capacity(mut self, capacity: usize) -> Self {
        self.outgoing_capacity = capacity;
        self
    }
}

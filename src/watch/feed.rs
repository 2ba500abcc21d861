//! The live feed: runs the store's blocking watch call on its own thread.

use super::snapshot::fetch_initial_state;
use crate::client::KeyValueClient;
use crate::error::{Result, WatchError};
use crate::types::Response;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, warn};

/// What the feed watches and from where.
pub(crate) struct FeedPump {
    pub client: Arc<dyn KeyValueClient>,
    pub key: String,
    pub recursive: bool,
    /// `None` takes a snapshot first and resumes after it.
    pub resume_version: Option<u64>,
    pub grace_window: Duration,
}

pub(crate) struct FeedChannels {
    pub incoming: Sender<Response>,
    pub store_stop: Receiver<()>,
    /// One slot: the first report wins.
    pub started: Sender<Result<()>>,
    /// Never sent on; dropped when the feed exits.
    pub ended: Sender<()>,
}

impl FeedPump {
    pub(crate) fn spawn(self, channels: FeedChannels) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(format!("watch-feed:{}", self.key))
            .spawn(move || self.run(channels))
    }

    fn run(self, channels: FeedChannels) {
        let FeedChannels {
            incoming,
            store_stop,
            started,
            ended,
        } = channels;
        // Held for the life of the call so receivers see the end even on unwind.
        let _ended = ended;

        let since = match self.resume_version {
            Some(version) => {
                self.start_grace_timer(&started);
                version
            }
            None => {
                let initial = match fetch_initial_state(&*self.client, &self.key, self.recursive) {
                    Ok(initial) => initial,
                    Err(e) => {
                        error!(key = %self.key, error = %e, "watch was unable to retrieve the current index for the provided key");
                        report(&started, Err(e));
                        return;
                    }
                };
                self.start_grace_timer(&started);

                let version = initial.version;
                debug!(key = %self.key, version, records = initial.records.len(), "replaying initial state");
                if !initial.enqueue(&incoming) {
                    debug!(key = %self.key, "watch closed during initial replay");
                    return;
                }
                version + 1
            }
        };

        match self
            .client
            .watch(&self.key, since, self.recursive, incoming, store_stop)
        {
            Ok(()) => debug!(key = %self.key, "watch sink closed"),
            Err(WatchError::StoppedByUser) => debug!(key = %self.key, "watch stopped by user"),
            Err(e) => {
                error!(key = %self.key, since, error = %e, "watch stopped unexpectedly");
                report(&started, Err(e));
            }
        }
    }

    /// Report success after the grace window unless something failed first.
    ///
    /// This is a guess: a watch that fails later than the window is reported
    /// as started, and its failure only ends the stream.
    fn start_grace_timer(&self, started: &Sender<Result<()>>) {
        let timer_started = started.clone();
        let grace_window = self.grace_window;
        let spawned = thread::Builder::new()
            .name("watch-grace".to_string())
            .spawn(move || {
                thread::sleep(grace_window);
                report(&timer_started, Ok(()));
            });

        if let Err(e) = spawned {
            warn!(key = %self.key, error = %e, "unable to start grace timer, acknowledging watch now");
            report(started, Ok(()));
        }
    }
}

fn report(started: &Sender<Result<()>>, result: Result<()>) {
    match started.try_send(result) {
        Ok(()) => {}
        Err(TrySendError::Full(Err(e))) => {
            debug!(error = %e, "watch already acknowledged, failure ends the stream")
        }
        Err(_) => {}
    }
}

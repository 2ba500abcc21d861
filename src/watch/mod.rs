//! Watch sessions over a key-value store.
//!
//! A session runs two threads:
//! - the feed, which optionally replays the current state of the key and
//!   then blocks in the store's watch call, pushing raw notifications onto
//!   an internal queue
//! - the translator, which decodes, classifies and filters each
//!   notification and hands the resulting events to the consumer
//!
//! The translator owns the consumer's channel, so the stream closes exactly
//! once: when the translator exits, either because the feed ended or because
//! the consumer stopped.
//!
//! # Example
//!
//! ```ignore
//! let mut stream = start_watch(
//!     client,
//!     WatchRequest::list("/registry/pods", None, everything()),
//!     ObjectDecoder::new(Arc::new(JsonCodec::<Pod>::new()), Some(Arc::new(ObjectVersioner)), None),
//!     &WatchConfig::default(),
//! )?;
//!
//! for event in stream.by_ref() {
//!     println!("{}: {:?}", event.kind, event.object);
//! }
//! ```

mod feed;
mod lifecycle;
mod snapshot;
mod stream;
mod translate;

pub use stream::{EventStream, Stopper, WatchInterface};

use crate::client::KeyValueClient;
use crate::codec::{FilterFn, ObjectDecoder};
use crate::config::WatchConfig;
use crate::error::Result;
use crossbeam_channel::bounded;
use feed::{FeedChannels, FeedPump};
use lifecycle::StopGate;
use std::sync::Arc;
use translate::{Translator, TranslatorChannels};

/// What to watch.
pub struct WatchRequest<T> {
    pub key: String,

    /// Watch the whole subtree under `key` rather than the key itself.
    pub recursive: bool,

    /// Store index to resume from. `None` replays the current state first.
    pub resume_version: Option<u64>,

    /// Only objects passing this filter are part of the stream.
    pub filter: FilterFn<T>,
}

impl<T> WatchRequest<T> {
    /// Recursive watch over the items under `key`.
    pub fn list(key: impl Into<String>, resume_version: Option<u64>, filter: FilterFn<T>) -> Self {
        Self {
            key: key.into(),
            recursive: true,
            resume_version,
            filter,
        }
    }

    /// Watch of a single key.
    pub fn single(key: impl Into<String>, resume_version: Option<u64>, filter: FilterFn<T>) -> Self {
        Self {
            key: key.into(),
            recursive: false,
            resume_version,
            filter,
        }
    }
}

/// Start a watch session and return its event stream.
///
/// Fails only if the session's threads cannot be spawned; store errors are
/// reported through [`EventStream::wait_started`] or end the stream.
pub fn start_watch<T: Send + 'static>(
    client: Arc<dyn KeyValueClient>,
    request: WatchRequest<T>,
    decoder: ObjectDecoder<T>,
    config: &WatchConfig,
) -> Result<EventStream<T>> {
    let (incoming_tx, incoming_rx) = bounded(config.incoming_capacity);
    let (outgoing_tx, outgoing_rx) = bounded(config.outgoing_capacity);
    let (store_stop_tx, store_stop_rx) = bounded(1);
    let (started_tx, started_rx) = bounded(1);
    let (ended_tx, ended_rx) = bounded(0);
    let (gate, user_stop_rx) = StopGate::new();
    let gate = Arc::new(gate);

    tracing::debug!(
        key = %request.key,
        recursive = request.recursive,
        resume_version = ?request.resume_version,
        "starting watch"
    );

    let translator = Translator::new(decoder, request.filter);
    translator.spawn(
        format!("watch-translate:{}", request.key),
        TranslatorChannels {
            incoming: incoming_rx,
            feed_ended: ended_rx,
            user_stop: user_stop_rx,
            store_stop: store_stop_tx,
            outgoing: outgoing_tx,
        },
    )?;

    let pump = FeedPump {
        client,
        key: request.key,
        recursive: request.recursive,
        resume_version: request.resume_version,
        grace_window: config.grace_window,
    };
    let spawned = pump.spawn(FeedChannels {
        incoming: incoming_tx,
        store_stop: store_stop_rx,
        started: started_tx,
        ended: ended_tx,
    });
    if let Err(e) = spawned {
        // The translator is already running; make it exit.
        gate.stop();
        return Err(e.into());
    }

    Ok(EventStream::new(outgoing_rx, gate, started_rx))
}

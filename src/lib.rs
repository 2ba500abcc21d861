//! # KV Watch
//!
//! Turns the native watch protocol of a hierarchical key-value store into an
//! ordered, filterable, cancellable stream of typed events.
//!
//! ## Core Concepts
//!
//! - **Store client**: anything implementing [`KeyValueClient`] (`get` + blocking `watch`)
//! - **Snapshot**: without a resume version, the current entries are replayed first
//! - **Filter**: objects crossing the filter boundary show up as added/deleted
//! - **Resume version**: every event carries the store index it came from
//!
//! ## Example
//!
//! ```ignore
//! use kv_watch::{everything, JsonCodec, MemoryClient, ObjectVersioner, WatchHelper};
//!
//! let store = Arc::new(MemoryClient::new());
//! let helper = WatchHelper::<Pod>::new(store.clone(), Arc::new(JsonCodec::new()))
//!     .with_versioner(Arc::new(ObjectVersioner));
//!
//! let mut pods = helper.watch_list("/registry/pods", None, everything())?;
//! store.create("/registry/pods/web", r#"{"name":"web"}"#)?;
//!
//! let event = pods.next().unwrap();
//! assert_eq!(event.kind, EventType::Added);
//! pods.stop();
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod helper;
pub mod memory;
pub mod types;
pub mod watch;

// Re-exports
pub use client::KeyValueClient;
pub use codec::{
    everything, Codec, FilterFn, JsonCodec, ObjectDecoder, ObjectVersioner, ResourceVersioner,
    TransformFn, Versioned,
};
pub use config::WatchConfig;
pub use error::{Result, WatchError};
pub use helper::WatchHelper;
pub use memory::MemoryClient;
pub use types::*;
pub use watch::{start_watch, EventStream, Stopper, WatchInterface, WatchRequest};

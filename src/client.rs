//! Contract of the backing key-value store client.

use crate::error::Result;
use crate::types::Response;
use crossbeam_channel::{Receiver, Sender};

/// A watch-capable hierarchical key-value store.
pub trait KeyValueClient: Send + Sync {
    /// Read the current state of `key`.
    ///
    /// A missing key fails with [`WatchError::KeyNotFound`], which may carry
    /// the store index at the time of the read.
    ///
    /// [`WatchError::KeyNotFound`]: crate::WatchError::KeyNotFound
    fn get(&self, key: &str, sort: bool, recursive: bool) -> Result<Response>;

    /// Stream every mutation of `key` (or its subtree when `recursive`) with
    /// an index of at least `since` into `sink`.
    ///
    /// Blocks until `stop` fires, returning [`WatchError::StoppedByUser`], or
    /// until the watch fails. Returns `Ok(())` if the receiving end of `sink`
    /// went away.
    ///
    /// [`WatchError::StoppedByUser`]: crate::WatchError::StoppedByUser
    fn watch(
        &self,
        key: &str,
        since: u64,
        recursive: bool,
        sink: Sender<Response>,
        stop: Receiver<()>,
    ) -> Result<()>;
}

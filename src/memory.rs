//! In-memory store client.
//!
//! A hierarchical key-value store with a global index, bounded event history
//! and blocking watches, implementing [`KeyValueClient`]. Directories are
//! implicit: a key is a directory when other keys live under it.
//!
//! Besides the usual mutations it can inject failures and raw notifications,
//! which makes it the store of choice for exercising watch sessions.

use crate::client::KeyValueClient;
use crate::error::{Result, WatchError};
use crate::types::{Action, Node, Response};
use crossbeam_channel::{select, unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::{debug, trace};

/// Number of events kept for watches that resume in the past.
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

#[derive(Clone, Debug)]
struct Entry {
    value: String,
    created_index: u64,
    modified_index: u64,
}

impl Entry {
    fn node(&self, key: &str) -> Node {
        Node::leaf(key, self.value.clone(), self.created_index, self.modified_index)
    }
}

struct Watcher {
    id: u64,
    key: String,
    recursive: bool,
    sender: Sender<Response>,
}

#[derive(Default)]
struct State {
    entries: BTreeMap<String, Entry>,
    index: u64,
    history: VecDeque<Response>,
    /// Index of the newest event evicted from history.
    cleared_through: u64,
    watchers: Vec<Watcher>,
    next_watcher_id: u64,
    fail_next_get: Option<WatchError>,
    fail_next_watch: Option<WatchError>,
}

/// Thread-safe in-memory store.
pub struct MemoryClient {
    state: Mutex<State>,
    history_capacity: usize,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::with_history_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    pub fn with_history_capacity(capacity: usize) -> Self {
        Self {
            state: Mutex::new(State::default()),
            history_capacity: capacity.max(1),
        }
    }

    /// Current global index.
    pub fn index(&self) -> u64 {
        self.state.lock().index
    }

    /// Number of watches currently registered.
    pub fn watcher_count(&self) -> usize {
        self.state.lock().watchers.len()
    }

    // --- Mutations ---

    /// Create `key`, failing if it already exists.
    pub fn create(&self, key: &str, value: impl Into<String>) -> Result<Response> {
        let key = normalize(key);
        let mut state = self.state.lock();
        if state.entries.contains_key(&key) {
            return Err(WatchError::NodeExists(key));
        }
        Ok(self.write(&mut state, key, value.into(), Action::Create))
    }

    /// Create or overwrite `key`.
    pub fn set(&self, key: &str, value: impl Into<String>) -> Result<Response> {
        let key = normalize(key);
        let mut state = self.state.lock();
        Ok(self.write(&mut state, key, value.into(), Action::Set))
    }

    /// Overwrite `key` only if it currently holds `expected`.
    pub fn compare_and_swap(
        &self,
        key: &str,
        expected: &str,
        value: impl Into<String>,
    ) -> Result<Response> {
        let key = normalize(key);
        let mut state = self.state.lock();
        let found = match state.entries.get(&key) {
            Some(entry) => entry.value.clone(),
            None => {
                return Err(WatchError::KeyNotFound {
                    key,
                    index: Some(state.index),
                })
            }
        };
        if found != expected {
            return Err(WatchError::CompareFailed {
                key,
                expected: expected.to_string(),
                found,
            });
        }
        Ok(self.write(&mut state, key, value.into(), Action::CompareAndSwap))
    }

    /// Remove `key`. The notification carries a tombstone at the deletion index.
    pub fn delete(&self, key: &str) -> Result<Response> {
        let key = normalize(key);
        let mut state = self.state.lock();
        let Some(previous) = state.entries.remove(&key) else {
            return Err(WatchError::KeyNotFound {
                key,
                index: Some(state.index),
            });
        };

        state.index += 1;
        let index = state.index;
        let response = Response {
            action: Action::Delete,
            node: Some(Node {
                key: key.clone(),
                modified_index: index,
                created_index: previous.created_index,
                ..Default::default()
            }),
            prev_node: Some(previous.node(&key)),
            index,
        };
        self.record(&mut state, response.clone());
        Ok(response)
    }

    fn write(&self, state: &mut State, key: String, value: String, action: Action) -> Response {
        state.index += 1;
        let index = state.index;

        let previous = state.entries.get(&key).cloned();
        let entry = Entry {
            value,
            created_index: previous.as_ref().map_or(index, |p| p.created_index),
            modified_index: index,
        };
        let response = Response {
            action,
            node: Some(entry.node(&key)),
            prev_node: previous.map(|p| p.node(&key)),
            index,
        };
        state.entries.insert(key, entry);
        self.record(state, response.clone());
        response
    }

    // --- Test hooks ---

    /// Deliver `response` to watches as-is, without touching stored data.
    pub fn publish(&self, response: Response) {
        let mut state = self.state.lock();
        self.record(&mut state, response);
    }

    /// Fail the next `get` with `error`.
    pub fn fail_next_get(&self, error: WatchError) {
        self.state.lock().fail_next_get = Some(error);
    }

    /// Fail the next `watch` with `error` before it streams anything.
    pub fn fail_next_watch(&self, error: WatchError) {
        self.state.lock().fail_next_watch = Some(error);
    }

    /// Drop every live watch, as a lost connection would.
    pub fn sever_watches(&self) {
        let mut state = self.state.lock();
        debug!(watchers = state.watchers.len(), "severing watches");
        state.watchers.clear();
    }

    // --- Internal ---

    fn record(&self, state: &mut State, response: Response) {
        let key = event_key(&response).map(str::to_string);
        state.watchers.retain(|w| {
            if !key.as_deref().map_or(true, |k| matches_key(&w.key, w.recursive, k)) {
                return true;
            }
            w.sender.send(response.clone()).is_ok()
        });

        state.history.push_back(response);
        while state.history.len() > self.history_capacity {
            if let Some(evicted) = state.history.pop_front() {
                state.cleared_through = event_index(&evicted);
            }
        }
    }
}

impl Default for MemoryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueClient for MemoryClient {
    fn get(&self, key: &str, _sort: bool, recursive: bool) -> Result<Response> {
        let key = normalize(key);
        let mut state = self.state.lock();
        if let Some(error) = state.fail_next_get.take() {
            return Err(error);
        }

        if let Some(entry) = state.entries.get(&key) {
            return Ok(Response {
                action: Action::Get,
                node: Some(entry.node(&key)),
                prev_node: None,
                index: state.index,
            });
        }

        match dir_node(&state.entries, &key, recursive) {
            Some(node) => Ok(Response {
                action: Action::Get,
                node: Some(node),
                prev_node: None,
                index: state.index,
            }),
            None => Err(WatchError::KeyNotFound {
                key,
                index: Some(state.index),
            }),
        }
    }

    fn watch(
        &self,
        key: &str,
        since: u64,
        recursive: bool,
        sink: Sender<Response>,
        stop: Receiver<()>,
    ) -> Result<()> {
        let key = normalize(key);
        let (id, events) = {
            let mut state = self.state.lock();
            if let Some(error) = state.fail_next_watch.take() {
                return Err(error);
            }

            let since = if since == 0 { state.index + 1 } else { since };
            if since <= state.cleared_through {
                return Err(WatchError::IndexCleared {
                    requested: since,
                    oldest: state.cleared_through + 1,
                });
            }

            // Replay and registration happen under one lock, so nothing is
            // missed or seen twice.
            let (tx, rx) = unbounded();
            for response in &state.history {
                let in_scope = event_key(response)
                    .map_or(true, |k| matches_key(&key, recursive, k));
                if in_scope && event_index(response) >= since {
                    let _ = tx.send(response.clone());
                }
            }
            state.next_watcher_id += 1;
            let id = state.next_watcher_id;
            trace!(key = %key, since, id, replayed = rx.len(), "watch registered");
            state.watchers.push(Watcher {
                id,
                key: key.clone(),
                recursive,
                sender: tx,
            });
            (id, rx)
        };
        let _registration = Registration { client: self, id };

        loop {
            select! {
                recv(stop) -> _ => return Err(WatchError::StoppedByUser),
                recv(events) -> msg => match msg {
                    Ok(response) => select! {
                        send(sink, response) -> res => {
                            if res.is_err() {
                                return Ok(());
                            }
                        }
                        recv(stop) -> _ => return Err(WatchError::StoppedByUser),
                    },
                    Err(_) => {
                        return Err(WatchError::Transport(format!("watch on {key} closed by store")))
                    }
                },
            }
        }
    }
}

fn normalize(key: &str) -> String {
    let trimmed = key.trim_matches('/');
    format!("/{trimmed}")
}

fn dir_prefix(key: &str) -> String {
    if key == "/" {
        key.to_string()
    } else {
        format!("{key}/")
    }
}

fn matches_key(watch_key: &str, recursive: bool, key: &str) -> bool {
    key == watch_key || (recursive && key.starts_with(&dir_prefix(watch_key)))
}

fn event_key(response: &Response) -> Option<&str> {
    response
        .node
        .as_ref()
        .or(response.prev_node.as_ref())
        .map(|n| n.key.as_str())
}

fn event_index(response: &Response) -> u64 {
    response
        .node
        .as_ref()
        .or(response.prev_node.as_ref())
        .map_or(response.index, |n| n.modified_index)
}

/// Unregisters a watch when its call returns.
struct Registration<'a> {
    client: &'a MemoryClient,
    id: u64,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.client
            .state
            .lock()
            .watchers
            .retain(|w| w.id != self.id);
        trace!(id = self.id, "watch unregistered");
    }
}

/// Directory node for `key`, or `None` if nothing lives under it.
fn dir_node(entries: &BTreeMap<String, Entry>, key: &str, recursive: bool) -> Option<Node> {
    let prefix = dir_prefix(key);
    let mut children = Vec::new();
    let mut subdirs = BTreeSet::new();
    let mut created = u64::MAX;
    let mut modified = 0;

    for (child_key, entry) in entries
        .range(prefix.clone()..)
        .take_while(|(k, _)| k.starts_with(&prefix))
    {
        created = created.min(entry.created_index);
        modified = modified.max(entry.modified_index);

        let rest = &child_key[prefix.len()..];
        match rest.split_once('/') {
            None => children.push(entry.node(child_key)),
            Some((name, _)) => {
                let sub = format!("{prefix}{name}");
                if !subdirs.insert(sub.clone()) {
                    continue;
                }
                if recursive {
                    children.extend(dir_node(entries, &sub, true));
                } else {
                    children.push(Node::dir(sub, Vec::new(), 0, 0));
                }
            }
        }
    }

    if children.is_empty() && key != "/" {
        return None;
    }
    if children.is_empty() {
        created = 0;
    }
    Some(Node::dir(key, children, created, modified))
}

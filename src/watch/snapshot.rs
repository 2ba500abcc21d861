//! Turns a read of the current state into the records a watch would have sent.

use crate::client::KeyValueClient;
use crate::error::Result;
use crate::types::{Action, Node, Response};
use crossbeam_channel::Sender;

/// Current state of a key, as synthetic `get` records.
#[derive(Debug)]
pub(crate) struct InitialState {
    /// Store index observed by the read. The live feed resumes after it.
    pub version: u64,
    pub records: Vec<Response>,
}

/// Read `key` once and flatten the result.
///
/// A missing key is not an error: it yields no records and the index hint
/// carried by the error (or zero).
pub(crate) fn fetch_initial_state(
    client: &dyn KeyValueClient,
    key: &str,
    recursive: bool,
) -> Result<InitialState> {
    let response = match client.get(key, false, recursive) {
        Ok(response) => response,
        Err(e) if e.is_not_found() => {
            return Ok(InitialState {
                version: e.index_hint().unwrap_or(0),
                records: Vec::new(),
            });
        }
        Err(e) => return Err(e),
    };

    let mut records = Vec::new();
    if let Some(node) = &response.node {
        flatten(node, response.index, &mut records);
    }

    Ok(InitialState {
        version: response.index,
        records,
    })
}

/// Depth-first: one record per leaf, each carrying the read's store index.
fn flatten(node: &Node, index: u64, out: &mut Vec<Response>) {
    if node.dir {
        for child in &node.nodes {
            flatten(child, index, out);
        }
        return;
    }

    out.push(Response {
        action: Action::Get,
        node: Some(node.clone()),
        prev_node: None,
        index,
    });
}

impl InitialState {
    /// Push every record onto the internal queue.
    ///
    /// Returns false if the translator went away before all were taken.
    pub(crate) fn enqueue(self, incoming: &Sender<Response>) -> bool {
        for record in self.records {
            if incoming.send(record).is_err() {
                return false;
            }
        }
        true
    }
}

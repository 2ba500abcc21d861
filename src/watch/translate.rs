//! Converts raw store notifications into watch events.

use crate::codec::{FilterFn, ObjectDecoder};
use crate::error::{Result, WatchError};
use crate::types::{Action, Event, Node, Response};
use crossbeam_channel::{select, Receiver, Sender};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, trace};

pub(crate) struct TranslatorChannels<T> {
    pub incoming: Receiver<Response>,
    pub feed_ended: Receiver<()>,
    pub user_stop: Receiver<()>,
    pub store_stop: Sender<()>,
    /// Dropped when the translator exits, which closes the stream.
    pub outgoing: Sender<Event<T>>,
}

/// Decodes, classifies and filters store notifications.
pub(crate) struct Translator<T> {
    decoder: ObjectDecoder<T>,
    filter: FilterFn<T>,
}

enum Emit {
    Sent,
    /// The consumer stopped or hung up.
    Closed,
}

impl<T: Send + 'static> Translator<T> {
    pub(crate) fn new(decoder: ObjectDecoder<T>, filter: FilterFn<T>) -> Self {
        Self { decoder, filter }
    }

    pub(crate) fn spawn(
        self,
        name: String,
        channels: TranslatorChannels<T>,
    ) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(name)
            .spawn(move || self.run(channels))
    }

    fn run(self, channels: TranslatorChannels<T>) {
        let TranslatorChannels {
            incoming,
            feed_ended,
            user_stop,
            store_stop,
            outgoing,
        } = channels;

        loop {
            select! {
                recv(feed_ended) -> _ => {
                    // Whatever is already queued was produced before the feed ended.
                    for response in incoming.try_iter() {
                        if let Emit::Closed = self.send_result(&response, &outgoing, &user_stop) {
                            break;
                        }
                    }
                    trace!("watch feed ended");
                    return;
                }
                recv(user_stop) -> _ => {
                    let _ = store_stop.try_send(());
                    trace!("watch stopped by consumer");
                    return;
                }
                recv(incoming) -> msg => match msg {
                    Ok(response) => {
                        if let Emit::Closed = self.send_result(&response, &outgoing, &user_stop) {
                            let _ = store_stop.try_send(());
                            return;
                        }
                    }
                    Err(_) => return,
                },
            }
        }
    }

    fn send_result(
        &self,
        response: &Response,
        outgoing: &Sender<Event<T>>,
        user_stop: &Receiver<()>,
    ) -> Emit {
        let Some(event) = self.translate(response) else {
            return Emit::Sent;
        };

        // Blocks until the consumer reads, unless it stops first.
        select! {
            send(outgoing, event) -> res => match res {
                Ok(()) => Emit::Sent,
                Err(_) => Emit::Closed,
            },
            recv(user_stop) -> _ => Emit::Closed,
        }
    }
}

impl<T> Translator<T> {
    /// Classify one notification, yielding at most one event.
    pub(crate) fn translate(&self, response: &Response) -> Option<Event<T>> {
        match &response.action {
            Action::Create | Action::Get => self.translate_add(response),
            Action::Set | Action::CompareAndSwap => self.translate_modify(response),
            Action::Delete => self.translate_delete(response),
            Action::Other(action) => {
                error!(action = %action, "unknown action");
                None
            }
        }
    }

    fn translate_add(&self, response: &Response) -> Option<Event<T>> {
        let node = current_node(response).map_err(log_dropped).ok()?;

        let object = self.decode(node, node.modified_index)?;
        if !(self.filter)(&object) {
            return None;
        }

        // An entry first seen at watch start may already have been updated.
        if node.modified_index != node.created_index {
            Some(Event::modified(object))
        } else {
            Some(Event::added(object))
        }
    }

    fn translate_modify(&self, response: &Response) -> Option<Event<T>> {
        let node = current_node(response).map_err(log_dropped).ok()?;

        let current = self.decode(node, node.modified_index)?;
        let current_passes = (self.filter)(&current);

        // Problems reading the old object just mean we don't know it.
        let previous = response
            .prev_node
            .as_ref()
            .filter(|prev| !prev.value.is_empty())
            .and_then(|prev| match self.decoder.decode(prev.value.as_bytes(), prev.modified_index) {
                Ok(object) => Some(object),
                Err(e) => {
                    debug!(key = %prev.key, error = %e, "ignoring undecodable previous value");
                    None
                }
            })
            .filter(|object| (self.filter)(object));

        // Crossing the filter boundary is reported as an add or a delete.
        match (current_passes, previous) {
            (true, Some(_)) => Some(Event::modified(current)),
            (true, None) => Some(Event::added(current)),
            (false, Some(previous)) => Some(Event::deleted(previous)),
            (false, None) => None,
        }
    }

    fn translate_delete(&self, response: &Response) -> Option<Event<T>> {
        let prev = previous_node(response).map_err(log_dropped).ok()?;

        // The old object carries the index of its deletion so consumers can
        // resume right after it.
        let version = response
            .node
            .as_ref()
            .map_or(prev.modified_index, |node| node.modified_index);

        let object = self.decode(prev, version)?;
        if !(self.filter)(&object) {
            return None;
        }
        Some(Event::deleted(object))
    }

    fn decode(&self, node: &Node, version: u64) -> Option<T> {
        match self.decoder.decode(node.value.as_bytes(), version) {
            Ok(object) => Some(object),
            Err(e) => {
                // Dropped rather than fatal, so a consumer resuming by version
                // can get past a bad value.
                error!(key = %node.key, version, value = %node.value, error = %e, "failure to decode api object");
                None
            }
        }
    }
}

/// The node every non-delete record must carry.
fn current_node(response: &Response) -> Result<&Node> {
    response
        .node
        .as_ref()
        .ok_or_else(|| malformed(response, "node"))
}

/// The deleted value a delete record must carry.
fn previous_node(response: &Response) -> Result<&Node> {
    response
        .prev_node
        .as_ref()
        .ok_or_else(|| malformed(response, "previous node"))
}

fn malformed(response: &Response, missing: &str) -> WatchError {
    WatchError::Malformed(format!(
        "{} at index {} has no {missing}",
        response.action, response.index
    ))
}

fn log_dropped(e: WatchError) {
    error!(error = %e, "dropping record");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{JsonCodec, ObjectVersioner, Versioned};
    use crate::types::EventType;
    use serde::{Deserialize, Serialize};
    use std::sync::Arc;

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Pod {
        name: String,
        #[serde(default)]
        ready: bool,
        #[serde(default)]
        version: u64,
    }

    impl Versioned for Pod {
        fn resource_version(&self) -> u64 {
            self.version
        }

        fn set_resource_version(&mut self, version: u64) {
            self.version = version;
        }
    }

    fn translator(filter: FilterFn<Pod>) -> Translator<Pod> {
        let decoder = ObjectDecoder::new(
            Arc::new(JsonCodec::<Pod>::new()),
            Some(Arc::new(ObjectVersioner)),
            None,
        );
        Translator::new(decoder, filter)
    }

    fn ready_only() -> FilterFn<Pod> {
        Arc::new(|pod: &Pod| pod.ready)
    }

    fn pod(name: &str, ready: bool) -> String {
        serde_json::to_string(&Pod {
            name: name.to_string(),
            ready,
            version: 0,
        })
        .unwrap()
    }

    fn response(action: Action, node: Option<Node>, prev_node: Option<Node>) -> Response {
        Response {
            action,
            node,
            prev_node,
            index: 0,
        }
    }

    #[test]
    fn test_create_is_added() {
        let t = translator(crate::codec::everything());
        let event = t
            .translate(&response(
                Action::Create,
                Some(Node::leaf("/pods/a", pod("a", true), 5, 5)),
                None,
            ))
            .unwrap();
        assert_eq!(event.kind, EventType::Added);
        assert_eq!(event.object.version, 5);
    }

    #[test]
    fn test_get_of_updated_node_is_modified() {
        let t = translator(crate::codec::everything());
        let event = t
            .translate(&response(
                Action::Get,
                Some(Node::leaf("/pods/a", pod("a", true), 3, 8)),
                None,
            ))
            .unwrap();
        assert_eq!(event.kind, EventType::Modified);
        assert_eq!(event.object.version, 8);
    }

    #[test]
    fn test_add_filtered_out() {
        let t = translator(ready_only());
        let result = t.translate(&response(
            Action::Create,
            Some(Node::leaf("/pods/a", pod("a", false), 5, 5)),
            None,
        ));
        assert!(result.is_none());
    }

    #[test]
    fn test_add_without_node_is_dropped() {
        let t = translator(crate::codec::everything());
        assert!(t.translate(&response(Action::Create, None, None)).is_none());
        assert!(t.translate(&response(Action::Set, None, None)).is_none());
    }

    #[test]
    fn test_missing_nodes_are_malformed() {
        let leaf = Node::leaf("/pods/a", pod("a", true), 5, 5);
        let create = response(Action::Create, None, Some(leaf.clone()));
        let delete = response(Action::Delete, Some(leaf), None);

        assert!(matches!(current_node(&create), Err(WatchError::Malformed(_))));
        assert!(matches!(previous_node(&delete), Err(WatchError::Malformed(_))));
        assert!(current_node(&delete).is_ok());
    }

    #[test]
    fn test_bad_payload_is_dropped() {
        let t = translator(crate::codec::everything());
        let result = t.translate(&response(
            Action::Create,
            Some(Node::leaf("/pods/a", "{not json", 5, 5)),
            None,
        ));
        assert!(result.is_none());
    }

    fn modify(old_ready: bool, new_ready: bool) -> Option<Event<Pod>> {
        translator(ready_only()).translate(&response(
            Action::Set,
            Some(Node::leaf("/pods/a", pod("new", new_ready), 1, 9)),
            Some(Node::leaf("/pods/a", pod("old", old_ready), 1, 4)),
        ))
    }

    #[test]
    fn test_modify_both_pass() {
        let event = modify(true, true).unwrap();
        assert_eq!(event.kind, EventType::Modified);
        assert_eq!(event.object.name, "new");
        assert_eq!(event.object.version, 9);
    }

    #[test]
    fn test_modify_enters_filter() {
        let event = modify(false, true).unwrap();
        assert_eq!(event.kind, EventType::Added);
        assert_eq!(event.object.name, "new");
    }

    #[test]
    fn test_modify_leaves_filter() {
        let event = modify(true, false).unwrap();
        assert_eq!(event.kind, EventType::Deleted);
        assert_eq!(event.object.name, "old");
        assert_eq!(event.object.version, 4);
    }

    #[test]
    fn test_modify_neither_pass() {
        assert!(modify(false, false).is_none());
    }

    #[test]
    fn test_modify_with_unknown_previous_is_added() {
        let t = translator(ready_only());
        let event = t
            .translate(&response(
                Action::CompareAndSwap,
                Some(Node::leaf("/pods/a", pod("a", true), 1, 9)),
                Some(Node::leaf("/pods/a", "garbage", 1, 4)),
            ))
            .unwrap();
        assert_eq!(event.kind, EventType::Added);

        let event = t
            .translate(&response(
                Action::Set,
                Some(Node::leaf("/pods/a", pod("a", true), 9, 9)),
                None,
            ))
            .unwrap();
        assert_eq!(event.kind, EventType::Added);
    }

    #[test]
    fn test_delete_uses_tombstone_version() {
        let t = translator(crate::codec::everything());
        let event = t
            .translate(&response(
                Action::Delete,
                Some(Node {
                    key: "/pods/a".to_string(),
                    modified_index: 12,
                    created_index: 3,
                    ..Default::default()
                }),
                Some(Node::leaf("/pods/a", pod("a", true), 3, 7)),
            ))
            .unwrap();
        assert_eq!(event.kind, EventType::Deleted);
        assert_eq!(event.object.name, "a");
        assert_eq!(event.object.version, 12);
    }

    #[test]
    fn test_delete_without_tombstone_uses_previous_version() {
        let t = translator(crate::codec::everything());
        let event = t
            .translate(&response(
                Action::Delete,
                None,
                Some(Node::leaf("/pods/a", pod("a", true), 3, 7)),
            ))
            .unwrap();
        assert_eq!(event.object.version, 7);
    }

    #[test]
    fn test_delete_without_previous_is_dropped() {
        let t = translator(crate::codec::everything());
        let result = t.translate(&response(
            Action::Delete,
            Some(Node::leaf("/pods/a", "", 3, 12)),
            None,
        ));
        assert!(result.is_none());
    }

    #[test]
    fn test_delete_filtered_out() {
        let t = translator(ready_only());
        let result = t.translate(&response(
            Action::Delete,
            None,
            Some(Node::leaf("/pods/a", pod("a", false), 3, 7)),
        ));
        assert!(result.is_none());
    }

    #[test]
    fn test_unknown_action_is_dropped() {
        let t = translator(crate::codec::everything());
        let result = t.translate(&response(
            Action::Other("expire".to_string()),
            Some(Node::leaf("/pods/a", pod("a", true), 3, 7)),
            None,
        ));
        assert!(result.is_none());
    }
}

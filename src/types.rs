//! Core types shared by store clients and watch sessions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of mutation reported by the store.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Action {
    Create,
    Set,
    CompareAndSwap,
    Delete,
    /// Synthetic action used when replaying the current state of a key.
    Get,
    /// Anything the store sent that we don't understand.
    Other(String),
}

impl Action {
    pub fn as_str(&self) -> &str {
        match self {
            Action::Create => "create",
            Action::Set => "set",
            Action::CompareAndSwap => "compareAndSwap",
            Action::Delete => "delete",
            Action::Get => "get",
            Action::Other(s) => s,
        }
    }
}

impl From<&str> for Action {
    fn from(s: &str) -> Self {
        match s {
            "create" => Action::Create,
            "set" => Action::Set,
            "compareAndSwap" => Action::CompareAndSwap,
            "delete" => Action::Delete,
            "get" => Action::Get,
            other => Action::Other(other.to_string()),
        }
    }
}

impl From<String> for Action {
    fn from(s: String) -> Self {
        Action::from(s.as_str())
    }
}

impl From<Action> for String {
    fn from(action: Action) -> Self {
        action.as_str().to_string()
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Action({})", self.as_str())
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A node in the store's key tree.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub key: String,

    /// Stored payload. Empty for directories and tombstones.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value: String,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub dir: bool,

    /// Children of a directory node.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<Node>,

    /// Index of the last mutation of this node.
    pub modified_index: u64,

    /// Index at which this node was created.
    pub created_index: u64,
}

impl Node {
    /// A leaf node holding a value.
    pub fn leaf(key: impl Into<String>, value: impl Into<String>, created: u64, modified: u64) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            dir: false,
            nodes: Vec::new(),
            modified_index: modified,
            created_index: created,
        }
    }

    /// A directory node with the given children.
    pub fn dir(key: impl Into<String>, nodes: Vec<Node>, created: u64, modified: u64) -> Self {
        Self {
            key: key.into(),
            value: String::new(),
            dir: true,
            nodes,
            modified_index: modified,
            created_index: created,
        }
    }
}

/// One notification from the store: a mutation, or a synthetic read.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub action: Action,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<Node>,

    /// Value immediately before this mutation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_node: Option<Node>,

    /// Store-wide index at the time of the call that produced this response.
    #[serde(default)]
    pub index: u64,
}

/// Kind of an outward-facing watch event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    Added,
    Modified,
    Deleted,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventType::Added => "ADDED",
            EventType::Modified => "MODIFIED",
            EventType::Deleted => "DELETED",
        };
        f.write_str(s)
    }
}

/// An event delivered to watch consumers.
#[derive(Clone, Debug, PartialEq)]
pub struct Event<T> {
    pub kind: EventType,
    pub object: T,
}

impl<T> Event<T> {
    pub fn added(object: T) -> Self {
        Self { kind: EventType::Added, object }
    }

    pub fn modified(object: T) -> Self {
        Self { kind: EventType::Modified, object }
    }

    pub fn deleted(object: T) -> Self {
        Self { kind: EventType::Deleted, object }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_strings() {
        for action in [
            Action::Create,
            Action::Set,
            Action::CompareAndSwap,
            Action::Delete,
            Action::Get,
        ] {
            assert_eq!(Action::from(action.as_str()), action);
        }
        assert_eq!(Action::from("expire"), Action::Other("expire".to_string()));
    }

    #[test]
    fn test_response_wire_format() {
        let raw = r#"{
            "action": "compareAndSwap",
            "node": {"key": "/pods/a", "value": "{}", "modifiedIndex": 7, "createdIndex": 3},
            "prevNode": {"key": "/pods/a", "value": "[]", "modifiedIndex": 5, "createdIndex": 3}
        }"#;
        let res: Response = serde_json::from_str(raw).unwrap();
        assert_eq!(res.action, Action::CompareAndSwap);
        assert_eq!(res.node.as_ref().unwrap().modified_index, 7);
        assert_eq!(res.prev_node.as_ref().unwrap().value, "[]");
        assert_eq!(res.index, 0);
        assert!(!res.node.unwrap().dir);
    }

    #[test]
    fn test_unknown_action_survives_parsing() {
        let res: Response = serde_json::from_str(r#"{"action": "expire"}"#).unwrap();
        assert_eq!(res.action.to_string(), "expire");
        assert!(res.node.is_none());
    }
}

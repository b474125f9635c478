//! Signal value types handed to the lifecycle engine.
//!
//! The interception mechanics (event listeners, mutation observers,
//! fetch/XHR wrapping, global error hooks) live in the host; the core only
//! depends on these narrow data shapes.

use std::collections::HashMap;

use crate::dom::NodeId;

/// A DOM event forwarded by the host
#[derive(Debug, Clone)]
pub struct DomEvent {
    /// Event type name (`click`, `load`, `error`, ...)
    pub event_type: String,
    /// The event target
    pub target: NodeId,
}

impl DomEvent {
    /// Create an event signal
    #[must_use]
    pub fn new(event_type: impl Into<String>, target: NodeId) -> Self {
        Self {
            event_type: event_type.into(),
            target,
        }
    }
}

/// One observed DOM mutation.
///
/// Character-data records target the element owning the text (the
/// original observer reported the text node's parent element).
#[derive(Debug, Clone)]
pub enum MutationRecord {
    /// Children were added to or removed from `target`
    ChildList {
        /// The mutated parent
        target: NodeId,
        /// Elements that entered the tree
        added: Vec<NodeId>,
        /// Elements that left the tree
        removed: Vec<NodeId>,
    },
    /// An attribute of `target` changed
    Attributes {
        /// The mutated element
        target: NodeId,
    },
    /// Text content owned by `target` changed
    CharacterData {
        /// The element owning the changed text
        target: NodeId,
    },
}

/// A mutation batch partitioned into the buckets the DOM resolver scans.
#[derive(Debug, Clone, Default)]
pub struct MutationBatch {
    /// Elements that entered the tree
    pub added: Vec<NodeId>,
    /// Elements that left the tree
    pub removed: Vec<NodeId>,
    /// Mutation targets; a parent is updated whenever a descendant
    /// mutates, which is what supports subtree-update assertions
    pub updated: Vec<NodeId>,
}

impl MutationBatch {
    /// Partition raw mutation records into added/removed/updated buckets
    #[must_use]
    pub fn partition(records: &[MutationRecord]) -> Self {
        let mut batch = Self::default();
        for record in records {
            match record {
                MutationRecord::ChildList {
                    target,
                    added,
                    removed,
                } => {
                    batch.added.extend(added.iter().copied());
                    batch.removed.extend(removed.iter().copied());
                    batch.updated.push(*target);
                }
                MutationRecord::Attributes { target } | MutationRecord::CharacterData { target } => {
                    batch.updated.push(*target);
                }
            }
        }
        batch
    }
}

/// Request half of an intercepted HTTP exchange
#[derive(Debug, Clone, Default)]
pub struct RequestInfo {
    /// Request URL
    pub url: String,
    /// Request body, if any
    pub params: Option<String>,
    /// Request headers
    pub headers: HashMap<String, String>,
}

/// Response half of an intercepted HTTP exchange
#[derive(Debug, Clone, Default)]
pub struct ResponseInfo {
    /// HTTP status code
    pub status: u16,
    /// Response body text (already size-capped by the interceptor)
    pub response_text: String,
    /// Response headers
    pub response_headers: HashMap<String, String>,
}

/// A transport-level HTTP failure (network error, abort, or a non-ok
/// response the call site treats as an error)
#[derive(Debug, Clone, Default)]
pub struct HttpErrorInfo {
    /// Human-readable error message (e.g. `HTTP Error: Not Found`)
    pub message: String,
    /// HTTP status code; zero for connection-level failures
    pub status: u16,
    /// Response body text, if any
    pub response_text: String,
    /// Request headers
    pub request_headers: HashMap<String, String>,
    /// Response headers, when a response was received
    pub response_headers: Option<HashMap<String, String>>,
    /// Request URL
    pub url: String,
}

/// An uncaught page error or unhandled promise rejection
#[derive(Debug, Clone, Default)]
pub struct ErrorInfo {
    /// Error message
    pub message: String,
    /// Stack trace, if available
    pub stack: Option<String>,
    /// Source file URL
    pub source: Option<String>,
    /// Line number
    pub lineno: Option<u32>,
    /// Column number
    pub colno: Option<u32>,
}

impl ErrorInfo {
    /// Create an error signal with just a message
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Document;

    #[test]
    fn partition_buckets_child_list_records() {
        let mut doc = Document::new();
        let parent = doc.build("div").append_to_root();
        let added = doc.build("span").append_to(parent);
        let removed = doc.build("i").detached();

        let batch = MutationBatch::partition(&[MutationRecord::ChildList {
            target: parent,
            added: vec![added],
            removed: vec![removed],
        }]);

        assert_eq!(batch.added, vec![added]);
        assert_eq!(batch.removed, vec![removed]);
        // the mutated parent counts as updated
        assert_eq!(batch.updated, vec![parent]);
    }

    #[test]
    fn partition_marks_attribute_and_text_targets_updated() {
        let mut doc = Document::new();
        let a = doc.build("div").append_to_root();
        let b = doc.build("p").append_to_root();

        let batch = MutationBatch::partition(&[
            MutationRecord::Attributes { target: a },
            MutationRecord::CharacterData { target: b },
        ]);

        assert!(batch.added.is_empty());
        assert!(batch.removed.is_empty());
        assert_eq!(batch.updated, vec![a, b]);
    }
}

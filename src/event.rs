use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// A change reported by a [`DocumentStore`](crate::store::DocumentStore) subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentEvent {
    Modified(String),
    Deleted(String),
    /// Old path, new path
    Renamed { from: String, to: String },
}

impl DocumentEvent {
    /// The path whose index entries are affected first by this event.
    pub fn path(&self) -> &str {
        match self {
            DocumentEvent::Modified(path) | DocumentEvent::Deleted(path) => path,
            DocumentEvent::Renamed { from, .. } => from,
        }
    }
}

impl Display for DocumentEvent {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            DocumentEvent::Modified(path) => write!(f, "Modified({path})"),
            DocumentEvent::Deleted(path) => write!(f, "Deleted({path})"),
            DocumentEvent::Renamed { from, to } => write!(f, "Renamed({from} -> {to})"),
        }
    }
}

/// Notifications emitted by the backlink index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexEvent {
    /// A full build finished, or a document's entries were dropped.
    Updated,
    /// One document was re-indexed.
    Reindexed(String),
}

impl Display for IndexEvent {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            IndexEvent::Updated => write!(f, "Updated"),
            IndexEvent::Reindexed(path) => write!(f, "Reindexed({path})"),
        }
    }
}

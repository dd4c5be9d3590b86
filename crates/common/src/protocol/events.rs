// Change-subscription events pushed to every subscriber.

use serde::{Deserialize, Serialize};

/// One event on the change stream. Serialized as `{"type": ..., ...}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrackEvent {
    /// Full listing of track names, sorted.
    Tracklist { tracks: Vec<String> },

    /// A track's content changed (external edit, write or undo).
    Change {
        name: String,
        content: String,
        #[serde(rename = "undoDepth")]
        undo_depth: usize,
    },

    /// A track disappeared from storage.
    Delete { name: String },
}

impl TrackEvent {
    pub fn tracklist(tracks: Vec<String>) -> Self {
        Self::Tracklist { tracks }
    }

    pub fn change(name: impl Into<String>, content: impl Into<String>, undo_depth: usize) -> Self {
        Self::Change { name: name.into(), content: content.into(), undo_depth }
    }

    pub fn delete(name: impl Into<String>) -> Self {
        Self::Delete { name: name.into() }
    }

    /// The track this event concerns, if any.
    pub fn track_name(&self) -> Option<&str> {
        match self {
            Self::Tracklist { .. } => None,
            Self::Change { name, .. } | Self::Delete { name } => Some(name),
        }
    }
}

// Track service: reads, writes, creation and undo over the tracks
// directory, plus the handler the watcher pipeline calls once a path has
// settled.
//
// Every mutation runs under one async lock so history pushes, echo marks
// and broadcasts for a track are totally ordered.

pub mod store;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::{debug, info, warn};
use trackbench_common::protocol::events::TrackEvent;
use trackbench_common::track::{self, TrackNameError};

use crate::history::{HistoryStore, NothingToUndo};
use crate::hub::{BroadcastHub, Subscription};

#[derive(Debug, Error)]
pub enum TrackError {
    #[error("invalid track name: {0}")]
    InvalidName(#[from] TrackNameError),

    #[error("track not found: {0}")]
    NotFound(String),

    #[error("track already exists: {0}")]
    AlreadyExists(String),

    #[error("nothing to undo")]
    NothingToUndo,

    #[error("storage failure on `{name}`: {source}")]
    Storage {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

impl From<NothingToUndo> for TrackError {
    fn from(_: NothingToUndo) -> Self {
        Self::NothingToUndo
    }
}

/// Echo state of a track with respect to our own writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EchoState {
    /// We wrote the file; the next settled watcher event is our own echo.
    AwaitingSelfEchoAck,
}

/// What the watcher handler did with a settled path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettleOutcome {
    /// Our own write; only the listing was rebroadcast.
    Echo,
    /// External edit recorded at the given undo depth.
    Changed { undo_depth: usize },
    /// The file is gone (or unreadable); history dropped.
    Deleted,
}

pub struct TrackService {
    root: PathBuf,
    history: HistoryStore,
    echoes: Mutex<HashMap<String, EchoState>>,
    hub: Arc<BroadcastHub>,
    ops: tokio::sync::Mutex<()>,
}

impl TrackService {
    pub fn new(root: impl Into<PathBuf>, hub: Arc<BroadcastHub>) -> Self {
        Self {
            root: root.into(),
            history: HistoryStore::new(),
            echoes: Mutex::new(HashMap::new()),
            hub,
            ops: tokio::sync::Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    pub fn undo_depth(&self, name: &str) -> usize {
        self.history.depth(name)
    }

    /// Record every existing track as its own undo baseline.
    /// Returns the number of tracks seeded.
    pub async fn snapshot_all(&self) -> usize {
        let _guard = self.ops.lock().await;
        let mut seeded = 0;
        for name in self.list().await {
            match store::read_track(&self.root, &name).await {
                Ok(content) => {
                    self.history.push(&name, &content);
                    seeded += 1;
                }
                Err(error) => warn!(track = %name, %error, "skipping unreadable track at startup"),
            }
        }
        info!(seeded, "track history seeded");
        seeded
    }

    /// Sorted listing of all tracks. Never fails; a broken scan lists empty.
    pub async fn list(&self) -> Vec<String> {
        let root = self.root.clone();
        match tokio::task::spawn_blocking(move || store::scan_tracks(&root)).await {
            Ok(names) => names,
            Err(error) => {
                warn!(%error, "track scan task failed");
                Vec::new()
            }
        }
    }

    pub async fn read(&self, name: &str) -> Result<String, TrackError> {
        track::validate_name(name)?;
        store::read_track(&self.root, name).await.map_err(|source| {
            if store::is_not_found(&source) {
                TrackError::NotFound(name.to_string())
            } else {
                TrackError::Storage { name: name.to_string(), source }
            }
        })
    }

    /// Replace a track's content. The write is recorded in history and
    /// broadcast here, and the watcher echo is suppressed.
    /// Returns the new undo depth.
    pub async fn write(&self, name: &str, content: &str) -> Result<usize, TrackError> {
        track::validate_name(name)?;
        let _guard = self.ops.lock().await;

        self.mark_self_authored(name);
        if let Err(source) = store::write_track(&self.root, name, content).await {
            self.clear_self_authored(name);
            return Err(TrackError::Storage { name: name.to_string(), source });
        }

        self.history.push(name, content);
        let undo_depth = self.history.depth(name);
        self.hub.publish(TrackEvent::change(name, content, undo_depth));
        debug!(track = %name, undo_depth, "track written");
        Ok(undo_depth)
    }

    /// Create a track with starter content. `requested` may omit the
    /// extension. Returns the final name.
    pub async fn create(&self, requested: &str) -> Result<String, TrackError> {
        let name = track::normalize_new_name(requested)?;
        let starter = track::starter_content(&name);
        let _guard = self.ops.lock().await;

        if tokio::fs::try_exists(store::track_path(&self.root, &name)).await.unwrap_or(false) {
            return Err(TrackError::AlreadyExists(name));
        }

        self.mark_self_authored(&name);
        if let Err(source) = store::create_track(&self.root, &name, &starter).await {
            self.clear_self_authored(&name);
            return Err(match source.kind() {
                std::io::ErrorKind::AlreadyExists => TrackError::AlreadyExists(name),
                _ => TrackError::Storage { name, source },
            });
        }

        self.history.push(&name, &starter);
        info!(track = %name, "track created");
        Ok(name)
    }

    /// Restore the previous version. Returns the restored content and the
    /// new undo depth. History is only popped once the write succeeded.
    pub async fn undo(&self, name: &str) -> Result<(String, usize), TrackError> {
        track::validate_name(name)?;
        let _guard = self.ops.lock().await;

        let previous = self.history.previous(name)?;
        self.mark_self_authored(name);
        if let Err(source) = store::write_track(&self.root, name, &previous).await {
            self.clear_self_authored(name);
            return Err(TrackError::Storage { name: name.to_string(), source });
        }

        self.history.undo(name)?;
        let undo_depth = self.history.depth(name);
        self.hub.publish(TrackEvent::change(name, previous.as_str(), undo_depth));
        info!(track = %name, undo_depth, "track undone");
        Ok((previous, undo_depth))
    }

    /// Handle a settled filesystem change for `name`.
    pub async fn settle(&self, name: &str) -> SettleOutcome {
        let _guard = self.ops.lock().await;
        let tracks = self.list().await;

        if self.take_self_echo(name) {
            debug!(track = %name, "suppressed echo of own write");
            self.hub.publish(TrackEvent::tracklist(tracks));
            return SettleOutcome::Echo;
        }

        let outcome = match store::read_track(&self.root, name).await {
            Ok(content) => {
                self.history.push(name, &content);
                let undo_depth = self.history.depth(name);
                self.hub.publish(TrackEvent::change(name, content, undo_depth));
                info!(track = %name, undo_depth, "external change recorded");
                SettleOutcome::Changed { undo_depth }
            }
            Err(error) => {
                self.hub.publish(TrackEvent::delete(name));
                self.history.drop_track(name);
                info!(track = %name, %error, "track removed");
                SettleOutcome::Deleted
            }
        };
        self.hub.publish(TrackEvent::tracklist(tracks));
        outcome
    }

    /// Subscribe to the change stream, starting with a listing snapshot.
    /// Listing and registration happen under the mutation lock, so no event
    /// published after the snapshot is missed.
    pub async fn subscribe(&self) -> Subscription {
        let _guard = self.ops.lock().await;
        let tracks = self.list().await;
        self.hub.subscribe(tracks)
    }

    fn mark_self_authored(&self, name: &str) {
        self.echoes
            .lock()
            .expect("echo lock poisoned")
            .insert(name.to_string(), EchoState::AwaitingSelfEchoAck);
    }

    fn clear_self_authored(&self, name: &str) {
        self.echoes.lock().expect("echo lock poisoned").remove(name);
    }

    fn take_self_echo(&self, name: &str) -> bool {
        matches!(
            self.echoes.lock().expect("echo lock poisoned").remove(name),
            Some(EchoState::AwaitingSelfEchoAck)
        )
    }
}

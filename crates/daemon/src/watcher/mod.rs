// File watcher: inotify/fsevents → debounce → track service.
// This module handles the first stage: raw FS event detection and filtering.

pub mod debounce;
pub mod pipeline;

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Component, Path};
use tokio::sync::mpsc;
use tracing::{debug, error, trace, warn};
use trackbench_common::track;

/// Raw filesystem event kind. The pipeline re-reads the file after the
/// debounce window, so the kind is informational only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsEventKind {
    Create,
    Modify,
    Remove,
}

/// A raw filesystem event for a single track, named relative to the
/// watched root with `/` separators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFsEvent {
    pub kind: FsEventKind,
    pub name: String,
}

impl RawFsEvent {
    pub fn new(kind: FsEventKind, name: impl Into<String>) -> Self {
        Self { kind, name: name.into() }
    }
}

/// Capacity for the internal event channel.
const EVENT_CHANNEL_CAPACITY: usize = 512;

/// Watches the tracks directory recursively for track file changes.
///
/// Events are sent to the returned receiver. The watcher runs until dropped.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
}

impl FileWatcher {
    /// Start watching `root` recursively.
    pub fn start(root: &Path) -> Result<(Self, mpsc::Receiver<RawFsEvent>)> {
        let root = root
            .canonicalize()
            .with_context(|| format!("failed to canonicalize watch root: {}", root.display()))?;

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let root_for_filter = root.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for raw in translate_event(&event, &root_for_filter).unwrap_or_default() {
                    if tx.blocking_send(raw).is_err() {
                        debug!("event channel closed, stopping event dispatch");
                        return;
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "file watcher error");
            }
        })
        .context("failed to create file watcher")?;

        watcher
            .watch(&root, RecursiveMode::Recursive)
            .with_context(|| format!("failed to watch directory: {}", root.display()))?;

        debug!(path = %root.display(), "file watcher started");

        Ok((Self { _watcher: watcher }, rx))
    }
}

fn is_track_file(path: &Path) -> bool {
    path.file_name().and_then(|name| name.to_str()).is_some_and(track::is_track_file_name)
}

/// Track name of `path` relative to `root`, or None if it escapes the root
/// or is not valid UTF-8.
fn relative_name(path: &Path, root: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            _ => return None,
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Translate a `notify::Event` into zero or more `RawFsEvent`s.
fn translate_event(event: &Event, root: &Path) -> Option<Vec<RawFsEvent>> {
    let kind = match &event.kind {
        EventKind::Create(_) => FsEventKind::Create,
        EventKind::Modify(modify_kind) => {
            use notify::event::ModifyKind;
            match modify_kind {
                ModifyKind::Metadata(_) => {
                    trace!("skipping metadata-only modify event");
                    return None;
                }
                // Data, renames and unknown modify kinds all re-read the file.
                _ => FsEventKind::Modify,
            }
        }
        EventKind::Remove(_) => FsEventKind::Remove,
        _ => {
            trace!(kind = ?event.kind, "skipping non-content event");
            return None;
        }
    };

    let events: Vec<RawFsEvent> = event
        .paths
        .iter()
        .filter(|p| is_track_file(p))
        .filter_map(|p| match relative_name(p, root) {
            Some(name) => Some(RawFsEvent { kind: kind.clone(), name }),
            None => {
                warn!(path = %p.display(), "ignoring event outside watch root");
                None
            }
        })
        .collect();

    if events.is_empty() {
        None
    } else {
        Some(events)
    }
}

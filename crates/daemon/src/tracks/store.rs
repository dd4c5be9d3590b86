// Track storage on disk: recursive listing, reads and writes by name.

use std::io;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tracing::warn;
use trackbench_common::track;

/// Absolute path for a validated relative track name.
pub fn track_path(root: &Path, name: &str) -> PathBuf {
    root.join(name)
}

/// All track names under `root`, forward-slash separated and sorted.
/// Unreadable directories are skipped; a missing root lists as empty.
pub fn scan_tracks(root: &Path) -> Vec<String> {
    let mut names = Vec::new();
    scan_dir(root, "", &mut names);
    names.sort();
    names
}

fn scan_dir(dir: &Path, prefix: &str, out: &mut Vec<String>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(error) => {
            if error.kind() != io::ErrorKind::NotFound {
                warn!(path = %dir.display(), %error, "failed to scan tracks directory");
            }
            return;
        }
    };

    for entry in entries.flatten() {
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        let rel = if prefix.is_empty() {
            file_name.to_string()
        } else {
            format!("{prefix}/{file_name}")
        };
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            scan_dir(&entry.path(), &rel, out);
        } else if track::is_track_file_name(file_name) {
            out.push(rel);
        }
    }
}

pub async fn read_track(root: &Path, name: &str) -> io::Result<String> {
    tokio::fs::read_to_string(track_path(root, name)).await
}

pub async fn write_track(root: &Path, name: &str, content: &str) -> io::Result<()> {
    tokio::fs::write(track_path(root, name), content).await
}

/// Create a new track file, failing with `AlreadyExists` if one is present.
/// Intermediate directories are created.
pub async fn create_track(root: &Path, name: &str, content: &str) -> io::Result<()> {
    let path = track_path(root, name);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::OpenOptions::new().write(true).create_new(true).open(&path).await?;
    file.write_all(content.as_bytes()).await?;
    file.flush().await
}

pub fn is_not_found(error: &io::Error) -> bool {
    matches!(error.kind(), io::ErrorKind::NotFound | io::ErrorKind::IsADirectory)
}

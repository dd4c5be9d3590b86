// Interactive terminal sessions: one pty-backed process per session, at
// most one attached channel, reaped when nobody attaches in time.

pub mod launch;
pub mod manager;
pub mod process;

use thiserror::Error;
use trackbench_common::track::TrackNameError;
use uuid::Uuid;

pub use manager::{
    DestroyReason, SessionInfo, SessionLink, SessionManager, SessionPhase, SessionSettings,
};
pub use process::{LaunchSpec, ProcessControl, ProcessSpawner, PtySpawner, SpawnedProcess};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid track name: {0}")]
    InvalidName(#[from] TrackNameError),

    #[error("session not found: {0}")]
    SessionNotFound(Uuid),

    #[error("session {0} already has an attached channel")]
    AlreadyAttached(Uuid),

    #[error("failed to spawn session process: {0:#}")]
    SpawnFailure(anyhow::Error),

    #[error("failed to persist resumption token: {0}")]
    Storage(#[source] std::io::Error),
}

// Session lifecycle: Created (idle timer armed) → Attached (channel bound)
// → removed. Removal is the terminal state; destroy is idempotent.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use trackbench_common::track;
use uuid::Uuid;

use crate::config::DaemonConfig;
use crate::resume::ResumptionRegistry;

use super::launch::{is_new_track, opening_prompt, LaunchPlan};
use super::process::{LaunchSpec, ProcessControl, ProcessSpawner, SpawnedProcess};
use super::SessionError;

/// Static settings for every spawned session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub program: String,
    pub project_root: PathBuf,
    /// Tracks directory as the program sees it (relative to `project_root`).
    pub tracks_dir: PathBuf,
    pub guide_file: String,
    pub new_track_max_bytes: u64,
    pub idle_timeout: Duration,
    pub cols: u16,
    pub rows: u16,
}

impl SessionSettings {
    pub fn from_config(config: &DaemonConfig) -> Self {
        Self {
            program: config.terminal.program.clone(),
            project_root: config.project_root.clone(),
            tracks_dir: config.tracks.dir.clone(),
            guide_file: config.terminal.guide_file.clone(),
            new_track_max_bytes: config.terminal.new_track_max_bytes,
            idle_timeout: config.idle_timeout(),
            cols: config.terminal.cols,
            rows: config.terminal.rows,
        }
    }

    fn launch_spec(&self, plan: &LaunchPlan) -> LaunchSpec {
        LaunchSpec {
            program: self.program.clone(),
            args: plan.args(),
            cwd: self.project_root.clone(),
            env: vec![
                ("TERM".into(), "xterm-256color".into()),
                ("CLAUDECODE".into(), String::new()),
            ],
            cols: self.cols,
            rows: self.rows,
        }
    }
}

/// Why a session went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroyReason {
    Requested,
    IdleTimeout,
    ChannelClosed,
    ProcessExited,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Created,
    Attached,
}

/// Diagnostic view of one live session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: Uuid,
    pub track: Option<String>,
    pub phase: SessionPhase,
    pub pid: Option<u32>,
    pub created_at: DateTime<Utc>,
}

/// The network side's handle on an attached session.
pub struct SessionLink {
    pub id: Uuid,
    pub output: mpsc::Receiver<Vec<u8>>,
    pub input: mpsc::Sender<Vec<u8>>,
    /// Fires when the session is destroyed from the process side or by
    /// request.
    pub closed: oneshot::Receiver<()>,
}

enum SessionState {
    Created { idle_timer: JoinHandle<()>, output: mpsc::Receiver<Vec<u8>> },
    Attached { close: oneshot::Sender<()> },
}

struct Session {
    track: Option<String>,
    pid: Option<u32>,
    created_at: DateTime<Utc>,
    input: mpsc::Sender<Vec<u8>>,
    control: Box<dyn ProcessControl>,
    exit_watch: JoinHandle<()>,
    state: SessionState,
}

struct Inner {
    sessions: Mutex<HashMap<Uuid, Session>>,
    spawner: Arc<dyn ProcessSpawner>,
    registry: Arc<ResumptionRegistry>,
    settings: SessionSettings,
}

#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    pub fn new(
        spawner: Arc<dyn ProcessSpawner>,
        registry: Arc<ResumptionRegistry>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                sessions: Mutex::new(HashMap::new()),
                spawner,
                registry,
                settings,
            }),
        }
    }

    /// Spawn a process for a new session and arm its idle timer.
    ///
    /// With a track, a recorded resumption token is resumed; otherwise a new
    /// token is minted and persisted before the process starts.
    pub async fn create(&self, track: Option<&str>) -> Result<Uuid, SessionError> {
        if let Some(name) = track {
            track::validate_name(name)?;
        }
        let plan = self.plan(track).await?;
        let spec = self.inner.settings.launch_spec(&plan);
        let SpawnedProcess { pid, output, input, control, exited } =
            self.inner.spawner.spawn(&spec).map_err(SessionError::SpawnFailure)?;

        let id = Uuid::new_v4();
        let weak = Arc::downgrade(&self.inner);
        let idle_timeout = self.inner.settings.idle_timeout;

        // Timers are spawned under the table lock so they cannot observe the
        // table before the session is in it.
        let mut sessions = self.inner.sessions.lock().expect("session table lock poisoned");
        let idle_timer = tokio::spawn(reap_if_idle(weak.clone(), id, idle_timeout));
        let exit_watch = tokio::spawn(destroy_on_exit(weak, id, exited));
        sessions.insert(
            id,
            Session {
                track: track.map(str::to_string),
                pid,
                created_at: Utc::now(),
                input,
                control,
                exit_watch,
                state: SessionState::Created { idle_timer, output },
            },
        );
        drop(sessions);

        info!(
            session_id = %id,
            track = track.unwrap_or("-"),
            pid,
            resumed = matches!(plan, LaunchPlan::Resume { .. }),
            "session created"
        );
        Ok(id)
    }

    async fn plan(&self, track: Option<&str>) -> Result<LaunchPlan, SessionError> {
        let Some(name) = track else {
            return Ok(LaunchPlan::Bare);
        };
        if let Some(token) = self.inner.registry.get(name).await {
            return Ok(LaunchPlan::Resume { token });
        }

        let settings = &self.inner.settings;
        let track_path = settings.tracks_dir.join(name);
        let is_new = is_new_track(
            &settings.project_root.join(&track_path),
            settings.new_track_max_bytes,
        )
        .await;
        let prompt =
            opening_prompt(&settings.guide_file, &track_path.display().to_string(), is_new);

        let token = Uuid::new_v4().to_string();
        self.inner.registry.set(name, &token).await.map_err(SessionError::Storage)?;
        Ok(LaunchPlan::Fresh { token, prompt })
    }

    /// Bind the session's channel. Cancels the idle timer and hands over the
    /// process output stream.
    pub fn attach(&self, id: Uuid) -> Result<SessionLink, SessionError> {
        let mut sessions = self.inner.sessions.lock().expect("session table lock poisoned");
        let session = sessions.get_mut(&id).ok_or(SessionError::SessionNotFound(id))?;

        let (close_tx, close_rx) = oneshot::channel();
        let output =
            match std::mem::replace(&mut session.state, SessionState::Attached { close: close_tx })
            {
                SessionState::Created { idle_timer, output } => {
                    idle_timer.abort();
                    output
                }
                previous @ SessionState::Attached { .. } => {
                    session.state = previous;
                    return Err(SessionError::AlreadyAttached(id));
                }
            };

        info!(session_id = %id, "channel attached");
        Ok(SessionLink { id, output, input: session.input.clone(), closed: close_rx })
    }

    pub fn resize(&self, id: Uuid, cols: u16, rows: u16) -> Result<(), SessionError> {
        let sessions = self.inner.sessions.lock().expect("session table lock poisoned");
        let session = sessions.get(&id).ok_or(SessionError::SessionNotFound(id))?;
        if let Err(error) = session.control.resize(cols, rows) {
            warn!(session_id = %id, %error, "resize failed");
        } else {
            debug!(session_id = %id, cols, rows, "resized");
        }
        Ok(())
    }

    /// Kill the process, close the channel, cancel timers and forget the
    /// session. Returns false if it was already gone.
    pub fn destroy(&self, id: Uuid, reason: DestroyReason) -> bool {
        let removed =
            self.inner.sessions.lock().expect("session table lock poisoned").remove(&id);
        let Some(session) = removed else {
            return false;
        };
        teardown(id, session, reason);
        true
    }

    /// Destroy every live session. Returns how many were destroyed.
    pub fn shutdown(&self) -> usize {
        let drained: Vec<(Uuid, Session)> =
            self.inner.sessions.lock().expect("session table lock poisoned").drain().collect();
        let count = drained.len();
        for (id, session) in drained {
            teardown(id, session, DestroyReason::Shutdown);
        }
        info!(sessions = count, "session manager shut down");
        count
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.inner.sessions.lock().expect("session table lock poisoned").contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.inner.sessions.lock().expect("session table lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live sessions, oldest first.
    pub fn snapshot(&self) -> Vec<SessionInfo> {
        let sessions = self.inner.sessions.lock().expect("session table lock poisoned");
        let mut infos: Vec<SessionInfo> = sessions
            .iter()
            .map(|(id, session)| SessionInfo {
                id: *id,
                track: session.track.clone(),
                phase: match session.state {
                    SessionState::Created { .. } => SessionPhase::Created,
                    SessionState::Attached { .. } => SessionPhase::Attached,
                },
                pid: session.pid,
                created_at: session.created_at,
            })
            .collect();
        infos.sort_by_key(|info| info.created_at);
        infos
    }
}

fn teardown(id: Uuid, session: Session, reason: DestroyReason) {
    let Session { mut control, exit_watch, state, track, .. } = session;
    match state {
        SessionState::Created { idle_timer, .. } => idle_timer.abort(),
        SessionState::Attached { close } => {
            let _ = close.send(());
        }
    }
    exit_watch.abort();
    control.kill();
    info!(session_id = %id, track = track.as_deref().unwrap_or("-"), ?reason, "session destroyed");
}

async fn reap_if_idle(inner: Weak<Inner>, id: Uuid, idle_timeout: Duration) {
    tokio::time::sleep(idle_timeout).await;
    let Some(inner) = inner.upgrade() else {
        return;
    };
    let mut sessions = inner.sessions.lock().expect("session table lock poisoned");
    // An attach may have won the lock after the timer fired.
    if !matches!(sessions.get(&id), Some(Session { state: SessionState::Created { .. }, .. })) {
        return;
    }
    let removed = sessions.remove(&id);
    drop(sessions);
    if let Some(session) = removed {
        teardown(id, session, DestroyReason::IdleTimeout);
    }
}

async fn destroy_on_exit(inner: Weak<Inner>, id: Uuid, exited: oneshot::Receiver<()>) {
    let _ = exited.await;
    if let Some(inner) = inner.upgrade() {
        SessionManager { inner }.destroy(id, DestroyReason::ProcessExited);
    }
}

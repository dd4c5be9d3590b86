// Daemon wiring: track service, watcher pipeline and session manager
// behind the HTTP server, with an ordered shutdown.

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::api::{self, cors::cors_layer, AppState};
use crate::config::DaemonConfig;
use crate::hub::BroadcastHub;
use crate::resume::ResumptionRegistry;
use crate::terminal::{ProcessSpawner, PtySpawner, SessionManager, SessionSettings};
use crate::tracks::TrackService;
use crate::watcher::debounce::DebounceConfig;
use crate::watcher::pipeline::run_pipeline;
use crate::watcher::FileWatcher;

/// Long-lived services owned by a running daemon.
pub struct DaemonServices {
    pub state: AppState,
    shutdown_tx: broadcast::Sender<()>,
    pipeline: Option<JoinHandle<()>>,
    _watcher: FileWatcher,
}

impl DaemonServices {
    /// Create the tracks directory if needed, seed history, start watching
    /// and build the session manager.
    pub async fn start(config: &DaemonConfig, spawner: Arc<dyn ProcessSpawner>) -> Result<Self> {
        let tracks_root = config.tracks_root();
        tokio::fs::create_dir_all(&tracks_root).await.with_context(|| {
            format!("failed to create tracks directory `{}`", tracks_root.display())
        })?;

        let hub = Arc::new(BroadcastHub::new());
        let tracks = Arc::new(TrackService::new(&tracks_root, Arc::clone(&hub)));
        tracks.snapshot_all().await;

        let (watcher, raw_rx) = FileWatcher::start(&tracks_root)?;
        let (shutdown_tx, shutdown_rx) = broadcast::channel(4);
        let pipeline = tokio::spawn(run_pipeline(
            raw_rx,
            Arc::clone(&tracks),
            DebounceConfig::with_millis(config.tracks.debounce_ms),
            shutdown_rx,
        ));

        let registry = Arc::new(ResumptionRegistry::new(config.resume_table_path()));
        let sessions =
            SessionManager::new(spawner, registry, SessionSettings::from_config(config));

        Ok(Self {
            state: AppState { tracks, sessions, keepalive: config.keepalive() },
            shutdown_tx,
            pipeline: Some(pipeline),
            _watcher: watcher,
        })
    }

    /// Destroy live sessions and end every event stream. Safe to call more
    /// than once.
    pub fn release_clients(&self) {
        for session in self.state.sessions.snapshot() {
            info!(
                session_id = %session.id,
                track = session.track.as_deref().unwrap_or("-"),
                phase = ?session.phase,
                "destroying live session"
            );
        }
        self.state.sessions.shutdown();
        self.state.tracks.hub().close();
    }

    /// Release clients, then stop the watcher pipeline and wait for it.
    pub async fn stop(mut self) {
        self.release_clients();
        let _ = self.shutdown_tx.send(());
        if let Some(pipeline) = self.pipeline.take() {
            if let Err(error) = pipeline.await {
                warn!(%error, "watcher pipeline task failed");
            }
        }
        info!("daemon services stopped");
    }
}

impl Drop for DaemonServices {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// Bind the configured address and serve until SIGINT/SIGTERM.
pub async fn run(config: DaemonConfig) -> Result<()> {
    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind listener on {}", config.listen_addr))?;
    serve(listener, &config, Arc::new(PtySpawner), shutdown_signal()).await
}

/// Serve on `listener` until `shutdown` resolves. Sessions are destroyed and
/// event streams ended before the server drains its connections.
pub async fn serve<F>(
    listener: TcpListener,
    config: &DaemonConfig,
    spawner: Arc<dyn ProcessSpawner>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let services = DaemonServices::start(config, spawner).await?;
    let app = api::router(services.state.clone(), cors_layer(config.cors_origins.as_deref()));

    let local_addr = listener.local_addr().context("failed to read listener address")?;
    info!(
        listen_addr = %local_addr,
        tracks_root = %config.tracks_root().display(),
        "trackbench daemon listening"
    );

    let sessions = services.state.sessions.clone();
    let hub = Arc::clone(services.state.tracks.hub());
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            sessions.shutdown();
            hub.close();
        })
        .await
        .context("http server exited unexpectedly");

    services.stop().await;
    result
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received");
}

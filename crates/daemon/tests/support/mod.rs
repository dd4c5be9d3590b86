// Shared fixtures for daemon integration tests.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use trackbench_daemon::config::DaemonConfig;
use trackbench_daemon::runtime;
use trackbench_daemon::terminal::{LaunchSpec, ProcessControl, ProcessSpawner, SpawnedProcess};

// ── Fake process spawner ─────────────────────────────────────────────

/// Test-side handles on one fake process.
pub struct FakeProcess {
    pub spec: LaunchSpec,
    pub output: mpsc::Sender<Vec<u8>>,
    pub input: Option<mpsc::Receiver<Vec<u8>>>,
    pub exit: Option<oneshot::Sender<()>>,
    pub killed: Arc<AtomicBool>,
    pub resizes: Arc<Mutex<Vec<(u16, u16)>>>,
}

struct FakeControl {
    killed: Arc<AtomicBool>,
    resizes: Arc<Mutex<Vec<(u16, u16)>>>,
}

impl ProcessControl for FakeControl {
    fn resize(&self, cols: u16, rows: u16) -> anyhow::Result<()> {
        self.resizes.lock().unwrap().push((cols, rows));
        Ok(())
    }

    fn kill(&mut self) {
        self.killed.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakeSpawner {
    processes: Mutex<Vec<FakeProcess>>,
}

impl FakeSpawner {
    pub fn count(&self) -> usize {
        self.processes.lock().unwrap().len()
    }

    pub fn spec(&self, index: usize) -> LaunchSpec {
        self.processes.lock().unwrap()[index].spec.clone()
    }

    pub fn output(&self, index: usize) -> mpsc::Sender<Vec<u8>> {
        self.processes.lock().unwrap()[index].output.clone()
    }

    pub fn take_input(&self, index: usize) -> mpsc::Receiver<Vec<u8>> {
        self.processes.lock().unwrap()[index].input.take().expect("input already taken")
    }

    pub fn exit(&self, index: usize) {
        if let Some(exit) = self.processes.lock().unwrap()[index].exit.take() {
            let _ = exit.send(());
        }
    }

    pub fn killed(&self, index: usize) -> bool {
        self.processes.lock().unwrap()[index].killed.load(Ordering::SeqCst)
    }

    pub fn resizes(&self, index: usize) -> Vec<(u16, u16)> {
        self.processes.lock().unwrap()[index].resizes.lock().unwrap().clone()
    }
}

impl ProcessSpawner for FakeSpawner {
    fn spawn(&self, spec: &LaunchSpec) -> anyhow::Result<SpawnedProcess> {
        let (output_tx, output_rx) = mpsc::channel(64);
        let (input_tx, input_rx) = mpsc::channel(64);
        let (exit_tx, exit_rx) = oneshot::channel();
        let killed = Arc::new(AtomicBool::new(false));
        let resizes = Arc::new(Mutex::new(Vec::new()));

        self.processes.lock().unwrap().push(FakeProcess {
            spec: spec.clone(),
            output: output_tx,
            input: Some(input_rx),
            exit: Some(exit_tx),
            killed: Arc::clone(&killed),
            resizes: Arc::clone(&resizes),
        });

        Ok(SpawnedProcess {
            pid: None,
            output: output_rx,
            input: input_tx,
            control: Box::new(FakeControl { killed, resizes }),
            exited: exit_rx,
        })
    }
}

// ── Config and server ────────────────────────────────────────────────

/// Config rooted at `root` with a short debounce window.
pub fn test_config(root: &Path) -> DaemonConfig {
    let mut config = DaemonConfig::for_root(root);
    config.tracks.debounce_ms = 50;
    config.tracks.keepalive_secs = 1;
    config
}

/// A daemon serving on an ephemeral port until `stop` is called.
pub struct TestServer {
    pub addr: SocketAddr,
    pub spawner: Arc<FakeSpawner>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<anyhow::Result<()>>>,
}

impl TestServer {
    pub async fn start(config: DaemonConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("test listener should bind");
        let addr = listener.local_addr().expect("listener should expose local address");
        let spawner = Arc::new(FakeSpawner::default());
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let spawner_for_server: Arc<dyn ProcessSpawner> = spawner.clone();
        let task = tokio::spawn(async move {
            runtime::serve(listener, &config, spawner_for_server, async move {
                let _ = shutdown_rx.await;
            })
            .await
        });

        // Give the watcher a moment to register.
        tokio::time::sleep(Duration::from_millis(100)).await;
        Self { addr, spawner, shutdown_tx: Some(shutdown_tx), task: Some(task) }
    }

    pub fn http(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub fn ws(&self, path: &str) -> String {
        format!("ws://{}{path}", self.addr)
    }

    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            tokio::time::timeout(Duration::from_secs(5), task)
                .await
                .expect("server should stop after shutdown")
                .expect("server task should not panic")
                .expect("server should exit cleanly");
        }
    }
}

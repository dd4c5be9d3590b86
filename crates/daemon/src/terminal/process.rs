// Spawned interactive processes behind a pseudo-terminal.
//
// `ProcessSpawner` is the seam the session manager is tested through; the
// production implementation is `PtySpawner` (portable-pty). Blocking pty I/O
// runs on dedicated threads bridged to tokio channels.

use std::io::{ErrorKind, Read, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use portable_pty::{native_pty_system, ChildKiller, CommandBuilder, MasterPty, PtySize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

const OUTPUT_CHANNEL_CAPACITY: usize = 256;
const INPUT_CHANNEL_CAPACITY: usize = 128;
const READ_BUFFER_BYTES: usize = 8192;

/// Everything needed to start one process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    /// Variables set on top of the inherited environment.
    pub env: Vec<(String, String)>,
    pub cols: u16,
    pub rows: u16,
}

/// Control half of a running process.
pub trait ProcessControl: Send {
    fn resize(&self, cols: u16, rows: u16) -> Result<()>;
    /// Forcefully terminate. Errors (already exited) are swallowed.
    fn kill(&mut self);
}

/// A freshly spawned process and its I/O channels.
pub struct SpawnedProcess {
    pub pid: Option<u32>,
    /// Output chunks in the order the process produced them. Closes once
    /// the pty reaches EOF.
    pub output: mpsc::Receiver<Vec<u8>>,
    pub input: mpsc::Sender<Vec<u8>>,
    pub control: Box<dyn ProcessControl>,
    /// Resolves (or errors) once the process has exited.
    pub exited: oneshot::Receiver<()>,
}

pub trait ProcessSpawner: Send + Sync {
    fn spawn(&self, spec: &LaunchSpec) -> Result<SpawnedProcess>;
}

/// Spawns processes on the platform's native pseudo-terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct PtySpawner;

struct PtyControl {
    master: Box<dyn MasterPty + Send>,
    killer: Box<dyn ChildKiller + Send + Sync>,
    killed: bool,
}

impl ProcessControl for PtyControl {
    fn resize(&self, cols: u16, rows: u16) -> Result<()> {
        self.master
            .resize(PtySize { rows, cols, pixel_width: 0, pixel_height: 0 })
            .context("failed to resize pty")
    }

    fn kill(&mut self) {
        if self.killed {
            return;
        }
        self.killed = true;
        if let Err(error) = self.killer.kill() {
            debug!(%error, "pty child kill failed (likely already exited)");
        }
    }
}

impl Drop for PtyControl {
    fn drop(&mut self) {
        self.kill();
    }
}

impl ProcessSpawner for PtySpawner {
    fn spawn(&self, spec: &LaunchSpec) -> Result<SpawnedProcess> {
        let pair = native_pty_system()
            .openpty(PtySize { rows: spec.rows, cols: spec.cols, pixel_width: 0, pixel_height: 0 })
            .context("failed to open pty")?;

        let mut cmd = CommandBuilder::new(&spec.program);
        cmd.args(&spec.args);
        cmd.cwd(&spec.cwd);
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }

        let mut child = pair
            .slave
            .spawn_command(cmd)
            .with_context(|| format!("failed to spawn `{}`", spec.program))?;
        // Only the child holds the slave side, so the reader sees EOF on exit.
        drop(pair.slave);

        let pid = child.process_id();
        let killer = child.clone_killer();
        let mut reader = pair.master.try_clone_reader().context("failed to clone pty reader")?;
        let mut writer = pair.master.take_writer().context("failed to take pty writer")?;

        let (output_tx, output_rx) = mpsc::channel::<Vec<u8>>(OUTPUT_CHANNEL_CAPACITY);
        let (input_tx, mut input_rx) = mpsc::channel::<Vec<u8>>(INPUT_CHANNEL_CAPACITY);
        let (exit_tx, exit_rx) = oneshot::channel();

        std::thread::Builder::new()
            .name("pty-reader".into())
            .spawn(move || {
                let mut buf = [0u8; READ_BUFFER_BYTES];
                loop {
                    match reader.read(&mut buf) {
                        Ok(0) => break,
                        Ok(n) => {
                            if output_tx.blocking_send(buf[..n].to_vec()).is_err() {
                                break;
                            }
                        }
                        Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                        // EIO once the child side is gone.
                        Err(_) => break,
                    }
                }
            })
            .context("failed to start pty reader thread")?;

        std::thread::Builder::new()
            .name("pty-writer".into())
            .spawn(move || {
                while let Some(bytes) = input_rx.blocking_recv() {
                    if let Err(error) = writer.write_all(&bytes).and_then(|_| writer.flush()) {
                        warn!(%error, "pty write failed");
                        break;
                    }
                }
            })
            .context("failed to start pty writer thread")?;

        std::thread::Builder::new()
            .name("pty-waiter".into())
            .spawn(move || {
                match child.wait() {
                    Ok(status) => debug!(exit_code = status.exit_code(), "pty child exited"),
                    Err(error) => warn!(%error, "failed to wait on pty child"),
                }
                let _ = exit_tx.send(());
            })
            .context("failed to start pty waiter thread")?;

        Ok(SpawnedProcess {
            pid,
            output: output_rx,
            input: input_tx,
            control: Box::new(PtyControl { master: pair.master, killer, killed: false }),
            exited: exit_rx,
        })
    }
}

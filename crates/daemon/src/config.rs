// Daemon configuration.
//
// Defaults, then `<root>/.trackbench/config.toml`, then environment
// variables. The file only carries the tracks and terminal tables; listen
// address and log filter come from the environment.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 5742;
const DEFAULT_LOG_FILTER: &str = "info";

/// Path to the per-project config file: `<root>/.trackbench/config.toml`.
pub fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(".trackbench").join("config.toml")
}

// ── File config ────────────────────────────────────────────────────

/// Contents of `.trackbench/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub tracks: TracksConfig,
    pub terminal: TerminalConfig,
}

impl FileConfig {
    /// Load from `<root>/.trackbench/config.toml`. Returns defaults if the
    /// file doesn't exist.
    pub fn load(project_root: &Path) -> Result<Self, ConfigError> {
        let path = project_config_path(project_root);
        match std::fs::read_to_string(&path) {
            Ok(contents) => toml::from_str(&contents).map_err(ConfigError::Parse),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(ConfigError::Io(e)),
        }
    }
}

/// Track storage and change-stream settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct TracksConfig {
    /// Tracks directory, relative to the project root.
    pub dir: PathBuf,
    /// Settle window for external change detection.
    pub debounce_ms: u64,
    /// Keepalive interval on the event stream.
    pub keepalive_secs: u64,
}

impl Default for TracksConfig {
    fn default() -> Self {
        Self { dir: PathBuf::from("tracks"), debounce_ms: 300, keepalive_secs: 30 }
    }
}

/// Interactive terminal session settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct TerminalConfig {
    /// Program spawned behind each pseudo-terminal.
    pub program: String,
    /// Seconds a session may wait for its channel before being reaped.
    pub idle_timeout_secs: u64,
    pub cols: u16,
    pub rows: u16,
    /// Reference file the spawned program is told to read first.
    pub guide_file: String,
    /// Tracks smaller than this are treated as freshly created.
    pub new_track_max_bytes: u64,
    /// Resumption table, relative to the project root.
    pub resume_table: PathBuf,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            program: "claude".into(),
            idle_timeout_secs: 15,
            cols: 80,
            rows: 24,
            guide_file: "strudel-guide.md".into(),
            new_track_max_bytes: 50,
            resume_table: PathBuf::from(".claude-sessions.json"),
        }
    }
}

// ── Resolved config ────────────────────────────────────────────────

/// Fully resolved daemon configuration.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Project root; spawned programs run here.
    pub project_root: PathBuf,
    pub listen_addr: SocketAddr,
    /// Log filter directive used when `RUST_LOG` is unset.
    pub log_filter: String,
    /// Comma-separated CORS origins (or `"*"` for any).
    pub cors_origins: Option<String>,
    pub tracks: TracksConfig,
    pub terminal: TerminalConfig,
}

impl DaemonConfig {
    /// Resolve configuration from the process environment and the project
    /// config file.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `TRACKBENCH_ROOT` | current directory |
    /// | `TRACKBENCH_HOST` | `127.0.0.1` |
    /// | `TRACKBENCH_PORT` (then `PORT`) | `5742` |
    /// | `TRACKBENCH_LOG_FILTER` | `info` |
    /// | `TRACKBENCH_CORS_ORIGINS` | *(unset: dev defaults)* |
    pub fn load() -> Result<Self, ConfigError> {
        let cwd = std::env::current_dir().map_err(ConfigError::Io)?;
        let mut config = Self::from_env_fn(cwd, |key| std::env::var(key));
        let file = FileConfig::load(&config.project_root)?;
        config.tracks = file.tracks;
        config.terminal = file.terminal;
        Ok(config)
    }

    /// Defaults for a project rooted at `project_root`, ignoring the
    /// environment and the config file.
    pub fn for_root(project_root: impl Into<PathBuf>) -> Self {
        Self::from_env_fn(project_root.into(), |_| Err(std::env::VarError::NotPresent))
    }

    /// Testable constructor that accepts an environment lookup function.
    fn from_env_fn<F>(cwd: PathBuf, env: F) -> Self
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let project_root = env("TRACKBENCH_ROOT").map(PathBuf::from).unwrap_or(cwd);
        let host = env("TRACKBENCH_HOST").unwrap_or_else(|_| DEFAULT_HOST.into());
        let port: u16 = env("TRACKBENCH_PORT")
            .or_else(|_| env("PORT"))
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_PORT);
        let listen_addr = format!("{host}:{port}")
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], port)));
        let log_filter =
            env("TRACKBENCH_LOG_FILTER").unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
        let cors_origins = env("TRACKBENCH_CORS_ORIGINS").ok();

        Self {
            project_root,
            listen_addr,
            log_filter,
            cors_origins,
            tracks: TracksConfig::default(),
            terminal: TerminalConfig::default(),
        }
    }

    /// Absolute tracks directory.
    pub fn tracks_root(&self) -> PathBuf {
        self.project_root.join(&self.tracks.dir)
    }

    /// Absolute resumption table path.
    pub fn resume_table_path(&self) -> PathBuf {
        self.project_root.join(&self.terminal.resume_table)
    }

    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.tracks.keepalive_secs.max(1))
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.terminal.idle_timeout_secs)
    }
}

// ── Errors ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "config I/O error: {e}"),
            Self::Parse(e) => write!(f, "config parse error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

// trackbench-daemon library: track sync and terminal sessions behind an
// HTTP/WebSocket API.

pub mod api;
pub mod config;
pub mod error;
pub mod history;
pub mod hub;
pub mod resume;
pub mod runtime;
pub mod terminal;
pub mod tracks;
pub mod watcher;

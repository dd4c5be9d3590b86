// Event debouncer for the file watcher pipeline.
//
// Coalesces rapid filesystem events on the same track within a configurable
// quiet window (default 300ms, range 50–2000ms). The last event kind wins.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use super::{FsEventKind, RawFsEvent};

/// Default debounce window.
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;
/// Minimum allowed debounce window.
const MIN_DEBOUNCE_MS: u64 = 50;
/// Maximum allowed debounce window.
const MAX_DEBOUNCE_MS: u64 = 2000;

/// Configuration for the debouncer.
#[derive(Debug, Clone)]
pub struct DebounceConfig {
    pub window: Duration,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self { window: Duration::from_millis(DEFAULT_DEBOUNCE_MS) }
    }
}

impl DebounceConfig {
    /// Create a config with the given window in milliseconds, clamped to [50, 2000].
    pub fn with_millis(ms: u64) -> Self {
        let clamped = ms.clamp(MIN_DEBOUNCE_MS, MAX_DEBOUNCE_MS);
        Self { window: Duration::from_millis(clamped) }
    }
}

struct PendingEvent {
    kind: FsEventKind,
    last_seen: Instant,
}

/// Debounces raw filesystem events, coalescing rapid events on the same track.
///
/// Call `push()` for each incoming event, then `drain_ready()` once
/// `next_deadline()` has passed to collect events whose window has elapsed.
/// Uses the tokio clock so paused-time tests drive it deterministically.
pub struct Debouncer {
    config: DebounceConfig,
    pending: HashMap<String, PendingEvent>,
}

impl Debouncer {
    pub fn new(config: DebounceConfig) -> Self {
        Self { config, pending: HashMap::new() }
    }

    /// Record a raw event. A pending event for the same track is replaced
    /// and its timer restarts.
    pub fn push(&mut self, event: RawFsEvent) {
        self.push_at(event, Instant::now());
    }

    fn push_at(&mut self, event: RawFsEvent, now: Instant) {
        self.pending.insert(event.name, PendingEvent { kind: event.kind, last_seen: now });
    }

    /// Drain all events whose debounce window has elapsed.
    pub fn drain_ready(&mut self) -> Vec<RawFsEvent> {
        self.drain_ready_at(Instant::now())
    }

    fn drain_ready_at(&mut self, now: Instant) -> Vec<RawFsEvent> {
        let window = self.config.window;
        let mut ready = Vec::new();

        self.pending.retain(|name, pending| {
            if now.duration_since(pending.last_seen) >= window {
                ready.push(RawFsEvent { kind: pending.kind.clone(), name: name.clone() });
                false
            } else {
                true
            }
        });

        ready.sort_by(|a, b| a.name.cmp(&b.name));
        ready
    }

    /// Number of events still waiting in the debounce window.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// When the next pending event becomes ready, or None if empty.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|p| p.last_seen + self.config.window).min()
    }
}

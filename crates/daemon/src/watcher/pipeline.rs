// Watcher pipeline: FS event → debounce → track service settle.
//
// Each track settles once its events have gone quiet for the debounce
// window; the track service then decides between echo, change and delete.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, trace};

use crate::tracks::TrackService;

use super::debounce::{DebounceConfig, Debouncer};
use super::RawFsEvent;

/// Runs the watcher pipeline as an async loop.
///
/// Exits when `raw_rx` closes (watcher dropped) or `shutdown` fires.
/// Pending events that have not settled by then are dropped.
pub async fn run_pipeline(
    mut raw_rx: mpsc::Receiver<RawFsEvent>,
    tracks: Arc<TrackService>,
    config: DebounceConfig,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut debouncer = Debouncer::new(config);

    info!("watcher pipeline started");

    loop {
        let deadline = debouncer.next_deadline();

        tokio::select! {
            biased;

            _ = shutdown.recv() => {
                info!("watcher pipeline shutting down");
                break;
            }

            maybe_event = raw_rx.recv() => {
                match maybe_event {
                    Some(event) => {
                        trace!(track = %event.name, kind = ?event.kind, "raw event received");
                        debouncer.push(event);
                    }
                    None => {
                        info!("raw event channel closed, pipeline exiting");
                        break;
                    }
                }
            }

            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {}
        }

        for event in debouncer.drain_ready() {
            let outcome = tracks.settle(&event.name).await;
            debug!(track = %event.name, ?outcome, "track settled");
        }
    }
}

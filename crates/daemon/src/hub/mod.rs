// Fan-out of track events to change-stream subscribers.
//
// Each subscriber owns a bounded queue. Publishing never waits: a subscriber
// whose queue is full or closed is dropped, and its stream ends so the
// client reconnects and receives a fresh snapshot.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, trace};
use trackbench_common::protocol::events::TrackEvent;

/// Per-subscriber queue depth.
const SUBSCRIBER_BUFFER: usize = 256;

#[derive(Debug, Default)]
pub struct BroadcastHub {
    subscribers: Mutex<HashMap<u64, mpsc::Sender<TrackEvent>>>,
    next_id: AtomicU64,
}

/// A live subscription. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<TrackEvent>,
    hub: Arc<BroadcastHub>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next event, or `None` once the hub has dropped this subscriber.
    pub async fn recv(&mut self) -> Option<TrackEvent> {
        self.rx.recv().await
    }

    /// Non-blocking receive for tests and drains.
    pub fn try_recv(&mut self) -> Option<TrackEvent> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.unsubscribe(self.id);
    }
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber. `snapshot` is queued before any later event.
    pub fn subscribe(self: &Arc<Self>, snapshot: Vec<String>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let mut subscribers = self.subscribers.lock().expect("hub lock poisoned");
        // Fresh channel with spare capacity: cannot fail.
        let _ = tx.try_send(TrackEvent::tracklist(snapshot));
        subscribers.insert(id, tx);
        debug!(subscriber = id, total = subscribers.len(), "subscriber added");
        Subscription { id, rx, hub: Arc::clone(self) }
    }

    pub fn unsubscribe(&self, id: u64) {
        let mut subscribers = self.subscribers.lock().expect("hub lock poisoned");
        if subscribers.remove(&id).is_some() {
            debug!(subscriber = id, total = subscribers.len(), "subscriber removed");
        }
    }

    /// Deliver `event` to every subscriber. Returns how many accepted it.
    pub fn publish(&self, event: TrackEvent) -> usize {
        let mut subscribers = self.subscribers.lock().expect("hub lock poisoned");
        let mut delivered = 0;
        subscribers.retain(|id, tx| match tx.try_send(event.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(error) => {
                debug!(subscriber = id, %error, "dropping subscriber after failed send");
                false
            }
        });
        trace!(delivered, "event published");
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().expect("hub lock poisoned").len()
    }

    /// Drop every subscriber; their streams end.
    pub fn close(&self) {
        let mut subscribers = self.subscribers.lock().expect("hub lock poisoned");
        let count = subscribers.len();
        subscribers.clear();
        debug!(count, "hub closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn snapshot_arrives_first() {
        let hub = Arc::new(BroadcastHub::new());
        let mut sub = hub.subscribe(vec!["a.strudel".into()]);
        hub.publish(TrackEvent::delete("a.strudel"));

        assert_eq!(sub.recv().await, Some(TrackEvent::tracklist(vec!["a.strudel".into()])));
        assert_eq!(sub.recv().await, Some(TrackEvent::delete("a.strudel")));
    }

    #[tokio::test]
    async fn publish_preserves_order_per_subscriber() {
        let hub = Arc::new(BroadcastHub::new());
        let mut sub = hub.subscribe(Vec::new());
        let _ = sub.recv().await;

        for depth in 0..5 {
            hub.publish(TrackEvent::change("a.strudel", format!("v{depth}"), depth));
        }
        for depth in 0..5 {
            assert_eq!(
                sub.recv().await,
                Some(TrackEvent::change("a.strudel", format!("v{depth}"), depth))
            );
        }
    }

    #[tokio::test]
    async fn fan_out_reaches_every_subscriber() {
        let hub = Arc::new(BroadcastHub::new());
        let mut a = hub.subscribe(Vec::new());
        let mut b = hub.subscribe(Vec::new());
        assert_eq!(hub.publish(TrackEvent::delete("x.strudel")), 2);

        for sub in [&mut a, &mut b] {
            let _ = sub.recv().await;
            assert_eq!(sub.recv().await, Some(TrackEvent::delete("x.strudel")));
        }
    }

    #[test]
    fn dropping_subscription_unsubscribes() {
        let hub = Arc::new(BroadcastHub::new());
        let sub = hub.subscribe(Vec::new());
        assert_eq!(hub.subscriber_count(), 1);
        drop(sub);
        assert_eq!(hub.subscriber_count(), 0);
        assert_eq!(hub.publish(TrackEvent::delete("x.strudel")), 0);
    }

    #[test]
    fn full_subscriber_is_dropped_without_blocking_others() {
        let hub = Arc::new(BroadcastHub::new());
        let _stalled = hub.subscribe(Vec::new());
        let mut healthy = hub.subscribe(Vec::new());

        for i in 0..SUBSCRIBER_BUFFER {
            hub.publish(TrackEvent::change("a.strudel", i.to_string(), i));
            // Keep the healthy subscriber drained.
            while healthy.try_recv().is_some() {}
        }

        assert_eq!(hub.subscriber_count(), 1, "stalled subscriber should be evicted");
        assert_eq!(hub.publish(TrackEvent::delete("a.strudel")), 1);
        assert_eq!(healthy.try_recv(), Some(TrackEvent::delete("a.strudel")));
    }

    #[tokio::test]
    async fn close_ends_streams() {
        let hub = Arc::new(BroadcastHub::new());
        let mut sub = hub.subscribe(Vec::new());
        hub.close();
        assert!(sub.recv().await.is_some(), "queued snapshot is still delivered");
        assert!(sub.recv().await.is_none());
    }
}

// Change subscription over Server-Sent Events.
//
// Each connection gets its own hub subscription; the tracklist snapshot is
// the first frame. The stream ends when the hub drops the subscriber.

use std::convert::Infallible;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use futures_util::stream::{self, Stream};
use tracing::{debug, warn};

use super::AppState;
use crate::hub::Subscription;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/events", get(subscribe))
}

async fn subscribe(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = state.tracks.subscribe().await;
    debug!(subscriber = subscription.id(), "event stream opened");
    Sse::new(event_stream(subscription))
        .keep_alive(KeepAlive::new().interval(state.keepalive).text("keepalive"))
}

fn event_stream(subscription: Subscription) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold(subscription, |mut subscription| async move {
        let event = subscription.recv().await?;
        let frame = Event::default().json_data(&event).unwrap_or_else(|error| {
            warn!(%error, "failed to encode track event");
            Event::default().comment("encode-error")
        });
        Some((Ok(frame), subscription))
    })
}

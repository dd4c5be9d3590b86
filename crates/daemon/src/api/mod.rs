// HTTP surface: track REST routes, the change event stream, and terminal
// session routes, behind shared request middleware.

pub mod cors;
pub mod events;
pub mod terminal;
pub mod tracks;

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::{header::HeaderValue, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tower_http::cors::CorsLayer;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::{ApiError, ErrorCode};
use crate::terminal::SessionManager;
use crate::tracks::TrackService;

pub const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub tracks: Arc<TrackService>,
    pub sessions: SessionManager,
    /// Interval between keepalive comments on the event stream.
    pub keepalive: Duration,
}

pub fn router(state: AppState, cors: CorsLayer) -> Router {
    with_request_layers(
        Router::new()
            .route("/healthz", get(healthz))
            .merge(tracks::router())
            .merge(events::router())
            .merge(terminal::router())
            .with_state(state),
    )
    .layer(cors)
}

/// Body limit innermost, then request context, then panic isolation, so a
/// panicking handler still gets a request id and a completion log line.
fn with_request_layers(routes: Router) -> Router {
    routes
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(middleware::from_fn(request_context))
        .layer(middleware::from_fn(isolate_panics))
}

async fn healthz() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Run the handler on its own task; a panic answers with the `INTERNAL`
/// envelope instead of dropping the connection.
async fn isolate_panics(request: Request<Body>, next: Next) -> Response {
    let path = request.uri().path().to_owned();
    match tokio::spawn(next.run(request)).await {
        Ok(response) => response,
        Err(join_error) => {
            error!(%path, ?join_error, "handler panicked");
            ApiError::new(ErrorCode::Internal, "internal error").into_response()
        }
    }
}

/// Tag the request with an id (echoed from `x-request-id` or minted), run it
/// inside a span carrying that id, and log its outcome once.
async fn request_context(request: Request<Body>, next: Next) -> Response {
    let request_id = incoming_request_id(&request).unwrap_or_else(|| Uuid::new_v4().to_string());
    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %request.method(),
        path = %request.uri().path(),
    );
    let started_at = Instant::now();

    let mut response = next.run(request).instrument(span.clone()).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    let status = response.status().as_u16();
    let latency_ms = started_at.elapsed().as_millis() as u64;
    span.in_scope(|| {
        if response.status().is_server_error() {
            warn!(status, latency_ms, "request failed");
        } else {
            info!(status, latency_ms, "request completed");
        }
    });
    response
}

fn incoming_request_id(request: &Request<Body>) -> Option<String> {
    let value = request.headers().get(REQUEST_ID_HEADER)?.to_str().ok()?.trim();
    (!value.is_empty()).then(|| value.to_string())
}

// Terminal session routes and the WebSocket bridge between a session's
// process and its channel.

use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use futures_util::{stream::SplitStream, SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, info};
use trackbench_common::protocol::terminal::{classify, InboundFrame};
use trackbench_common::track;
use uuid::Uuid;

use super::AppState;
use crate::error::{ApiError, ErrorCode};
use crate::terminal::{DestroyReason, SessionError, SessionLink, SessionManager};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/terminal/create", post(create_session))
        .route("/api/terminal/{id}", delete(destroy_session))
        .route("/api/terminal/{id}/kill", post(kill_session))
        .route("/ws/terminal/{id}", get(attach_channel))
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionBody {
    #[serde(rename = "trackName", default)]
    pub track_name: Option<String>,
}

fn parse_session_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw)
        .map_err(|_| ApiError::new(ErrorCode::SessionNotFound, format!("session not found: {raw}")))
}

async fn create_session(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let body: CreateSessionBody = if body.iter().all(u8::is_ascii_whitespace) {
        CreateSessionBody::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|error| ApiError::new(ErrorCode::ValidationFailed, error.to_string()))?
    };

    // An unusable track name means a session without track context.
    let track = body.track_name.filter(|name| track::validate(name));
    let id = state.sessions.create(track.as_deref()).await?;
    Ok(Json(json!({ "sessionId": id })))
}

async fn destroy_session(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_session_id(&raw_id)?;
    if !state.sessions.destroy(id, DestroyReason::Requested) {
        return Err(SessionError::SessionNotFound(id).into());
    }
    Ok(Json(json!({ "ok": true })))
}

/// Beacon-friendly destroy: always 204.
async fn kill_session(State(state): State<AppState>, Path(raw_id): Path<String>) -> StatusCode {
    if let Ok(id) = Uuid::parse_str(&raw_id) {
        state.sessions.destroy(id, DestroyReason::Requested);
    }
    StatusCode::NO_CONTENT
}

async fn attach_channel(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let id = parse_session_id(&raw_id)?;
    let link = state.sessions.attach(id)?;
    // If the upgrade never completes, dropping the guard tears the session down.
    let guard = ChannelGuard { id, sessions: state.sessions.clone() };
    Ok(ws.on_upgrade(move |socket| bridge(socket, link, guard)).into_response())
}

/// Destroys the session when the channel side goes away.
struct ChannelGuard {
    id: Uuid,
    sessions: SessionManager,
}

impl Drop for ChannelGuard {
    fn drop(&mut self) {
        self.sessions.destroy(self.id, DestroyReason::ChannelClosed);
    }
}

async fn bridge(socket: WebSocket, link: SessionLink, guard: ChannelGuard) {
    let SessionLink { id, mut output, input, mut closed } = link;
    let (mut sink, stream) = socket.split();
    // Inbound frames are routed on their own task; a full input channel
    // must not hold up output or close.
    let mut inbound = tokio::spawn(forward_inbound(stream, input, guard.sessions.clone(), id));
    let mut output_open = true;

    loop {
        tokio::select! {
            _ = &mut closed => {
                // Flush output already read from the process before closing.
                while let Ok(chunk) = output.try_recv() {
                    if sink.send(Message::Binary(chunk.into())).await.is_err() {
                        break;
                    }
                }
                debug!(session_id = %id, "session ended, closing channel");
                break;
            }

            chunk = output.recv(), if output_open => match chunk {
                Some(chunk) => {
                    if sink.send(Message::Binary(chunk.into())).await.is_err() {
                        break;
                    }
                }
                // Output EOF; the exit notification closes the channel.
                None => output_open = false,
            },

            _ = &mut inbound => {
                debug!(session_id = %id, "channel closed by client");
                break;
            }
        }
    }

    inbound.abort();
    drop(guard);
    let _ = sink.send(Message::Close(None)).await;
    info!(session_id = %id, "channel closed");
}

/// Route inbound frames until the client goes away or the process stops
/// accepting input.
async fn forward_inbound(
    mut stream: SplitStream<WebSocket>,
    input: mpsc::Sender<Vec<u8>>,
    sessions: SessionManager,
    id: Uuid,
) {
    while let Some(message) = stream.next().await {
        let payload = match message {
            Ok(Message::Text(text)) => Bytes::copy_from_slice(text.as_str().as_bytes()),
            Ok(Message::Binary(bytes)) => bytes,
            Ok(Message::Ping(_) | Message::Pong(_)) => continue,
            Ok(Message::Close(_)) | Err(_) => break,
        };
        match classify(&payload) {
            InboundFrame::Resize { cols, rows } => {
                if let Err(error) = sessions.resize(id, cols, rows) {
                    debug!(session_id = %id, %error, "resize ignored");
                }
            }
            InboundFrame::Input(bytes) => {
                if input.send(bytes).await.is_err() {
                    break;
                }
            }
        }
    }
}

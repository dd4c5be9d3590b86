// Track REST routes.

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Query, State},
    http::header,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/tracks", get(list_tracks))
        .route("/api/track", get(read_track).put(write_track))
        .route("/api/track/create", post(create_track))
        .route("/api/track/undo", post(undo_track))
}

/// `?name=`; a missing name is an empty (invalid) name.
#[derive(Debug, Deserialize)]
pub struct NameQuery {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct WriteBody {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateBody {
    #[serde(default)]
    pub name: String,
}

async fn list_tracks(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.tracks.list().await)
}

async fn read_track(
    State(state): State<AppState>,
    query: Result<Query<NameQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;
    let content = state.tracks.read(&query.name).await?;
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], content))
}

async fn write_track(
    State(state): State<AppState>,
    query: Result<Query<NameQuery>, QueryRejection>,
    body: Result<Json<WriteBody>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(query) = query?;
    let Json(body) = body?;
    let undo_depth = state.tracks.write(&query.name, &body.content).await?;
    Ok(Json(json!({ "ok": true, "undoDepth": undo_depth })))
}

async fn create_track(
    State(state): State<AppState>,
    body: Result<Json<CreateBody>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = body?;
    let name = state.tracks.create(&body.name).await?;
    Ok(Json(json!({ "ok": true, "name": name })))
}

async fn undo_track(
    State(state): State<AppState>,
    query: Result<Query<NameQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(query) = query?;
    let (_, undo_depth) = state.tracks.undo(&query.name).await?;
    Ok(Json(json!({ "ok": true, "undoDepth": undo_depth })))
}

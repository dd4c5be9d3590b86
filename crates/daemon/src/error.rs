// HTTP error envelope: `{"error": {"code": ..., "message": ...}}`.

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::warn;

use crate::terminal::SessionError;
use crate::tracks::TrackError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ValidationFailed,
    PayloadTooLarge,
    InvalidName,
    NotFound,
    AlreadyExists,
    NothingToUndo,
    SessionNotFound,
    SessionAttached,
    SpawnFailed,
    StorageFailure,
    Internal,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            Self::InvalidName => "INVALID_NAME",
            Self::NotFound => "NOT_FOUND",
            Self::AlreadyExists => "ALREADY_EXISTS",
            Self::NothingToUndo => "NOTHING_TO_UNDO",
            Self::SessionNotFound => "SESSION_NOT_FOUND",
            Self::SessionAttached => "SESSION_ATTACHED",
            Self::SpawnFailed => "SPAWN_FAILED",
            Self::StorageFailure => "STORAGE_FAILURE",
            Self::Internal => "INTERNAL",
        }
    }

    pub const fn status(self) -> StatusCode {
        match self {
            Self::ValidationFailed | Self::InvalidName => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::NotFound | Self::NothingToUndo | Self::SessionNotFound => StatusCode::NOT_FOUND,
            Self::AlreadyExists | Self::SessionAttached => StatusCode::CONFLICT,
            Self::SpawnFailed | Self::StorageFailure | Self::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiError {
    code: ErrorCode,
    message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.code.status(),
            Json(json!({
                "error": {
                    "code": self.code.as_str(),
                    "message": self.message,
                }
            })),
        )
            .into_response()
    }
}

impl From<TrackError> for ApiError {
    fn from(error: TrackError) -> Self {
        let code = match &error {
            TrackError::InvalidName(_) => ErrorCode::InvalidName,
            TrackError::NotFound(_) => ErrorCode::NotFound,
            TrackError::AlreadyExists(_) => ErrorCode::AlreadyExists,
            TrackError::NothingToUndo => ErrorCode::NothingToUndo,
            TrackError::Storage { .. } => {
                warn!(%error, "track storage failure");
                ErrorCode::StorageFailure
            }
        };
        Self::new(code, error.to_string())
    }
}

impl From<SessionError> for ApiError {
    fn from(error: SessionError) -> Self {
        let code = match &error {
            SessionError::InvalidName(_) => ErrorCode::InvalidName,
            SessionError::SessionNotFound(_) => ErrorCode::SessionNotFound,
            SessionError::AlreadyAttached(_) => ErrorCode::SessionAttached,
            SessionError::SpawnFailure(_) => {
                warn!(%error, "session spawn failure");
                ErrorCode::SpawnFailed
            }
            SessionError::Storage(_) => {
                warn!(%error, "session storage failure");
                ErrorCode::StorageFailure
            }
        };
        Self::new(code, error.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let code = if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ErrorCode::PayloadTooLarge
        } else {
            ErrorCode::ValidationFailed
        };
        Self::new(code, rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::new(ErrorCode::ValidationFailed, rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;
    use serde_json::Value;
    use trackbench_common::track::TrackNameError;
    use uuid::Uuid;

    use super::*;

    async fn body_json(response: Response) -> Value {
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("error response body should be readable");
        serde_json::from_slice(&body).expect("error response body should be valid json")
    }

    #[tokio::test]
    async fn envelope_carries_code_and_message() {
        let response =
            ApiError::new(ErrorCode::NotFound, "track not found: a.strudel").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let parsed = body_json(response).await;
        assert_eq!(parsed["error"]["code"], "NOT_FOUND");
        assert_eq!(parsed["error"]["message"], "track not found: a.strudel");
    }

    #[test]
    fn track_errors_map_to_codes() {
        let cases = [
            (TrackError::InvalidName(TrackNameError::Traversal), ErrorCode::InvalidName),
            (TrackError::NotFound("a".into()), ErrorCode::NotFound),
            (TrackError::AlreadyExists("a".into()), ErrorCode::AlreadyExists),
            (TrackError::NothingToUndo, ErrorCode::NothingToUndo),
            (
                TrackError::Storage {
                    name: "a".into(),
                    source: std::io::Error::other("disk full"),
                },
                ErrorCode::StorageFailure,
            ),
        ];
        for (error, code) in cases {
            assert_eq!(ApiError::from(error).code(), code);
        }
    }

    #[test]
    fn session_errors_map_to_codes() {
        let id = Uuid::new_v4();
        assert_eq!(
            ApiError::from(SessionError::SessionNotFound(id)).code().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(SessionError::AlreadyAttached(id)).code().status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(SessionError::SpawnFailure(anyhow::anyhow!("boom"))).code(),
            ErrorCode::SpawnFailed
        );
    }
}

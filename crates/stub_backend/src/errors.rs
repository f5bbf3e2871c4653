use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// The two error shapes the real backend produces: plain text from the
/// API gateway and `{"detail": ...}` from the ML service.
#[derive(Debug)]
pub enum StubError {
    Plain(StatusCode, String),
    Detail(StatusCode, String),
}

impl StubError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        StubError::Plain(StatusCode::BAD_REQUEST, message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        StubError::Plain(StatusCode::UNAUTHORIZED, message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        StubError::Plain(StatusCode::NOT_FOUND, message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        StubError::Plain(StatusCode::CONFLICT, message.into())
    }

    pub fn ml(status: StatusCode, message: impl Into<String>) -> Self {
        StubError::Detail(status, message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            StubError::Plain(status, _) | StubError::Detail(status, _) => *status,
        }
    }
}

impl IntoResponse for StubError {
    fn into_response(self) -> Response {
        match self {
            StubError::Plain(status, message) => (status, format!("{}\n", message)).into_response(),
            StubError::Detail(status, message) => {
                (status, Json(json!({ "detail": message }))).into_response()
            }
        }
    }
}

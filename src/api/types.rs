//! Shared API envelope and error types.
//!
//! Task endpoints wrap success payloads in `{"code": 0, "data": ...}` and
//! report failures as an HTTP status plus `{"code": <status>, "msg": ...}`,
//! which is the shape the studio front-end parses. Key-management and
//! catalog endpoints return their listing payloads unwrapped.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::error::GenerationError;
use crate::keystore::KeystoreError;

/// Success envelope for the task endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope<T> {
    /// Zero on success
    pub code: i64,

    /// Endpoint-specific payload
    pub data: T,
}

/// Wrap a payload in the success envelope.
pub fn ok<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope { code: 0, data })
}

/// An API failure carrying the HTTP status and a human-readable reason.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub msg: String,
}

impl ApiError {
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            msg: msg.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({
            "code": self.status.as_u16(),
            "msg": self.msg,
        }));
        (self.status, body).into_response()
    }
}

impl From<GenerationError> for ApiError {
    fn from(err: GenerationError) -> Self {
        let status = match &err {
            GenerationError::Validation(_) => StatusCode::BAD_REQUEST,
            GenerationError::ConcurrentTask => StatusCode::CONFLICT,
            GenerationError::Submission(_)
            | GenerationError::TransientPoll(_)
            | GenerationError::RemoteFailure(_) => StatusCode::BAD_GATEWAY,
            GenerationError::PollTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            GenerationError::Keystore(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl From<KeystoreError> for ApiError {
    fn from(err: KeystoreError) -> Self {
        let status = match &err {
            KeystoreError::NotFound(_) => StatusCode::NOT_FOUND,
            KeystoreError::Invalid(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,
}

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Failure of an outbound call (model inference, image generation, product search).
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("missing credentials for {0}")] MissingCredentials(&'static str),
    #[error("HTTP error: {0}")] Http(String),
    #[error("status={status} body={body}")] Status { status: u16, body: String },
    #[error("request timed out")] Timeout,
    #[error("provider error: {0}")] Provider(String),
    #[error("parse error: {0}")] Parse(String),
    #[error("empty response")] Empty,
}

impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() { UpstreamError::Timeout } else { UpstreamError::Http(e.to_string()) }
    }
}

/// Errors surfaced to callers of the HTTP boundary.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")] Validation(String),
    #[error("{0} not found")] NotFound(String),
    #[error("No results found")] NoResults,
    #[error("upstream failure: {0}")] Upstream(#[from] UpstreamError),
    #[error("{0}")] Internal(String),
    /// Request the extractors refused, keeping their status (400, 413, 415, ...).
    #[error("{message}")] Rejected { status: StatusCode, message: String },
}

impl ApiError {
    fn rejected(status: StatusCode, message: String) -> Self {
        if status.is_server_error() {
            ApiError::Internal(message)
        } else {
            ApiError::Rejected { status, message }
        }
    }
}

impl From<PathRejection> for ApiError {
    fn from(r: PathRejection) -> Self { Self::rejected(r.status(), r.body_text()) }
}

impl From<QueryRejection> for ApiError {
    fn from(r: QueryRejection) -> Self { Self::rejected(r.status(), r.body_text()) }
}

impl From<JsonRejection> for ApiError {
    fn from(r: JsonRejection) -> Self { Self::rejected(r.status(), r.body_text()) }
}

impl From<MultipartRejection> for ApiError {
    fn from(r: MultipartRejection) -> Self { Self::rejected(r.status(), r.body_text()) }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self { Self::rejected(e.status(), e.body_text()) }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) | ApiError::NoResults => StatusCode::NOT_FOUND,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Rejected { status, .. } => *status,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("❌ {}", self);
        } else {
            tracing::warn!("⚠️ {}", self);
        }
        (status, Json(json!({ "success": false, "error": self.to_string() }))).into_response()
    }
}

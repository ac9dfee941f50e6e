use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Why a single probe produced no HTTP status.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Client error: {0}")]
    Transport(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),

    /// The scan was cancelled before this URL was admitted.
    #[error("Scan cancelled before probe was admitted")]
    Cancelled,
}

impl ProbeError {
    pub fn status_text(&self) -> &'static str {
        match self {
            ProbeError::InvalidUrl(_) => "Invalid URL",
            ProbeError::Timeout => "Timeout",
            ProbeError::Transport(_) => "Network Error",
            ProbeError::Unexpected(_) => "Unexpected Error",
            ProbeError::Cancelled => "Cancelled",
        }
    }
}

/// Failures reported by a [`crate::transport::Transport`].
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    /// DNS, connect, TLS, redirect or protocol failure.
    #[error("{0}")]
    Request(String),

    #[error("failed to build HTTP client: {0}")]
    Build(String),

    #[error("{0}")]
    Other(String),
}

impl From<TransportError> for ProbeError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout => ProbeError::Timeout,
            TransportError::Request(msg) => ProbeError::Transport(msg),
            TransportError::Build(msg) | TransportError::Other(msg) => ProbeError::Unexpected(msg),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: String,
    pub message: String,
}

/// Errors returned by the HTTP API.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, key, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            ApiError::Internal(msg) => {
                tracing::error!(details = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg)
            }
        };
        (
            status,
            Json(ApiErrorBody {
                error: key.into(),
                message,
            }),
        )
            .into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(format!("{err:#}"))
    }
}

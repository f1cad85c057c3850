//! Error responses for the HTTP adapter

use crate::hub::HubError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use sse_common::{AppError, ErrorResponse};
use thiserror::Error;

/// Error returned by request handlers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    App(#[from] AppError),

    #[error("{0}")]
    Hub(#[from] HubError),

    #[error("Internal server error")]
    Internal(#[source] anyhow::Error),
}

impl ApiError {
    /// Get HTTP status code for this error
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        let code = match self {
            Self::App(e) => e.status_code(),
            Self::Hub(e) => hub_status(e),
            Self::Internal(_) => 500,
        };
        StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Get error code for API responses
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::App(e) => e.error_code(),
            Self::Hub(HubError::DuplicateConsumer(_)) => "DUPLICATE_CONSUMER",
            Self::Hub(HubError::StreamingUnsupported) => "STREAMING_UNSUPPORTED",
            Self::Hub(HubError::ShuttingDown | HubError::Closed) => "HUB_CLOSED",
            Self::Hub(HubError::QueueFull) => "QUEUE_FULL",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Create an internal error from any error
    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        Self::Internal(err.into())
    }
}

fn hub_status(err: &HubError) -> u16 {
    match err {
        HubError::DuplicateConsumer(_) => 409,
        HubError::ShuttingDown | HubError::Closed | HubError::QueueFull => 503,
        HubError::StreamingUnsupported => 500,
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorResponse,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(error = ?self, "Server error occurred");
        }

        let body = ErrorBody {
            error: ErrorResponse {
                code: self.error_code().to_string(),
                message: self.to_string(),
                details: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

/// Type alias for handler results
pub type ApiResult<T> = Result<T, ApiError>;

//! HTTP error responses for the offline-loader server.
//!
//! Every failure reaches the caller as `{"error": "<CODE>: <message>"}` with
//! a status derived from the error code.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use loader_core::Error;

use crate::routes::capture::CaptureResponse;

/// Structured errors returned by request handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The capture pipeline failed.
    #[error(transparent)]
    Capture(#[from] Error),

    /// The capture task ended without producing a result.
    #[error("INTERNAL: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Capture(Error::InvalidInput(_) | Error::MalformedUrl(_)) => StatusCode::BAD_REQUEST,
            ApiError::Capture(Error::RenderFailed(_) | Error::RenderDisabled) => StatusCode::BAD_GATEWAY,
            ApiError::Capture(Error::RenderTimeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Capture(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Capture(err) => err.code(),
            ApiError::Internal(_) => "INTERNAL",
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Capture(Error::InvalidInput(rejection.body_text()))
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::Internal(format!("capture task failed: {err}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        tracing::warn!(code = self.code(), status = status.as_u16(), "request failed: {self}");
        (status, Json(CaptureResponse::Failure { error: self.to_string() })).into_response()
    }
}

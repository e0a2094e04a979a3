//! `POST /capture` implementation.
//!
//! Serves a stored snapshot or captures the page, relaying the outcome as
//! JSON for the viewer.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use loader_client::CaptureResult;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::handler::AppState;

/// Request body for `POST /capture`.
#[derive(Debug, Clone, Deserialize)]
pub struct CaptureParams {
    /// The URL to capture; the scheme may be omitted.
    pub url: String,
}

/// Response body for `POST /capture`.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum CaptureResponse {
    Success {
        html: String,
        #[serde(rename = "fromCache")]
        from_cache: bool,
        /// Path component of the requested URL.
        path: String,
        /// False when the page was rendered but could not be stored.
        persisted: bool,
    },
    Failure {
        error: String,
    },
}

impl From<CaptureResult> for CaptureResponse {
    fn from(result: CaptureResult) -> Self {
        CaptureResponse::Success {
            html: result.html,
            from_cache: result.from_cache,
            path: result.path,
            persisted: result.persisted,
        }
    }
}

/// Handler for `POST /capture`.
///
/// The capture runs in its own task so a caller that disconnects mid-render
/// does not abort it; the snapshot still lands for the next request.
pub async fn capture_impl(
    State(state): State<AppState>, payload: Result<Json<CaptureParams>, JsonRejection>,
) -> Result<Json<CaptureResponse>, ApiError> {
    let Json(params) = payload?;

    let service = state.capture.clone();
    let result = tokio::spawn(async move { service.capture(&params.url).await }).await??;

    Ok(Json(result.into()))
}

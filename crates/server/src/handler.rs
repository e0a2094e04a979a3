//! HTTP router for offline-loader.
//!
//! This module defines the shared application state and the router that
//! maps paths to the route implementations.

use axum::Json;
use axum::Router;
use axum::routing::{get, post};
use loader_client::CaptureService;
use tower_http::trace::TraceLayer;

use crate::routes::{capture, viewer};

/// State shared by every request.
#[derive(Clone)]
pub struct AppState {
    pub capture: CaptureService,
}

impl AppState {
    pub fn new(capture: CaptureService) -> Self {
        Self { capture }
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(viewer::index))
        .route("/capture", post(capture::capture_impl))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

//! HTTP router configuration

use std::sync::Arc;

use axum::{
    Json, Router,
    routing::{get, post},
};
use utoipa::OpenApi;

use crate::api::{ApiDoc, ota, system};
use crate::state::AppState;

async fn openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // System endpoints
        .route("/health", get(system::health))
        .route("/api-docs/openapi.json", get(openapi))
        // Firmware updates
        .route("/api/v1/ota", get(ota::get_status))
        .route("/api/v1/ota/trigger", post(ota::trigger_update))
        .route("/api/v1/ota/abort", post(ota::abort_update))
        .with_state(state)
}

//! Firmware update API endpoints

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode};
use otaflow_api::requests::TriggerRequest;
use otaflow_api::responses::{ApiError, ImageInfo, OtaStatus, StatusResponse};
use otaflow_core::{ImageDescriptor, Orchestrator, UpdateRequest, UpdateStatus};
use tracing::info;

use crate::api::error::AppError;
use crate::state::AppState;

fn api_status(status: UpdateStatus) -> OtaStatus {
    match status {
        UpdateStatus::Idle => OtaStatus::Idle,
        UpdateStatus::Updating => OtaStatus::Updating,
        UpdateStatus::Verifying => OtaStatus::Verifying,
        UpdateStatus::Succeeded => OtaStatus::Succeeded,
        UpdateStatus::Failed => OtaStatus::Failed,
        UpdateStatus::NotReady => OtaStatus::NotReady,
    }
}

fn image_info(desc: ImageDescriptor) -> ImageInfo {
    ImageInfo {
        project_name: desc.project_name,
        version: desc.version,
        secure_version: desc.secure_version,
        compile_date: desc.compile_date,
        compile_time: desc.compile_time,
        sdk_version: desc.sdk_version,
        elf_sha256: desc.elf_sha256,
    }
}

fn update_request(req: TriggerRequest) -> UpdateRequest {
    UpdateRequest {
        url: req.url,
        ca_cert_pem: req.ca_cert_pem,
        use_global_trust_store: req.use_global_trust_store,
        client_key_pem: req.client_key_pem,
        client_cert_pem: req.client_cert_pem,
    }
}

fn status_response(orchestrator: &Orchestrator) -> StatusResponse {
    StatusResponse {
        status: api_status(orchestrator.status()),
        progress: orchestrator.progress(),
        total_size: orchestrator.total_size(),
        percent: orchestrator.percent(),
        message: orchestrator.message(),
        image: orchestrator.image_descriptor().map(image_info),
    }
}

/// Current update status
#[utoipa::path(
    get,
    path = "/api/v1/ota",
    tag = "ota",
    responses((status = 200, description = "Current status", body = StatusResponse))
)]
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(status_response(&state.orchestrator))
}

/// Start a firmware update
///
/// # Errors
/// Returns `AppError` if the orchestrator rejects the trigger
#[utoipa::path(
    post,
    path = "/api/v1/ota/trigger",
    tag = "ota",
    request_body = TriggerRequest,
    responses(
        (status = 202, description = "Update started"),
        (status = 400, description = "Missing or malformed URL", body = ApiError),
        (status = 409, description = "An update is running or awaiting acknowledgement", body = ApiError),
        (status = 500, description = "Worker could not be started", body = ApiError)
    )
)]
pub async fn trigger_update(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TriggerRequest>,
) -> Result<StatusCode, AppError> {
    let url = req.url.clone();
    let orchestrator = Arc::clone(&state.orchestrator);

    // May start the worker, which waits for it to come up.
    tokio::task::spawn_blocking(move || orchestrator.trigger(update_request(req)))
        .await
        .map_err(|e| AppError::internal(format!("trigger task failed: {e}")))??;

    info!(url = %url, "update accepted");
    Ok(StatusCode::ACCEPTED)
}

/// Cancel the update in flight
///
/// # Errors
/// Returns `AppError` if no update is running or an abort is already pending
#[utoipa::path(
    post,
    path = "/api/v1/ota/abort",
    tag = "ota",
    responses(
        (status = 202, description = "Abort requested"),
        (status = 409, description = "Nothing to abort", body = ApiError)
    )
)]
pub async fn abort_update(State(state): State<Arc<AppState>>) -> Result<StatusCode, AppError> {
    state.orchestrator.abort()?;
    Ok(StatusCode::ACCEPTED)
}

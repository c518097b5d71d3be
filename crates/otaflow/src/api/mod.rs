//! API route handlers

pub mod error;
pub mod ota;
pub mod system;

use otaflow_api::requests::TriggerRequest;
use otaflow_api::responses::{ApiError, HealthResponse, ImageInfo, OtaStatus, StatusResponse};
use utoipa::OpenApi;

/// OpenAPI document for the daemon
#[derive(OpenApi)]
#[openapi(
    info(title = "otaflow", description = "Firmware update daemon"),
    paths(system::health, ota::get_status, ota::trigger_update, ota::abort_update),
    components(schemas(
        TriggerRequest,
        StatusResponse,
        OtaStatus,
        ImageInfo,
        HealthResponse,
        ApiError
    )),
    tags(
        (name = "system", description = "Daemon health"),
        (name = "ota", description = "Firmware updates")
    )
)]
pub struct ApiDoc;

//! API error types

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use otaflow_api::responses::ApiError;
use otaflow_core::OtaError;

/// Wrapper for API errors with status codes
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub error: ApiError,
}

impl AppError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: ApiError::new("INTERNAL_ERROR", message),
        }
    }
}

impl From<OtaError> for AppError {
    fn from(err: OtaError) -> Self {
        let (status, code) = match &err {
            OtaError::AlreadyRunning => (StatusCode::CONFLICT, "ALREADY_RUNNING"),
            OtaError::NotRunning => (StatusCode::CONFLICT, "NOT_RUNNING"),
            OtaError::EndAlreadyPending => (StatusCode::CONFLICT, "END_PENDING"),
            OtaError::AbortAlreadyRequested => (StatusCode::CONFLICT, "ABORT_PENDING"),
            OtaError::NothingRunning => (StatusCode::CONFLICT, "NOTHING_RUNNING"),
            OtaError::NotFullyFinished => (StatusCode::CONFLICT, "NOT_FULLY_FINISHED"),
            OtaError::EmptyUrl => (StatusCode::BAD_REQUEST, "EMPTY_URL"),
            OtaError::InvalidUrl(_) => (StatusCode::BAD_REQUEST, "INVALID_URL"),
            OtaError::SpawnFailed(_) => (StatusCode::INTERNAL_SERVER_ERROR, "SPAWN_FAILED"),
        };
        Self {
            status,
            error: ApiError::new(code, err.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(self.error)).into_response()
    }
}

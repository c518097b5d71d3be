//! Response types for the API

use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    /// Daemon version
    pub version: String,
}

/// Update status as reported over the API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OtaStatus {
    Idle,
    Updating,
    Verifying,
    Succeeded,
    Failed,
    NotReady,
}

impl OtaStatus {
    /// Attempt is still running
    pub fn is_busy(self) -> bool {
        matches!(self, OtaStatus::Updating | OtaStatus::Verifying)
    }
}

impl fmt::Display for OtaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OtaStatus::Idle => "idle",
            OtaStatus::Updating => "updating",
            OtaStatus::Verifying => "verifying",
            OtaStatus::Succeeded => "succeeded",
            OtaStatus::Failed => "failed",
            OtaStatus::NotReady => "not_ready",
        };
        f.write_str(s)
    }
}

/// Metadata of the firmware image being installed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ImageInfo {
    pub project_name: String,
    pub version: String,
    pub secure_version: u32,
    pub compile_date: String,
    pub compile_time: String,
    pub sdk_version: String,
    /// Hex-encoded SHA-256 of the ELF file
    pub elf_sha256: String,
}

/// Current update state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct StatusResponse {
    pub status: OtaStatus,
    /// Bytes transferred in the current or last attempt
    pub progress: u64,
    /// Image size, when the server announced one
    pub total_size: Option<u64>,
    /// Progress percentage, when the size is known
    pub percent: Option<f32>,
    /// Last error; empty after success
    pub message: String,
    pub image: Option<ImageInfo>,
}

/// Error body returned by every failing endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Machine-readable error code
    pub code: String,
    /// Human-readable message
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

//! Request types for the API

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Start a firmware update from `url`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TriggerRequest {
    /// Firmware image URL
    pub url: String,
    /// CA certificate (PEM) to verify the server with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert_pem: Option<String>,
    /// Also trust the system certificate store
    #[serde(default)]
    pub use_global_trust_store: bool,
    /// Client private key (PEM) for mutual TLS
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_key_pem: Option<String>,
    /// Client certificate (PEM) for mutual TLS
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_cert_pem: Option<String>,
}

impl TriggerRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

//! Mapping of client errors onto `TransportError`

use otaflow_core::TransportError;

/// Classify a reqwest error
pub(crate) fn request_error(err: &reqwest::Error) -> TransportError {
    if let Some(status) = err.status() {
        return TransportError::Http {
            status: status.as_u16(),
            message: err.to_string(),
        };
    }
    if err.is_connect() || err.is_timeout() {
        return TransportError::Connection(err.to_string());
    }
    if err.is_builder() {
        return TransportError::InvalidRequest(err.to_string());
    }
    TransportError::Other(err.to_string())
}

/// Classify an I/O error raised while reading the response body
pub(crate) fn body_error(err: &std::io::Error) -> TransportError {
    TransportError::Connection(format!("reading image: {err}"))
}

//! Core error types for otaflow-core

use thiserror::Error;

/// Usage errors returned synchronously by the orchestrator
///
/// None of these affect an attempt that is already in flight; attempt
/// failures are reported through `status()` and `message()` instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OtaError {
    /// Worker already running, or an update is already in flight
    #[error("ota already running")]
    AlreadyRunning,

    /// Worker thread is not running
    #[error("ota worker not running")]
    NotRunning,

    /// Another end request is already pending
    #[error("another end request is already pending")]
    EndAlreadyPending,

    /// An abort has already been requested for this attempt
    #[error("an abort has already been requested")]
    AbortAlreadyRequested,

    /// No attempt is running that could be aborted
    #[error("no ota job is running")]
    NothingRunning,

    /// Previous attempt has not been acknowledged by the ticker yet
    #[error("ota not fully finished, try again")]
    NotFullyFinished,

    /// Request URL is empty
    #[error("empty firmware url")]
    EmptyUrl,

    /// Request URL failed syntax validation
    #[error("could not verify firmware url: {0}")]
    InvalidUrl(String),

    /// Worker thread could not be created
    #[error("failed creating ota worker: {0}")]
    SpawnFailed(String),
}

/// Failure reported by a firmware transport
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Could not reach the server or negotiate TLS
    #[error("connection failed: {0}")]
    Connection(String),

    /// Server answered with an error status
    #[error("server returned {status}: {message}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Response body or reason phrase
        message: String,
    },

    /// Local I/O failed while staging the image
    #[error("I/O error: {0}")]
    Io(String),

    /// Image did not pass verification
    #[error("image verification failed: {0}")]
    Verification(String),

    /// Image metadata could not be read
    #[error("no image descriptor: {0}")]
    NoDescriptor(String),

    /// Request is not usable by this transport
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Anything else
    #[error("{0}")]
    Other(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::Io(err.to_string())
    }
}

//! Collaborators the orchestrator drives but does not implement

use crate::error::TransportError;
use crate::request::{ImageDescriptor, UpdateRequest};

/// Result of a single transfer step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// More data to come; carries bytes read so far
    InProgress(u64),
    /// Whole image transferred
    Done,
    /// Transfer failed
    Error(TransportError),
}

/// Opens firmware downloads
pub trait FirmwareTransport: Send + Sync {
    /// Connect and prepare to receive the image described by `request`
    fn begin(&self, request: &UpdateRequest) -> Result<Box<dyn FirmwareSession>, TransportError>;
}

/// One open firmware download
///
/// Dropping a session without calling `finish` discards the partial image.
pub trait FirmwareSession: Send {
    /// Metadata of the remote image
    fn image_descriptor(&mut self) -> Result<ImageDescriptor, TransportError>;

    /// Total image size, if the server announced it
    fn total_size(&self) -> Option<u64>;

    /// Transfer the next chunk
    fn step(&mut self) -> StepOutcome;

    /// Bytes received so far
    fn bytes_read(&self) -> u64;

    /// Verify and install the transferred image
    fn finish(self: Box<Self>) -> Result<(), TransportError>;
}

/// Restarts the device or process
pub trait ProcessControl: Send + Sync {
    /// Restart now
    ///
    /// Production implementations do not return.
    fn restart(&self);
}

/// Checks firmware URL syntax before a trigger is accepted
pub trait UrlValidator: Send + Sync {
    fn validate(&self, url: &str) -> Result<(), String>;
}

//! otaflow-core: firmware update orchestration
//!
//! Implements the `Orchestrator`, which runs update attempts on a dedicated
//! worker thread and publishes their progress through an atomic flag
//! register. Transports, process restart and URL validation are pluggable
//! through the traits in [`traits`].

pub mod config;
pub mod error;
pub mod flags;
pub mod orchestrator;
pub mod request;
pub mod session;
pub mod state;
pub mod traits;
pub mod validate;

pub use config::OrchestratorConfig;
pub use error::{OtaError, TransportError};
pub use flags::{FlagRegister, Flags};
pub use orchestrator::{Orchestrator, OrchestratorArgs};
pub use request::{ImageDescriptor, UpdateRequest};
pub use session::UpdateSession;
pub use state::{
    ABORT_MESSAGE, AttemptOutcome, DROPPED_MESSAGE, Stage, TickOutcome, UpdateStatus,
};
pub use traits::{FirmwareSession, FirmwareTransport, ProcessControl, StepOutcome, UrlValidator};
pub use validate::UrlSyntaxValidator;

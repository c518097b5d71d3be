//! otaflow-transport: Firmware transports and process control
//!
//! Provides the HTTP(S) download transport, the on-disk firmware slot the
//! image is staged into, and the process restart used after an update.

pub mod descriptor;
mod error;
pub mod http;
pub mod restart;
pub mod slot;

pub use descriptor::parse_app_descriptor;
pub use http::{HttpTransport, HttpTransportConfig};
pub use restart::{ProcessRestart, RestartMode};
pub use slot::{FirmwareSlot, StagedImage};

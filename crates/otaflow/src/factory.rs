//! Builds the orchestrator and its collaborators from configuration

use std::sync::Arc;

use eyre::{Result, WrapErr};
use otaflow_core::{Orchestrator, OrchestratorArgs};
use otaflow_transport::{FirmwareSlot, HttpTransport, ProcessRestart};
use tracing::info;

use crate::config::Config;

/// Create an orchestrator downloading over HTTP into the configured slot
///
/// # Errors
/// Returns error if the slot directory cannot be created
pub fn build_orchestrator(config: &Config) -> Result<Orchestrator> {
    let slot = FirmwareSlot::open(&config.slot.dir)
        .wrap_err_with(|| format!("opening firmware slot {}", config.slot.dir.display()))?;
    info!(slot = %slot.dir().display(), "firmware slot ready");

    let transport = HttpTransport::new(config.transport.clone(), slot);
    let process = ProcessRestart::new(config.restart.mode, config.restart.exit_code);

    let args = OrchestratorArgs::new(Arc::new(transport), Arc::new(process))
        .with_config(config.ota.orchestrator.clone());
    Ok(Orchestrator::new(args))
}

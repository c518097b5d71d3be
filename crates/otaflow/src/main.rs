//! otaflow daemon
//!
//! Serves the firmware update API over axum and drives the update
//! orchestrator's status ticker.

use std::sync::Arc;

use color_eyre::Result;
use eyre::WrapErr;
use otaflow_core::Orchestrator;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

mod api;
mod config;
mod factory;
mod logging;
mod router;
mod state;

use crate::config::Config;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let config = Config::load_default()?;
    logging::init_logging(&config.daemon.log_level, config.daemon.json_logs);
    info!(version = env!("CARGO_PKG_VERSION"), "otaflow daemon starting");

    let orchestrator = Arc::new(factory::build_orchestrator(&config)?);
    {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::task::spawn_blocking(move || orchestrator.start_worker()).await??;
    }

    let ticker = tokio::spawn(run_ticker(
        Arc::clone(&orchestrator),
        config.ota.tick_interval(),
    ));

    let app = router::create_router(Arc::new(AppState::new(Arc::clone(&orchestrator))));
    let listener = tokio::net::TcpListener::bind(&config.daemon.bind)
        .await
        .wrap_err_with(|| format!("binding {}", config.daemon.bind))?;
    info!(address = %config.daemon.bind, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    ticker.abort();
    info!("shutting down update worker");
    tokio::task::spawn_blocking(move || orchestrator.end_worker()).await??;

    Ok(())
}

/// Call `tick` at a fixed interval
async fn run_ticker(orchestrator: Arc<Orchestrator>, every: std::time::Duration) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        interval.tick().await;
        orchestrator.tick();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

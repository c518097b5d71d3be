//! `Orchestrator`: background firmware update coordination
//!
//! Owns the flag register and session data, runs one worker thread that
//! drives a `FirmwareTransport`, and exposes non-blocking status accessors to
//! any number of caller threads.

mod ticker;
mod worker;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info, warn};

use crate::config::OrchestratorConfig;
use crate::error::OtaError;
use crate::flags::{FlagRegister, Flags};
use crate::request::{ImageDescriptor, UpdateRequest};
use crate::session::UpdateSession;
use crate::state::UpdateStatus;
use crate::traits::{FirmwareTransport, ProcessControl, UrlValidator};
use crate::validate::UrlSyntaxValidator;

use self::ticker::TickerState;

/// Arguments for building an `Orchestrator`
pub struct OrchestratorArgs {
    /// Worker and ticker settings
    pub config: OrchestratorConfig,
    /// Firmware download implementation
    pub transport: Arc<dyn FirmwareTransport>,
    /// Restart implementation used after a successful update
    pub process: Arc<dyn ProcessControl>,
    /// URL syntax check applied on trigger
    pub validator: Arc<dyn UrlValidator>,
}

impl OrchestratorArgs {
    /// Default config and URL validator with the given collaborators
    pub fn new(transport: Arc<dyn FirmwareTransport>, process: Arc<dyn ProcessControl>) -> Self {
        Self {
            config: OrchestratorConfig::default(),
            transport,
            process,
            validator: Arc::new(UrlSyntaxValidator),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_validator(mut self, validator: Arc<dyn UrlValidator>) -> Self {
        self.validator = validator;
        self
    }
}

/// State shared with the worker thread
struct Shared {
    config: OrchestratorConfig,
    flags: FlagRegister,
    session: UpdateSession,
    /// Published before `START_REQUESTED` is set, read by the worker after
    request: Mutex<Option<Arc<UpdateRequest>>>,
    transport: Arc<dyn FirmwareTransport>,
}

impl Shared {
    fn pending_request(&self) -> MutexGuard<'_, Option<Arc<UpdateRequest>>> {
        self.request.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Asynchronous firmware update orchestrator
pub struct Orchestrator {
    shared: Arc<Shared>,
    process: Arc<dyn ProcessControl>,
    validator: Arc<dyn UrlValidator>,
    worker: Mutex<Option<JoinHandle<()>>>,
    ticker: Mutex<TickerState>,
}

impl Orchestrator {
    /// Create an orchestrator; the worker is started lazily by `trigger`
    /// or explicitly by `start_worker`
    pub fn new(args: OrchestratorArgs) -> Self {
        Self {
            shared: Arc::new(Shared {
                config: args.config,
                flags: FlagRegister::new(),
                session: UpdateSession::default(),
                request: Mutex::new(None),
                transport: args.transport,
            }),
            process: args.process,
            validator: args.validator,
            worker: Mutex::new(None),
            ticker: Mutex::new(TickerState::default()),
        }
    }

    /// Orchestrator settings
    pub fn config(&self) -> &OrchestratorConfig {
        &self.shared.config
    }

    /// Spawn the worker thread and wait until it accepts triggers
    ///
    /// # Errors
    /// `AlreadyRunning` if a worker exists, `SpawnFailed` if the thread
    /// could not be created.
    pub fn start_worker(&self) -> Result<(), OtaError> {
        let config = &self.shared.config;
        let mut worker = self.worker_handle();

        if let Some(handle) = worker.take_if(|h| h.is_finished()) {
            reap(handle, &config.worker_name);
        }
        if worker.is_some() {
            warn!(worker = %config.worker_name, "ota worker thread already exists");
            return Err(OtaError::AlreadyRunning);
        }
        if self.shared.flags.snapshot().contains(Flags::WORKER_RUNNING) {
            warn!(worker = %config.worker_name, "ota worker already running");
            return Err(OtaError::AlreadyRunning);
        }

        self.shared.flags.clear(Flags::all());

        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name(config.worker_name.clone())
            .stack_size(config.stack_size)
            .spawn(move || worker::run(&shared))
            .map_err(|e| {
                error!(worker = %config.worker_name, error = %e, "failed creating ota worker");
                OtaError::SpawnFailed(e.to_string())
            })?;
        *worker = Some(handle);
        drop(worker);

        debug!(worker = %config.worker_name, "created ota worker");

        let bits = self.shared.flags.wait_any(
            Flags::WORKER_RUNNING,
            false,
            Some(config.startup_timeout()),
        );
        if !bits.contains(Flags::WORKER_RUNNING) {
            warn!(worker = %config.worker_name, "WORKER_RUNNING not yet set...");
            self.shared.flags.wait_any(Flags::WORKER_RUNNING, false, None);
        }

        Ok(())
    }

    /// Ask the worker to exit and wait until it has
    ///
    /// Only completes between attempts, so this blocks for the remainder of
    /// an attempt in flight. Succeeds without doing anything if no worker is
    /// running.
    ///
    /// # Errors
    /// `EndAlreadyPending` if another end request is outstanding.
    pub fn end_worker(&self) -> Result<(), OtaError> {
        let config = &self.shared.config;

        match self.shared.flags.set_if(
            Flags::WORKER_RUNNING,
            Flags::END_REQUESTED,
            Flags::END_REQUESTED,
        ) {
            Ok(_) => {}
            Err(bits) if !bits.contains(Flags::WORKER_RUNNING) => {
                self.reap_finished_worker();
                return Ok(());
            }
            Err(_) => {
                error!(worker = %config.worker_name, "another end request is already pending");
                return Err(OtaError::EndAlreadyPending);
            }
        }

        let bits = self.shared.flags.wait_any(
            Flags::WORKER_ENDED,
            true,
            Some(config.startup_timeout()),
        );
        if !bits.contains(Flags::WORKER_ENDED) {
            warn!(worker = %config.worker_name, "WORKER_ENDED not yet set...");
            self.shared.flags.wait_any(Flags::WORKER_ENDED, true, None);
        }

        if let Some(handle) = self.worker_handle().take() {
            reap(handle, &config.worker_name);
        }
        debug!(worker = %config.worker_name, "ota worker ended");

        Ok(())
    }

    /// Publish `request` and wake the worker
    ///
    /// Starts the worker first if none is running. Never blocks on network
    /// activity.
    ///
    /// # Errors
    /// `NotRunning`, `AlreadyRunning`, `NotFullyFinished`, `EmptyUrl` or
    /// `InvalidUrl`; see the variants.
    pub fn trigger(&self, request: UpdateRequest) -> Result<(), OtaError> {
        if !self.shared.flags.snapshot().contains(Flags::WORKER_RUNNING) {
            match self.start_worker() {
                Ok(()) | Err(OtaError::AlreadyRunning) => {}
                Err(e) => return Err(e),
            }
        }

        // Held until START_REQUESTED is set so concurrent triggers are
        // serialized.
        let mut pending = self.shared.pending_request();

        if let Some(err) = trigger_conflict(self.shared.flags.snapshot()) {
            return Err(err);
        }

        if request.url.is_empty() {
            return Err(OtaError::EmptyUrl);
        }
        self.validator
            .validate(&request.url)
            .map_err(OtaError::InvalidUrl)?;

        let url = request.url.clone();
        *pending = Some(Arc::new(request));

        self.shared
            .flags
            .set_if(
                Flags::WORKER_RUNNING,
                Flags::IN_FLIGHT | Flags::REQUEST_FINISHED | Flags::END_REQUESTED,
                Flags::START_REQUESTED,
            )
            .map_err(|bits| trigger_conflict(bits).unwrap_or(OtaError::NotRunning))?;

        info!(url = %url, "ota update triggered");
        Ok(())
    }

    /// Ask the attempt in flight to cancel at its next polling point
    ///
    /// # Errors
    /// `NothingRunning` without an attempt, `AbortAlreadyRequested` if an
    /// abort is already pending.
    pub fn abort(&self) -> Result<(), OtaError> {
        match self.shared.flags.set_if(
            Flags::IN_FLIGHT,
            Flags::ABORT_REQUESTED,
            Flags::ABORT_REQUESTED,
        ) {
            Ok(_) => {
                info!("ota update abort requested");
                Ok(())
            }
            Err(bits) if !bits.intersects(Flags::IN_FLIGHT) => Err(OtaError::NothingRunning),
            Err(_) => Err(OtaError::AbortAlreadyRequested),
        }
    }

    /// Current status, derived from a single flag snapshot
    pub fn status(&self) -> UpdateStatus {
        UpdateStatus::from_flags(self.shared.flags.snapshot())
    }

    /// Raw flag snapshot
    pub fn flags(&self) -> Flags {
        self.shared.flags.snapshot()
    }

    /// Bytes transferred in the current or last attempt
    pub fn progress(&self) -> u64 {
        self.shared.session.progress()
    }

    /// Image size reported by the transport
    pub fn total_size(&self) -> Option<u64> {
        self.shared.session.total_size()
    }

    /// Progress percentage when the total size is known
    pub fn percent(&self) -> Option<f32> {
        self.shared.session.percent()
    }

    /// Last error, empty after success
    pub fn message(&self) -> String {
        self.shared.session.message()
    }

    /// Metadata of the image being (or last) installed
    pub fn image_descriptor(&self) -> Option<ImageDescriptor> {
        self.shared.session.image_descriptor()
    }

    fn worker_handle(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reap_finished_worker(&self) {
        let finished = self.worker_handle().take_if(|h| h.is_finished());
        if let Some(handle) = finished {
            reap(handle, &self.shared.config.worker_name);
        }
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        if let Err(e) = self.end_worker() {
            error!(error = %e, "failed to end ota worker");
        }
    }
}

/// Usage error that prevents a trigger in the state `bits`
fn trigger_conflict(bits: Flags) -> Option<OtaError> {
    if !bits.contains(Flags::WORKER_RUNNING) || bits.contains(Flags::END_REQUESTED) {
        Some(OtaError::NotRunning)
    } else if bits.intersects(Flags::IN_FLIGHT) {
        Some(OtaError::AlreadyRunning)
    } else if bits.contains(Flags::REQUEST_FINISHED) {
        Some(OtaError::NotFullyFinished)
    } else {
        None
    }
}

fn reap(handle: JoinHandle<()>, name: &str) {
    if handle.join().is_err() {
        error!(worker = %name, "ota worker panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_conflict_order() {
        let w = Flags::WORKER_RUNNING;

        assert_eq!(trigger_conflict(Flags::empty()), Some(OtaError::NotRunning));
        assert_eq!(
            trigger_conflict(w | Flags::END_REQUESTED),
            Some(OtaError::NotRunning)
        );
        assert_eq!(
            trigger_conflict(w | Flags::START_REQUESTED | Flags::REQUEST_FINISHED),
            Some(OtaError::AlreadyRunning)
        );
        assert_eq!(
            trigger_conflict(w | Flags::REQUEST_FINISHED | Flags::REQUEST_SUCCEEDED),
            Some(OtaError::NotFullyFinished)
        );
        assert_eq!(trigger_conflict(w), None);
    }
}

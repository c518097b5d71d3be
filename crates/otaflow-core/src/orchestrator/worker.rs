//! Worker thread: waits for triggers and runs one attempt at a time

use std::sync::Arc;
use std::thread;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::flags::Flags;
use crate::request::UpdateRequest;
use crate::state::{AttemptOutcome, DROPPED_MESSAGE, Stage};
use crate::traits::{FirmwareSession, StepOutcome};

use super::Shared;

/// Attempt state machine, advanced until `Finished`
enum Phase {
    Connecting(Arc<UpdateRequest>),
    Transferring(Box<dyn FirmwareSession>),
    Verifying(Box<dyn FirmwareSession>),
    Finished(AttemptOutcome),
}

/// Worker thread body
pub(super) fn run(shared: &Shared) {
    let _exit = ExitGuard(shared);
    shared.flags.set(Flags::WORKER_RUNNING);
    info!(worker = %shared.config.worker_name, "ota worker running");

    loop {
        let bits = shared.flags.wait_any(
            Flags::START_REQUESTED | Flags::END_REQUESTED,
            false,
            None,
        );
        if bits.contains(Flags::END_REQUESTED) {
            if bits.contains(Flags::START_REQUESTED) {
                warn!("end requested, dropping pending trigger");
                shared.session.set_message(DROPPED_MESSAGE);
            }
            break;
        }

        let prev = shared
            .flags
            .transition(Flags::START_REQUESTED, Flags::REQUEST_RUNNING);
        if !prev.contains(Flags::START_REQUESTED) {
            continue;
        }
        debug_assert!(!prev.intersects(
            Flags::REQUEST_RUNNING
                | Flags::VERIFYING
                | Flags::REQUEST_FINISHED
                | Flags::REQUEST_SUCCEEDED
        ));

        shared.session.begin_attempt();
        let mut attempt = AttemptGuard::new(shared);

        let request = shared.pending_request().clone();
        let outcome = match request {
            Some(request) => run_attempt(shared, request),
            None => AttemptOutcome::Failed {
                stage: Stage::Begin,
                cause: "no request published".to_string(),
            },
        };
        attempt.finalize(&outcome);
    }

    info!(worker = %shared.config.worker_name, "ota worker exiting");
}

fn run_attempt(shared: &Shared, request: Arc<UpdateRequest>) -> AttemptOutcome {
    let mut phase = Phase::Connecting(request);
    loop {
        phase = match phase {
            Phase::Connecting(request) => connect(shared, &request),
            Phase::Transferring(session) => transfer(shared, session),
            Phase::Verifying(session) => verify(shared, session),
            Phase::Finished(outcome) => return outcome,
        };
    }
}

fn connect(shared: &Shared, request: &UpdateRequest) -> Phase {
    info!(url = %request.url, "ota begin...");
    let mut session = match shared.transport.begin(request) {
        Ok(session) => session,
        Err(e) => {
            error!(url = %request.url, error = %e, "ota begin failed");
            return Phase::Finished(AttemptOutcome::Failed {
                stage: Stage::Begin,
                cause: e.to_string(),
            });
        }
    };

    match session.image_descriptor() {
        Ok(descriptor) => {
            info!(
                project = %descriptor.project_name,
                version = %descriptor.version,
                "remote image descriptor"
            );
            shared.session.set_image_descriptor(Some(descriptor));
        }
        Err(e) => {
            warn!(error = %e, "could not read image descriptor");
            shared.session.set_image_descriptor(None);
        }
    }

    let total = session.total_size().filter(|size| *size > 0);
    match total {
        Some(size) => info!(total_size = size, "image size"),
        None => warn!("image size unknown"),
    }
    shared.session.set_total_size(total);

    Phase::Transferring(session)
}

fn transfer(shared: &Shared, mut session: Box<dyn FirmwareSession>) -> Phase {
    info!("ota transfer...");
    let yield_every = shared.config.yield_interval();
    let mut last_yield = Instant::now();

    loop {
        match session.step() {
            StepOutcome::InProgress(bytes) => {
                shared.session.record_progress(bytes);

                if last_yield.elapsed() >= yield_every {
                    last_yield = Instant::now();
                    thread::yield_now();
                }

                let prev = shared.flags.clear(Flags::ABORT_REQUESTED);
                if prev.contains(Flags::ABORT_REQUESTED) {
                    warn!(progress = shared.session.progress(), "abort request received");
                    return Phase::Finished(AttemptOutcome::Aborted);
                }
            }
            StepOutcome::Done => {
                shared.session.record_progress(session.bytes_read());
                info!(bytes = session.bytes_read(), "ota transfer done");
                return Phase::Verifying(session);
            }
            StepOutcome::Error(e) => {
                error!(error = %e, progress = shared.session.progress(), "ota transfer failed");
                return Phase::Finished(AttemptOutcome::Failed {
                    stage: Stage::Transfer,
                    cause: e.to_string(),
                });
            }
        }
    }
}

fn verify(shared: &Shared, session: Box<dyn FirmwareSession>) -> Phase {
    shared.flags.set(Flags::VERIFYING);
    info!("ota finish...");

    match session.finish() {
        Ok(()) => {
            info!("ota finish succeeded");
            Phase::Finished(AttemptOutcome::Succeeded)
        }
        Err(e) => {
            error!(error = %e, "ota finish failed");
            Phase::Finished(AttemptOutcome::Failed {
                stage: Stage::Finish,
                cause: e.to_string(),
            })
        }
    }
}

/// Publishes the outcome of an attempt, including one cut short by a panic
struct AttemptGuard<'a> {
    shared: &'a Shared,
    finalized: bool,
}

impl<'a> AttemptGuard<'a> {
    fn new(shared: &'a Shared) -> Self {
        Self {
            shared,
            finalized: false,
        }
    }

    fn finalize(&mut self, outcome: &AttemptOutcome) {
        self.finalized = true;

        let session = &self.shared.session;
        match outcome {
            AttemptOutcome::Succeeded => session.clear_message(),
            other => session.set_message(other.message(Utc::now().timestamp_millis())),
        }

        // Message is in place before REQUEST_FINISHED becomes visible.
        self.shared.flags.transition(
            Flags::REQUEST_RUNNING | Flags::VERIFYING | Flags::ABORT_REQUESTED,
            outcome.terminal_flags(),
        );

        info!(
            succeeded = matches!(outcome, AttemptOutcome::Succeeded),
            progress = session.progress(),
            "ota attempt finished"
        );
    }
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        if !self.finalized {
            self.finalize(&AttemptOutcome::Failed {
                stage: Stage::Transfer,
                cause: "worker panicked".to_string(),
            });
        }
    }
}

/// Marks the worker as gone however the thread exits
///
/// Requests nobody will serve are wiped in the same transition.
struct ExitGuard<'a>(&'a Shared);

impl Drop for ExitGuard<'_> {
    fn drop(&mut self) {
        self.0.flags.transition(
            Flags::WORKER_RUNNING
                | Flags::END_REQUESTED
                | Flags::START_REQUESTED
                | Flags::ABORT_REQUESTED,
            Flags::WORKER_ENDED,
        );
        debug!(worker = %self.0.config.worker_name, "ota worker ended");
    }
}

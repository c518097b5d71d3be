//! Status ticker, driven by the host's scheduling loop

use std::sync::PoisonError;
use std::time::Instant;

use tracing::{info, warn};

use crate::flags::Flags;
use crate::state::TickOutcome;

use super::Orchestrator;

/// Timestamps owned by the ticker
#[derive(Debug, Default)]
pub(super) struct TickerState {
    /// When the finished state was first observed
    finished_at: Option<Instant>,
    /// Last progress log line
    last_progress_log_at: Option<Instant>,
}

impl Orchestrator {
    /// Log progress and acknowledge finished attempts
    ///
    /// Call periodically from the host's own loop. Once a finished attempt
    /// has been visible for longer than the grace period, a successful one
    /// restarts the process and a failed one is cleared so that the next
    /// `trigger` is accepted.
    pub fn tick(&self) -> TickOutcome {
        let bits = self.shared.flags.snapshot();
        let config = &self.shared.config;
        let session = &self.shared.session;
        let mut state = self
            .ticker
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if !bits.contains(Flags::REQUEST_FINISHED) {
            state.finished_at = None;
        }

        if bits.intersects(Flags::IN_FLIGHT) {
            let due = state
                .last_progress_log_at
                .is_none_or(|at| at.elapsed() >= config.progress_log_interval());
            if !due {
                return TickOutcome::InProgress { logged: false };
            }
            state.last_progress_log_at = Some(Instant::now());

            if bits.contains(Flags::VERIFYING) {
                info!("ota verifying");
            } else if let (Some(total), Some(percent)) = (session.total_size(), session.percent()) {
                info!(
                    progress = session.progress(),
                    total_size = total,
                    "ota progress {} of {} ({percent:.2}%)",
                    session.progress(),
                    total
                );
            } else {
                info!(progress = session.progress(), "ota progress {} of unknown", session.progress());
            }
            return TickOutcome::InProgress { logged: true };
        }

        if !bits.contains(Flags::REQUEST_FINISHED) {
            return TickOutcome::Idle;
        }

        let Some(finished_at) = state.finished_at else {
            state.finished_at = Some(Instant::now());
            state.last_progress_log_at = None;
            match (session.total_size(), session.percent()) {
                (Some(total), Some(percent)) => info!(
                    message = %session.message(),
                    "ota finished {} of {} ({percent:.2}%)",
                    session.progress(),
                    total
                ),
                _ => info!(
                    message = %session.message(),
                    "ota finished {} of unknown",
                    session.progress()
                ),
            }
            return TickOutcome::Finished;
        };

        if finished_at.elapsed() <= config.grace_period() {
            return TickOutcome::AwaitingGrace;
        }
        state.finished_at = None;
        drop(state);

        let succeeded = bits.contains(Flags::REQUEST_SUCCEEDED);
        if succeeded {
            info!("ota succeeded, restarting");
            self.process.restart();
            warn!("process control returned from restart");
        }

        // Triggers stay rejected until REQUEST_FINISHED is cleared.
        self.shared.session.set_image_descriptor(None);
        self.shared
            .flags
            .clear(Flags::REQUEST_FINISHED | Flags::REQUEST_SUCCEEDED);

        if succeeded {
            TickOutcome::Restarting
        } else {
            info!("ota failure acknowledged, ready for next trigger");
            TickOutcome::Reset
        }
    }
}

//! Status and attempt state types

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::flags::Flags;

/// Externally visible status of the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStatus {
    Idle,
    Updating,
    Verifying,
    Succeeded,
    Failed,
    /// No orchestrator is available to ask
    NotReady,
}

impl UpdateStatus {
    /// Derive the status from a single flag snapshot
    #[must_use]
    pub fn from_flags(flags: Flags) -> Self {
        if !flags.contains(Flags::WORKER_RUNNING) {
            UpdateStatus::Idle
        } else if flags.contains(Flags::VERIFYING) {
            UpdateStatus::Verifying
        } else if flags.intersects(Flags::IN_FLIGHT) {
            UpdateStatus::Updating
        } else if flags.contains(Flags::REQUEST_FINISHED) {
            if flags.contains(Flags::REQUEST_SUCCEEDED) {
                UpdateStatus::Succeeded
            } else {
                UpdateStatus::Failed
            }
        } else {
            UpdateStatus::Idle
        }
    }

    /// Attempt is in flight
    #[must_use]
    pub fn is_busy(self) -> bool {
        matches!(self, UpdateStatus::Updating | UpdateStatus::Verifying)
    }

    /// Attempt has concluded and awaits acknowledgement
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, UpdateStatus::Succeeded | UpdateStatus::Failed)
    }
}

impl fmt::Display for UpdateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UpdateStatus::Idle => "idle",
            UpdateStatus::Updating => "updating",
            UpdateStatus::Verifying => "verifying",
            UpdateStatus::Succeeded => "succeeded",
            UpdateStatus::Failed => "failed",
            UpdateStatus::NotReady => "not_ready",
        };
        f.write_str(s)
    }
}

/// Transport call an attempt failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Begin,
    Transfer,
    Finish,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Begin => "begin",
            Stage::Transfer => "transfer",
            Stage::Finish => "finish",
        };
        f.write_str(s)
    }
}

/// How an attempt concluded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Succeeded,
    Failed {
        /// Call that failed
        stage: Stage,
        /// Transport's description of the failure
        cause: String,
    },
    /// Cancelled through `abort()`
    Aborted,
}

impl AttemptOutcome {
    /// Message published for this outcome, stamped with `at_ms`
    #[must_use]
    pub fn message(&self, at_ms: i64) -> String {
        match self {
            AttemptOutcome::Succeeded => String::new(),
            AttemptOutcome::Failed { stage, cause } => {
                format!("{stage} failed: {cause} (at {at_ms})")
            }
            AttemptOutcome::Aborted => ABORT_MESSAGE.to_string(),
        }
    }

    /// Flags set when the attempt is finalized
    #[must_use]
    pub fn terminal_flags(&self) -> Flags {
        match self {
            AttemptOutcome::Succeeded => Flags::REQUEST_FINISHED | Flags::REQUEST_SUCCEEDED,
            AttemptOutcome::Failed { .. } | AttemptOutcome::Aborted => Flags::REQUEST_FINISHED,
        }
    }
}

/// Message recorded when an attempt is cancelled
pub const ABORT_MESSAGE: &str = "Requested abort";

/// Message left by a trigger the worker ended before starting
pub const DROPPED_MESSAGE: &str = "update dropped: worker ended before it started";

/// What a call to `tick()` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing to report
    Idle,
    /// Attempt in flight; `logged` is false when throttled
    InProgress { logged: bool },
    /// First observation of a finished attempt
    Finished,
    /// Waiting for the grace period to elapse
    AwaitingGrace,
    /// Restart was requested from process control
    Restarting,
    /// Finished state was cleared; a new trigger is accepted
    Reset,
}

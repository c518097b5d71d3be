//! Orchestrator configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables for the orchestrator, its worker thread and the status ticker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Name given to the worker thread
    #[serde(default = "default_worker_name")]
    pub worker_name: String,
    /// Worker thread stack size in bytes
    #[serde(default = "default_stack_size")]
    pub stack_size: usize,
    /// Delay after a finished attempt is observed before restart or reset
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,
    /// Minimum time between two progress log lines
    #[serde(default = "default_progress_log_interval_ms")]
    pub progress_log_interval_ms: u64,
    /// Maximum time the transfer loop runs without yielding
    #[serde(default = "default_yield_interval_ms")]
    pub yield_interval_ms: u64,
    /// Bounded wait for worker start/end before warning and waiting on
    #[serde(default = "default_startup_timeout_ms")]
    pub startup_timeout_ms: u64,
}

fn default_worker_name() -> String {
    "ota-worker".to_string()
}

fn default_stack_size() -> usize {
    64 * 1024
}

fn default_grace_period_ms() -> u64 {
    5_000
}

fn default_progress_log_interval_ms() -> u64 {
    1_000
}

fn default_yield_interval_ms() -> u64 {
    1_000
}

fn default_startup_timeout_ms() -> u64 {
    1_000
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            worker_name: default_worker_name(),
            stack_size: default_stack_size(),
            grace_period_ms: default_grace_period_ms(),
            progress_log_interval_ms: default_progress_log_interval_ms(),
            yield_interval_ms: default_yield_interval_ms(),
            startup_timeout_ms: default_startup_timeout_ms(),
        }
    }
}

impl OrchestratorConfig {
    #[must_use]
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    #[must_use]
    pub fn progress_log_interval(&self) -> Duration {
        Duration::from_millis(self.progress_log_interval_ms)
    }

    /// Yield interval, capped at one second
    #[must_use]
    pub fn yield_interval(&self) -> Duration {
        Duration::from_millis(self.yield_interval_ms.min(1_000))
    }

    #[must_use]
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    /// Set the grace period
    #[must_use]
    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the worker thread name
    #[must_use]
    pub fn with_worker_name(mut self, name: impl Into<String>) -> Self {
        self.worker_name = name.into();
        self
    }
}

//! Process restart after a successful update

use std::process;

use otaflow_core::ProcessControl;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

/// How the process comes back after an update
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestartMode {
    /// Replace the running binary with a fresh copy of itself
    #[default]
    Exec,
    /// Exit and leave the restart to a supervisor
    Exit,
}

/// `ProcessControl` for a hosted daemon
#[derive(Debug, Clone)]
pub struct ProcessRestart {
    mode: RestartMode,
    exit_code: i32,
}

impl ProcessRestart {
    pub fn new(mode: RestartMode, exit_code: i32) -> Self {
        Self { mode, exit_code }
    }

    #[cfg(unix)]
    fn exec_self(&self) {
        use std::os::unix::process::CommandExt;

        let exe = match std::env::current_exe() {
            Ok(exe) => exe,
            Err(e) => {
                error!(error = %e, "cannot locate current executable");
                return;
            }
        };
        info!(exe = %exe.display(), "re-executing");
        // Only returns on failure.
        let err = process::Command::new(&exe).args(std::env::args_os().skip(1)).exec();
        error!(exe = %exe.display(), error = %err, "exec failed");
    }

    #[cfg(not(unix))]
    fn exec_self(&self) {
        error!("exec restart is not supported on this platform");
    }
}

impl ProcessControl for ProcessRestart {
    fn restart(&self) {
        if self.mode == RestartMode::Exec {
            self.exec_self();
        }
        info!(code = self.exit_code, "exiting for restart");
        process::exit(self.exit_code);
    }
}

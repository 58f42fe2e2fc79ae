//! Command dispatch.
//!
//! Each tick captures a dispatch window; commands falling due inside it are
//! marked run under the resolver lock and handed to the shell runner on a
//! fresh thread so a slow or hung command can never stall the tick loop.
//! Dispatch failures are logged and never retried.

use std::sync::Arc;
use std::thread;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::{info, warn};

use crate::schedule::ScheduleCommand;

/// Errors raised when handing a command to the shell runner.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The runner rejected or failed the command.
    #[error("command `{code}` failed: {reason}")]
    RunFailed {
        /// Command code that failed.
        code: String,
        /// Runner-provided failure description.
        reason: String,
    },
}

/// Shell-runner seam the dispatcher hands commands to.
pub trait CommandRunner: Send + Sync {
    /// Execute the command code.
    fn run(&self, code: &str) -> Result<(), DispatchError>;
}

/// Runner stub that logs and discards commands.
#[derive(Debug, Clone, Default)]
pub struct NoOpCommandRunner;

impl CommandRunner for NoOpCommandRunner {
    fn run(&self, code: &str) -> Result<(), DispatchError> {
        info!(code, "command discarded (no runner configured)");
        Ok(())
    }
}

/// Mark and collect the commands due in `[now, now + window]`.
///
/// Marking happens here, under the caller's lock, so a command is claimed
/// exactly once no matter how dispatch itself fares.
pub fn collect_due_commands(
    commands: &mut [ScheduleCommand],
    now: DateTime<Utc>,
    window: Duration,
) -> Vec<ScheduleCommand> {
    let mut due = Vec::new();
    for command in commands.iter_mut() {
        if command.is_due(now, window) {
            command.has_run = true;
            due.push(command.clone());
        }
    }
    due
}

/// Hand each due command to the runner on its own thread.
///
/// Spawn failures and runner errors are logged; the commands stay marked run
/// either way.
pub fn dispatch_commands(due: Vec<ScheduleCommand>, runner: Arc<dyn CommandRunner>) {
    for command in due {
        let runner = Arc::clone(&runner);
        let code = command.code.clone();
        let spawned = thread::Builder::new()
            .name(format!("command-{}", command.schedule_id))
            .spawn(move || {
                info!(code = %code, schedule_id = command.schedule_id, "dispatching command");
                if let Err(e) = runner.run(&code) {
                    warn!(error = %e, "command execution failed");
                }
            });

        if let Err(e) = spawned {
            warn!(code = %command.code, error = %e, "failed to spawn command thread");
        }
    }
}

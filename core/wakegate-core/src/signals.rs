//! Process signal handling.
//!
//! - Shutdown: SIGINT/SIGTERM set a process-wide flag that long-running loops
//!   poll; the handler itself does nothing else.
//! - Job control: the gate's task-switch policy on Unix ignores the signals a
//!   terminal turns escape keys into (SIGINT, SIGQUIT, SIGTSTP).

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Result, WakeGateError};
use crate::lockdown::TaskSwitchPolicy;

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

#[cfg(unix)]
extern "C" fn on_shutdown_signal(_signum: libc::c_int) {
    SHUTDOWN.store(true, Ordering::SeqCst);
}

/// Installs the SIGINT/SIGTERM handler. Safe to call more than once.
pub fn install_shutdown_handler() -> Result<()> {
    #[cfg(unix)]
    {
        for signum in [libc::SIGINT, libc::SIGTERM] {
            // SAFETY: the handler only stores to an atomic, which is
            // async-signal-safe.
            let previous = unsafe { libc::signal(signum, on_shutdown_signal as libc::sighandler_t) };
            if previous == libc::SIG_ERR {
                return Err(WakeGateError::Platform(format!(
                    "Failed to install handler for signal {}",
                    signum
                )));
            }
        }
    }
    Ok(())
}

pub fn shutdown_requested() -> bool {
    SHUTDOWN.load(Ordering::SeqCst)
}

/// Task-switch policy scoped to the current process's job-control signals.
#[derive(Debug, Default)]
pub struct JobControlPolicy;

#[cfg(unix)]
const JOB_CONTROL_SIGNALS: [libc::c_int; 3] = [libc::SIGINT, libc::SIGQUIT, libc::SIGTSTP];

impl TaskSwitchPolicy for JobControlPolicy {
    fn set_task_switching(&mut self, enabled: bool) -> Result<()> {
        #[cfg(unix)]
        {
            for signum in JOB_CONTROL_SIGNALS {
                let disposition = if enabled {
                    if signum == libc::SIGINT {
                        on_shutdown_signal as libc::sighandler_t
                    } else {
                        libc::SIG_DFL
                    }
                } else {
                    libc::SIG_IGN
                };
                // SAFETY: installs a standard disposition or the atomic-only
                // shutdown handler.
                let previous = unsafe { libc::signal(signum, disposition) };
                if previous == libc::SIG_ERR {
                    return Err(WakeGateError::Platform(format!(
                        "Failed to change disposition of signal {}",
                        signum
                    )));
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = enabled;
        }
        Ok(())
    }
}

/// Policy for settings that end with the process that made them: restoring
/// from another process only clears the record.
#[derive(Debug, Default)]
pub struct ProcessScopedPolicy;

impl TaskSwitchPolicy for ProcessScopedPolicy {
    fn set_task_switching(&mut self, _enabled: bool) -> Result<()> {
        Ok(())
    }
}

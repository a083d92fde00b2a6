//! Child-process supervision for the recorder and gate.
//!
//! The orchestrator only sees [`ProcessLauncher`] and [`ManagedProcess`], so
//! its state machine can be driven by fakes in tests. [`CommandLauncher`] is
//! the real implementation over `std::process`.

use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use sysinfo::{Pid, ProcessRefreshKind, ProcessStatus, System, UpdateKind};
use tracing::{debug, info, warn};
use wakegate_core::config::STATE_DIR_ENV;
use wakegate_core::{Result, WakeGateError};

const STOP_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitInfo {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
}

impl ExitInfo {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    AlreadyExited,
    Graceful,
    Forced,
}

/// A running child the daemon owns.
pub trait ManagedProcess: Send {
    fn pid(&self) -> u32;

    /// Non-blocking exit check.
    fn try_wait(&mut self) -> Result<Option<ExitInfo>>;

    /// Asks the process to exit (SIGTERM on Unix).
    fn request_stop(&mut self) -> Result<()>;

    /// Forced termination.
    fn kill(&mut self) -> Result<()>;

    /// Blocks until the process has exited and been reaped.
    fn wait(&mut self) -> Result<ExitInfo>;
}

pub trait ProcessLauncher {
    fn spawn_recorder(&mut self) -> Result<Box<dyn ManagedProcess>>;

    fn spawn_gate(&mut self) -> Result<Box<dyn ManagedProcess>>;
}

/// Requests a graceful stop, waits up to `timeout`, then kills. Returns only
/// once the process has been reaped.
pub fn stop_process(process: &mut dyn ManagedProcess, timeout: Duration) -> Result<StopOutcome> {
    let pid = process.pid();
    if process.try_wait()?.is_some() {
        return Ok(StopOutcome::AlreadyExited);
    }

    if let Err(err) = process.request_stop() {
        warn!(pid, error = %err, "Failed to request graceful stop");
    }

    let deadline = Instant::now() + timeout;
    loop {
        if let Some(exit) = process.try_wait()? {
            debug!(pid, code = ?exit.code, "Process exited after stop request");
            return Ok(StopOutcome::Graceful);
        }
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep(STOP_POLL_INTERVAL.min(deadline - now));
    }

    warn!(
        error = %WakeGateError::ProcessUnresponsive { pid },
        timeout_ms = timeout.as_millis() as u64,
        "Escalating to forced kill"
    );
    process.kill()?;
    process.wait()?;
    Ok(StopOutcome::Forced)
}

// ═══════════════════════════════════════════════════════════════════════════════
// std::process implementation
// ═══════════════════════════════════════════════════════════════════════════════

pub struct ChildProcess {
    label: &'static str,
    child: Child,
}

impl ChildProcess {
    fn exit_info(status: std::process::ExitStatus) -> ExitInfo {
        ExitInfo {
            code: status.code(),
        }
    }
}

impl ManagedProcess for ChildProcess {
    fn pid(&self) -> u32 {
        self.child.id()
    }

    fn try_wait(&mut self) -> Result<Option<ExitInfo>> {
        self.child
            .try_wait()
            .map(|status| status.map(Self::exit_info))
            .map_err(|e| WakeGateError::io(format!("Failed to poll {}", self.label), e))
    }

    fn request_stop(&mut self) -> Result<()> {
        #[cfg(unix)]
        {
            let pid = self.child.id() as libc::pid_t;
            // SAFETY: signals a child we spawned and have not yet reaped, so
            // the pid cannot have been reused.
            let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
            if rc != 0 {
                return Err(WakeGateError::io(
                    format!("Failed to signal {}", self.label),
                    std::io::Error::last_os_error(),
                ));
            }
            Ok(())
        }
        #[cfg(not(unix))]
        {
            self.kill()
        }
    }

    fn kill(&mut self) -> Result<()> {
        match self.child.kill() {
            Ok(()) => Ok(()),
            // Already exited.
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(WakeGateError::io(format!("Failed to kill {}", self.label), e)),
        }
    }

    fn wait(&mut self) -> Result<ExitInfo> {
        self.child
            .wait()
            .map(Self::exit_info)
            .map_err(|e| WakeGateError::io(format!("Failed to wait for {}", self.label), e))
    }
}

/// Spawns the configured recorder and gate commands. Both children inherit
/// the state directory through `WAKEGATE_HOME`.
pub struct CommandLauncher {
    recorder: Vec<String>,
    gate: Vec<String>,
    state_dir: PathBuf,
}

impl CommandLauncher {
    pub fn new(recorder: Vec<String>, gate: Vec<String>, state_dir: PathBuf) -> Self {
        Self {
            recorder,
            gate,
            state_dir,
        }
    }

    fn spawn(&self, label: &'static str, argv: &[String], quiet: bool) -> Result<Box<dyn ManagedProcess>> {
        let Some((program, args)) = argv.split_first() else {
            return Err(WakeGateError::Spawn {
                command: label.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
            });
        };

        let mut command = Command::new(program);
        command.args(args).env(STATE_DIR_ENV, &self.state_dir);
        if quiet {
            command
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null());
        }

        let child = command.spawn().map_err(|source| WakeGateError::Spawn {
            command: argv.join(" "),
            source,
        })?;
        info!(pid = child.id(), command = %program, "Started {}", label);
        Ok(Box::new(ChildProcess { label, child }))
    }
}

impl ProcessLauncher for CommandLauncher {
    fn spawn_recorder(&mut self) -> Result<Box<dyn ManagedProcess>> {
        self.spawn("recorder", &self.recorder, true)
    }

    fn spawn_gate(&mut self) -> Result<Box<dyn ManagedProcess>> {
        // The gate draws on the daemon's terminal.
        self.spawn("gate", &self.gate, false)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Orphan cleanup
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
pub struct CleanupStats {
    /// Exited within the timeout after SIGTERM.
    pub terminated: u32,
    /// Ignored SIGTERM and were killed.
    pub forced: u32,
    /// Still running after the kill; the activity log is not safe to touch.
    pub survivors: Vec<u32>,
    pub errors: Vec<String>,
}

impl CleanupStats {
    pub fn all_gone(&self) -> bool {
        self.survivors.is_empty()
    }
}

const KILL_GRACE: Duration = Duration::from_secs(1);

/// Stops recorder processes left behind by a previous daemon instance.
///
/// A process matches when the file name of its first argument is
/// `binary_name` (plus the platform executable suffix). The current process
/// is never signalled. Matches get SIGTERM and `timeout` to exit; whatever
/// is left is killed. Returns once every match is gone or reported as a
/// survivor.
pub fn cleanup_orphaned_recorders(binary_name: &str, timeout: Duration) -> CleanupStats {
    let mut stats = CleanupStats::default();
    let target = format!("{}{}", binary_name, std::env::consts::EXE_SUFFIX);

    let mut sys = System::new();
    sys.refresh_processes_specifics(ProcessRefreshKind::new().with_cmd(UpdateKind::Always));
    let own_pid = std::process::id();

    let orphans: Vec<Pid> = sys
        .processes()
        .iter()
        .filter(|(pid, _)| pid.as_u32() != own_pid)
        .filter(|(_, process)| {
            process
                .cmd()
                .first()
                .and_then(|arg| program_file_name(arg))
                .is_some_and(|name| name == target)
        })
        .map(|(pid, _)| *pid)
        .collect();

    let mut pending = Vec::new();
    for pid in orphans {
        match signal_orphan(&sys, pid, false) {
            Ok(true) => {
                info!(pid = pid.as_u32(), "Sent SIGTERM to orphaned recorder");
                pending.push(pid);
            }
            Ok(false) => {}
            Err(err) => stats.errors.push(format!(
                "Failed to terminate orphaned recorder {}: {}",
                pid, err
            )),
        }
    }
    if pending.is_empty() {
        return stats;
    }

    let signalled = pending.len();
    let pending = wait_for_exit(&mut sys, pending, timeout);
    stats.terminated = (signalled - pending.len()) as u32;

    let mut killed = Vec::new();
    for pid in pending {
        warn!(pid = pid.as_u32(), "Orphaned recorder ignored SIGTERM; killing");
        match signal_orphan(&sys, pid, true) {
            Ok(true) => killed.push(pid),
            Ok(false) => stats.terminated += 1,
            Err(err) => {
                stats
                    .errors
                    .push(format!("Failed to kill orphaned recorder {}: {}", pid, err));
                killed.push(pid);
            }
        }
    }

    let attempted = killed.len();
    let survivors = wait_for_exit(&mut sys, killed, KILL_GRACE);
    stats.forced = (attempted - survivors.len()) as u32;
    stats.survivors = survivors.iter().map(|pid| pid.as_u32()).collect();
    stats
}

/// Whether `pid` still exists and has not exited. Zombies count as exited.
fn still_running(sys: &mut System, pid: Pid) -> bool {
    sys.refresh_process_specifics(pid, ProcessRefreshKind::new())
        && sys
            .process(pid)
            .is_some_and(|process| process.status() != ProcessStatus::Zombie)
}

/// Polls until every pid has exited or `timeout` passes. Returns the pids
/// still running.
fn wait_for_exit(sys: &mut System, mut pending: Vec<Pid>, timeout: Duration) -> Vec<Pid> {
    let deadline = Instant::now() + timeout;
    loop {
        pending.retain(|pid| still_running(sys, *pid));
        if pending.is_empty() || Instant::now() >= deadline {
            return pending;
        }
        thread::sleep(STOP_POLL_INTERVAL);
    }
}

/// Sends SIGTERM (or SIGKILL when `force`). `Ok(false)` means the process
/// was already gone.
#[cfg(unix)]
fn signal_orphan(_sys: &System, pid: Pid, force: bool) -> std::io::Result<bool> {
    let signal = if force { libc::SIGKILL } else { libc::SIGTERM };
    // SAFETY: signal to a pid taken from the process table.
    let rc = unsafe { libc::kill(pid.as_u32() as libc::pid_t, signal) };
    if rc == 0 {
        return Ok(true);
    }
    let err = std::io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        Ok(false)
    } else {
        Err(err)
    }
}

#[cfg(not(unix))]
fn signal_orphan(sys: &System, pid: Pid, _force: bool) -> std::io::Result<bool> {
    match sys.process(pid) {
        Some(process) if process.kill() => Ok(true),
        Some(_) => Err(std::io::Error::new(
            std::io::ErrorKind::Other,
            "process refused to terminate",
        )),
        None => Ok(false),
    }
}

fn program_file_name(arg: &str) -> Option<String> {
    std::path::Path::new(arg)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
}


#[cfg(test)]
mod tests {
    use super::fakes::*;
    use super::*;
    #[cfg(unix)]
    use std::os::unix::process::ExitStatusExt;
    use std::sync::{Arc, Mutex};

    fn running(on_stop: Option<i32>, journal: &Journal) -> FakeProcess {
        FakeProcess {
            label: "recorder",
            pid: 42,
            exit: None,
            on_stop,
            journal: Arc::clone(journal),
        }
    }

    #[test]
    fn stop_process_is_graceful_when_child_honors_sigterm() {
        let journal: Journal = Arc::new(Mutex::new(Vec::new()));
        let mut process = running(Some(0), &journal);

        let outcome = stop_process(&mut process, Duration::from_millis(200)).unwrap();
        assert_eq!(outcome, StopOutcome::Graceful);
        assert_eq!(entries(&journal), vec!["stop recorder"]);
    }

    #[test]
    fn stop_process_escalates_after_timeout() {
        let journal: Journal = Arc::new(Mutex::new(Vec::new()));
        let mut process = running(None, &journal);

        let started = Instant::now();
        let outcome = stop_process(&mut process, Duration::from_millis(100)).unwrap();
        assert_eq!(outcome, StopOutcome::Forced);
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert_eq!(entries(&journal), vec!["stop recorder", "kill recorder"]);
    }

    #[test]
    fn stop_process_skips_exited_child() {
        let journal: Journal = Arc::new(Mutex::new(Vec::new()));
        let mut process = running(None, &journal);
        process.exit = Some(ExitInfo { code: Some(1) });

        let outcome = stop_process(&mut process, Duration::from_millis(100)).unwrap();
        assert_eq!(outcome, StopOutcome::AlreadyExited);
        assert!(entries(&journal).is_empty());
    }

    #[test]
    fn program_file_name_strips_directories() {
        assert_eq!(
            program_file_name("/usr/local/bin/wakegate-recorder").as_deref(),
            Some("wakegate-recorder")
        );
        assert_eq!(program_file_name("wakegate-recorder").as_deref(), Some("wakegate-recorder"));
    }

    #[cfg(unix)]
    #[test]
    fn real_child_that_traps_sigterm_is_killed() {
        let launcher = CommandLauncher::new(
            vec![
                "sh".into(),
                "-c".into(),
                "trap '' TERM; while true; do sleep 1; done".into(),
            ],
            vec!["true".into()],
            std::env::temp_dir(),
        );
        let mut child = launcher
            .spawn("recorder", &launcher.recorder, true)
            .unwrap();
        // Give the shell time to install its trap.
        thread::sleep(Duration::from_millis(200));

        let outcome = stop_process(child.as_mut(), Duration::from_millis(300)).unwrap();
        assert_eq!(outcome, StopOutcome::Forced);
        assert!(child.try_wait().unwrap().is_some());
    }

    #[cfg(unix)]
    #[test]
    fn real_child_exits_on_sigterm() {
        let launcher = CommandLauncher::new(
            vec!["sleep".into(), "30".into()],
            vec!["true".into()],
            std::env::temp_dir(),
        );
        let mut child = launcher
            .spawn("recorder", &launcher.recorder, true)
            .unwrap();

        let outcome = stop_process(child.as_mut(), Duration::from_secs(3)).unwrap();
        assert_eq!(outcome, StopOutcome::Graceful);
    }

    #[test]
    fn orphan_cleanup_ignores_unrelated_processes() {
        let stats = cleanup_orphaned_recorders(
            "wakegate-recorder-that-does-not-exist",
            Duration::from_millis(100),
        );
        assert_eq!(stats.terminated + stats.forced, 0);
        assert!(stats.all_gone());
        assert!(stats.errors.is_empty());
    }

    #[cfg(unix)]
    fn spawn_named(name: &str, script: &str) -> Child {
        let child = Command::new("bash")
            .arg("-c")
            .arg(format!("{}exec -a {} sleep 30", script, name))
            .stdin(Stdio::null())
            .spawn()
            .unwrap();
        // Let bash reach the exec.
        thread::sleep(Duration::from_millis(300));
        child
    }

    #[cfg(unix)]
    #[test]
    fn orphan_exiting_on_sigterm_is_reaped_before_cleanup_returns() {
        let name = format!("wakegate-orphan-term-{}", std::process::id());
        let mut orphan = spawn_named(&name, "");

        let stats = cleanup_orphaned_recorders(&name, Duration::from_secs(3));

        assert_eq!(stats.terminated, 1);
        assert_eq!(stats.forced, 0);
        assert!(stats.all_gone());
        assert_eq!(orphan.wait().unwrap().signal(), Some(libc::SIGTERM));
    }

    #[cfg(unix)]
    #[test]
    fn orphan_ignoring_sigterm_is_killed_before_cleanup_returns() {
        let name = format!("wakegate-orphan-stuck-{}", std::process::id());
        let mut orphan = spawn_named(&name, "trap '' TERM; ");

        let started = Instant::now();
        let stats = cleanup_orphaned_recorders(&name, Duration::from_millis(300));

        assert!(started.elapsed() >= Duration::from_millis(300));
        assert_eq!(stats.terminated, 0);
        assert_eq!(stats.forced, 1);
        assert!(stats.all_gone());
        assert!(stats.errors.is_empty());
        assert_eq!(orphan.wait().unwrap().signal(), Some(libc::SIGKILL));
    }

    #[test]
    fn empty_command_is_a_spawn_error() {
        let mut launcher = CommandLauncher::new(Vec::new(), Vec::new(), std::env::temp_dir());
        assert!(matches!(
            launcher.spawn_recorder(),
            Err(WakeGateError::Spawn { .. })
        ));
    }
}

//! Service Orchestrator.
//!
//! A two-state machine driven by one intent queue:
//!
//! ```text
//!            poll sees an unhandled wake
//!   ┌──────┐ ─────────────────────────────▶ ┌────────┐
//!   │ Idle │                                │ Gating │──┐ gate exits non-zero:
//!   └──────┘ ◀───────────────────────────── └────────┘◀─┘ relaunch
//!              gate exits 0
//! ```
//!
//! Entering `Gating` persists the handled-wake marker, stops the recorder and
//! transfers its session. Leaving it clears `last_sleep` and starts a fresh
//! recorder. The loop blocks while a gate runs; intents queue up meanwhile.
//!
//! The orchestrator writes `file_activity.json` only after the recorder has
//! been reaped.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};
use wakegate_core::config::ServiceConfig;
use wakegate_core::lockdown::restore_task_switching;
use wakegate_core::signals::{self, ProcessScopedPolicy};
use wakegate_core::{transfer_persisted_session, unhandled_wake, Result, StateStore, Timestamp};

use crate::backoff::RetryBackoff;
use crate::intent::Intent;
use crate::process::{stop_process, ManagedProcess, ProcessLauncher};

const GATE_POLL_INTERVAL: Duration = Duration::from_millis(100);
const PAUSE_STEP: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Idle,
    Gating,
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub poll_interval: Duration,
    pub stop_timeout: Duration,
    pub gate_relaunch_delay: Duration,
    pub retry_initial: Duration,
    pub retry_max: Duration,
}

impl From<&ServiceConfig> for OrchestratorSettings {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            stop_timeout: config.stop_timeout(),
            gate_relaunch_delay: config.gate_relaunch_delay(),
            retry_initial: Duration::from_millis(config.retry_initial_ms),
            retry_max: Duration::from_millis(config.retry_max_ms),
        }
    }
}

enum GateExit {
    Succeeded,
    Failed(Option<i32>),
    Interrupted,
}

pub struct Orchestrator<L: ProcessLauncher> {
    store: Arc<StateStore>,
    launcher: L,
    settings: OrchestratorSettings,
    state: ServiceState,
    recorder: Option<Box<dyn ManagedProcess>>,
    /// Whether a recorder should be running (set after a successful gate).
    recorder_wanted: bool,
    retry: RetryBackoff,
    /// Delay before the next poll after a failed one.
    retry_delay: Option<Duration>,
    shutdown_check: fn() -> bool,
}

impl<L: ProcessLauncher> Orchestrator<L> {
    pub fn new(store: Arc<StateStore>, launcher: L, settings: OrchestratorSettings) -> Self {
        let retry = RetryBackoff::new(settings.retry_initial, settings.retry_max);
        Self {
            store,
            launcher,
            settings,
            state: ServiceState::Idle,
            recorder: None,
            recorder_wanted: false,
            retry,
            retry_delay: None,
            shutdown_check: signals::shutdown_requested,
        }
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    pub fn recorder_running(&self) -> bool {
        self.recorder.is_some()
    }

    /// One-time startup pass. Must run before any recorder is spawned by this
    /// instance and after orphaned recorders have been stopped. Pass
    /// `recover_session = false` when an orphan may still be writing the
    /// activity log.
    pub fn startup(&mut self, recover_session: bool) {
        self.restore_policy();

        if recover_session {
            match transfer_persisted_session(&self.store) {
                Ok(outcome) => debug!(outcome = ?outcome, "Startup session recovery"),
                Err(err) => warn!(error = %err, "Failed to recover previous session activity"),
            }
        } else {
            warn!("Orphaned recorder still running; skipping startup session recovery");
        }

        // Service start counts as a wake.
        match self
            .store
            .update_device_state(|state| state.last_awake = Some(Utc::now()))
        {
            Ok(state) => info!(last_awake = ?state.last_awake, "Set wake time on startup"),
            Err(err) => warn!(error = %err, "Failed to persist startup wake time"),
        }
    }

    /// Consumes intents until shutdown, then runs the cleanup path.
    pub fn run(&mut self, intents: &Receiver<Intent>) {
        info!(
            poll_interval_ms = self.settings.poll_interval.as_millis() as u64,
            "Orchestrator running"
        );
        let mut queue_open = true;

        while !(self.shutdown_check)() {
            let wait = self.retry_delay.unwrap_or(self.settings.poll_interval);
            let next = if queue_open {
                intents.recv_timeout(wait)
            } else {
                self.pause(wait);
                Err(RecvTimeoutError::Timeout)
            };

            match next {
                Ok(Intent::Shutdown) => break,
                Ok(intent) => self.guarded(|o| o.handle_intent(intent)),
                Err(RecvTimeoutError::Timeout) => self.guarded(|o| o.poll()),
                Err(RecvTimeoutError::Disconnected) => {
                    warn!("Intent queue closed; continuing on poll timer only");
                    queue_open = false;
                }
            }
        }

        self.shutdown_cleanup();
    }

    /// Runs one loop body, containing panics so only a shutdown ends the loop.
    fn guarded<F>(&mut self, body: F)
    where
        F: FnOnce(&mut Self),
    {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| body(self)));
        if let Err(payload) = outcome {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(panic = %message, state = ?self.state, "Orchestrator loop body panicked");
            self.recover_after_panic();
        }
    }

    fn recover_after_panic(&mut self) {
        self.restore_policy();
        if self.state == ServiceState::Gating {
            // The wake was marked handled but never confirmed; let the next
            // poll gate it again.
            if let Err(err) = self.store.clear_handled_marker() {
                warn!(error = %err, "Failed to clear handled marker after panic");
            }
            self.state = ServiceState::Idle;
        }
    }

    pub fn handle_intent(&mut self, intent: Intent) {
        match intent {
            Intent::Suspend { at } => {
                info!(at = %at, "Suspend: stopping recorder");
                self.recorder_wanted = false;
                self.stop_recorder();
            }
            Intent::Resume { at } => {
                debug!(at = %at, "Resume: checking for wake");
                self.poll();
            }
            Intent::Shutdown => {}
        }
    }

    /// One poll tick. Store failures are retried with backoff.
    pub fn poll(&mut self) {
        match self.try_poll() {
            Ok(()) => {
                if self.retry.failures() > 0 {
                    info!(failures = self.retry.failures(), "State store readable again");
                }
                self.retry.reset();
                self.retry_delay = None;
            }
            Err(err) => {
                let delay = self.retry.next_delay();
                warn!(
                    error = %err,
                    failures = self.retry.failures(),
                    retry_in_ms = delay.as_millis() as u64,
                    "Poll failed"
                );
                self.retry_delay = Some(delay);
            }
        }
    }

    fn try_poll(&mut self) -> Result<()> {
        self.supervise_recorder();

        let (state, marker) = self.store.wake_snapshot()?;
        if let Some(awake) = unhandled_wake(&state, marker.as_ref()) {
            self.handle_wake(awake);
        }
        Ok(())
    }

    fn supervise_recorder(&mut self) {
        if let Some(recorder) = self.recorder.as_mut() {
            match recorder.try_wait() {
                Ok(Some(exit)) => {
                    warn!(pid = recorder.pid(), code = ?exit.code, "Recorder exited unexpectedly");
                    self.recorder = None;
                }
                Ok(None) => {}
                Err(err) => warn!(error = %err, "Failed to poll recorder"),
            }
        }
        if self.recorder.is_none() && self.recorder_wanted && self.state == ServiceState::Idle {
            self.start_recorder();
        }
    }

    fn handle_wake(&mut self, awake: Timestamp) {
        info!(awake = %awake, "Device wake detected");

        // Marked before the gate launches so a restart mid-gate does not
        // gate the same wake twice.
        if let Err(err) = self.store.mark_wake_handled(awake) {
            warn!(error = %err, "Failed to persist handled wake marker; gating anyway");
        }
        self.state = ServiceState::Gating;
        self.recorder_wanted = false;
        self.stop_recorder();

        if !self.run_gate_until_success() {
            info!("Shutdown requested while gating");
            return;
        }

        if let Err(err) = self
            .store
            .update_device_state(|state| state.last_sleep = None)
        {
            warn!(error = %err, "Failed to reset sleep time");
        }
        self.state = ServiceState::Idle;
        self.recorder_wanted = true;
        self.start_recorder();
    }

    /// Launches the gate until one exits successfully. Returns false when
    /// interrupted by shutdown.
    fn run_gate_until_success(&mut self) -> bool {
        let mut attempt: u32 = 0;
        loop {
            if (self.shutdown_check)() {
                return false;
            }
            attempt += 1;

            let exit = match self.launcher.spawn_gate() {
                Ok(mut gate) => {
                    info!(pid = gate.pid(), attempt, "Challenge gate launched");
                    let exit = self.wait_for_gate(gate.as_mut());
                    self.restore_policy();
                    exit
                }
                Err(err) => {
                    let delay = self.retry.next_delay();
                    error!(error = %err, retry_in_ms = delay.as_millis() as u64, "Failed to launch gate");
                    self.pause(delay);
                    continue;
                }
            };

            match exit {
                GateExit::Succeeded => {
                    self.retry.reset();
                    info!(attempt, "Challenge gate succeeded");
                    return true;
                }
                GateExit::Interrupted => return false,
                GateExit::Failed(code) => {
                    warn!(code = ?code, attempt, "Gate exited without success; relaunching");
                    self.pause(self.settings.gate_relaunch_delay);
                }
            }
        }
    }

    fn wait_for_gate(&mut self, gate: &mut dyn ManagedProcess) -> GateExit {
        loop {
            if (self.shutdown_check)() {
                match stop_process(gate, self.settings.stop_timeout) {
                    Ok(outcome) => info!(outcome = ?outcome, "Gate stopped for shutdown"),
                    Err(err) => warn!(error = %err, "Failed to stop gate for shutdown"),
                }
                return GateExit::Interrupted;
            }
            match gate.try_wait() {
                Ok(Some(exit)) if exit.success() => return GateExit::Succeeded,
                Ok(Some(exit)) => return GateExit::Failed(exit.code),
                Ok(None) => thread::sleep(GATE_POLL_INTERVAL),
                Err(err) => {
                    warn!(error = %err, "Failed to poll gate; restarting it");
                    let _ = stop_process(gate, self.settings.stop_timeout);
                    return GateExit::Failed(None);
                }
            }
        }
    }

    fn start_recorder(&mut self) {
        if self.recorder.is_some() {
            return;
        }
        match self.launcher.spawn_recorder() {
            Ok(recorder) => {
                info!(pid = recorder.pid(), "Recorder started");
                self.recorder = Some(recorder);
            }
            Err(err) => warn!(error = %err, "Failed to start recorder; will retry on next poll"),
        }
    }

    /// Stops the recorder (if any) and transfers its session once it has
    /// been reaped.
    fn stop_recorder(&mut self) {
        if let Some(mut recorder) = self.recorder.take() {
            let pid = recorder.pid();
            match stop_process(recorder.as_mut(), self.settings.stop_timeout) {
                Ok(outcome) => info!(pid, outcome = ?outcome, "Recorder stopped"),
                Err(err) => {
                    // Exit not confirmed; writing the log now could race it.
                    error!(pid, error = %err, "Failed to stop recorder; skipping session transfer");
                    return;
                }
            }
        }

        match transfer_persisted_session(&self.store) {
            Ok(outcome) => debug!(outcome = ?outcome, "Session transfer after recorder stop"),
            Err(err) => warn!(error = %err, "Failed to transfer session activity"),
        }
    }

    fn restore_policy(&self) {
        match restore_task_switching(&self.store, &mut ProcessScopedPolicy) {
            Ok(true) => warn!("Restored task switching left disabled by a gate"),
            Ok(false) => {}
            Err(err) => warn!(error = %err, "Failed to restore task switching policy"),
        }
    }

    /// Shutdown path: stop the recorder, record the sleep time, restore policy.
    pub fn shutdown_cleanup(&mut self) {
        info!("Performing shutdown cleanup");
        self.recorder_wanted = false;
        self.stop_recorder();

        match self
            .store
            .update_device_state(|state| state.last_sleep = Some(Utc::now()))
        {
            Ok(_) => info!("Recorded sleep time at shutdown"),
            Err(err) => warn!(error = %err, "Failed to record sleep time at shutdown"),
        }
        self.restore_policy();
    }

    fn pause(&self, duration: Duration) {
        let mut remaining = duration;
        while !remaining.is_zero() && !(self.shutdown_check)() {
            let step = remaining.min(PAUSE_STEP);
            thread::sleep(step);
            remaining -= step;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::fakes::{entries, FakeLauncher, Journal};
    use crate::process::ExitInfo;
    use chrono::Duration as ChronoDuration;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{mpsc, Mutex};
    use tempfile::{tempdir, TempDir};
    use wakegate_core::records::{FileActivityLog, LockdownPolicyRecord};
    use wakegate_core::DeviceState;

    fn settings() -> OrchestratorSettings {
        OrchestratorSettings {
            poll_interval: Duration::from_millis(10),
            stop_timeout: Duration::from_millis(50),
            gate_relaunch_delay: Duration::ZERO,
            retry_initial: Duration::from_millis(1),
            retry_max: Duration::from_millis(5),
        }
    }

    fn never() -> bool {
        false
    }

    fn setup(launcher: FakeLauncher) -> (TempDir, Arc<StateStore>, Orchestrator<FakeLauncher>) {
        let temp = tempdir().unwrap();
        let store = Arc::new(StateStore::open(temp.path()).unwrap());
        let mut orchestrator = Orchestrator::new(Arc::clone(&store), launcher, settings());
        orchestrator.shutdown_check = never;
        (temp, store, orchestrator)
    }

    fn journal_of(orchestrator: &Orchestrator<FakeLauncher>) -> Journal {
        Arc::clone(&orchestrator.launcher.journal)
    }

    fn count(journal: &Journal, entry: &str) -> usize {
        entries(journal).iter().filter(|e| *e == entry).count()
    }

    #[test]
    fn fresh_start_initializes_state_and_gates_once() {
        let (_temp, store, mut orchestrator) = setup(FakeLauncher::default());
        let journal = journal_of(&orchestrator);

        orchestrator.startup(true);
        let state = store.device_state().unwrap();
        assert!(state.last_awake.is_some());
        assert_eq!(state.last_sleep, None);

        orchestrator.poll();
        assert_eq!(entries(&journal), vec!["spawn gate", "spawn recorder"]);
        assert_eq!(orchestrator.state(), ServiceState::Idle);
        assert!(orchestrator.recorder_running());
        assert_eq!(
            store.handled_marker().unwrap().unwrap().last_handled_awake,
            state.last_awake.unwrap()
        );
    }

    #[test]
    fn unchanged_wake_is_gated_at_most_once() {
        let (_temp, _store, mut orchestrator) = setup(FakeLauncher::default());
        let journal = journal_of(&orchestrator);

        orchestrator.startup(true);
        for _ in 0..5 {
            orchestrator.poll();
        }
        assert_eq!(count(&journal, "spawn gate"), 1);
        assert_eq!(count(&journal, "spawn recorder"), 1);
    }

    #[test]
    fn deleted_marker_forces_a_new_gate() {
        let (_temp, store, mut orchestrator) = setup(FakeLauncher::default());
        let journal = journal_of(&orchestrator);

        orchestrator.startup(true);
        orchestrator.poll();
        assert!(store.clear_handled_marker().unwrap());
        orchestrator.poll();

        assert_eq!(count(&journal, "spawn gate"), 2);
        // The running recorder was stopped before the second gate.
        assert_eq!(
            entries(&journal),
            vec![
                "spawn gate",
                "spawn recorder",
                "stop recorder",
                "spawn gate",
                "spawn recorder"
            ]
        );
    }

    #[test]
    fn resume_between_polls_gates_the_new_wake_once() {
        let (_temp, store, mut orchestrator) = setup(FakeLauncher::default());
        let journal = journal_of(&orchestrator);
        orchestrator.startup(true);
        orchestrator.poll();

        let woke = Utc::now() + ChronoDuration::seconds(1);
        store.record_resume(woke).unwrap();
        for _ in 0..3 {
            orchestrator.poll();
        }

        assert_eq!(count(&journal, "spawn gate"), 2);
        assert_eq!(
            store.handled_marker().unwrap().unwrap().last_handled_awake,
            woke
        );
    }

    #[test]
    fn marker_is_persisted_before_the_gate_runs() {
        let temp = tempdir().unwrap();
        let store = Arc::new(StateStore::open(temp.path()).unwrap());
        let seen = Arc::new(Mutex::new(None));

        let mut launcher = FakeLauncher::default();
        let hook_store = Arc::clone(&store);
        let hook_seen = Arc::clone(&seen);
        launcher.on_gate = Some(Box::new(move || {
            *hook_seen.lock().unwrap() = hook_store.handled_marker().unwrap();
        }));

        let mut orchestrator = Orchestrator::new(Arc::clone(&store), launcher, settings());
        orchestrator.shutdown_check = never;
        orchestrator.startup(true);
        orchestrator.poll();

        let awake = store.device_state().unwrap().last_awake.unwrap();
        let marker = seen.lock().unwrap().expect("marker written before gate");
        assert_eq!(marker.last_handled_awake, awake);
    }

    #[test]
    fn failed_gates_keep_recorder_stopped_until_success() {
        let (_temp, store, mut orchestrator) =
            setup(FakeLauncher::with_gate_exits([1, 1, 1, 0]));
        let journal = journal_of(&orchestrator);

        // An earlier wake was handled and its recorder is running.
        let earlier = Utc::now() - ChronoDuration::hours(1);
        store
            .save(&DeviceState {
                last_awake: Some(earlier),
                last_sleep: None,
            })
            .unwrap();
        store.mark_wake_handled(earlier).unwrap();
        orchestrator.recorder_wanted = true;
        orchestrator.poll();
        assert!(orchestrator.recorder_running());

        // Suspend then resume.
        let slept = Utc::now() - ChronoDuration::minutes(5);
        orchestrator.handle_intent(Intent::Suspend { at: slept });
        store
            .update_device_state(|state| state.last_sleep = Some(slept))
            .unwrap();
        store
            .update_device_state(|state| state.last_awake = Some(Utc::now()))
            .unwrap();
        store.clear_handled_marker().unwrap();
        assert!(!orchestrator.recorder_running());

        orchestrator.handle_intent(Intent::Resume { at: Utc::now() });

        assert_eq!(
            entries(&journal),
            vec![
                "spawn recorder",
                "stop recorder",
                "spawn gate",
                "spawn gate",
                "spawn gate",
                "spawn gate",
                "spawn recorder"
            ]
        );
        let state = store.device_state().unwrap();
        assert_eq!(state.last_sleep, None);
        assert_eq!(orchestrator.state(), ServiceState::Idle);
    }

    /// A recorder that keeps touching files until it is killed.
    struct WritingRecorder {
        store: Arc<StateStore>,
        writes: u32,
        exited: bool,
        journal: Journal,
    }

    impl ManagedProcess for WritingRecorder {
        fn pid(&self) -> u32 {
            7
        }

        fn try_wait(&mut self) -> Result<Option<ExitInfo>> {
            if self.exited {
                return Ok(Some(ExitInfo { code: None }));
            }
            self.writes += 1;
            let mut log = self.store.file_activity()?;
            log.record_touch(&format!("recorded-{}.txt", self.writes), Utc::now());
            self.store.save(&log)?;
            Ok(None)
        }

        fn request_stop(&mut self) -> Result<()> {
            self.journal.lock().unwrap().push("ignored stop".into());
            Ok(())
        }

        fn kill(&mut self) -> Result<()> {
            self.journal.lock().unwrap().push("killed".into());
            self.exited = true;
            Ok(())
        }

        fn wait(&mut self) -> Result<ExitInfo> {
            Ok(ExitInfo { code: None })
        }
    }

    #[test]
    fn forced_stop_transfers_only_after_the_recorder_is_gone() {
        let (_temp, store, mut orchestrator) = setup(FakeLauncher::default());
        let journal = journal_of(&orchestrator);
        orchestrator.recorder = Some(Box::new(WritingRecorder {
            store: Arc::clone(&store),
            writes: 0,
            exited: false,
            journal: Arc::clone(&journal),
        }));

        orchestrator.handle_intent(Intent::Suspend { at: Utc::now() });

        assert_eq!(entries(&journal), vec!["ignored stop", "killed"]);
        // Every touch the recorder made landed before the transfer.
        let log: FileActivityLog = store.file_activity().unwrap();
        assert!(log.current_session.is_empty());
        assert!(!log.previous_session.is_empty());
    }

    #[test]
    fn startup_recovers_stale_session_and_policy() {
        let (_temp, store, mut orchestrator) = setup(FakeLauncher::default());
        let mut log = FileActivityLog::default();
        for name in ["a.py", "b.txt", "c.js"] {
            log.record_touch(name, Utc::now());
        }
        store.save(&log).unwrap();
        store
            .save(&LockdownPolicyRecord {
                task_switching_disabled: true,
                changed_at: Some(Utc::now()),
            })
            .unwrap();

        orchestrator.startup(true);

        let log = store.file_activity().unwrap();
        assert!(log.current_session.is_empty());
        assert_eq!(log.previous_session.len(), 3);
        assert!(!store.lockdown_policy().unwrap().task_switching_disabled);
    }

    #[test]
    fn startup_leaves_log_alone_while_an_orphan_survives() {
        let (_temp, store, mut orchestrator) = setup(FakeLauncher::default());
        let mut log = FileActivityLog::default();
        log.record_touch("a.py", Utc::now());
        store.save(&log).unwrap();

        orchestrator.startup(false);

        let log = store.file_activity().unwrap();
        assert_eq!(log.current_session.len(), 1);
        assert!(log.previous_session.is_empty());
        assert!(store.device_state().unwrap().last_awake.is_some());
    }

    #[test]
    fn shutdown_cleanup_records_sleep_and_stops_recorder() {
        let (_temp, store, mut orchestrator) = setup(FakeLauncher::default());
        let journal = journal_of(&orchestrator);
        orchestrator.startup(true);
        orchestrator.poll();
        assert!(orchestrator.recorder_running());

        orchestrator.shutdown_cleanup();

        assert!(!orchestrator.recorder_running());
        assert_eq!(entries(&journal).last().map(String::as_str), Some("stop recorder"));
        let state = store.device_state().unwrap();
        assert!(state.last_sleep.is_some());
        assert!(!state.is_awake());
    }

    #[test]
    fn run_processes_intents_until_shutdown() {
        let (_temp, store, mut orchestrator) = setup(FakeLauncher::default());
        let journal = journal_of(&orchestrator);
        orchestrator.startup(true);

        let (tx, rx) = mpsc::channel();
        tx.send(Intent::Resume { at: Utc::now() }).unwrap();
        tx.send(Intent::Shutdown).unwrap();
        orchestrator.run(&rx);

        assert_eq!(
            entries(&journal),
            vec!["spawn gate", "spawn recorder", "stop recorder"]
        );
        assert!(store.device_state().unwrap().last_sleep.is_some());
    }

    static PANICKED: AtomicBool = AtomicBool::new(false);

    #[test]
    fn panic_while_gating_is_contained_and_wake_retried() {
        let temp = tempdir().unwrap();
        let store = Arc::new(StateStore::open(temp.path()).unwrap());
        let mut launcher = FakeLauncher::default();
        launcher.on_gate = Some(Box::new(|| {
            if !PANICKED.swap(true, Ordering::SeqCst) {
                panic!("gate launcher exploded");
            }
        }));
        let mut orchestrator = Orchestrator::new(Arc::clone(&store), launcher, settings());
        orchestrator.shutdown_check = never;
        let journal = journal_of(&orchestrator);
        orchestrator.startup(true);

        orchestrator.guarded(|o| o.poll());
        assert_eq!(orchestrator.state(), ServiceState::Idle);
        assert!(store.handled_marker().unwrap().is_none());

        orchestrator.guarded(|o| o.poll());
        assert_eq!(count(&journal, "spawn gate"), 2);
        assert!(orchestrator.recorder_running());
    }
}

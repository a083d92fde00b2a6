//! Power Event Monitor.
//!
//! Runs on its own thread, independent of the poll loop. Each suspend/resume
//! is applied to the store immediately (so a suspend during a gate is still
//! recorded) and then posted to the orchestrator as an [`Intent`].
//!
//! There is no portable suspend/resume broadcast, so the default source infers
//! a sleep from the gap between a clock that runs during suspend and one that
//! does not.

use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};
use wakegate_core::config::PowerConfig;
use wakegate_core::{signals, Result, StateStore, Timestamp};

use crate::intent::Intent;

const SHUTDOWN_CHECK_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerEvent {
    Suspend { at: Timestamp },
    Resume { at: Timestamp },
}

/// Delivers OS suspend/resume notifications.
pub trait PowerSource: Send {
    /// Returns the events observed since the previous call, oldest first.
    fn poll(&mut self) -> Result<Vec<PowerEvent>>;
}

/// Cumulative time the device has spent suspended.
pub trait SuspendClock: Send {
    fn suspended(&mut self) -> Result<Duration>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// Clocks
// ═══════════════════════════════════════════════════════════════════════════════

/// `CLOCK_BOOTTIME` keeps counting through suspend, `CLOCK_MONOTONIC` stops.
#[cfg(target_os = "linux")]
#[derive(Debug, Default)]
pub struct BootClock;

#[cfg(target_os = "linux")]
fn read_clock(clock: libc::clockid_t) -> Result<Duration> {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: `ts` is a valid, writable timespec.
    let rc = unsafe { libc::clock_gettime(clock, &mut ts) };
    if rc != 0 {
        return Err(wakegate_core::WakeGateError::Platform(format!(
            "clock_gettime({}) failed: {}",
            clock,
            std::io::Error::last_os_error()
        )));
    }
    Ok(Duration::new(ts.tv_sec as u64, ts.tv_nsec as u32))
}

#[cfg(target_os = "linux")]
impl SuspendClock for BootClock {
    fn suspended(&mut self) -> Result<Duration> {
        let monotonic = read_clock(libc::CLOCK_MONOTONIC)?;
        let boottime = read_clock(libc::CLOCK_BOOTTIME)?;
        Ok(boottime.saturating_sub(monotonic))
    }
}

/// Wall-clock time elapsed beyond what `Instant` saw. `Instant` does not
/// advance during sleep on the platforms this is used on.
#[derive(Debug)]
pub struct WallClockDrift {
    wall_start: std::time::SystemTime,
    instant_start: std::time::Instant,
}

impl Default for WallClockDrift {
    fn default() -> Self {
        Self {
            wall_start: std::time::SystemTime::now(),
            instant_start: std::time::Instant::now(),
        }
    }
}

impl SuspendClock for WallClockDrift {
    fn suspended(&mut self) -> Result<Duration> {
        let wall = self.wall_start.elapsed().unwrap_or_default();
        Ok(wall.saturating_sub(self.instant_start.elapsed()))
    }
}

#[cfg(target_os = "linux")]
pub fn default_clock() -> Box<dyn SuspendClock> {
    let mut boot = BootClock;
    match boot.suspended() {
        Ok(_) => Box::new(boot),
        Err(err) => {
            warn!(error = %err, "Boot clock unavailable; using wall-clock drift");
            Box::new(WallClockDrift::default())
        }
    }
}

#[cfg(not(target_os = "linux"))]
pub fn default_clock() -> Box<dyn SuspendClock> {
    Box::new(WallClockDrift::default())
}

// ═══════════════════════════════════════════════════════════════════════════════
// Clock-gap source
// ═══════════════════════════════════════════════════════════════════════════════

/// Reports a suspend/resume pair whenever suspended time grows by at least
/// `threshold` between two polls.
pub struct ClockGapSource {
    clock: Box<dyn SuspendClock>,
    threshold: Duration,
    last: Option<Duration>,
}

impl ClockGapSource {
    pub fn new(clock: Box<dyn SuspendClock>, threshold: Duration) -> Self {
        Self {
            clock,
            threshold,
            last: None,
        }
    }

    pub fn from_config(config: &PowerConfig) -> Self {
        Self::new(
            default_clock(),
            Duration::from_millis(config.gap_threshold_ms),
        )
    }
}

impl PowerSource for ClockGapSource {
    fn poll(&mut self) -> Result<Vec<PowerEvent>> {
        let suspended = self.clock.suspended()?;
        let Some(previous) = self.last.replace(suspended) else {
            return Ok(Vec::new());
        };

        let gap = suspended.saturating_sub(previous);
        if gap < self.threshold {
            return Ok(Vec::new());
        }

        let now = Utc::now();
        let slept_at = chrono::Duration::from_std(gap)
            .ok()
            .and_then(|gap| now.checked_sub_signed(gap))
            .unwrap_or(now);
        debug!(gap_ms = gap.as_millis() as u64, "Suspend gap detected");
        Ok(vec![
            PowerEvent::Suspend { at: slept_at },
            PowerEvent::Resume { at: now },
        ])
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Monitor
// ═══════════════════════════════════════════════════════════════════════════════

pub struct PowerMonitor {
    store: Arc<StateStore>,
    source: Box<dyn PowerSource>,
    intents: Sender<Intent>,
    sample_interval: Duration,
    shutdown_check: fn() -> bool,
}

impl PowerMonitor {
    pub fn new(
        store: Arc<StateStore>,
        source: Box<dyn PowerSource>,
        intents: Sender<Intent>,
        sample_interval: Duration,
    ) -> Self {
        Self {
            store,
            source,
            intents,
            sample_interval,
            shutdown_check: signals::shutdown_requested,
        }
    }

    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("power-monitor".into())
            .spawn(move || self.run())
    }

    pub fn run(mut self) {
        info!(
            sample_interval_ms = self.sample_interval.as_millis() as u64,
            "Power monitor started"
        );
        while !(self.shutdown_check)() {
            match self.source.poll() {
                Ok(events) => {
                    for event in events {
                        if !self.handle_power_event(event) {
                            debug!("Orchestrator gone; power monitor exiting");
                            return;
                        }
                    }
                }
                Err(err) => warn!(error = %err, "Power source poll failed"),
            }
            self.sleep_interruptibly();
        }
        // Wakes the orchestrator instead of waiting out its poll tick.
        let _ = self.intents.send(Intent::Shutdown);
        debug!("Power monitor stopped");
    }

    fn sleep_interruptibly(&self) {
        let mut remaining = self.sample_interval;
        while !remaining.is_zero() && !(self.shutdown_check)() {
            let step = remaining.min(SHUTDOWN_CHECK_INTERVAL);
            thread::sleep(step);
            remaining -= step;
        }
    }

    /// Applies `event` to the store and notifies the orchestrator. Returns
    /// false once the orchestrator's queue is closed.
    pub fn handle_power_event(&self, event: PowerEvent) -> bool {
        let intent = match event {
            PowerEvent::Suspend { at } => {
                info!(at = %at, "System entering sleep");
                // Recorder stop request first, then the sleep time.
                let sent = self.intents.send(Intent::Suspend { at }).is_ok();
                if let Err(err) = self.store.update_device_state(|state| state.last_sleep = Some(at)) {
                    warn!(error = %err, "Failed to persist sleep time");
                }
                return sent;
            }
            PowerEvent::Resume { at } => {
                info!(at = %at, "System resumed");
                match self.store.record_resume(at) {
                    Ok(_) => debug!("Recorded wake time and cleared handled wake marker"),
                    Err(err) => warn!(error = %err, "Failed to persist wake time"),
                }
                Intent::Resume { at }
            }
        };
        self.intents.send(intent).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use std::collections::VecDeque;
    use std::sync::mpsc;
    use tempfile::tempdir;
    use wakegate_core::is_new_wake;

    struct ScriptedClock(VecDeque<Duration>);

    impl SuspendClock for ScriptedClock {
        fn suspended(&mut self) -> Result<Duration> {
            Ok(self.0.pop_front().unwrap_or_default())
        }
    }

    fn source(samples: &[u64]) -> ClockGapSource {
        let clock = ScriptedClock(samples.iter().map(|s| Duration::from_secs(*s)).collect());
        ClockGapSource::new(Box::new(clock), Duration::from_secs(5))
    }

    #[test]
    fn clock_gap_reports_suspend_then_resume() {
        let mut source = source(&[10, 10, 70]);
        assert!(source.poll().unwrap().is_empty());
        assert!(source.poll().unwrap().is_empty());

        let events = source.poll().unwrap();
        assert_eq!(events.len(), 2);
        match (events[0], events[1]) {
            (PowerEvent::Suspend { at: slept }, PowerEvent::Resume { at: woke }) => {
                let gap = woke - slept;
                assert!(gap >= ChronoDuration::seconds(59) && gap <= ChronoDuration::seconds(61));
            }
            other => panic!("unexpected events {:?}", other),
        }
    }

    #[test]
    fn wall_clock_drift_starts_near_zero() {
        let mut clock = WallClockDrift::default();
        assert!(clock.suspended().unwrap() < Duration::from_secs(1));
    }

    #[test]
    fn small_gaps_are_ignored() {
        let mut source = source(&[0, 2, 4]);
        for _ in 0..3 {
            assert!(source.poll().unwrap().is_empty());
        }
    }

    fn monitor(store: &Arc<StateStore>) -> (PowerMonitor, mpsc::Receiver<Intent>) {
        let (tx, rx) = mpsc::channel();
        let monitor = PowerMonitor::new(
            Arc::clone(store),
            Box::new(source(&[])),
            tx,
            Duration::from_millis(10),
        );
        (monitor, rx)
    }

    #[test]
    fn resume_clears_marker_and_forces_new_wake() {
        let temp = tempdir().unwrap();
        let store = Arc::new(StateStore::open(temp.path()).unwrap());
        let (monitor, rx) = monitor(&store);

        let slept = Utc::now() - ChronoDuration::minutes(10);
        let woke = Utc::now();
        store.mark_wake_handled(woke).unwrap();

        assert!(monitor.handle_power_event(PowerEvent::Suspend { at: slept }));
        assert!(monitor.handle_power_event(PowerEvent::Resume { at: woke }));

        assert_eq!(rx.recv().unwrap(), Intent::Suspend { at: slept });
        assert_eq!(rx.recv().unwrap(), Intent::Resume { at: woke });

        let state = store.device_state().unwrap();
        assert_eq!(state.last_sleep, Some(slept));
        assert_eq!(state.last_awake, Some(woke));
        assert!(store.handled_marker().unwrap().is_none());
        assert!(is_new_wake(&state, None));
    }

    #[test]
    fn closed_queue_stops_the_monitor() {
        let temp = tempdir().unwrap();
        let store = Arc::new(StateStore::open(temp.path()).unwrap());
        let (monitor, rx) = monitor(&store);
        drop(rx);

        assert!(!monitor.handle_power_event(PowerEvent::Resume { at: Utc::now() }));
        // The store is still updated.
        assert!(store.device_state().unwrap().last_awake.is_some());
    }
}

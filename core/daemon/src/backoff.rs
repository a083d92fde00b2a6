//! Backoff policies for the daemon.
//!
//! - Startup backoff: a daemon that crash-loops (more than [`MAX_STARTS`]
//!   starts inside [`WINDOW_SECS`]) sleeps before doing anything, so a broken
//!   install does not spin a supervisor.
//! - Retry backoff: transient state-store failures in the poll loop are
//!   retried with a doubling delay instead of on every tick.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp;
use std::thread;
use std::time::Duration as StdDuration;
use tracing::warn;
use wakegate_core::records::Record;
use wakegate_core::StateStore;

const WINDOW_SECS: i64 = 120;
const MAX_STARTS: usize = 3;
const BACKOFF_STEP_SECS: u64 = 10;
const BACKOFF_MAX_SECS: u64 = 60;

/// Recent daemon start instants, kept in the state directory.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StartHistory {
    #[serde(default)]
    starts: Vec<DateTime<Utc>>,
}

impl Record for StartHistory {
    const FILE_NAME: &'static str = "daemon-backoff.json";
}

pub fn apply_startup_backoff(store: &StateStore) {
    let now = Utc::now();
    let mut history = match store.load::<StartHistory>() {
        Ok(loaded) => loaded.into_option().unwrap_or_default(),
        Err(err) => {
            warn!(error = %err, "Failed to read daemon start history");
            StartHistory::default()
        }
    };
    let backoff_secs = compute_backoff(now, &mut history);

    if let Err(err) = store.save(&history) {
        warn!(error = %err, "Failed to persist daemon start history");
    }

    if let Some(secs) = backoff_secs {
        warn!(
            count = history.starts.len(),
            backoff_secs = secs,
            "Daemon start backoff engaged"
        );
        thread::sleep(StdDuration::from_secs(secs));
    }
}

fn compute_backoff(now: DateTime<Utc>, history: &mut StartHistory) -> Option<u64> {
    history
        .starts
        .retain(|started| now.signed_duration_since(*started).num_seconds() <= WINDOW_SECS);
    history.starts.push(now);

    if history.starts.len() <= MAX_STARTS {
        return None;
    }

    let extra = history.starts.len().saturating_sub(MAX_STARTS) as u64;
    let backoff = BACKOFF_STEP_SECS.saturating_mul(extra);
    Some(cmp::min(backoff, BACKOFF_MAX_SECS))
}

/// Doubling delay between retries of a failing operation.
#[derive(Debug, Clone)]
pub struct RetryBackoff {
    initial: StdDuration,
    max: StdDuration,
    next: StdDuration,
    failures: u32,
}

impl RetryBackoff {
    pub fn new(initial: StdDuration, max: StdDuration) -> Self {
        let initial = initial.max(StdDuration::from_millis(1));
        Self {
            initial,
            max: max.max(initial),
            next: initial,
            failures: 0,
        }
    }

    /// Records a failure and returns how long to wait before retrying.
    pub fn next_delay(&mut self) -> StdDuration {
        let delay = self.next;
        self.failures = self.failures.saturating_add(1);
        self.next = cmp::min(self.next.saturating_mul(2), self.max);
        delay
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn reset(&mut self) {
        self.next = self.initial;
        self.failures = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn compute_backoff_after_threshold() {
        let now = Utc::now();
        let mut history = StartHistory {
            starts: vec![
                now - Duration::seconds(10),
                now - Duration::seconds(20),
                now - Duration::seconds(30),
            ],
        };

        let backoff = compute_backoff(now, &mut history);
        assert_eq!(backoff, Some(BACKOFF_STEP_SECS));
    }

    #[test]
    fn compute_backoff_resets_when_window_expires() {
        let now = Utc::now();
        let mut history = StartHistory {
            starts: vec![
                now - Duration::seconds(WINDOW_SECS + 10),
                now - Duration::seconds(WINDOW_SECS + 20),
            ],
        };

        let backoff = compute_backoff(now, &mut history);
        assert_eq!(backoff, None);
        assert_eq!(history.starts.len(), 1);
    }

    #[test]
    fn startup_backoff_records_each_start() {
        let temp = tempfile::tempdir().unwrap();
        let store = StateStore::open(temp.path()).unwrap();

        apply_startup_backoff(&store);
        apply_startup_backoff(&store);

        let history = store.load::<StartHistory>().unwrap().into_option().unwrap();
        assert_eq!(history.starts.len(), 2);
    }

    #[test]
    fn retry_backoff_doubles_up_to_max() {
        let mut retry = RetryBackoff::new(StdDuration::from_secs(1), StdDuration::from_secs(5));
        assert_eq!(retry.next_delay(), StdDuration::from_secs(1));
        assert_eq!(retry.next_delay(), StdDuration::from_secs(2));
        assert_eq!(retry.next_delay(), StdDuration::from_secs(4));
        assert_eq!(retry.next_delay(), StdDuration::from_secs(5));
        assert_eq!(retry.failures(), 4);

        retry.reset();
        assert_eq!(retry.next_delay(), StdDuration::from_secs(1));
    }
}

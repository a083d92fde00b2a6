//! File Activity Recorder.
//!
//! Holds the activity log in memory, records the first touch of each accepted
//! file name into `current_session`, and flushes the whole log after every
//! change. A failed flush keeps the change in memory and is retried on the
//! next event or idle tick.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use chrono::Utc;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, warn};
use wakegate_core::filter::ActivityFilter;
use wakegate_core::{
    transfer_session, FileActivityLog, Result, StateStore, Timestamp, TransferOutcome, WakeGateError,
};

const IDLE_TICK: Duration = Duration::from_millis(200);

pub struct Recorder {
    store: StateStore,
    filter: ActivityFilter,
    log: FileActivityLog,
    dirty: bool,
}

impl Recorder {
    /// Loads the existing log so a restarted recorder continues the session.
    pub fn open(store: StateStore, filter: ActivityFilter) -> Self {
        let log = match store.file_activity() {
            Ok(log) => log,
            Err(err) => {
                warn!(error = %err, "Failed to read activity log; starting empty");
                FileActivityLog::default()
            }
        };
        info!(
            current = log.current_session.len(),
            previous = log.previous_session.len(),
            "Activity log loaded"
        );
        Self {
            store,
            filter,
            log,
            dirty: false,
        }
    }

    pub fn log(&self) -> &FileActivityLog {
        &self.log
    }

    /// Records `path` if it counts as activity. Returns whether the log
    /// changed.
    pub fn handle_path(&mut self, path: &Path, at: Timestamp) -> bool {
        let Some(name) = self.filter.accept(path) else {
            return false;
        };
        if !self.log.record_touch(&name, at) {
            return false;
        }
        debug!(file = %name, "Recorded first touch");
        self.dirty = true;
        self.flush();
        true
    }

    pub fn handle_event(&mut self, event: &Event) -> usize {
        if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
            return 0;
        }
        let now = Utc::now();
        event
            .paths
            .iter()
            .filter(|path| self.handle_path(path, now))
            .count()
    }

    /// Writes the log if it has unsaved changes.
    pub fn flush(&mut self) {
        if !self.dirty {
            return;
        }
        match self.store.save(&self.log) {
            Ok(()) => self.dirty = false,
            Err(err) => warn!(error = %err, "Failed to flush activity log; will retry"),
        }
    }

    /// Graceful stop: moves the current session into the previous one and
    /// persists the result.
    pub fn finish(mut self) -> Result<TransferOutcome> {
        let outcome = transfer_session(&mut self.log);
        if outcome != TransferOutcome::NothingToTransfer || self.dirty {
            self.store.save(&self.log)?;
        }
        info!(outcome = ?outcome, "Recorder finished");
        Ok(outcome)
    }

    /// Watches `roots` until `should_stop` returns true, then finishes.
    pub fn run(mut self, roots: &[PathBuf], should_stop: fn() -> bool) -> Result<TransferOutcome> {
        let (tx, rx) = mpsc::channel();
        let mut watcher: RecommendedWatcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) => {
                    let _ = tx.send(event);
                }
                Err(err) => warn!(error = %err, "Watch error"),
            }
        })
        .map_err(|e| WakeGateError::Platform(format!("Failed to create watcher: {}", e)))?;

        let mut watched = 0;
        for root in roots {
            match watcher.watch(root, RecursiveMode::Recursive) {
                Ok(()) => {
                    watched += 1;
                    debug!(root = %root.display(), "Watching");
                }
                Err(err) => warn!(root = %root.display(), error = %err, "Failed to watch root"),
            }
        }
        if watched == 0 && !roots.is_empty() {
            return Err(WakeGateError::Platform("No watch root could be watched".to_string()));
        }
        info!(roots = watched, "Recorder running");

        while !should_stop() {
            match rx.recv_timeout(IDLE_TICK) {
                Ok(event) => {
                    self.handle_event(&event);
                }
                Err(RecvTimeoutError::Timeout) => self.flush(),
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        drop(watcher);
        // Events already queued still count.
        while let Ok(event) = rx.try_recv() {
            self.handle_event(&event);
        }
        self.finish()
    }
}

/// Resolves the directories to watch. A filesystem root is replaced by its
/// non-excluded child directories so system trees are never watched.
pub fn expand_watch_roots(roots: &[PathBuf], filter: &ActivityFilter) -> Vec<PathBuf> {
    let mut expanded = Vec::new();
    for root in roots {
        if root.parent().is_some() {
            if !filter.is_excluded_dir(root) {
                expanded.push(root.clone());
            }
            continue;
        }

        match std::fs::read_dir(root) {
            Ok(entries) => {
                for entry in entries.flatten() {
                    let path = entry.path();
                    let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
                    if is_dir && !filter.is_excluded_dir(&path) {
                        expanded.push(path);
                    }
                }
            }
            Err(err) => warn!(root = %root.display(), error = %err, "Failed to list watch root"),
        }
    }
    expanded.sort();
    expanded.dedup();
    expanded
}

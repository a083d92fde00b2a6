//! File-backed record persistence shared by every WakeGate process.
//!
//! The state directory is the only medium the daemon, recorder and gate share.
//! Each [`Record`] is one JSON file; there is no cross-process lock, so the
//! store guarantees two things instead:
//!
//! - **Atomic writes**: temp file in the same directory + rename. A reader never
//!   observes a partially written record.
//! - **Self-healing reads**: empty or malformed files load as
//!   [`Loaded::AbsentOrCorrupt`]. The typed helpers turn that into a safe default
//!   (and persist it where the record requires one) instead of failing.
//!
//! Within one process, read-modify-write helpers are serialized by an internal
//! mutex so the power monitor thread and the orchestrator cannot interleave.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use fs_err as fs;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{Result, WakeGateError};
use crate::records::{
    DeviceState, FileActivityLog, HandledWakeMarker, LockdownPolicyRecord, Record, Timestamp,
};

/// Outcome of reading a record from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Loaded<T> {
    Present(T),
    AbsentOrCorrupt,
}

impl<T> Loaded<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            Loaded::Present(value) => Some(value),
            Loaded::AbsentOrCorrupt => None,
        }
    }
}

pub struct StateStore {
    dir: PathBuf,
    rmw: Mutex<()>,
}

impl StateStore {
    /// Opens (and creates if needed) a store rooted at `dir`.
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .map_err(|e| WakeGateError::io("Failed to create state directory", e))?;
        Ok(StateStore {
            dir: dir.to_path_buf(),
            rmw: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_of<T: Record>(&self) -> PathBuf {
        self.dir.join(T::FILE_NAME)
    }

    /// Reads a record. Only I/O failures other than "not found" are errors.
    pub fn load<T: Record>(&self) -> Result<Loaded<T>> {
        let path = self.path_of::<T>();
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Loaded::AbsentOrCorrupt),
            Err(e) => return Err(WakeGateError::io(format!("Failed to read {}", T::FILE_NAME), e)),
        };

        if content.trim().is_empty() {
            warn!(record = T::FILE_NAME, "Empty record file, treating as absent");
            return Ok(Loaded::AbsentOrCorrupt);
        }

        match serde_json::from_str::<T>(&content) {
            Ok(value) => Ok(Loaded::Present(value)),
            Err(e) => {
                warn!(record = T::FILE_NAME, error = %e, "Malformed record file, treating as absent");
                Ok(Loaded::AbsentOrCorrupt)
            }
        }
    }

    /// Writes a record atomically.
    pub fn save<T: Record>(&self, value: &T) -> Result<()> {
        let path = self.path_of::<T>();
        let content = serde_json::to_string_pretty(value).map_err(|e| WakeGateError::Json {
            context: format!("Failed to serialize {}", T::FILE_NAME),
            source: e,
        })?;

        let mut temp_file = NamedTempFile::new_in(&self.dir)
            .map_err(|e| WakeGateError::io("Failed to create temp record file", e))?;
        temp_file
            .write_all(content.as_bytes())
            .map_err(|e| WakeGateError::io("Failed to write temp record file", e))?;
        temp_file
            .flush()
            .map_err(|e| WakeGateError::io("Failed to flush temp record file", e))?;
        temp_file
            .persist(&path)
            .map_err(|e| WakeGateError::io(format!("Failed to commit {}", T::FILE_NAME), e.error))?;
        Ok(())
    }

    /// Deletes a record. Deleting an absent record is not an error.
    pub fn remove<T: Record>(&self) -> Result<bool> {
        match fs::remove_file(self.path_of::<T>()) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(WakeGateError::io(format!("Failed to remove {}", T::FILE_NAME), e)),
        }
    }

    fn lock_rmw(&self) -> std::sync::MutexGuard<'_, ()> {
        self.rmw.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ─────────────────────────────────────────────────────────────────────
    // DeviceState
    // ─────────────────────────────────────────────────────────────────────

    /// Loads the device state, reinitializing it to "awake now" when absent or
    /// corrupt. A failure to persist the healed value is logged, not returned.
    pub fn device_state(&self) -> Result<DeviceState> {
        let _guard = self.lock_rmw();
        self.device_state_locked()
    }

    fn device_state_locked(&self) -> Result<DeviceState> {
        match self.load::<DeviceState>()? {
            Loaded::Present(state) => Ok(state),
            Loaded::AbsentOrCorrupt => {
                let healed = DeviceState::awake_at(Utc::now());
                if let Err(e) = self.save(&healed) {
                    warn!(error = %e, "Failed to persist reinitialized device state");
                } else {
                    debug!("Reinitialized device state");
                }
                Ok(healed)
            }
        }
    }

    /// Applies `mutate` to the current device state and persists the result.
    pub fn update_device_state<F>(&self, mutate: F) -> Result<DeviceState>
    where
        F: FnOnce(&mut DeviceState),
    {
        let _guard = self.lock_rmw();
        let mut state = self.device_state_locked()?;
        mutate(&mut state);
        self.save(&state)?;
        Ok(state)
    }

    // ─────────────────────────────────────────────────────────────────────
    // HandledWakeMarker
    // ─────────────────────────────────────────────────────────────────────

    pub fn handled_marker(&self) -> Result<Option<HandledWakeMarker>> {
        Ok(self.load::<HandledWakeMarker>()?.into_option())
    }

    /// Persists the marker unless an existing marker is already newer.
    pub fn mark_wake_handled(&self, awake: Timestamp) -> Result<HandledWakeMarker> {
        let _guard = self.lock_rmw();
        if let Some(existing) = self.handled_marker()? {
            if existing.last_handled_awake >= awake {
                return Ok(existing);
            }
        }
        let marker = HandledWakeMarker {
            last_handled_awake: awake,
        };
        self.save(&marker)?;
        Ok(marker)
    }

    pub fn clear_handled_marker(&self) -> Result<bool> {
        let _guard = self.lock_rmw();
        self.remove::<HandledWakeMarker>()
    }

    /// Records a resume at `at`: sets `last_awake` and drops the handled
    /// marker as one step with respect to [`StateStore::wake_snapshot`].
    pub fn record_resume(&self, at: Timestamp) -> Result<DeviceState> {
        let _guard = self.lock_rmw();
        let mut state = self.device_state_locked()?;
        state.last_awake = Some(at);
        self.save(&state)?;
        self.remove::<HandledWakeMarker>()?;
        Ok(state)
    }

    /// Device state and handled marker read together.
    pub fn wake_snapshot(&self) -> Result<(DeviceState, Option<HandledWakeMarker>)> {
        let _guard = self.lock_rmw();
        let state = self.device_state_locked()?;
        let marker = self.handled_marker()?;
        Ok((state, marker))
    }

    // ─────────────────────────────────────────────────────────────────────
    // FileActivityLog
    // ─────────────────────────────────────────────────────────────────────

    /// Loads the activity log, falling back to an empty one.
    pub fn file_activity(&self) -> Result<FileActivityLog> {
        Ok(self
            .load::<FileActivityLog>()?
            .into_option()
            .unwrap_or_default())
    }

    // ─────────────────────────────────────────────────────────────────────
    // LockdownPolicyRecord
    // ─────────────────────────────────────────────────────────────────────

    pub fn lockdown_policy(&self) -> Result<LockdownPolicyRecord> {
        Ok(self
            .load::<LockdownPolicyRecord>()?
            .into_option()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wake::unhandled_wake;
    use chrono::Duration;
    use std::sync::Arc;
    use std::thread;
    use tempfile::tempdir;

    #[test]
    fn device_state_heals_missing_record() {
        let temp = tempdir().unwrap();
        let store = StateStore::open(temp.path()).unwrap();

        let state = store.device_state().unwrap();
        assert!(state.last_awake.is_some());
        assert!(state.last_sleep.is_none());
        assert!(store.path_of::<DeviceState>().exists());
    }

    #[test]
    fn device_state_heals_corrupt_record() {
        let temp = tempdir().unwrap();
        let store = StateStore::open(temp.path()).unwrap();
        fs::write(store.path_of::<DeviceState>(), "{invalid json}").unwrap();

        let state = store.device_state().unwrap();
        assert!(state.last_awake.is_some());

        let reread = store.load::<DeviceState>().unwrap();
        assert_eq!(reread, Loaded::Present(state));
    }

    #[test]
    fn empty_file_loads_as_absent() {
        let temp = tempdir().unwrap();
        let store = StateStore::open(temp.path()).unwrap();
        fs::write(store.path_of::<FileActivityLog>(), "  \n").unwrap();

        assert_eq!(
            store.load::<FileActivityLog>().unwrap(),
            Loaded::AbsentOrCorrupt
        );
        assert_eq!(store.file_activity().unwrap(), FileActivityLog::default());
    }

    #[test]
    fn save_leaves_no_temp_files_behind() {
        let temp = tempdir().unwrap();
        let store = StateStore::open(temp.path()).unwrap();
        store.save(&FileActivityLog::default()).unwrap();
        store.save(&FileActivityLog::default()).unwrap();

        let entries: Vec<_> = std::fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("file_activity.json")]);
    }

    #[test]
    fn update_device_state_persists_mutation() {
        let temp = tempdir().unwrap();
        let store = StateStore::open(temp.path()).unwrap();
        let sleep = Utc::now();

        store
            .update_device_state(|state| state.last_sleep = Some(sleep))
            .unwrap();

        let state = store.device_state().unwrap();
        assert_eq!(state.last_sleep, Some(sleep));
    }

    #[test]
    fn handled_marker_never_moves_backwards() {
        let temp = tempdir().unwrap();
        let store = StateStore::open(temp.path()).unwrap();
        let now = Utc::now();

        store.mark_wake_handled(now).unwrap();
        let marker = store.mark_wake_handled(now - Duration::minutes(1)).unwrap();

        assert_eq!(marker.last_handled_awake, now);
        assert_eq!(
            store.handled_marker().unwrap().unwrap().last_handled_awake,
            now
        );
    }

    #[test]
    fn record_resume_sets_wake_and_clears_marker() {
        let temp = tempdir().unwrap();
        let store = StateStore::open(temp.path()).unwrap();
        let earlier = Utc::now() - Duration::minutes(10);
        store.mark_wake_handled(earlier).unwrap();

        let now = Utc::now();
        let state = store.record_resume(now).unwrap();

        assert_eq!(state.last_awake, Some(now));
        let (persisted, marker) = store.wake_snapshot().unwrap();
        assert_eq!(persisted.last_awake, Some(now));
        assert!(marker.is_none());
    }

    #[test]
    fn concurrent_resumes_never_gate_the_same_wake_twice() {
        let temp = tempdir().unwrap();
        let store = Arc::new(StateStore::open(temp.path()).unwrap());
        let base = Utc::now();
        store.record_resume(base).unwrap();

        let resumer = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 1..=50 {
                    store
                        .record_resume(base + Duration::seconds(i))
                        .unwrap();
                }
            })
        };

        let mut gated = Vec::new();
        let mut poll = |store: &StateStore| {
            let (state, marker) = store.wake_snapshot().unwrap();
            if let Some(awake) = unhandled_wake(&state, marker.as_ref()) {
                store.mark_wake_handled(awake).unwrap();
                gated.push(awake);
            }
        };
        while !resumer.is_finished() {
            poll(&store);
        }
        resumer.join().unwrap();
        poll(&store);
        poll(&store);

        assert!(!gated.is_empty());
        assert!(
            gated.windows(2).all(|pair| pair[0] < pair[1]),
            "a wake was gated more than once: {:?}",
            gated
        );
        assert_eq!(gated.last().copied(), Some(base + Duration::seconds(50)));
    }

    #[test]
    fn clear_handled_marker_is_idempotent() {
        let temp = tempdir().unwrap();
        let store = StateStore::open(temp.path()).unwrap();
        store.mark_wake_handled(Utc::now()).unwrap();

        assert!(store.clear_handled_marker().unwrap());
        assert!(!store.clear_handled_marker().unwrap());
        assert!(store.handled_marker().unwrap().is_none());
    }
}

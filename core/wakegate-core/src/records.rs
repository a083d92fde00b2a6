//! Persisted record types shared by the daemon, recorder and gate.
//!
//! Each record is a small JSON document stored under its own file name in the
//! state directory. The schema is stable; new fields must carry serde defaults.
//!
//! ```text
//! device_state.json     {"last_awake": ISO8601|null, "last_sleep": ISO8601|null}
//! handled_state.json    {"last_handled_awake": ISO8601}
//! file_activity.json    {"previous_session": {name: ISO8601}, "current_session": {name: ISO8601}}
//! lockdown_policy.json  {"task_switching_disabled": bool, "changed_at": ISO8601|null}
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub type Timestamp = DateTime<Utc>;

/// A record that lives in the state directory under a fixed file name.
pub trait Record: Serialize + DeserializeOwned {
    const FILE_NAME: &'static str;
}

/// Device wake/sleep timestamps written by the power monitor and the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceState {
    pub last_awake: Option<Timestamp>,
    pub last_sleep: Option<Timestamp>,
}

impl DeviceState {
    /// The state a fresh or corrupt record heals to.
    pub fn awake_at(now: Timestamp) -> Self {
        DeviceState {
            last_awake: Some(now),
            last_sleep: None,
        }
    }

    /// True when the most recent recorded transition is a wake.
    pub fn is_awake(&self) -> bool {
        match (self.last_awake, self.last_sleep) {
            (Some(awake), Some(sleep)) => awake > sleep,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }
}

impl Record for DeviceState {
    const FILE_NAME: &'static str = "device_state.json";
}

/// The most recent wake instant the daemon has already gated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandledWakeMarker {
    pub last_handled_awake: Timestamp,
}

impl Record for HandledWakeMarker {
    const FILE_NAME: &'static str = "handled_state.json";
}

/// Filename → first-touch timestamp.
pub type SessionFiles = BTreeMap<String, Timestamp>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileActivityLog {
    #[serde(default)]
    pub previous_session: SessionFiles,
    #[serde(default)]
    pub current_session: SessionFiles,
}

impl FileActivityLog {
    /// Records a touch. Only the first touch of a filename in the current
    /// session is kept; returns whether the log changed.
    pub fn record_touch(&mut self, file_name: &str, at: Timestamp) -> bool {
        if self.current_session.contains_key(file_name) {
            return false;
        }
        self.current_session.insert(file_name.to_string(), at);
        true
    }

    pub fn previous_file_names(&self) -> Vec<String> {
        self.previous_session.keys().cloned().collect()
    }
}

impl Record for FileActivityLog {
    const FILE_NAME: &'static str = "file_activity.json";
}

/// Whether a gate left the OS task-switch policy disabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockdownPolicyRecord {
    #[serde(default)]
    pub task_switching_disabled: bool,
    #[serde(default)]
    pub changed_at: Option<Timestamp>,
}

impl Record for LockdownPolicyRecord {
    const FILE_NAME: &'static str = "lockdown_policy.json";
}

//! Wake classification.
//!
//! A wake is *new* when the device is awake (`last_awake` set and newer than
//! any `last_sleep`) and the daemon has not already gated that instant. A
//! missing [`HandledWakeMarker`] always counts as "not handled": the power
//! monitor deletes the marker on resume to force the next poll to gate.

use crate::records::{DeviceState, HandledWakeMarker, Timestamp};

/// Returns the wake instant to gate, or `None` when nothing needs handling.
pub fn unhandled_wake(
    state: &DeviceState,
    marker: Option<&HandledWakeMarker>,
) -> Option<Timestamp> {
    let awake = state.last_awake?;
    if let Some(sleep) = state.last_sleep {
        if awake <= sleep {
            return None;
        }
    }
    match marker {
        Some(marker) if awake <= marker.last_handled_awake => None,
        _ => Some(awake),
    }
}

pub fn is_new_wake(state: &DeviceState, marker: Option<&HandledWakeMarker>) -> bool {
    unhandled_wake(state, marker).is_some()
}

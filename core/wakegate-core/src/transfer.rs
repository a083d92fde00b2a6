//! Session transfer at a sleep boundary.
//!
//! `current_session` becomes `previous_session` when it holds at least
//! [`REPLACE_THRESHOLD`] files; a shorter session is merged in instead so a
//! brief pre-sleep session cannot erase a richer challenge pool. Either way the
//! current session is cleared. Applying the transfer to an empty current
//! session changes nothing.

use tracing::info;

use crate::error::Result;
use crate::records::FileActivityLog;
use crate::store::StateStore;

/// Minimum current-session size that replaces the previous session outright.
pub const REPLACE_THRESHOLD: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    Replaced { files: usize },
    Merged { added: usize },
    NothingToTransfer,
}

/// Applies the transfer policy in memory.
pub fn transfer_session(log: &mut FileActivityLog) -> TransferOutcome {
    if log.current_session.is_empty() {
        return TransferOutcome::NothingToTransfer;
    }

    let current = std::mem::take(&mut log.current_session);
    if current.len() >= REPLACE_THRESHOLD {
        let files = current.len();
        log.previous_session = current;
        TransferOutcome::Replaced { files }
    } else {
        let mut added = 0;
        for (name, touched_at) in current {
            if !log.previous_session.contains_key(&name) {
                log.previous_session.insert(name, touched_at);
                added += 1;
            }
        }
        TransferOutcome::Merged { added }
    }
}

/// Loads the persisted log, transfers, and writes it back.
///
/// Callers outside the recorder must only invoke this after the recorder
/// process has fully exited.
pub fn transfer_persisted_session(store: &StateStore) -> Result<TransferOutcome> {
    let mut log = store.file_activity()?;
    let outcome = transfer_session(&mut log);
    if outcome != TransferOutcome::NothingToTransfer {
        store.save(&log)?;
        info!(outcome = ?outcome, "Session activity transferred");
    }
    Ok(outcome)
}

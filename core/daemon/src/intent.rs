//! Work items for the orchestrator's single consumer queue.
//!
//! Producers: the power monitor thread (suspend/resume) and the signal
//! watcher (shutdown). A receive timeout on the queue is the poll tick.

use wakegate_core::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// The device went to sleep at `at`; stop the recorder.
    Suspend { at: Timestamp },
    /// The device woke at `at`; the next poll must re-check for a wake.
    Resume { at: Timestamp },
    Shutdown,
}

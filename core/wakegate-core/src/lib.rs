//! # wakegate-core
//!
//! Shared logic for WakeGate: re-authenticating the user after the device
//! wakes with a recall challenge ("which files did you touch last session?").
//!
//! Three processes cooperate and share state only through the
//! [`store::StateStore`] directory:
//!
//! ```text
//! power events ─┐
//!               ▼
//!  wakegate-daemon ──spawn/stop──▶ wakegate-recorder ──writes──▶ file_activity.json
//!        │                                                         │
//!        └──────spawn, wait for exit 0──▶ wakegate-gate ◀──reads───┘
//! ```
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime. Each process is a small loop.
//! - **Self-healing state**: Missing or corrupt records load as safe defaults.
//! - **Atomic writes**: Readers never see a partial record.
//! - **Capability seams**: OS-specific lockdown and power notification sit
//!   behind traits so the state machine never depends on the platform.

pub mod challenge;
pub mod config;
pub mod error;
pub mod filter;
pub mod lockdown;
pub mod logging;
pub mod records;
pub mod signals;
pub mod store;
pub mod transfer;
pub mod wake;

pub use challenge::{Challenge, Verdict};
pub use config::RuntimeConfig;
pub use error::{Result, WakeGateError};
pub use records::{DeviceState, FileActivityLog, HandledWakeMarker, LockdownPolicyRecord, Timestamp};
pub use store::{Loaded, StateStore};
pub use transfer::{transfer_persisted_session, transfer_session, TransferOutcome};
pub use wake::{is_new_wake, unhandled_wake};

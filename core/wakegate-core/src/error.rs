//! Error types for wakegate-core operations.
//!
//! Corrupt or missing records are not errors here: the typed loaders in
//! [`crate::store`] self-heal them. What surfaces as an error is what a caller
//! can act on (retry, escalate, fall back).

use std::path::PathBuf;

/// All errors that can occur in wakegate-core operations.
#[derive(Debug, thiserror::Error)]
pub enum WakeGateError {
    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    // ─────────────────────────────────────────────────────────────────────
    // I/O Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    // ─────────────────────────────────────────────────────────────────────
    // Process Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Process {pid} did not exit after a stop request")]
    ProcessUnresponsive { pid: u32 },

    // ─────────────────────────────────────────────────────────────────────
    // Lockdown Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Isolated input surface unavailable: {0}")]
    IsolationUnavailable(String),

    #[error("Platform operation failed: {0}")]
    Platform(String),
}

impl WakeGateError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        WakeGateError::Io {
            context: context.into(),
            source,
        }
    }
}

/// Convenience type alias for Results using WakeGateError.
pub type Result<T> = std::result::Result<T, WakeGateError>;

impl From<WakeGateError> for String {
    fn from(err: WakeGateError) -> String {
        err.to_string()
    }
}

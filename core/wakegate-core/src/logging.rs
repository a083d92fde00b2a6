//! Tracing setup shared by the WakeGate binaries.
//!
//! Every process writes a daily-rolling log under `<state_dir>/logs/`. The
//! gate owns the terminal, so it asks for file output only.

use std::env;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::logs_dir;

pub const DEBUG_LOG_ENV: &str = "WAKEGATE_DEBUG_LOG";

fn env_filter() -> EnvFilter {
    let debug_enabled = env::var(DEBUG_LOG_ENV)
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Installs the global subscriber. Keep the returned guard alive for the
/// lifetime of the process or buffered file output is lost.
pub fn init(component: &str, state_dir: Option<&Path>, to_stderr: bool) -> Option<WorkerGuard> {
    let (file_layer, guard) = match state_dir {
        Some(dir) => {
            let logs = logs_dir(dir);
            match fs_err::create_dir_all(&logs) {
                Ok(()) => {
                    let appender =
                        tracing_appender::rolling::daily(&logs, format!("{}.log", component));
                    let (writer, guard) = tracing_appender::non_blocking(appender);
                    let layer = fmt::layer().with_writer(writer).with_ansi(false);
                    (Some(layer), Some(guard))
                }
                Err(err) => {
                    if to_stderr {
                        eprintln!("wakegate: failed to create log directory: {}", err);
                    }
                    (None, None)
                }
            }
        }
        None => (None, None),
    };

    let stderr_layer = to_stderr.then(|| fmt::layer().with_writer(std::io::stderr));

    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(file_layer)
        .with(stderr_layer)
        .try_init();

    guard
}

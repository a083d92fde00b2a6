//! WakeGate daemon entrypoint.
//!
//! Long-lived service that owns the session lifecycle: it watches for wakes,
//! runs the challenge gate, and keeps the file activity recorder running
//! between gates. All coordination with the child processes goes through the
//! state directory.
//!
//! ## Subcommands
//!
//! - (none): run the service
//! - `status`: print the persisted records and whether a wake is pending

mod backoff;
mod intent;
mod orchestrator;
mod power;
mod process;

use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{debug, error, info, warn};
use wakegate_core::config::{self, RuntimeConfig, GATE_BIN, RECORDER_BIN};
use wakegate_core::{is_new_wake, logging, signals, DeviceState, Result, StateStore, WakeGateError};

use orchestrator::{Orchestrator, OrchestratorSettings};
use power::{ClockGapSource, PowerMonitor};
use process::CommandLauncher;

#[derive(Parser)]
#[command(name = "wakegate-daemon")]
#[command(about = "Re-authenticates the user with a recall challenge after wake")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the persisted state records and the pending-wake verdict
    Status,
}

fn main() {
    let cli = Cli::parse();

    let state_dir = match config::state_dir() {
        Ok(dir) => dir,
        Err(err) => {
            eprintln!("wakegate-daemon: {}", err);
            std::process::exit(1);
        }
    };

    match cli.command {
        Some(Commands::Status) => {
            if let Err(err) = print_status(&state_dir) {
                eprintln!("wakegate-daemon: {}", err);
                std::process::exit(1);
            }
        }
        None => run_service(state_dir),
    }
}

fn run_service(state_dir: PathBuf) {
    // The gate inherits this terminal; stderr output would land on its screen.
    let terminal_shared = io::stderr().is_terminal();
    let _logging_guard = logging::init("daemon", Some(&state_dir), !terminal_shared);
    if terminal_shared {
        info!("stderr is a terminal; logging to file only");
    }

    let store = match StateStore::open(&state_dir) {
        Ok(store) => Arc::new(store),
        Err(err) => {
            error!(error = %err, path = %state_dir.display(), "Failed to open state directory");
            std::process::exit(1);
        }
    };

    backoff::apply_startup_backoff(&store);

    if let Err(err) = signals::install_shutdown_handler() {
        error!(error = %err, "Failed to install signal handlers");
        std::process::exit(1);
    }

    let runtime = config::load_or_default(&state_dir);
    let launcher = match build_launcher(&runtime, &state_dir) {
        Ok(launcher) => launcher,
        Err(err) => {
            error!(error = %err, "Failed to resolve child commands");
            std::process::exit(1);
        }
    };
    info!(
        state_dir = %state_dir.display(),
        poll_interval_ms = runtime.service.poll_interval_ms,
        "WakeGate daemon started"
    );

    // Recorders from a previous instance must be gone before the log is
    // touched.
    let stats = process::cleanup_orphaned_recorders(RECORDER_BIN, runtime.service.stop_timeout());
    if stats.terminated + stats.forced > 0 {
        info!(
            terminated = stats.terminated,
            forced = stats.forced,
            "Stopped orphaned recorders"
        );
    }
    for err in &stats.errors {
        warn!(error = %err, "Orphan cleanup error");
    }
    if !stats.all_gone() {
        error!(pids = ?stats.survivors, "Orphaned recorders survived SIGKILL");
    }

    let (intents_tx, intents_rx) = mpsc::channel();
    let monitor = PowerMonitor::new(
        Arc::clone(&store),
        Box::new(ClockGapSource::from_config(&runtime.power)),
        intents_tx,
        std::time::Duration::from_millis(runtime.power.sample_interval_ms),
    );
    let monitor_handle = match monitor.spawn() {
        Ok(handle) => Some(handle),
        Err(err) => {
            warn!(error = %err, "Failed to start power monitor; relying on polling only");
            None
        }
    };

    let mut orchestrator = Orchestrator::new(
        Arc::clone(&store),
        launcher,
        OrchestratorSettings::from(&runtime.service),
    );
    orchestrator.startup(stats.all_gone());
    orchestrator.run(&intents_rx);
    debug!(
        state = ?orchestrator.state(),
        recorder_running = orchestrator.recorder_running(),
        "Orchestrator loop exited"
    );

    if let Some(handle) = monitor_handle {
        if handle.join().is_err() {
            warn!("Power monitor thread panicked");
        }
    }
    info!("WakeGate daemon stopped");
}

fn build_launcher(runtime: &RuntimeConfig, state_dir: &Path) -> Result<CommandLauncher> {
    let recorder = config::resolve_command(runtime.service.recorder_command.as_deref(), RECORDER_BIN)?;
    let gate = config::resolve_command(runtime.service.gate_command.as_deref(), GATE_BIN)?;
    Ok(CommandLauncher::new(recorder, gate, state_dir.to_path_buf()))
}

fn print_status(state_dir: &Path) -> Result<()> {
    let store = StateStore::open(state_dir)?;
    let device = store.load::<DeviceState>()?.into_option();
    let marker = store.handled_marker()?;
    let activity = store.file_activity()?;
    let policy = store.lockdown_policy()?;

    let pending = device
        .as_ref()
        .map(|state| is_new_wake(state, marker.as_ref()))
        .unwrap_or(false);

    let status = json!({
        "state_dir": store.dir().display().to_string(),
        "device_state": device,
        "awake": device.as_ref().is_some_and(DeviceState::is_awake),
        "handled_state": marker,
        "file_activity": activity,
        "lockdown_policy": policy,
        "is_new_wake": pending,
    });
    let rendered = serde_json::to_string_pretty(&status).map_err(|e| WakeGateError::Json {
        context: "Failed to render status".to_string(),
        source: e,
    })?;
    println!("{}", rendered);
    Ok(())
}

//! wakegate-recorder: records which files the user touches during a session.
//!
//! Spawned and stopped by the daemon. Runs until SIGTERM/SIGINT, then moves
//! the current session into the previous one and exits 0.

mod recorder;

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};
use wakegate_core::config;
use wakegate_core::filter::ActivityFilter;
use wakegate_core::{logging, signals, StateStore};

use recorder::{expand_watch_roots, Recorder};

#[derive(Parser)]
#[command(name = "wakegate-recorder")]
#[command(about = "WakeGate file activity recorder")]
#[command(version)]
struct Cli {
    /// Directory to watch instead of the configured roots (repeatable)
    #[arg(long = "watch", value_name = "DIR")]
    watch: Vec<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    let state_dir = match config::state_dir() {
        Ok(dir) => dir,
        Err(err) => {
            eprintln!("wakegate-recorder: {}", err);
            std::process::exit(1);
        }
    };
    let _logging_guard = logging::init("recorder", Some(&state_dir), true);

    if let Err(err) = signals::install_shutdown_handler() {
        error!(error = %err, "Failed to install signal handlers");
        std::process::exit(1);
    }

    let store = match StateStore::open(&state_dir) {
        Ok(store) => store,
        Err(err) => {
            error!(error = %err, "Failed to open state directory");
            std::process::exit(1);
        }
    };

    let runtime = config::load_or_default(&state_dir);
    let filter = ActivityFilter::from_config(&runtime.recorder, &state_dir);

    let configured = if cli.watch.is_empty() {
        runtime.recorder.watch_roots.clone()
    } else {
        cli.watch
    };
    let roots = expand_watch_roots(&configured, &filter);
    info!(roots = roots.len(), "Watch roots resolved");

    let recorder = Recorder::open(store, filter);
    match recorder.run(&roots, signals::shutdown_requested) {
        Ok(outcome) => info!(outcome = ?outcome, "Recorder stopped"),
        Err(err) => {
            error!(error = %err, "Recorder failed");
            std::process::exit(1);
        }
    }
}

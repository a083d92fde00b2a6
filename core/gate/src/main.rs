//! wakegate-gate: the recall challenge shown after the device wakes.
//!
//! Exits 0 only once the user picks exactly the files from their previous
//! session. Any other exit (signal, terminal failure) makes the daemon launch
//! a fresh gate.

mod app;
mod surface;
mod ui;

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyCode, KeyEventKind, MouseButton, MouseEventKind};
use ratatui::{backend::CrosstermBackend, Terminal};
use tracing::{debug, error, info, warn};
use wakegate_core::config::{self, IsolationMode};
use wakegate_core::lockdown::{
    engage, DegradedSurface, FocusEnforcer, InputEvent, InputPolicy, LockdownSurface,
    RecordedPolicy,
};
use wakegate_core::signals::{self, JobControlPolicy};
use wakegate_core::{logging, Challenge, Result, StateStore, WakeGateError};

use app::GateApp;
use surface::{key_input, pointer_input, RawTerminalSurface, TerminalFocus, TerminalScreen};

const EVENT_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, PartialEq, Eq)]
enum GateOutcome {
    Unlocked,
    Interrupted,
}

fn main() {
    let state_dir = match config::state_dir() {
        Ok(dir) => dir,
        Err(err) => {
            eprintln!("wakegate-gate: {}", err);
            std::process::exit(1);
        }
    };
    let _logging_guard = logging::init("gate", Some(&state_dir), false);

    if let Err(err) = signals::install_shutdown_handler() {
        error!(error = %err, "Failed to install signal handlers");
        std::process::exit(1);
    }

    let store = match StateStore::open(&state_dir) {
        Ok(store) => Arc::new(store),
        Err(err) => {
            error!(error = %err, "Failed to open state directory");
            std::process::exit(1);
        }
    };
    let runtime = config::load_or_default(&state_dir);

    match run(store, &runtime.gate) {
        Ok(GateOutcome::Unlocked) => {
            info!("Challenge passed");
            std::process::exit(0);
        }
        Ok(GateOutcome::Interrupted) => {
            info!("Gate interrupted before unlock");
            std::process::exit(1);
        }
        Err(err) => {
            error!(error = %err, "Gate failed");
            eprintln!("wakegate-gate: {}", err);
            std::process::exit(1);
        }
    }
}

fn run(store: Arc<StateStore>, gate: &config::GateConfig) -> Result<GateOutcome> {
    let previous = match store.file_activity() {
        Ok(log) => log.previous_file_names(),
        Err(err) => {
            warn!(error = %err, "Failed to read activity log; using decoys only");
            Vec::new()
        }
    };
    let mut app = GateApp::new(Challenge::build(previous, &mut rand::thread_rng()));
    info!(
        items = app.challenge().displayed().len(),
        correct = app.challenge().correct().len(),
        "Challenge built"
    );

    let primary: Option<Box<dyn LockdownSurface>> = match gate.isolation {
        IsolationMode::Auto => Some(Box::new(RawTerminalSurface::default())),
        IsolationMode::Degraded => None,
    };
    let degraded = Box::new(DegradedSurface::new(RecordedPolicy::new(
        JobControlPolicy,
        Arc::clone(&store),
    )));
    let mut lockdown = engage(primary, degraded)?;
    let isolated = lockdown.is_isolated();

    let mut screen =
        TerminalScreen::enter().map_err(|e| WakeGateError::io("Failed to prepare terminal", e))?;
    let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout()))
        .map_err(|e| WakeGateError::io("Failed to create terminal", e))?;

    let outcome = event_loop(&mut terminal, &mut app, gate, isolated);

    // Lift the lockdown before handing the terminal back.
    let released = lockdown.release();
    if let Err(err) = terminal.show_cursor() {
        debug!(error = %err, "Failed to show cursor");
    }
    if let Err(err) = screen.leave() {
        warn!(error = %err, "Failed to restore terminal screen");
    }
    let outcome = outcome?;
    released?;
    info!(
        attempts = app.attempts(),
        unlocked = app.is_unlocked(),
        surface = lockdown.surface_name(),
        "Gate closed"
    );
    Ok(outcome)
}

fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut GateApp,
    gate: &config::GateConfig,
    isolated: bool,
) -> Result<GateOutcome> {
    let mut policy = InputPolicy::new(gate.click_radius);
    let mut enforcer = FocusEnforcer::new(gate.focus_interval());
    let mut focus = TerminalFocus::default();

    loop {
        if signals::shutdown_requested() {
            return Ok(GateOutcome::Interrupted);
        }

        terminal
            .draw(|f| ui::draw(f, app, isolated))
            .map_err(|e| WakeGateError::io("Failed to draw gate", e))?;
        policy.set_hotspots(app.hotspots());

        if enforcer.tick(Instant::now(), &mut focus) {
            debug!(count = enforcer.refocus_count(), "Gate re-focused");
        }

        let ready =
            event::poll(EVENT_POLL).map_err(|e| WakeGateError::io("Failed to poll terminal", e))?;
        if !ready {
            continue;
        }
        let event = event::read().map_err(|e| WakeGateError::io("Failed to read terminal", e))?;
        focus.observe(&event);

        let verdict = match event {
            Event::Key(key) if key.kind != KeyEventKind::Release => {
                if policy.suppresses(&InputEvent::Key(key_input(&key))) {
                    debug!(code = ?key.code, modifiers = ?key.modifiers, "Suppressed key");
                    continue;
                }
                match key.code {
                    KeyCode::Up | KeyCode::BackTab | KeyCode::Char('k') => {
                        app.previous();
                        None
                    }
                    KeyCode::Down | KeyCode::Tab | KeyCode::Char('j') => {
                        app.next();
                        None
                    }
                    KeyCode::Char(' ') | KeyCode::Enter => app.activate(),
                    _ => None,
                }
            }
            Event::Mouse(mouse) => {
                if policy.suppresses(&pointer_input(&mouse)) {
                    continue;
                }
                match mouse.kind {
                    MouseEventKind::Down(MouseButton::Left) => app.click(mouse.column, mouse.row),
                    _ => None,
                }
            }
            _ => None,
        };

        match verdict {
            Some(verdict) if verdict.is_accepted() => return Ok(GateOutcome::Unlocked),
            Some(verdict) => info!(verdict = ?verdict, attempts = app.attempts(), "Challenge rejected"),
            None => {}
        }
    }
}

//! Terminal implementations of the lockdown capabilities.
//!
//! - [`RawTerminalSurface`] is the isolated surface: with the tty in raw mode
//!   the line discipline no longer turns Ctrl-C/Ctrl-Z/Ctrl-\ into signals, so
//!   every key reaches the gate as input and nothing can suspend or interrupt
//!   it from the keyboard.
//! - Without a tty, lockdown degrades to ignoring the job-control signals
//!   (see `wakegate_core::signals::JobControlPolicy`).
//! - [`TerminalScreen`] owns the alternate screen and mouse/focus reporting
//!   for either surface.

use std::io::{self, Write};

use crossterm::event::{
    DisableFocusChange, DisableMouseCapture, EnableFocusChange, EnableMouseCapture, Event, KeyCode,
    KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use tracing::{debug, warn};
use wakegate_core::lockdown::{
    FocusProbe, InputEvent, Key, KeyInput, LockdownSurface, Modifiers, Point, PointerKind,
};
use wakegate_core::{Result, WakeGateError};

// ═══════════════════════════════════════════════════════════════════════════════
// Surfaces
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
pub struct RawTerminalSurface {
    raw: bool,
}

fn stdin_is_tty() -> bool {
    // SAFETY: isatty only inspects the descriptor.
    unsafe { libc::isatty(libc::STDIN_FILENO) == 1 }
}

impl LockdownSurface for RawTerminalSurface {
    fn name(&self) -> &'static str {
        "raw-terminal"
    }

    fn is_isolated(&self) -> bool {
        true
    }

    fn enter(&mut self) -> Result<()> {
        if !stdin_is_tty() {
            return Err(WakeGateError::IsolationUnavailable(
                "stdin is not a terminal".to_string(),
            ));
        }
        enable_raw_mode()
            .map_err(|e| WakeGateError::IsolationUnavailable(format!("raw mode: {}", e)))?;
        self.raw = true;
        Ok(())
    }

    fn exit(&mut self) -> Result<()> {
        if !self.raw {
            return Ok(());
        }
        disable_raw_mode().map_err(|e| WakeGateError::io("Failed to leave raw mode", e))?;
        self.raw = false;
        Ok(())
    }
}

/// Alternate screen plus mouse and focus reporting. Restored on drop.
pub struct TerminalScreen {
    active: bool,
}

impl TerminalScreen {
    pub fn enter() -> io::Result<Self> {
        execute!(
            io::stdout(),
            EnterAlternateScreen,
            EnableMouseCapture,
            EnableFocusChange
        )?;
        Ok(Self { active: true })
    }

    pub fn leave(&mut self) -> io::Result<()> {
        if !self.active {
            return Ok(());
        }
        self.active = false;
        execute!(
            io::stdout(),
            DisableFocusChange,
            DisableMouseCapture,
            LeaveAlternateScreen
        )
    }
}

impl Drop for TerminalScreen {
    fn drop(&mut self) {
        if let Err(err) = self.leave() {
            warn!(error = %err, "Failed to restore terminal screen");
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Focus
// ═══════════════════════════════════════════════════════════════════════════════

/// Tracks focus from terminal focus reports. Re-focusing asks the terminal
/// emulator to raise and de-iconify its window (xterm window operations).
#[derive(Debug)]
pub struct TerminalFocus {
    focused: bool,
}

impl Default for TerminalFocus {
    fn default() -> Self {
        Self { focused: true }
    }
}

impl TerminalFocus {
    pub fn observe(&mut self, event: &Event) {
        match event {
            Event::FocusGained => self.focused = true,
            Event::FocusLost => {
                debug!("Terminal lost focus");
                self.focused = false;
            }
            _ => {}
        }
    }
}

impl FocusProbe for TerminalFocus {
    fn is_foreground(&mut self) -> bool {
        self.focused
    }

    fn bring_to_front(&mut self) -> Result<()> {
        let mut stdout = io::stdout();
        stdout
            .write_all(b"\x1b[1t\x1b[5t")
            .and_then(|()| stdout.flush())
            .map_err(|e| WakeGateError::io("Failed to request window focus", e))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Event conversion
// ═══════════════════════════════════════════════════════════════════════════════

fn modifiers(mods: KeyModifiers) -> Modifiers {
    Modifiers {
        alt: mods.contains(KeyModifiers::ALT),
        ctrl: mods.contains(KeyModifiers::CONTROL),
        shift: mods.contains(KeyModifiers::SHIFT),
        meta: mods.intersects(KeyModifiers::SUPER | KeyModifiers::META | KeyModifiers::HYPER),
    }
}

pub fn key_input(event: &KeyEvent) -> KeyInput {
    let key = match event.code {
        KeyCode::Tab | KeyCode::BackTab => Key::Tab,
        KeyCode::Esc => Key::Escape,
        KeyCode::Delete => Key::Delete,
        KeyCode::F(n) => Key::F(n),
        KeyCode::Enter => Key::Enter,
        KeyCode::Char(' ') => Key::Space,
        KeyCode::Char(c) => Key::Char(c),
        KeyCode::Modifier(modifier) => {
            use crossterm::event::ModifierKeyCode::*;
            match modifier {
                LeftSuper | RightSuper | LeftMeta | RightMeta | LeftHyper | RightHyper => Key::Meta,
                _ => Key::Other,
            }
        }
        _ => Key::Other,
    };
    KeyInput {
        key,
        modifiers: modifiers(event.modifiers),
    }
}

pub fn pointer_input(event: &MouseEvent) -> InputEvent {
    let kind = match event.kind {
        MouseEventKind::Down(MouseButton::Left) => PointerKind::PrimaryDown,
        MouseEventKind::Up(MouseButton::Left) => PointerKind::PrimaryUp,
        MouseEventKind::Down(_) => PointerKind::SecondaryDown,
        MouseEventKind::Moved | MouseEventKind::Drag(_) => PointerKind::Moved,
        MouseEventKind::ScrollDown
        | MouseEventKind::ScrollUp
        | MouseEventKind::ScrollLeft
        | MouseEventKind::ScrollRight => PointerKind::Scroll,
        _ => PointerKind::Other,
    };
    InputEvent::Pointer {
        kind,
        at: Point {
            x: i32::from(event.column),
            y: i32::from(event.row),
        },
    }
}

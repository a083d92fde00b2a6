//! Input lockdown for the challenge gate.
//!
//! # Surfaces
//!
//! A [`LockdownSurface`] is whatever keeps input and focus on the gate. The
//! gate tries the primary (isolated) surface first; if it reports
//! [`WakeGateError::IsolationUnavailable`], [`engage`] falls back to a
//! [`DegradedSurface`] that disables task switching through a
//! [`TaskSwitchPolicy`]. Callers only ever hold a [`LockdownGuard`], so the
//! state machine never depends on which surface is active.
//!
//! # Cleanup
//!
//! The guard exits its surface on [`LockdownGuard::release`] or on drop
//! (including unwinding). A process killed outright cannot run either, so the
//! degraded surface records the disabled policy in the state store and the
//! daemon calls [`restore_task_switching`] after every gate exit.
//!
//! # Input Filtering
//!
//! [`InputPolicy`] is the veto predicate for a global input hook: escape
//! combinations are always suppressed, pointer input is suppressed unless it
//! is a primary click near one of the gate's hotspots.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::{Result, WakeGateError};
use crate::records::LockdownPolicyRecord;
use crate::store::StateStore;

// ═══════════════════════════════════════════════════════════════════════════════
// Input Model
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Tab,
    Escape,
    Delete,
    F(u8),
    /// OS-menu key (Windows/Super/Command).
    Meta,
    Enter,
    Space,
    Char(char),
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub alt: bool,
    pub ctrl: bool,
    pub shift: bool,
    pub meta: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyInput {
    pub key: Key,
    pub modifiers: Modifiers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerKind {
    PrimaryDown,
    PrimaryUp,
    SecondaryDown,
    Moved,
    Scroll,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    Key(KeyInput),
    Pointer { kind: PointerKind, at: Point },
}

/// Window-switch and task-escape combinations.
pub fn is_escape_combo(input: &KeyInput) -> bool {
    let m = input.modifiers;
    match input.key {
        Key::Meta => true,
        Key::Tab if m.alt || m.meta => true,
        Key::F(4) if m.alt => true,
        Key::Escape if m.ctrl || m.alt => true,
        Key::Delete if m.ctrl && m.alt => true,
        _ => m.meta,
    }
}

#[derive(Debug, Clone, Default)]
pub struct InputPolicy {
    hotspots: Vec<Point>,
    radius: i32,
}

impl InputPolicy {
    pub fn new(radius: i32) -> Self {
        Self {
            hotspots: Vec::new(),
            radius: radius.max(0),
        }
    }

    /// Replaces the clickable points (verification control and items).
    pub fn set_hotspots(&mut self, hotspots: Vec<Point>) {
        self.hotspots = hotspots;
    }

    pub fn hotspots(&self) -> &[Point] {
        &self.hotspots
    }

    fn near_hotspot(&self, at: Point) -> bool {
        self.hotspots
            .iter()
            .any(|h| (at.x - h.x).abs() <= self.radius && (at.y - h.y).abs() <= self.radius)
    }

    /// True when the event must not reach anything, the gate included.
    pub fn suppresses(&self, event: &InputEvent) -> bool {
        match event {
            InputEvent::Key(input) => is_escape_combo(input),
            InputEvent::Pointer {
                kind: PointerKind::PrimaryDown,
                at,
            } => !self.near_hotspot(*at),
            InputEvent::Pointer { .. } => true,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Capability Interfaces
// ═══════════════════════════════════════════════════════════════════════════════

pub trait LockdownSurface {
    fn name(&self) -> &'static str;

    /// Isolated surfaces make switching away structurally impossible.
    fn is_isolated(&self) -> bool;

    fn enter(&mut self) -> Result<()>;

    fn exit(&mut self) -> Result<()>;
}

/// OS-level switch for the task switcher / task manager.
pub trait TaskSwitchPolicy {
    fn set_task_switching(&mut self, enabled: bool) -> Result<()>;
}

/// Foreground tracking for focus enforcement.
pub trait FocusProbe {
    fn is_foreground(&mut self) -> bool;

    fn bring_to_front(&mut self) -> Result<()>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// Degraded Surface
// ═══════════════════════════════════════════════════════════════════════════════

/// Lockdown without isolation: task switching disabled at the policy level,
/// relying on hook interception and focus enforcement for the rest.
pub struct DegradedSurface<P: TaskSwitchPolicy> {
    policy: P,
    engaged: bool,
}

impl<P: TaskSwitchPolicy> DegradedSurface<P> {
    pub fn new(policy: P) -> Self {
        Self {
            policy,
            engaged: false,
        }
    }
}

impl<P: TaskSwitchPolicy> LockdownSurface for DegradedSurface<P> {
    fn name(&self) -> &'static str {
        "degraded"
    }

    fn is_isolated(&self) -> bool {
        false
    }

    fn enter(&mut self) -> Result<()> {
        self.policy.set_task_switching(false)?;
        self.engaged = true;
        Ok(())
    }

    fn exit(&mut self) -> Result<()> {
        if !self.engaged {
            return Ok(());
        }
        self.policy.set_task_switching(true)?;
        self.engaged = false;
        Ok(())
    }
}

/// Wraps a platform policy and mirrors its state into the store so a gate
/// that dies mid-lockdown can be cleaned up by the daemon.
pub struct RecordedPolicy<P: TaskSwitchPolicy> {
    inner: P,
    store: Arc<StateStore>,
}

impl<P: TaskSwitchPolicy> RecordedPolicy<P> {
    pub fn new(inner: P, store: Arc<StateStore>) -> Self {
        Self { inner, store }
    }
}

impl<P: TaskSwitchPolicy> TaskSwitchPolicy for RecordedPolicy<P> {
    fn set_task_switching(&mut self, enabled: bool) -> Result<()> {
        let record = LockdownPolicyRecord {
            task_switching_disabled: !enabled,
            changed_at: Some(Utc::now()),
        };
        if enabled {
            self.inner.set_task_switching(true)?;
            self.store.save(&record)
        } else {
            // Persisted before disabling; see restore_task_switching.
            self.store.save(&record)?;
            self.inner.set_task_switching(false)
        }
    }
}

/// Re-enables task switching if a gate left it disabled. Returns whether a
/// restore was needed.
pub fn restore_task_switching<P: TaskSwitchPolicy>(store: &StateStore, policy: &mut P) -> Result<bool> {
    let record = store.lockdown_policy()?;
    if !record.task_switching_disabled {
        return Ok(false);
    }
    warn!(since = ?record.changed_at, "Task switching left disabled; restoring");
    policy.set_task_switching(true)?;
    store.save(&LockdownPolicyRecord {
        task_switching_disabled: false,
        changed_at: Some(Utc::now()),
    })?;
    Ok(true)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Guard
// ═══════════════════════════════════════════════════════════════════════════════

pub struct LockdownGuard {
    surface: Box<dyn LockdownSurface>,
    active: bool,
}

impl std::fmt::Debug for LockdownGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockdownGuard")
            .field("surface", &self.surface.name())
            .field("active", &self.active)
            .finish()
    }
}

impl LockdownGuard {
    pub fn surface_name(&self) -> &'static str {
        self.surface.name()
    }

    pub fn is_isolated(&self) -> bool {
        self.surface.is_isolated()
    }

    /// Lifts the lockdown. Idempotent.
    pub fn release(&mut self) -> Result<()> {
        if !self.active {
            return Ok(());
        }
        self.active = false;
        self.surface.exit()?;
        info!(surface = self.surface.name(), "Lockdown released");
        Ok(())
    }
}

impl Drop for LockdownGuard {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            warn!(error = %err, "Failed to release lockdown during drop");
        }
    }
}

/// Enters the primary surface, falling back to `degraded` when isolation is
/// unavailable. Other failures of the primary surface also fall back; only a
/// failing degraded surface is an error.
pub fn engage(
    primary: Option<Box<dyn LockdownSurface>>,
    mut degraded: Box<dyn LockdownSurface>,
) -> Result<LockdownGuard> {
    if let Some(mut surface) = primary {
        match surface.enter() {
            Ok(()) => {
                info!(surface = surface.name(), "Lockdown engaged");
                return Ok(LockdownGuard {
                    surface,
                    active: true,
                });
            }
            Err(WakeGateError::IsolationUnavailable(reason)) => {
                warn!(reason = %reason, "Isolation unavailable; using degraded lockdown");
            }
            Err(err) => {
                warn!(error = %err, "Primary lockdown failed; using degraded lockdown");
                let _ = surface.exit();
            }
        }
    }

    degraded.enter()?;
    info!(surface = degraded.name(), "Lockdown engaged");
    Ok(LockdownGuard {
        surface: degraded,
        active: true,
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// Focus Enforcement
// ═══════════════════════════════════════════════════════════════════════════════

/// Periodic check that pulls the gate back to the foreground.
pub struct FocusEnforcer {
    interval: Duration,
    last_check: Option<Instant>,
    refocus_count: u64,
}

impl FocusEnforcer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_check: None,
            refocus_count: 0,
        }
    }

    pub fn refocus_count(&self) -> u64 {
        self.refocus_count
    }

    /// Runs a check if the interval has elapsed. Returns whether the gate had
    /// to be re-focused.
    pub fn tick(&mut self, now: Instant, probe: &mut dyn FocusProbe) -> bool {
        if let Some(last) = self.last_check {
            if now.duration_since(last) < self.interval {
                return false;
            }
        }
        self.last_check = Some(now);

        if probe.is_foreground() {
            return false;
        }
        self.refocus_count += 1;
        debug!(count = self.refocus_count, "Gate lost focus; re-focusing");
        if let Err(err) = probe.bring_to_front() {
            warn!(error = %err, "Failed to re-focus gate");
        }
        true
    }
}

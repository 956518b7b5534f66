//! # Mode Arbiter
//!
//! Derives the operating mode from the number of field devices online and
//! whether the AI engine is running:
//!
//! | devices | AI active | mode |
//! |---|---|---|
//! | > 0 | yes | `Live` |
//! | > 0 | no | `Partial` |
//! | 0 | no | `Demo` |
//! | 0 | yes | `Partial` if a field device was seen this session, else `Demo` |
//!
//! The last row keeps the system out of pure demo when the last device drops while
//! the AI engine is still running, without promoting a fresh boot (no hardware
//! ever seen) out of demo just because the engine process is up.

use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use tokio::sync::broadcast;

use crate::models::status::{FieldDeviceNotice, SystemModeUpdate};

/// Operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemMode {
    /// No field hardware; local simulation fills in.
    Demo,
    /// Field hardware and AI engine both up.
    Live,
    /// One of the two is missing.
    Partial,
}

/// Fired when the derived mode changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModeChange {
    /// Mode before.
    pub previous: SystemMode,
    /// Mode after.
    pub current: SystemMode,
    /// Field devices online at the time.
    pub device_count: u32,
    /// AI engine activity at the time.
    pub ai_active: bool,
}

/// Inputs and output of the last recomputation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModeSnapshot {
    /// Derived mode.
    pub mode: SystemMode,
    /// Field devices online.
    pub device_count: u32,
    /// AI engine activity.
    pub ai_active: bool,
    /// Whether any field device has been seen this session.
    pub ever_had_device: bool,
}

/// The arbiter.
pub struct ModeArbiter {
    state: Mutex<ModeSnapshot>,
    tx: broadcast::Sender<ModeChange>,
}

impl Default for ModeArbiter {
    fn default() -> Self {
        Self::new()
    }
}

impl ModeArbiter {
    /// Starts in `Demo` with no devices and AI inactive.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(32);
        Self {
            state: Mutex::new(ModeSnapshot {
                mode: SystemMode::Demo,
                device_count: 0,
                ai_active: false,
                ever_had_device: false,
            }),
            tx,
        }
    }

    /// The mode rule.
    pub fn derive(device_count: u32, ai_active: bool, ever_had_device: bool) -> SystemMode {
        match (device_count > 0, ai_active) {
            (true, true) => SystemMode::Live,
            (true, false) => SystemMode::Partial,
            (false, true) if ever_had_device => SystemMode::Partial,
            (false, _) => SystemMode::Demo,
        }
    }

    /// Mode-change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<ModeChange> {
        self.tx.subscribe()
    }

    /// Current mode.
    pub fn mode(&self) -> SystemMode {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).mode
    }

    /// Current inputs and mode.
    pub fn snapshot(&self) -> ModeSnapshot {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies whichever inputs are present in one recomputation.
    pub fn update(&self, device_count: Option<u32>, ai_active: Option<bool>) -> Option<ModeChange> {
        self.recompute(|s| {
            if let Some(count) = device_count {
                s.device_count = count;
            }
            if let Some(active) = ai_active {
                s.ai_active = active;
            }
        })
    }

    fn recompute(&self, mutate: impl FnOnce(&mut ModeSnapshot)) -> Option<ModeChange> {
        let change = {
            let mut s = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            mutate(&mut *s);
            if s.device_count > 0 {
                s.ever_had_device = true;
            }
            let previous = s.mode;
            s.mode = Self::derive(s.device_count, s.ai_active, s.ever_had_device);
            if s.mode == previous {
                return None;
            }
            ModeChange { previous, current: s.mode, device_count: s.device_count, ai_active: s.ai_active }
        };
        log::info!(
            "Mode {:?} -> {:?} (devices online: {}, AI active: {})",
            change.previous,
            change.current,
            change.device_count,
            change.ai_active
        );
        let _ = self.tx.send(change);
        Some(change)
    }

    /// New field-device count.
    pub fn set_device_count(&self, count: u32) -> Option<ModeChange> {
        self.update(Some(count), None)
    }

    /// New AI activity.
    pub fn set_ai_active(&self, active: bool) -> Option<ModeChange> {
        self.update(None, Some(active))
    }

    /// A field device connected or disconnected. Without a count, the current
    /// count is stepped by one.
    pub fn field_device(&self, notice: &FieldDeviceNotice) -> Option<ModeChange> {
        log::info!(
            "Field device {} {}.",
            notice.name.as_deref().or(notice.device_id.as_deref()).unwrap_or("?"),
            if notice.connected { "connected" } else { "disconnected" }
        );
        self.recompute(|s| {
            s.device_count = match notice.count {
                Some(count) => count,
                None if notice.connected => s.device_count.saturating_add(1),
                None => s.device_count.saturating_sub(1),
            };
            if let Some(active) = notice.ai_engine_active {
                s.ai_active = active;
            }
        })
    }

    /// A backend mode summary. Its demo flag is advisory: a disagreement with the
    /// derived mode is logged, never adopted.
    pub fn system_mode(&self, update: &SystemModeUpdate) -> Option<ModeChange> {
        let change = self.update(update.esp32_online_count, update.ai_engine_active);
        if let Some(backend_demo) = update.demo_mode {
            let derived_demo = self.mode() == SystemMode::Demo;
            if backend_demo != derived_demo {
                log::warn!(
                    "Backend reports demo_mode={} but derived mode is {:?}.",
                    backend_demo,
                    self.mode()
                );
            }
        }
        change
    }
}

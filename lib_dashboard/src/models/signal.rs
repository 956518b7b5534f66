//! Signal phases and the backend's `traffic_state` payload.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::configs::CycleTimings;

/// One phase of the traffic signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalPhase {
    /// Traffic may proceed.
    #[serde(alias = "green", alias = "Green")]
    Green,
    /// Clearing interval.
    #[serde(alias = "yellow", alias = "Yellow")]
    Yellow,
    /// Stop. Crossings during red are violations.
    #[serde(alias = "red", alias = "Red")]
    Red,
}

impl SignalPhase {
    /// The phase that follows this one in the ring.
    pub fn successor(self) -> SignalPhase {
        match self {
            SignalPhase::Green => SignalPhase::Yellow,
            SignalPhase::Yellow => SignalPhase::Red,
            SignalPhase::Red => SignalPhase::Green,
        }
    }

    /// Camera state tied to this phase.
    pub fn camera_state(self) -> CameraState {
        match self {
            SignalPhase::Green => CameraState::Idle,
            SignalPhase::Yellow => CameraState::Warmup,
            SignalPhase::Red => CameraState::Active,
        }
    }

    /// Nominal duration of this phase under `timings`.
    pub fn duration(self, timings: &CycleTimings) -> u32 {
        match self {
            SignalPhase::Green => timings.green,
            SignalPhase::Yellow => timings.yellow,
            SignalPhase::Red => timings.red,
        }
    }

    /// Case-insensitive parse of `GREEN`, `YELLOW` or `RED`.
    pub fn parse(raw: &str) -> Option<SignalPhase> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "GREEN" => Some(SignalPhase::Green),
            "YELLOW" => Some(SignalPhase::Yellow),
            "RED" => Some(SignalPhase::Red),
            _ => None,
        }
    }
}

impl fmt::Display for SignalPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SignalPhase::Green => "GREEN",
            SignalPhase::Yellow => "YELLOW",
            SignalPhase::Red => "RED",
        };
        f.write_str(s)
    }
}

/// What the detection camera is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CameraState {
    /// Not capturing.
    Idle,
    /// Spinning up ahead of red.
    Warmup,
    /// Capturing violations.
    Active,
}

/// Authoritative signal state pushed by the backend (`traffic_state`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalUpdate {
    /// Current phase.
    pub light: SignalPhase,
    /// Seconds left in the phase, if reported.
    #[serde(default)]
    pub countdown: Option<u32>,
    /// Camera state, if reported.
    #[serde(default)]
    pub camera: Option<CameraState>,
    /// Controller mode, e.g. `AUTO` or `EMERGENCY`.
    #[serde(default)]
    pub mode: Option<String>,
    /// Phase durations, if reported.
    #[serde(default)]
    pub cycle: Option<CycleTimings>,
}

impl SignalUpdate {
    /// An update carrying only the phase.
    pub fn phase_only(light: SignalPhase) -> Self {
        Self { light, countdown: None, camera: None, mode: None, cycle: None }
    }
}

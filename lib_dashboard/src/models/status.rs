//! # Status Models
//!
//! AI engine status, bootstrap and poll responses, and the smaller device and
//! mode notices the backend pushes.
//!
//! The AI status payload comes in several dialects (`ai_status`,
//! `ai_engine_status`, `context_update` and the bootstrap `ai_engine` object),
//! some of which carry two names for the same field in a single object. The
//! patch is therefore decoded by hand: for every field the first present name
//! wins, `null` counts as absent, and a wrong type is an error.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::signal::{CameraState, SignalPhase, SignalUpdate};
use crate::models::violation::ViolationCandidate;

/// A partial AI engine status. Absent fields leave the prior value untouched.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub struct AiStatusPatch {
    /// Engine running.
    pub active: Option<bool>,
    /// Detection model loaded.
    pub model_loaded: Option<bool>,
    /// OCR model loaded.
    pub ocr_loaded: Option<bool>,
    /// Capture device open.
    pub camera_open: Option<bool>,
    /// Detection frames per second.
    pub fps: Option<f64>,
    /// Detections so far.
    pub detections: Option<u64>,
    /// Violations found so far.
    pub violations: Option<u64>,
    /// Scene context valid.
    pub context_ok: Option<bool>,
}

impl AiStatusPatch {
    /// True when no field is present.
    pub fn is_empty(&self) -> bool {
        *self == AiStatusPatch::default()
    }
}

impl TryFrom<Map<String, Value>> for AiStatusPatch {
    type Error = String;

    fn try_from(map: Map<String, Value>) -> Result<Self, Self::Error> {
        Ok(Self {
            active: pick_bool(&map, &["active", "ai_active", "ai_engine_active"])?,
            model_loaded: pick_bool(&map, &["model_loaded", "ai_model_loaded", "models_ready"])?,
            ocr_loaded: pick_bool(&map, &["ocr_loaded", "ai_ocr_loaded"])?,
            camera_open: pick_bool(&map, &["camera_open", "ai_camera_open"])?,
            fps: pick_f64(&map, &["fps", "detection_fps"])?,
            detections: pick_u64(&map, &["detections", "detection_count", "ai_detections"])?,
            violations: pick_u64(&map, &["violations", "violation_count", "violations_found"])?,
            context_ok: pick_bool(&map, &["context_ok"])?,
        })
    }
}

fn pick<'a>(map: &'a Map<String, Value>, names: &[&'static str]) -> Option<(&'static str, &'a Value)> {
    names
        .iter()
        .find_map(|n| map.get(*n).filter(|v| !v.is_null()).map(|v| (*n, v)))
}

fn pick_bool(map: &Map<String, Value>, names: &[&'static str]) -> Result<Option<bool>, String> {
    match pick(map, names) {
        None => Ok(None),
        Some((_, Value::Bool(b))) => Ok(Some(*b)),
        Some((name, other)) => Err(format!("field '{}' must be a boolean, found {}", name, other)),
    }
}

fn pick_f64(map: &Map<String, Value>, names: &[&'static str]) -> Result<Option<f64>, String> {
    match pick(map, names) {
        None => Ok(None),
        Some((name, v)) => v
            .as_f64()
            .map(Some)
            .ok_or_else(|| format!("field '{}' must be a number, found {}", name, v)),
    }
}

fn pick_u64(map: &Map<String, Value>, names: &[&'static str]) -> Result<Option<u64>, String> {
    match pick(map, names) {
        None => Ok(None),
        Some((name, v)) => v
            .as_u64()
            .or_else(|| v.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .map(Some)
            .ok_or_else(|| format!("field '{}' must be a non-negative number, found {}", name, v)),
    }
}

/// Last-known AI engine status.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AiEngineStatus {
    /// Engine running.
    pub active: bool,
    /// Detection model loaded.
    pub model_loaded: bool,
    /// OCR model loaded.
    pub ocr_loaded: bool,
    /// Capture device open.
    pub camera_open: bool,
    /// Detection frames per second.
    pub fps: f64,
    /// Detections so far.
    pub detection_count: u64,
    /// Violations found so far.
    pub violation_count: u64,
    /// Scene context valid.
    pub context_ok: bool,
    /// Wall-clock time of the last merge.
    pub last_update: Option<DateTime<Utc>>,
}

impl AiEngineStatus {
    /// Overwrites every field present in `patch`.
    pub fn apply(&mut self, patch: &AiStatusPatch) {
        if let Some(v) = patch.active {
            self.active = v;
        }
        if let Some(v) = patch.model_loaded {
            self.model_loaded = v;
        }
        if let Some(v) = patch.ocr_loaded {
            self.ocr_loaded = v;
        }
        if let Some(v) = patch.camera_open {
            self.camera_open = v;
        }
        if let Some(v) = patch.fps {
            self.fps = v;
        }
        if let Some(v) = patch.detections {
            self.detection_count = v;
        }
        if let Some(v) = patch.violations {
            self.violation_count = v;
        }
        if let Some(v) = patch.context_ok {
            self.context_ok = v;
        }
    }
}

/// Online state of a camera or controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeviceStatus {
    /// Responding.
    #[serde(alias = "online")]
    Online,
    /// Not responding.
    #[serde(alias = "offline")]
    Offline,
}

/// A `device_update` push event.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeviceUpdate {
    /// Device key, e.g. `esp32_cam_1`.
    pub device_id: String,
    /// New status.
    pub status: DeviceStatus,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
}

/// One entry of the bootstrap `devices` map.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeviceInfo {
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Current status.
    pub status: DeviceStatus,
}

/// Field device (signal controller) connected or disconnected.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FieldDeviceNotice {
    /// Set from the event name, not the payload.
    #[serde(skip)]
    pub connected: bool,
    /// Authoritative online count after the change.
    #[serde(default)]
    pub count: Option<u32>,
    /// Device display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Device key.
    #[serde(default)]
    pub device_id: Option<String>,
    /// AI activity reported alongside the change.
    #[serde(default)]
    pub ai_engine_active: Option<bool>,
}

/// A `system_mode` push event.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SystemModeUpdate {
    /// The backend's own view of demo mode. Advisory only.
    #[serde(default)]
    pub demo_mode: Option<bool>,
    /// Field devices online.
    #[serde(default)]
    pub esp32_online_count: Option<u32>,
    /// AI engine running.
    #[serde(default)]
    pub ai_engine_active: Option<bool>,
}

/// A backend log line (`system_event`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemLogLine {
    /// `INFO`, `WARN` or `ERROR`.
    #[serde(default = "default_level")]
    pub level: String,
    /// Subsystem that logged it.
    #[serde(default)]
    pub source: String,
    /// Message text.
    #[serde(default)]
    pub message: String,
    /// Unix seconds.
    #[serde(default)]
    pub ts: Option<f64>,
}

fn default_level() -> String {
    "INFO".to_string()
}

/// Severity of a [`SystemLogLine`] mapped onto the `log` facade.
pub type LogLevel = log::Level;

impl SystemLogLine {
    /// Severity on the `log` scale; unknown levels map to `Info`.
    pub fn log_level(&self) -> LogLevel {
        match self.level.trim().to_ascii_uppercase().as_str() {
            "ERROR" | "CRITICAL" => log::Level::Error,
            "WARN" | "WARNING" => log::Level::Warn,
            "DEBUG" => log::Level::Debug,
            _ => log::Level::Info,
        }
    }
}

/// Response of `GET /api/bootstrap`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BootstrapPayload {
    /// Backend's demo flag.
    #[serde(default)]
    pub demo_mode: Option<bool>,
    /// Field devices online.
    #[serde(default)]
    pub esp32_online_count: Option<u32>,
    /// AI engine snapshot.
    #[serde(default)]
    pub ai_engine: Option<AiStatusPatch>,
    /// Recent violations, newest first.
    #[serde(default)]
    pub violations: Vec<ViolationCandidate>,
    /// Current signal state.
    #[serde(default)]
    pub traffic: Option<SignalUpdate>,
    /// Known cameras by key.
    #[serde(default)]
    pub devices: BTreeMap<String, DeviceInfo>,
    /// Recent backend log lines, newest first.
    #[serde(default)]
    pub events: Vec<SystemLogLine>,
    /// Preferred theme name.
    #[serde(default)]
    pub theme: Option<String>,
}

/// Response of the aggregate status endpoint polled in fallback.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StatusSnapshot {
    /// AI engine snapshot.
    #[serde(default)]
    pub ai_engine: Option<AiStatusPatch>,
    /// Backend's demo flag.
    #[serde(default)]
    pub demo_mode: Option<bool>,
    /// Field devices online.
    #[serde(default)]
    pub esp32_online_count: Option<u32>,
    /// Current phase.
    #[serde(default)]
    pub light: Option<SignalPhase>,
    /// Current camera state.
    #[serde(default)]
    pub camera: Option<CameraState>,
}

/// Response of the snapshot capture request.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SnapshotReceipt {
    /// Where the captured image was stored.
    #[serde(default)]
    pub image_url: Option<String>,
    /// Plate the capture was tagged with.
    #[serde(default)]
    pub plate: Option<String>,
    /// Phase at capture.
    #[serde(default)]
    pub light: Option<SignalPhase>,
    /// Whether the backend also recorded a violation.
    #[serde(default)]
    pub injected: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_patch_first_name_wins_and_null_is_absent() {
        let patch: AiStatusPatch = serde_json::from_value(json!({
            "fps": 12.5, "detection_fps": 3.0, "models_ready": true,
            "active": null, "violations_found": 4
        }))
        .unwrap();
        assert_eq!(patch.fps, Some(12.5));
        assert_eq!(patch.model_loaded, Some(true));
        assert_eq!(patch.active, None);
        assert_eq!(patch.violations, Some(4));
        assert_eq!(patch.ocr_loaded, None);
    }

    #[test]
    fn test_patch_rejects_wrong_types() {
        let res = serde_json::from_value::<AiStatusPatch>(json!({"active": "yes"}));
        assert!(res.is_err());
    }

    #[test]
    fn test_apply_keeps_absent_fields() {
        let mut status = AiEngineStatus { active: true, fps: 9.0, ..Default::default() };
        status.apply(&AiStatusPatch { ocr_loaded: Some(true), ..Default::default() });
        assert!(status.active);
        assert!(status.ocr_loaded);
        assert_eq!(status.fps, 9.0);
    }

    #[test]
    fn test_bootstrap_shape() {
        let payload: BootstrapPayload = serde_json::from_value(json!({
            "ok": true, "demo_mode": true, "esp32_online_count": 0,
            "ai_engine": {"ever_connected": false, "models_ready": true, "detection_fps": 0.0},
            "violations": [{"id": 2, "plate": "59D-67890", "type": "CAR", "light_state": "RED", "ts": 20}],
            "traffic": {"light": "GREEN", "countdown": 12},
            "devices": {"esp32_cam_1": {"name": "ESP32-CAM #1", "status": "OFFLINE", "ip": "192.168.1.101"}},
            "events": [{"level": "WARN", "source": "AI", "message": "slow", "ts": 10}],
            "theme": "dark"
        }))
        .unwrap();
        assert_eq!(payload.demo_mode, Some(true));
        assert_eq!(payload.violations.len(), 1);
        assert_eq!(payload.devices["esp32_cam_1"].status, DeviceStatus::Offline);
        assert_eq!(payload.events[0].log_level(), log::Level::Warn);
        assert_eq!(payload.ai_engine.and_then(|a| a.model_loaded), Some(true));
    }
}

//! # Violation Models
//!
//! A [`ViolationCandidate`] is whatever the backend (or the demo synthesizer, or an
//! operator) says happened. The ledger normalizes it into an immutable
//! [`ViolationRecord`] with a locally assigned id.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::models::signal::SignalPhase;

/// Region of interest assumed when none is reported.
pub const DEFAULT_ROI: &str = "STOP_LINE";

/// Where a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationSource {
    /// Pushed by the backend or loaded from its history.
    Server,
    /// Synthesized locally while in demo mode.
    Demo,
    /// Entered by an operator.
    Operator,
}

/// An unnormalized violation as reported by a producer.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ViolationCandidate {
    /// Backend row id, when the backend assigned one.
    #[serde(rename = "id", default, deserialize_with = "flexible_id")]
    pub remote_id: Option<String>,
    /// License plate text.
    #[serde(default)]
    pub plate: String,
    /// Vehicle class, e.g. `MOTORBIKE`.
    #[serde(rename = "type", default)]
    pub vehicle_type: String,
    /// Capture time, Unix seconds.
    #[serde(rename = "ts", default)]
    pub timestamp: Option<f64>,
    /// Signal phase at capture.
    #[serde(rename = "light", alias = "light_state", default)]
    pub phase: Option<SignalPhase>,
    /// Measured speed.
    #[serde(default)]
    pub speed_kmh: Option<f64>,
    /// Detection zone tag.
    #[serde(default)]
    pub roi: Option<String>,
    /// Either a 0..1 score or a percentage.
    #[serde(default)]
    pub confidence: Option<f64>,
    /// Camera that captured it.
    #[serde(rename = "cam_id", alias = "cam", default, deserialize_with = "flexible_id")]
    pub camera: Option<String>,
    /// Evidence image location.
    #[serde(default)]
    pub image_url: Option<String>,
}

/// Accepts a JSON string or number (or null) as an optional string.
fn flexible_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected string or number id, found {}",
            other
        ))),
    }
}

/// An immutable, ledger-owned violation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViolationRecord {
    /// Local id; strictly increasing, never reused.
    pub id: u64,
    /// Backend row id, if any.
    pub remote_id: Option<String>,
    /// Normalized plate text.
    pub plate: String,
    /// Upper-cased vehicle class.
    pub vehicle_type: String,
    /// Capture time, Unix seconds.
    pub timestamp: i64,
    /// Signal phase at capture.
    pub phase: SignalPhase,
    /// Speed, absent when unknown or non-positive.
    pub speed_kmh: Option<f64>,
    /// Detection zone tag.
    pub roi: String,
    /// Confidence in percent, within 0..=100.
    pub confidence: f64,
    /// Camera that captured it.
    pub camera: String,
    /// Evidence image location.
    pub image_url: Option<String>,
    /// Producer.
    pub source: ViolationSource,
}

impl ViolationRecord {
    /// Normalizes `candidate` under `id`. `now` fills a missing timestamp.
    pub fn from_candidate(
        id: u64,
        candidate: ViolationCandidate,
        source: ViolationSource,
        now: i64,
    ) -> Self {
        let plate = candidate.plate.trim().to_uppercase();
        let vehicle_type = candidate.vehicle_type.trim().to_uppercase();
        Self {
            id,
            remote_id: candidate.remote_id,
            plate: if plate.is_empty() { "UNKNOWN".to_string() } else { plate },
            vehicle_type: if vehicle_type.is_empty() { "UNKNOWN".to_string() } else { vehicle_type },
            timestamp: candidate
                .timestamp
                .filter(|t| t.is_finite() && *t > 0.0)
                .map(|t| t as i64)
                .unwrap_or(now),
            phase: candidate.phase.unwrap_or(SignalPhase::Red),
            speed_kmh: candidate.speed_kmh.filter(|s| s.is_finite() && *s > 0.0),
            roi: candidate
                .roi
                .filter(|r| !r.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_ROI.to_string()),
            confidence: normalize_confidence(candidate.confidence),
            camera: candidate
                .camera
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| "unknown".to_string()),
            image_url: candidate.image_url.filter(|u| !u.trim().is_empty()),
            source,
        }
    }

    /// UTC calendar day of capture.
    pub fn date(&self) -> Option<NaiveDate> {
        DateTime::<Utc>::from_timestamp(self.timestamp, 0).map(|d| d.date_naive())
    }
}

/// Scores in 0..=1 are fractions; anything else is already a percentage.
pub fn normalize_confidence(raw: Option<f64>) -> f64 {
    match raw {
        Some(c) if c.is_finite() => {
            let pct = if (0.0..=1.0).contains(&c) { c * 100.0 } else { c };
            pct.clamp(0.0, 100.0)
        }
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_payload_decodes() {
        let raw = serde_json::json!({
            "id": 42, "plate": "51b-12345", "type": "motorbike", "speed_kmh": 14.2,
            "light": "RED", "roi": "STOP_LINE", "vehicles_frame": 3, "confidence": 0.87,
            "image_url": "/static/violations/42.jpg", "cam_id": "CAM 2",
            "ts": 1_700_000_000, "date_str": "2023-11-14"
        });
        let candidate: ViolationCandidate = serde_json::from_value(raw).unwrap();
        let record = ViolationRecord::from_candidate(1, candidate, ViolationSource::Server, 0);

        assert_eq!(record.remote_id.as_deref(), Some("42"));
        assert_eq!(record.plate, "51B-12345");
        assert_eq!(record.vehicle_type, "MOTORBIKE");
        assert_eq!(record.phase, SignalPhase::Red);
        assert!((record.confidence - 87.0).abs() < 1e-9);
        assert_eq!(record.date(), NaiveDate::from_ymd_opt(2023, 11, 14));
    }

    #[test]
    fn test_history_row_uses_light_state() {
        let raw = serde_json::json!({
            "id": "7", "plate": "", "type": "CAR", "speed_kmh": 0,
            "light_state": "YELLOW", "confidence": 91, "image_url": "", "cam_id": null, "ts": 5
        });
        let candidate: ViolationCandidate = serde_json::from_value(raw).unwrap();
        let record = ViolationRecord::from_candidate(3, candidate, ViolationSource::Server, 99);

        assert_eq!(record.plate, "UNKNOWN");
        assert_eq!(record.phase, SignalPhase::Yellow);
        assert_eq!(record.speed_kmh, None);
        assert_eq!(record.image_url, None);
        assert_eq!(record.camera, "unknown");
        assert_eq!(record.roi, DEFAULT_ROI);
        assert_eq!(record.timestamp, 5);
        assert!((record.confidence - 91.0).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_is_clamped() {
        assert_eq!(normalize_confidence(Some(250.0)), 100.0);
        assert_eq!(normalize_confidence(Some(-3.0)), 0.0);
        assert_eq!(normalize_confidence(None), 0.0);
        assert_eq!(normalize_confidence(Some(1.0)), 100.0);
    }

    #[test]
    fn test_missing_timestamp_uses_now() {
        let record = ViolationRecord::from_candidate(
            1,
            ViolationCandidate::default(),
            ViolationSource::Operator,
            1234,
        );
        assert_eq!(record.timestamp, 1234);
    }
}

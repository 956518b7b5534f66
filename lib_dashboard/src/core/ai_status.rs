//! # AI Engine Status Tracker
//!
//! Mirrors the last-known AI subsystem status. Updates arrive from push events,
//! poll responses and the bootstrap call, usually as partial snapshots: each
//! field is overwritten only when present.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::models::status::{AiEngineStatus, AiStatusPatch};

/// The tracker.
pub struct AiStatusTracker {
    state: Mutex<(AiEngineStatus, Option<Instant>)>,
    tx: broadcast::Sender<AiEngineStatus>,
}

impl Default for AiStatusTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl AiStatusTracker {
    /// Everything off, never updated.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(32);
        Self { state: Mutex::new((AiEngineStatus::default(), None)), tx }
    }

    /// Status notifications, one per merge.
    pub fn subscribe(&self) -> broadcast::Receiver<AiEngineStatus> {
        self.tx.subscribe()
    }

    /// Folds `patch` into the current status and returns the result.
    pub fn merge(&self, patch: &AiStatusPatch) -> AiEngineStatus {
        let status = {
            let mut s = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            s.0.apply(patch);
            s.0.last_update = Some(Utc::now());
            s.1 = Some(Instant::now());
            s.0.clone()
        };
        log::debug!(
            "AI status: active={} model={} ocr={} camera={} fps={:.1}",
            status.active,
            status.model_loaded,
            status.ocr_loaded,
            status.camera_open,
            status.fps
        );
        let _ = self.tx.send(status.clone());
        status
    }

    /// Current status.
    pub fn snapshot(&self) -> AiEngineStatus {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).0.clone()
    }

    /// True if never updated, or last updated more than `threshold` ago.
    pub fn is_stale(&self, threshold: Duration) -> bool {
        match self.state.lock().unwrap_or_else(PoisonError::into_inner).1 {
            None => true,
            Some(at) => at.elapsed() > threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_is_field_by_field() {
        let tracker = AiStatusTracker::new();
        tracker.merge(&AiStatusPatch {
            active: Some(true),
            model_loaded: Some(true),
            fps: Some(11.0),
            detections: Some(40),
            ..Default::default()
        });
        let status = tracker.merge(&AiStatusPatch { fps: Some(7.5), ..Default::default() });

        assert!(status.active);
        assert!(status.model_loaded);
        assert!(!status.ocr_loaded);
        assert_eq!(status.fps, 7.5);
        assert_eq!(status.detection_count, 40);
        assert!(status.last_update.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_staleness() {
        let tracker = AiStatusTracker::new();
        assert!(tracker.is_stale(Duration::from_secs(60)));

        tracker.merge(&AiStatusPatch::default());
        assert!(!tracker.is_stale(Duration::from_secs(5)));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(tracker.is_stale(Duration::from_secs(5)));
        assert!(!tracker.is_stale(Duration::from_secs(10)));
    }
}

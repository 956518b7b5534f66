//! # Device Tracker
//!
//! Tracks camera connection status and reports transitions only, so a device
//! that keeps reporting the same status does not spam subscribers.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use tokio::sync::broadcast;

use crate::models::status::{DeviceInfo, DeviceStatus, DeviceUpdate};

/// A status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeviceTransitionKind {
    /// Online to offline, or first seen offline.
    Lost,
    /// Offline to online.
    Recovered,
}

/// A transition of one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceTransition {
    /// Device key.
    pub device_id: String,
    /// Display name, if known.
    pub name: Option<String>,
    /// What happened.
    pub kind: DeviceTransitionKind,
}

/// Known state of one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceEntry {
    /// Display name, if known.
    pub name: Option<String>,
    /// Last reported status.
    pub status: DeviceStatus,
}

/// The tracker.
pub struct DeviceTracker {
    devices: Mutex<BTreeMap<String, DeviceEntry>>,
    tx: broadcast::Sender<DeviceTransition>,
}

impl Default for DeviceTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceTracker {
    /// No devices known.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(32);
        Self { devices: Mutex::new(BTreeMap::new()), tx }
    }

    /// Transition notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceTransition> {
        self.tx.subscribe()
    }

    /// Records known devices without reporting transitions.
    pub fn seed<'a>(&self, entries: impl IntoIterator<Item = (&'a String, &'a DeviceInfo)>) {
        let mut devices = self.devices.lock().unwrap_or_else(PoisonError::into_inner);
        for (id, info) in entries {
            devices.insert(id.clone(), DeviceEntry { name: info.name.clone(), status: info.status });
        }
    }

    /// Records a status report and returns the transition, if any.
    pub fn apply(&self, update: &DeviceUpdate) -> Option<DeviceTransition> {
        let transition = {
            let mut devices = self.devices.lock().unwrap_or_else(PoisonError::into_inner);
            let previous = devices.get(&update.device_id).map(|e| e.status);
            let entry = devices
                .entry(update.device_id.clone())
                .or_insert_with(|| DeviceEntry { name: None, status: update.status });
            if update.name.is_some() {
                entry.name = update.name.clone();
            }
            entry.status = update.status;

            let kind = match (previous, update.status) {
                (None, DeviceStatus::Offline) | (Some(DeviceStatus::Online), DeviceStatus::Offline) => {
                    DeviceTransitionKind::Lost
                }
                (Some(DeviceStatus::Offline), DeviceStatus::Online) => DeviceTransitionKind::Recovered,
                _ => return None,
            };
            DeviceTransition { device_id: update.device_id.clone(), name: entry.name.clone(), kind }
        };
        match transition.kind {
            DeviceTransitionKind::Lost => log::warn!("Device {} lost.", transition.device_id),
            DeviceTransitionKind::Recovered => log::info!("Device {} recovered.", transition.device_id),
        }
        let _ = self.tx.send(transition.clone());
        Some(transition)
    }

    /// Number of devices currently online.
    pub fn online_count(&self) -> usize {
        self.devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|d| d.status == DeviceStatus::Online)
            .count()
    }

    /// All known devices.
    pub fn snapshot(&self) -> BTreeMap<String, DeviceEntry> {
        self.devices.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(id: &str, status: DeviceStatus) -> DeviceUpdate {
        DeviceUpdate { device_id: id.to_string(), status, name: None }
    }

    #[test]
    fn test_only_transitions_are_reported() {
        let tracker = DeviceTracker::new();
        assert!(tracker.apply(&update("cam1", DeviceStatus::Online)).is_none());
        assert!(tracker.apply(&update("cam1", DeviceStatus::Online)).is_none());

        let lost = tracker.apply(&update("cam1", DeviceStatus::Offline)).unwrap();
        assert_eq!(lost.kind, DeviceTransitionKind::Lost);
        assert!(tracker.apply(&update("cam1", DeviceStatus::Offline)).is_none());

        let back = tracker.apply(&update("cam1", DeviceStatus::Online)).unwrap();
        assert_eq!(back.kind, DeviceTransitionKind::Recovered);
    }

    #[test]
    fn test_first_seen_offline_is_lost() {
        let tracker = DeviceTracker::new();
        let mut rx = tracker.subscribe();
        let t = tracker.apply(&update("cam2", DeviceStatus::Offline)).unwrap();
        assert_eq!(t.kind, DeviceTransitionKind::Lost);
        assert_eq!(rx.try_recv().unwrap(), t);
        assert_eq!(tracker.online_count(), 0);
    }

    #[test]
    fn test_seed_is_silent() {
        let tracker = DeviceTracker::new();
        let mut rx = tracker.subscribe();
        let mut known = BTreeMap::new();
        known.insert("cam1".to_string(), DeviceInfo { name: Some("CAM #1".into()), status: DeviceStatus::Offline });
        known.insert("cam2".to_string(), DeviceInfo { name: None, status: DeviceStatus::Online });
        tracker.seed(&known);

        assert!(rx.try_recv().is_err());
        assert_eq!(tracker.online_count(), 1);
        let t = tracker.apply(&update("cam1", DeviceStatus::Online)).unwrap();
        assert_eq!(t.name.as_deref(), Some("CAM #1"));
    }
}

//! # Data Models
//!
//! Typed shapes for everything that crosses the backend boundary, plus the
//! immutable domain records the state holders hand out.
//!
//! ## Contained Modules:
//! - **`signal`**: signal phases, camera states and the `traffic_state` payload.
//! - **`violation`**: violation candidates as sent by the backend and the
//!   immutable records kept by the ledger.
//! - **`status`**: AI engine status, bootstrap and poll responses, device and
//!   mode notices.
//! - **`events`**: the push-frame envelope and its decoded event enum.

#![doc(html_logo_url = "https://example.com/logo.png")] // Placeholder
#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Signal phase types.
pub mod signal;
/// Violation candidates and records.
pub mod violation;
/// Status snapshots and notices.
pub mod status;
/// Push events and frame decoding.
pub mod events;

pub use events::{EventKind, PushEvent, RawFrame};
pub use signal::{CameraState, SignalPhase, SignalUpdate};
pub use status::{
    AiEngineStatus, AiStatusPatch, BootstrapPayload, DeviceStatus, DeviceUpdate,
    FieldDeviceNotice, LogLevel, SnapshotReceipt, StatusSnapshot, SystemLogLine,
    SystemModeUpdate,
};
pub use violation::{ViolationCandidate, ViolationRecord, ViolationSource};

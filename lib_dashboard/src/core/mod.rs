//! # Core Engine Module
//!
//! The state holders and plumbing behind the dashboard. Every holder owns its
//! state behind a lock that is never held across an `.await`, and announces
//! changes on a broadcast channel so that presentation layers can subscribe
//! without polling.
//!
//! ## Core Components:
//!
//! - **`dispatcher`**: Decodes `{event, data}` frames and routes each typed event
//!   to the single sink registered for its kind.
//! - **`signal_cycle`**: The local traffic-light clock with operator overrides and
//!   remote reconciliation.
//! - **`mode_arbiter`**: Derives `Demo`/`Live`/`Partial` from field-device and AI
//!   engine signals.
//! - **`ai_status`**: Merges partial AI-engine status patches.
//! - **`devices`**: Tracks field-device presence and reports losses and recoveries.
//! - **`event_log`**: A bounded, newest-first book of backend log lines.
//! - **`connection_manager`**: Owns the push-channel lifecycle and the poll
//!   fallback that covers for it.

#![doc(html_logo_url = "https://example.com/logo.png")] // Placeholder
#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Frame decoding and per-kind routing.
pub mod dispatcher;
/// The signal phase clock.
pub mod signal_cycle;
/// Operating-mode derivation.
pub mod mode_arbiter;
/// AI engine status merging.
pub mod ai_status;
/// Field-device presence tracking.
pub mod devices;
/// Bounded backend log book.
pub mod event_log;
/// Push channel lifecycle and poll fallback.
pub mod connection_manager;

// --- Public API Re-exports ---
pub use ai_status::AiStatusTracker;
pub use connection_manager::{
    BackendSource, ConnectionManager, ConnectionState, PushConnector, PushFrame, PushStream,
};
pub use devices::{DeviceEntry, DeviceTracker, DeviceTransition, DeviceTransitionKind};
pub use dispatcher::{DispatchStats, Dispatcher, EventSink};
pub use event_log::SystemLogBook;
pub use mode_arbiter::{ModeArbiter, ModeChange, ModeSnapshot, SystemMode};
pub use signal_cycle::{PhaseChange, PhaseChangeCause, SignalCycle, SignalSnapshot};

//! # Data Ingestors Module
//!
//! The "front door" for backend data entering the engine. Both ingestors feed
//! the same [`Dispatcher`](crate::core::Dispatcher), so state holders cannot tell
//! whether an event arrived by push or by poll.
//!
//! ## Contained Modules:
//! - **`status_polling`**: A self-scheduling poller for the aggregate status
//!   endpoint, run by the connection manager while the push channel is down.
//! - **`push_wss`**: The Socket.IO push-channel connector over WebSocket (feature `wss`).

#![doc(html_logo_url = "https://example.com/logo.png")] // Placeholder
#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// The fallback status poller.
pub mod status_polling;
/// The WebSocket push connector.
#[cfg(feature = "wss")]
pub mod push_wss;

// --- Public API Re-exports ---
pub use status_polling::{snapshot_events, PollResult, StatusPoller};
#[cfg(feature = "wss")]
pub use push_wss::WssPushConnector;

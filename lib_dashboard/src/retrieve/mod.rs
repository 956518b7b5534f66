//! # Data Retrieval Module
//!
//! Outbound HTTP for the dashboard engine.
//!
//! ## Contained Modules:
//!
//! - **`ky_http`**: The `ResilientClient`, built on `reqwest` and
//!   `reqwest-middleware`. It injects the bearer credential, bounds every attempt
//!   with a timeout, retries once after a 401 with a refreshed credential and
//!   folds every outcome into a typed `RequestFailure`.
//! - **`backend`**: Typed wrappers for the backend endpoints the engine uses
//!   (bootstrap, status, snapshot capture, deletion, theme).

#![doc(html_logo_url = "https://example.com/logo.png")] // Placeholder
#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Resilient HTTP client with credential recovery and typed failures.
pub mod ky_http;
/// Typed backend endpoints.
pub mod backend;

pub use backend::BackendApi;
pub use ky_http::{CallOptions, ResilientClient, SessionEvent};

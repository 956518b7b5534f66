//! # Simulation Module
//!
//! Local stand-ins for backend traffic while the dashboard runs in demo mode.
//!
//! ## Contained Modules:
//! - **`demo`**: The `DemoSynthesizer`, which produces plausible violation
//!   candidates and the random timings the engine schedules them with.

#![doc(html_logo_url = "https://example.com/logo.png")] // Placeholder
#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Demo violation synthesis.
pub mod demo;

pub use demo::{DemoSynthesizer, DEMO_PLATES};

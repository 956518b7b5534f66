//! # Configuration Module
//!
//! Runtime settings for the dashboard engine. Every field has a default so an
//! empty JSON object (or no file at all) yields a working configuration; the agent
//! binary layers CLI and environment overrides on top.

#![doc(html_logo_url = "https://example.com/logo.png")] // Placeholder
#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// The engine configuration tree and its defaults.
pub mod engine_config;

pub use engine_config::{
    AuthSettings, ConnectionSettings, CycleTimings, DemoSettings, EngineConfig, HttpSettings,
    FALLBACK_TOKEN,
};

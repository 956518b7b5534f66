//! # lib_dashboard
//!
//! The state-synchronization and mode-arbitration engine behind the traffic
//! violation dashboard. It reconciles authoritative backend events with local
//! simulation, keeps the push channel (or its poll fallback) alive, drives the
//! signal cycle, records violations and decides between demo and live operation.
//!
//! Network-facing modules are gated behind the `retrieve` and `wss` features; the
//! state holders and the engine only see the network through the traits in
//! [`core::connection_manager`].

#![doc(html_logo_url = "https://example.com/logo.png")] // Placeholder
#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Failure taxonomies shared across the crate.
pub mod errors;
/// Engine configuration, loadable from JSON.
pub mod configs;
/// Wire and domain data types.
pub mod models;
/// State holders, dispatcher and connection lifecycle.
pub mod core;
/// The order-preserving violation ledger.
pub mod ledger;
/// Poll and push ingestors.
pub mod ingestors;
/// Local demo-mode violation synthesis.
pub mod simulation;
/// The composition root wiring every component together.
pub mod engine;

/// Session credential persistence.
#[cfg(feature = "retrieve")]
pub mod auth;
/// Resilient HTTP client and typed backend API.
#[cfg(feature = "retrieve")]
pub mod retrieve;

pub use configs::EngineConfig;
pub use engine::{BootReport, DashboardEngine, DeletionReport};
pub use errors::{CallResult, DispatchError, PushError, RequestFailure};

//! # Session Credential Module
//!
//! Holds the bearer token every outbound call carries. The store never reports
//! an error: storage problems are logged and the in-memory copy stays
//! authoritative for the rest of the session.

#![doc(html_logo_url = "https://example.com/logo.png")] // Placeholder
#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// File-backed token store with a well-known fallback.
pub mod token_store;

pub use token_store::{default_token_path, TokenStore};

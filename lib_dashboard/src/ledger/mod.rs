//! # Violation Ledger Module
//!
//! The single owner of violation records. Records are stored most-recent-first,
//! never mutated after creation and handed out as shared read-only references.
//!
//! ## Contained Modules:
//! - **`violations`**: The `ViolationLedger` itself, plus the filter predicate set
//!   and the clamping pager used by the history views.

#![doc(html_logo_url = "https://example.com/logo.png")] // Placeholder
#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// The ledger, its filters and pager.
pub mod violations;

// --- Public API Re-exports ---
pub use violations::{
    page, DeleteOutcome, LedgerChange, LedgerCounters, Page, ViolationFilter, ViolationLedger,
};

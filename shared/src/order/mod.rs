//! Canonical order model
//!
//! Aggregator payloads are mapped into [`Order`]; the order pipeline is the
//! only writer of `status` and `statuses_history`.

pub mod types;

// Re-exports
pub use types::*;

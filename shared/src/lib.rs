//! Shared types for the aggregator hub
//!
//! Domain models, the canonical order, and the unified error system used by
//! hub-server and its API consumers.

pub mod error;
pub mod models;
pub mod order;
pub mod util;

// Re-exports
pub use axum::Json;
pub use http;
pub use serde::{Deserialize, Serialize};

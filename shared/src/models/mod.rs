//! Data models
//!
//! Shared between hub-server and its API consumers.
//! All document IDs are `String` (uuid v4 unless supplied by a partner).

pub mod menu;
pub mod stoplist;
pub mod store;

// Re-exports
pub use menu::*;
pub use stoplist::*;
pub use store::*;

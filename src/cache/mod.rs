//! Cache Module
//!
//! Provides the typed cache facade, value encoding and memoization.

mod codec;
mod facade;
mod memoize;


// Re-export public types
pub use codec::Payload;
pub use facade::Cache;
pub use memoize::{OperationTable, Subject};

// == Public Constants ==
/// TTL in seconds used when a write gives none (30 minutes)
pub const DEFAULT_TTL: i64 = 1800;

//! tastemap/crates/tm-core/src/lib.rs
//!
//! The central domain logic and interface definitions for Tastemap: entities,
//! ports, and the pure pieces of the venue search engine (distance, filter
//! compilation, ranking, pagination).

pub mod error;
pub mod filter;
pub mod geo;
pub mod models;
pub mod pagination;
pub mod params;
pub mod ranking;
pub mod traits;

// Re-exporting for easier access in other crates
pub use error::*;
pub use models::*;
pub use traits::*;

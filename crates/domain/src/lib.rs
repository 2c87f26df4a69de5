//! # MarketLens Domain
//!
//! Domain types and the error taxonomy shared by every MarketLens crate.
//!
//! This crate contains:
//! - Route metadata (`RouteDescriptor`, `ParameterSpec`) built from the API
//!   reference document
//! - Pagination windows and the merged response shape
//! - Client configuration (`ClientSettings`)
//! - Error types and the `Result` alias
//!
//! ## Architecture
//! - No dependencies on other MarketLens crates
//! - No I/O; pure data structures and small pure functions

pub mod config;
pub mod constants;
pub mod errors;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;

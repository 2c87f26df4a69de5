//! # MarketLens Core
//!
//! Pure business logic layer - no infrastructure dependencies.
//!
//! This crate contains:
//! - The route catalog built from the API reference document
//! - Argument validation and request preparation
//! - Paginated dispatch with bounded concurrency and response merging
//!
//! ## Architecture Principles
//! - Only depends on `marketlens-domain`
//! - No HTTP or filesystem code outside of loading the reference document
//! - The wire transport is reached through [`ResourceTransport`]

pub mod catalog;
pub mod dispatch;

pub use catalog::{prepare, BoundArguments, ParamValue, PreparedRequest, RouteCatalog};
pub use dispatch::{
    DispatchHandle, DispatchRequest, MergePolicy, RequestDispatcher, ResourceTransport,
};

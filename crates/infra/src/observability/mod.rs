//! Observability infrastructure
//!
//! Subscriber setup for the `tracing` events every MarketLens crate emits.
//! Events use dotted names (`oauth_flow.authenticated`,
//! `dispatch.window_failed`) with structured fields, so the JSON formatter
//! produces one queryable record per event.

pub mod logging;

pub use logging::{init_tracing, log_filter};

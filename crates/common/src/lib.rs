//! Modular common infrastructure shared across MarketLens crates.
//!
//! # Feature Tiers
//!
//! Enable cargo features to opt into the tiers you need:
//! - `foundation`: pure helpers (PKCE primitives, credential types)
//! - `runtime`: async infrastructure (tokio, cancellation, locks)
//! - `platform`: OAuth client, shared token store, token refresher
//! - `observability`: tracing instrumentation
//! - `test-utils`: scripted mocks for downstream tests

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Platform tier
// -------------------------------------------------------------------
#[cfg(feature = "platform")]
pub mod auth;

// Testing utilities
// ---------------------------------------------------------------
#[cfg(any(feature = "test-utils", all(test, feature = "platform")))]
pub mod testing;

// Re-export commonly used types
// ------------------------
#[cfg(feature = "platform")]
pub use auth::{
    Credential, OAuthClient, OAuthClientError, OAuthConfig, RefreshStatus, TokenRefresher,
    TokenRefresherError, TokenStore, TokenStoreError,
};

//! # MarketLens Infrastructure
//!
//! Infrastructure implementations of core ports and the session wiring.
//!
//! This crate contains:
//! - HTTP client (reqwest, proxy and TLS settings fixed at build time)
//! - Resource transport implementing `marketlens_core::ResourceTransport`
//! - Interactive OAuth login (loopback callback listener, browser hand-off)
//! - Configuration loading and tracing initialisation
//! - `MarketLensSession`, which ties store, login, refresher and dispatcher
//!
//! ## Architecture
//! - Implements traits defined in `marketlens-core`
//! - Depends on `marketlens-common`, `marketlens-domain` and `marketlens-core`
//! - Contains all "impure" code (network, sockets, browser, files)

pub mod api;
pub mod auth;
pub mod config;
pub mod errors;
pub mod http;
pub mod observability;
pub mod session;

// Re-export commonly used items
pub use api::{AccessTokenProvider, ResourceClient, SharedCredentialProvider, StaticTokenProvider};
pub use auth::{AuthState, BeginOutcome, BrowserOpener, ManualBrowser, OAuth2Flow, SystemBrowser};
pub use errors::InfraError;
pub use http::{HttpClient, HttpClientBuilder};
pub use observability::init_tracing;
pub use session::{MarketLensSession, SessionBuilder};

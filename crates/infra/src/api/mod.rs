//! Etsy resource API access
//!
//! This module connects the core dispatcher to the network: bearer tokens
//! come from an [`AccessTokenProvider`], requests go out through the shared
//! [`crate::http::HttpClient`].

pub mod auth;
pub mod transport;

pub use auth::{AccessTokenProvider, SharedCredentialProvider, StaticTokenProvider};
pub use transport::{ResourceClient, API_KEY_HEADER};

//! OAuth 2.0 + PKCE infrastructure shared by every MarketLens client
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │  TokenRefresher  │  Re-armable refresh timer (elder refreshes)
//! └────────┬─────────┘
//!          │
//!          ├──► OAuthClient   (authorization URL, code exchange, refresh)
//!          │         │
//!          │         └──► PKCE utilities
//!          │
//!          └──► TokenStore    (credential + registered client ids)
//!                    │
//!                    ├──► FileRegion    (cross-process)
//!                    └──► MemoryRegion  (private fallback)
//! ```
//!
//! The interactive part of the login (browser, loopback listener) lives in
//! the infra crate; everything here is reusable without a UI.
//!
//! # Module Organization
//!
//! - **[`types`]**: `Credential`, `OAuthConfig`, token endpoint wire types
//! - **[`pkce`]**: verifier/challenge/state generation
//! - **[`client`]**: token endpoint client
//! - **[`token_store`]**: shared key-value space and elder election
//! - **[`refresher`]**: background refresh chain

pub mod client;
pub mod pkce;
pub mod refresher;
pub mod token_store;
pub mod traits;
pub mod types;

pub use client::{OAuthClient, OAuthClientError};
pub use pkce::{code_challenge_for, generate_code_verifier, generate_state, states_match, PkcePair};
pub use refresher::{RefreshStatus, TokenRefresher, TokenRefresherConfig, TokenRefresherError};
pub use token_store::{
    FileRegion, MemoryRegion, SharedRegion, SharedState, TokenStore, TokenStoreError,
    TokenStoreResult, CREDENTIAL_KEY,
};
pub use traits::OAuthClientTrait;
pub use types::{
    Credential, OAuthConfig, OAuthError, TokenRequest, TokenResponse,
    DEFAULT_AUTHORIZATION_ENDPOINT, DEFAULT_TOKEN_ENDPOINT, MAX_CREDENTIAL_LIFETIME_SECS,
};

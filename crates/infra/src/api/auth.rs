//! Access tokens for resource requests
//!
//! The resource transport asks an [`AccessTokenProvider`] for a bearer token
//! on every request. The default provider reads the credential published in
//! the shared token store, so a refresh by the elder is picked up by every
//! cooperating process without any extra signalling.

use async_trait::async_trait;
use marketlens_common::auth::TokenStore;
use marketlens_domain::{MarketLensError, Result};
use tracing::debug;

use crate::errors::InfraError;

/// Trait for providing access tokens
///
/// This trait allows dependency injection and testing with mock providers.
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    /// Get a currently valid access token.
    ///
    /// # Errors
    /// `Auth` when no credential exists or it has expired.
    async fn access_token(&self) -> Result<String>;
}

/// Reads the credential from the (possibly shared) token store, off the
/// async worker threads.
#[derive(Clone)]
pub struct SharedCredentialProvider {
    store: TokenStore,
}

impl SharedCredentialProvider {
    pub fn new(store: TokenStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl AccessTokenProvider for SharedCredentialProvider {
    async fn access_token(&self) -> Result<String> {
        let credential =
            self.store.load_credential().await.map_err(InfraError::from)?.ok_or_else(|| {
                MarketLensError::Auth(
                    "not authenticated: no credential in the token store".to_string(),
                )
            })?;

        if !credential.is_valid() {
            debug!(expiry = %credential.expiry, "api_auth.credential_expired");
            return Err(MarketLensError::Auth(format!(
                "access token expired at {}; refresh or re-authenticate",
                credential.expiry
            )));
        }

        Ok(credential.access_token)
    }
}

/// Fixed token, for scripts that obtained one elsewhere.
#[derive(Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }
}

#[async_trait]
impl AccessTokenProvider for StaticTokenProvider {
    async fn access_token(&self) -> Result<String> {
        Ok(self.token.clone())
    }
}

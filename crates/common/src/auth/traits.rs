//! Trait for OAuth token endpoint operations
//!
//! Lets the refresher and the login flow run against a mock authorization
//! server in tests.

use async_trait::async_trait;

use super::client::OAuthClientError;
use super::types::Credential;

/// OAuth client operations used by the flow and the refresher.
#[async_trait]
pub trait OAuthClientTrait: Send + Sync {
    /// Generate the authorization URL for browser-based login
    ///
    /// # Returns
    /// Tuple of (authorization_url, state) where state must be validated in
    /// the callback
    ///
    /// # Errors
    /// Implementation specific
    async fn generate_authorization_url(&self) -> Result<(String, String), OAuthClientError>;

    /// Exchange an authorization code for a credential
    ///
    /// # Errors
    /// Returns error on state mismatch or when the token endpoint rejects
    /// the code
    async fn exchange_code_for_tokens(
        &self,
        code: &str,
        state: &str,
    ) -> Result<Credential, OAuthClientError>;

    /// Obtain a new credential from a refresh token
    ///
    /// # Errors
    /// Returns error if refresh fails or the token is invalid/revoked
    async fn refresh_access_token(&self, refresh_token: &str)
        -> Result<Credential, OAuthClientError>;

    /// Get the configured redirect URI
    fn redirect_uri(&self) -> &str;
}

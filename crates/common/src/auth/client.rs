//! OAuth 2.0 client implementation with PKCE support
//!
//! Handles the authorization code flow against the Etsy token endpoint:
//! - PKCE challenge generation
//! - Authorization URL building
//! - Authorization code exchange
//! - Token refresh
//!
//! Both grants POST a JSON body; the endpoint answers with JSON.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio::sync::Mutex;
use tracing::debug;

use super::pkce::{states_match, PkcePair};
use super::traits::OAuthClientTrait;
use super::types::{Credential, OAuthConfig, OAuthError, TokenRequest, TokenResponse};

/// Error type for OAuth client operations
#[derive(Debug)]
pub enum OAuthClientError {
    /// HTTP request failed
    RequestFailed(reqwest::Error),

    /// Token endpoint returned a structured OAuth error
    OAuthError(OAuthError),

    /// Token endpoint returned a non-success status without an OAuth error
    /// body
    UnexpectedStatus { status: u16, body: String },

    /// State parameter mismatch (CSRF attack detected)
    StateMismatch { expected: String, received: String },

    /// Failed to parse response
    ParseError(String),

    /// No refresh token available
    NoRefreshToken,

    /// Invalid configuration or call order
    ConfigError(String),
}

impl std::fmt::Display for OAuthClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RequestFailed(e) => write!(f, "HTTP request failed: {e}"),
            Self::OAuthError(e) => write!(f, "OAuth error: {e}"),
            Self::UnexpectedStatus { status, body } => {
                write!(f, "Token endpoint returned HTTP {status}: {body}")
            }
            Self::StateMismatch { .. } => {
                write!(f, "State mismatch (CSRF): callback state does not match request")
            }
            Self::ParseError(msg) => write!(f, "Parse error: {msg}"),
            Self::NoRefreshToken => write!(f, "No refresh token available"),
            Self::ConfigError(msg) => write!(f, "Configuration error: {msg}"),
        }
    }
}

impl std::error::Error for OAuthClientError {}

impl From<reqwest::Error> for OAuthClientError {
    fn from(err: reqwest::Error) -> Self {
        Self::RequestFailed(err)
    }
}

/// OAuth 2.0 client with PKCE support (RFC 6749, RFC 7636).
///
/// Public client: no secret is ever sent, the PKCE verifier proves
/// possession instead.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    config: OAuthConfig,
    client: Client,
    current_challenge: Arc<Mutex<Option<PkcePair>>>,
}

impl OAuthClient {
    /// Create a new OAuth client with a default HTTP client (30s timeout).
    #[must_use]
    pub fn new(config: OAuthConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self::with_http_client(config, client)
    }

    /// Create a client that reuses an existing `reqwest::Client`, so token
    /// calls share proxy and TLS settings with resource calls.
    #[must_use]
    pub fn with_http_client(config: OAuthConfig, client: Client) -> Self {
        Self { config, client, current_challenge: Arc::new(Mutex::new(None)) }
    }

    /// Build the authorization URL for a fresh PKCE attempt.
    ///
    /// # Returns
    /// Tuple of (authorization_url, state). Any earlier pending attempt is
    /// replaced.
    ///
    /// # Errors
    /// Currently infallible; the signature matches [`OAuthClientTrait`].
    pub async fn generate_authorization_url(&self) -> Result<(String, String), OAuthClientError> {
        let challenge = PkcePair::generate();
        let state = challenge.state.clone();

        let scope_string = self.config.scope_string();
        let params = [
            ("response_type", "code"),
            ("client_id", self.config.client_id.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("scope", scope_string.as_str()),
            ("state", state.as_str()),
            ("code_challenge", challenge.code_challenge.as_str()),
            ("code_challenge_method", challenge.challenge_method()),
        ];

        let query_string = params
            .iter()
            .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        let url = format!("{}?{}", self.config.authorization_endpoint, query_string);

        *self.current_challenge.lock().await = Some(challenge);

        Ok((url, state))
    }

    /// Exchange an authorization code for a credential.
    ///
    /// The pending PKCE attempt is consumed whether or not the exchange
    /// succeeds.
    ///
    /// # Errors
    /// Returns error if:
    /// - No authorization URL was generated first
    /// - State mismatch (CSRF attack)
    /// - Token endpoint rejects the code or omits the refresh token
    /// - Response parsing fails
    pub async fn exchange_code_for_tokens(
        &self,
        code: &str,
        state: &str,
    ) -> Result<Credential, OAuthClientError> {
        let challenge =
            self.current_challenge.lock().await.take().ok_or_else(|| {
                OAuthClientError::ConfigError("No PKCE challenge found".to_string())
            })?;

        if !states_match(&challenge.state, state) {
            return Err(OAuthClientError::StateMismatch {
                expected: challenge.state,
                received: state.to_string(),
            });
        }

        let body = TokenRequest {
            grant_type: "authorization_code",
            client_id: &self.config.client_id,
            redirect_uri: Some(&self.config.redirect_uri),
            code: Some(code),
            code_verifier: Some(&challenge.code_verifier),
            refresh_token: None,
        };

        let token_response = self.post_token_request(&body).await?;
        let refresh_token = token_response.refresh_token.ok_or(OAuthClientError::NoRefreshToken)?;

        debug!(expires_in = token_response.expires_in, "oauth.code_exchanged");
        Ok(Credential::issue(token_response.access_token, refresh_token, token_response.expires_in))
    }

    /// Refresh the access token.
    ///
    /// When the endpoint does not rotate the refresh token, the one passed in
    /// is carried into the new credential.
    ///
    /// # Errors
    /// Returns error if the refresh token is empty, revoked, or the endpoint
    /// cannot be reached.
    pub async fn refresh_access_token(
        &self,
        refresh_token: &str,
    ) -> Result<Credential, OAuthClientError> {
        if refresh_token.is_empty() {
            return Err(OAuthClientError::NoRefreshToken);
        }

        let body = TokenRequest {
            grant_type: "refresh_token",
            client_id: &self.config.client_id,
            redirect_uri: None,
            code: None,
            code_verifier: None,
            refresh_token: Some(refresh_token),
        };

        let token_response = self.post_token_request(&body).await?;
        let next_refresh =
            token_response.refresh_token.unwrap_or_else(|| refresh_token.to_string());

        debug!(expires_in = token_response.expires_in, "oauth.token_refreshed");
        Ok(Credential::issue(token_response.access_token, next_refresh, token_response.expires_in))
    }

    async fn post_token_request(
        &self,
        body: &TokenRequest<'_>,
    ) -> Result<TokenResponse, OAuthClientError> {
        let response = self.client.post(&self.config.token_endpoint).json(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(match serde_json::from_str::<OAuthError>(&text) {
                Ok(error) => OAuthClientError::OAuthError(error),
                Err(_) => OAuthClientError::UnexpectedStatus { status: status.as_u16(), body: text },
            });
        }

        response.json().await.map_err(|e| OAuthClientError::ParseError(e.to_string()))
    }

    /// Get the configured redirect URI
    #[must_use]
    pub fn redirect_uri(&self) -> &str {
        &self.config.redirect_uri
    }

    /// Get a reference to the OAuth configuration
    #[must_use]
    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }
}

#[async_trait]
impl OAuthClientTrait for OAuthClient {
    async fn generate_authorization_url(&self) -> Result<(String, String), OAuthClientError> {
        self.generate_authorization_url().await
    }

    async fn exchange_code_for_tokens(
        &self,
        code: &str,
        state: &str,
    ) -> Result<Credential, OAuthClientError> {
        self.exchange_code_for_tokens(code, state).await
    }

    async fn refresh_access_token(
        &self,
        refresh_token: &str,
    ) -> Result<Credential, OAuthClientError> {
        self.refresh_access_token(refresh_token).await
    }

    fn redirect_uri(&self) -> &str {
        self.redirect_uri()
    }
}

//! OAuth 2.0 types and structures
//!
//! The credential shape shared between processes, the token endpoint wire
//! format, and the authorization server configuration.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Etsy authorization page.
pub const DEFAULT_AUTHORIZATION_ENDPOINT: &str = "https://www.etsy.com/oauth/connect";

/// Etsy token endpoint (authorization code and refresh grants).
pub const DEFAULT_TOKEN_ENDPOINT: &str = "https://api.etsy.com/v3/public/oauth/token";

/// Longest lifetime honored from a token endpoint answer (ten years).
/// Larger `expires_in` values are clamped to it.
pub const MAX_CREDENTIAL_LIFETIME_SECS: i64 = 10 * 365 * 24 * 60 * 60;

/// Access/refresh token pair with its absolute expiry.
///
/// `expiry` is always `issue time + expires_in`. Once `now >= expiry` the
/// access token must not be used for new requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
    /// Lifetime in seconds as reported by the token endpoint.
    pub expires_in: i64,
    pub expiry: DateTime<Utc>,
}

impl Credential {
    /// Credential issued now.
    #[must_use]
    pub fn issue(access_token: String, refresh_token: String, expires_in: i64) -> Self {
        Self::issued_at(access_token, refresh_token, expires_in, Utc::now())
    }

    /// Credential issued at an explicit instant. Negative lifetimes are
    /// treated as already expired; lifetimes beyond
    /// [`MAX_CREDENTIAL_LIFETIME_SECS`] are clamped to it.
    #[must_use]
    pub fn issued_at(
        access_token: String,
        refresh_token: String,
        expires_in: i64,
        issued_at: DateTime<Utc>,
    ) -> Self {
        let lifetime = Duration::try_seconds(expires_in.clamp(0, MAX_CREDENTIAL_LIFETIME_SECS))
            .unwrap_or_else(Duration::zero);
        let expiry = issued_at.checked_add_signed(lifetime).unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self { access_token, refresh_token, expires_in, expiry }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expiry
    }

    /// Seconds until expiry, negative once expired.
    #[must_use]
    pub fn seconds_until_expiry(&self) -> i64 {
        (self.expiry - Utc::now()).num_seconds()
    }
}

/// Token endpoint success body.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: i64,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// JSON body POSTed to the token endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct TokenRequest<'a> {
    pub grant_type: &'a str,
    pub client_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_verifier: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<&'a str>,
}

/// Error body returned by the token endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthError {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl fmt::Display for OAuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error_description {
            Some(description) => write!(f, "{}: {description}", self.error),
            None => write!(f, "{}", self.error),
        }
    }
}

/// Authorization server configuration.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    /// Application keystring.
    pub client_id: String,
    /// Loopback callback, e.g. `http://localhost:5000/callback`.
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
}

impl OAuthConfig {
    /// Configuration against the default Etsy endpoints.
    #[must_use]
    pub fn new(client_id: String, redirect_uri: String, scopes: Vec<String>) -> Self {
        Self {
            client_id,
            redirect_uri,
            scopes,
            authorization_endpoint: DEFAULT_AUTHORIZATION_ENDPOINT.to_string(),
            token_endpoint: DEFAULT_TOKEN_ENDPOINT.to_string(),
        }
    }

    /// Point the flow at different endpoints (mock servers in tests).
    #[must_use]
    pub fn with_endpoints(
        mut self,
        authorization_endpoint: impl Into<String>,
        token_endpoint: impl Into<String>,
    ) -> Self {
        self.authorization_endpoint = authorization_endpoint.into();
        self.token_endpoint = token_endpoint.into();
        self
    }

    /// Space separated; percent-encoding turns the separator into `%20`.
    #[must_use]
    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }
}

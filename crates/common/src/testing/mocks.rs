//! Mock implementations of the auth traits
//!
//! Provides mock objects for testing purposes.

// Test mocks keep error docs out of the way; failures are scripted.
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::auth::{Credential, OAuthClientError, OAuthClientTrait, OAuthError};

#[derive(Debug, Default)]
struct MockState {
    issued_states: u64,
    pending_state: Option<String>,
    exchange_calls: Vec<String>,
    refresh_calls: Vec<String>,
    should_fail: bool,
}

/// Scripted OAuth client.
///
/// - `generate_authorization_url` hands out `mock-state-<n>`.
/// - `exchange_code_for_tokens` checks the state, then issues
///   `access-<code>` / `refresh-<code>`.
/// - `refresh_access_token` records the refresh token and issues
///   `access-r<n>` / `refresh-r<n>`, or fails with `invalid_grant` once
///   [`MockOAuthClient::set_should_fail`] is set.
#[derive(Debug, Clone)]
pub struct MockOAuthClient {
    state: Arc<Mutex<MockState>>,
    expires_in: i64,
}

impl MockOAuthClient {
    /// Create a new mock issuing one-hour credentials.
    #[must_use]
    pub fn new() -> Self {
        Self { state: Arc::new(Mutex::new(MockState::default())), expires_in: 3600 }
    }

    /// Lifetime of every credential this mock issues.
    #[must_use]
    pub fn with_expires_in(mut self, expires_in: i64) -> Self {
        self.expires_in = expires_in;
        self
    }

    /// Force token calls to fail.
    pub fn set_should_fail(&self, should_fail: bool) {
        self.state.lock().should_fail = should_fail;
    }

    /// Refresh tokens passed to `refresh_access_token`, in call order.
    #[must_use]
    pub fn refresh_calls(&self) -> Vec<String> {
        self.state.lock().refresh_calls.clone()
    }

    /// Codes passed to `exchange_code_for_tokens`, in call order.
    #[must_use]
    pub fn exchange_calls(&self) -> Vec<String> {
        self.state.lock().exchange_calls.clone()
    }

    /// Reset recorded calls and failure mode.
    pub fn reset(&self) {
        *self.state.lock() = MockState::default();
    }

    fn rejection() -> OAuthClientError {
        OAuthClientError::OAuthError(OAuthError {
            error: "invalid_grant".to_string(),
            error_description: Some("scripted failure".to_string()),
        })
    }
}

impl Default for MockOAuthClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OAuthClientTrait for MockOAuthClient {
    async fn generate_authorization_url(&self) -> Result<(String, String), OAuthClientError> {
        let mut state = self.state.lock();
        state.issued_states += 1;
        let token = format!("mock-state-{}", state.issued_states);
        state.pending_state = Some(token.clone());
        Ok((format!("https://auth.test/oauth/connect?state={token}"), token))
    }

    async fn exchange_code_for_tokens(
        &self,
        code: &str,
        state: &str,
    ) -> Result<Credential, OAuthClientError> {
        let mut guard = self.state.lock();
        guard.exchange_calls.push(code.to_string());

        let expected = guard.pending_state.take().ok_or_else(|| {
            OAuthClientError::ConfigError("No PKCE challenge found".to_string())
        })?;
        if expected != state {
            return Err(OAuthClientError::StateMismatch {
                expected,
                received: state.to_string(),
            });
        }
        if guard.should_fail {
            return Err(Self::rejection());
        }

        Ok(Credential::issue(format!("access-{code}"), format!("refresh-{code}"), self.expires_in))
    }

    async fn refresh_access_token(
        &self,
        refresh_token: &str,
    ) -> Result<Credential, OAuthClientError> {
        let mut guard = self.state.lock();
        guard.refresh_calls.push(refresh_token.to_string());
        if guard.should_fail {
            return Err(Self::rejection());
        }

        let n = guard.refresh_calls.len();
        Ok(Credential::issue(format!("access-r{n}"), format!("refresh-r{n}"), self.expires_in))
    }

    fn redirect_uri(&self) -> &str {
        "http://localhost:5000/callback"
    }
}

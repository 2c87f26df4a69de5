//! PKCE authorization-code flow
//!
//! `Unauthenticated -> AwaitingCallback -> Authenticated`.
//!
//! Only the elder process talks to the authorization server. Every other
//! process runs in cooperative mode: [`OAuth2Flow::begin`] reports
//! [`BeginOutcome::Cooperative`] and the await step polls the shared token
//! store until the elder has published a valid credential.
//!
//! Any failure after `begin` (timeout, state mismatch, rejected exchange)
//! drops back to `Unauthenticated`; the caller starts over.

use std::sync::Arc;
use std::time::Duration;

use marketlens_common::auth::{Credential, OAuthClientTrait, TokenStore};
use marketlens_domain::constants::{DEFAULT_CALLBACK_HOST, DEFAULT_CALLBACK_PORT};
use marketlens_domain::{MarketLensError, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::browser::{BrowserOpener, SystemBrowser};
use super::callback::CallbackListener;
use crate::errors::InfraError;

const DEFAULT_COOPERATIVE_POLL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    Unauthenticated,
    AwaitingCallback,
    Authenticated,
}

/// What [`OAuth2Flow::begin`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BeginOutcome {
    /// The authorization URL was generated and handed to the browser.
    Authorize { url: String },
    /// Not the elder; the credential will come from the shared store.
    Cooperative,
}

#[derive(Debug)]
struct FlowState {
    auth: AuthState,
    pending_state: Option<String>,
}

pub struct OAuth2Flow {
    client: Arc<dyn OAuthClientTrait>,
    store: TokenStore,
    client_id: u64,
    browser: Arc<dyn BrowserOpener>,
    host: String,
    port: u16,
    auto_close_browser: bool,
    cooperative_poll: Duration,
    state: Mutex<FlowState>,
}

impl OAuth2Flow {
    pub fn new(client: Arc<dyn OAuthClientTrait>, store: TokenStore, client_id: u64) -> Self {
        Self {
            client,
            store,
            client_id,
            browser: Arc::new(SystemBrowser),
            host: DEFAULT_CALLBACK_HOST.to_string(),
            port: DEFAULT_CALLBACK_PORT,
            auto_close_browser: true,
            cooperative_poll: DEFAULT_COOPERATIVE_POLL,
            state: Mutex::new(FlowState { auth: AuthState::Unauthenticated, pending_state: None }),
        }
    }

    #[must_use]
    pub fn with_browser(mut self, browser: Arc<dyn BrowserOpener>) -> Self {
        self.browser = browser;
        self
    }

    /// Address [`OAuth2Flow::authenticate`] listens on.
    #[must_use]
    pub fn with_callback_address(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    #[must_use]
    pub fn with_auto_close_browser(mut self, auto_close: bool) -> Self {
        self.auto_close_browser = auto_close;
        self
    }

    #[must_use]
    pub fn with_cooperative_poll(mut self, interval: Duration) -> Self {
        self.cooperative_poll = interval;
        self
    }

    pub fn state(&self) -> AuthState {
        self.state.lock().auth
    }

    pub fn client_id(&self) -> u64 {
        self.client_id
    }

    /// # Errors
    /// Returns `Resource` when the token store cannot be read.
    pub fn is_elder(&self) -> Result<bool> {
        Ok(self.store.is_elder(self.client_id).map_err(InfraError::from)?)
    }

    /// Credential currently in the token store.
    ///
    /// # Errors
    /// Returns `Resource` when the token store cannot be read.
    pub fn credential(&self) -> Result<Option<Credential>> {
        Ok(self.store.credential().map_err(InfraError::from)?)
    }

    /// Generate the authorization URL and open it in the browser.
    ///
    /// A browser that fails to open is logged, not fatal: the URL is
    /// returned for the caller to show.
    ///
    /// # Errors
    /// Returns `Auth` when the URL cannot be generated.
    #[instrument(skip(self), fields(client_id = self.client_id))]
    pub async fn begin(&self) -> Result<BeginOutcome> {
        if !self.check_elder().await? {
            info!("oauth_flow.cooperative");
            return Ok(BeginOutcome::Cooperative);
        }

        let url = self.prepare_authorization().await?;
        self.open_browser(&url);
        Ok(BeginOutcome::Authorize { url })
    }

    /// Listen for the redirect on `host:port`, then exchange the code.
    ///
    /// In cooperative mode this waits for the elder's credential instead.
    ///
    /// # Errors
    /// Returns `Auth` if `begin` was not called, on timeout, a state
    /// mismatch or a rejected exchange.
    #[instrument(skip(self), fields(client_id = self.client_id))]
    pub async fn await_callback(
        &self,
        host: &str,
        port: u16,
        timeout: Option<Duration>,
    ) -> Result<Credential> {
        if !self.check_elder().await? {
            return self.await_shared_credential(timeout).await;
        }

        let expected = self.state.lock().pending_state.clone().ok_or_else(|| {
            MarketLensError::Auth("authorization not started; call begin() first".to_string())
        })?;

        let listener = match CallbackListener::bind(host, port, expected, self.auto_close_browser).await {
            Ok(listener) => listener,
            Err(err) => return Err(self.fail(err)),
        };
        self.complete(listener, timeout).await
    }

    /// `begin` then `await_callback` on the configured address. The
    /// listener is bound before the browser opens so a fast redirect cannot
    /// miss it.
    ///
    /// # Errors
    /// See [`OAuth2Flow::await_callback`].
    #[instrument(skip(self), fields(client_id = self.client_id))]
    pub async fn authenticate(&self, timeout: Option<Duration>) -> Result<Credential> {
        if !self.check_elder().await? {
            info!("oauth_flow.cooperative");
            return self.await_shared_credential(timeout).await;
        }

        let url = self.prepare_authorization().await?;
        let expected = self.state.lock().pending_state.clone().unwrap_or_default();
        let listener =
            match CallbackListener::bind(&self.host, self.port, expected, self.auto_close_browser).await {
                Ok(listener) => listener,
                Err(err) => return Err(self.fail(err)),
            };
        self.open_browser(&url);
        self.complete(listener, timeout).await
    }

    async fn check_elder(&self) -> Result<bool> {
        Ok(self.store.check_elder(self.client_id).await.map_err(InfraError::from)?)
    }

    async fn prepare_authorization(&self) -> Result<String> {
        let (url, state) = self
            .client
            .generate_authorization_url()
            .await
            .map_err(|err| MarketLensError::from(InfraError::from(err)))?;

        let mut guard = self.state.lock();
        guard.pending_state = Some(state);
        guard.auth = AuthState::AwaitingCallback;
        debug!("oauth_flow.awaiting_callback");
        Ok(url)
    }

    fn open_browser(&self, url: &str) {
        if let Err(err) = self.browser.open(url) {
            warn!(error = %err, %url, "oauth_flow.browser_open_failed");
        }
    }

    async fn complete(&self, listener: CallbackListener, timeout: Option<Duration>) -> Result<Credential> {
        let params = match listener.wait(timeout).await {
            Ok(params) => params,
            Err(err) => return Err(self.fail(err)),
        };

        let credential = match self.client.exchange_code_for_tokens(&params.code, &params.state).await {
            Ok(credential) => credential,
            Err(err) => return Err(self.fail(InfraError::from(err).into())),
        };

        if let Err(err) = self.store.publish_credential(credential.clone()).await {
            return Err(self.fail(InfraError::from(err).into()));
        }

        {
            let mut guard = self.state.lock();
            guard.pending_state = None;
            guard.auth = AuthState::Authenticated;
        }
        info!(expiry = %credential.expiry, "oauth_flow.authenticated");
        Ok(credential)
    }

    async fn await_shared_credential(&self, timeout: Option<Duration>) -> Result<Credential> {
        let deadline = timeout.map(|limit| Instant::now() + limit);
        loop {
            let shared = self.store.load_credential().await.map_err(InfraError::from)?;
            if let Some(credential) = shared.filter(Credential::is_valid) {
                self.state.lock().auth = AuthState::Authenticated;
                info!(expiry = %credential.expiry, "oauth_flow.adopted_shared_credential");
                return Ok(credential);
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return Err(MarketLensError::Auth(
                    "timed out waiting for the elder client to publish a credential".to_string(),
                ));
            }
            tokio::time::sleep(self.cooperative_poll).await;
        }
    }

    fn fail(&self, err: MarketLensError) -> MarketLensError {
        {
            let mut guard = self.state.lock();
            guard.pending_state = None;
            guard.auth = AuthState::Unauthenticated;
        }
        warn!(error = %err, kind = err.label(), "oauth_flow.failed");
        err
    }
}

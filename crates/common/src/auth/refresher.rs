//! Background token refresh
//!
//! A one-shot timer that fires `expires_in` seconds after it is armed. On
//! fire the elder client exchanges the refresh token, publishes the new
//! credential to the [`TokenStore`] and re-arms with the new lifetime, which
//! yields an open-ended chain. Non-elder clients never call the token
//! endpoint; they re-read the shared credential and follow whatever the
//! elder published.
//!
//! A failed refresh is reported through [`RefreshStatus::Failed`] and ends
//! the chain. The previous credential stays in the store.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::client::OAuthClientError;
use super::token_store::{TokenStore, TokenStoreError};
use super::traits::OAuthClientTrait;
use super::types::Credential;

/// Error type for refresher operations
#[derive(Debug, thiserror::Error)]
pub enum TokenRefresherError {
    /// Token endpoint rejected the refresh
    #[error("token refresh failed: {0}")]
    Refresh(#[from] OAuthClientError),

    /// Nothing to refresh
    #[error("no credential available to refresh")]
    NoCredential,

    #[error(transparent)]
    Store(#[from] TokenStoreError),

    /// Timer needs a tokio runtime
    #[error("no tokio runtime available to arm the refresh timer")]
    NoRuntime,
}

/// Observable refresher state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RefreshStatus {
    Idle,
    Scheduled { at: DateTime<Utc> },
    Refreshed { expiry: DateTime<Utc> },
    Failed { message: String },
    Cancelled,
}

/// Refresher tuning.
#[derive(Debug, Clone)]
pub struct TokenRefresherConfig {
    /// Start enabled.
    pub enabled: bool,
    /// How long a non-elder waits before re-reading an unchanged credential.
    pub recheck_interval: Duration,
}

impl Default for TokenRefresherConfig {
    fn default() -> Self {
        Self { enabled: true, recheck_interval: Duration::from_secs(30) }
    }
}

struct Timer {
    generation: u64,
    cancel: CancellationToken,
    _handle: JoinHandle<()>,
}

struct Inner {
    client: Arc<dyn OAuthClientTrait>,
    store: TokenStore,
    client_id: u64,
    enabled: AtomicBool,
    generation: AtomicU64,
    recheck_interval: Duration,
    timer: Mutex<Option<Timer>>,
    status: watch::Sender<RefreshStatus>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.get_mut().take() {
            timer.cancel.cancel();
        }
    }
}

/// Re-armable refresh timer. Clones share the same timer.
#[derive(Clone)]
pub struct TokenRefresher {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for TokenRefresher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRefresher")
            .field("client_id", &self.inner.client_id)
            .field("enabled", &self.is_enabled())
            .field("armed", &self.is_armed())
            .finish()
    }
}

impl TokenRefresher {
    #[must_use]
    pub fn new(client: Arc<dyn OAuthClientTrait>, store: TokenStore, client_id: u64) -> Self {
        Self::with_config(client, store, client_id, TokenRefresherConfig::default())
    }

    #[must_use]
    pub fn with_config(
        client: Arc<dyn OAuthClientTrait>,
        store: TokenStore,
        client_id: u64,
        config: TokenRefresherConfig,
    ) -> Self {
        let (status, _) = watch::channel(RefreshStatus::Idle);
        Self {
            inner: Arc::new(Inner {
                client,
                store,
                client_id,
                enabled: AtomicBool::new(config.enabled),
                generation: AtomicU64::new(0),
                recheck_interval: config.recheck_interval,
                timer: Mutex::new(None),
                status,
            }),
        }
    }

    /// Arm the timer to fire `credential.expires_in` seconds from now,
    /// replacing any pending timer. Does nothing while disabled.
    ///
    /// # Errors
    /// Returns `NoRuntime` when called outside a tokio runtime.
    pub fn schedule(&self, credential: Credential) -> Result<(), TokenRefresherError> {
        if !self.is_enabled() {
            debug!(client_id = self.inner.client_id, "token_refresher.schedule_skipped_disabled");
            return Ok(());
        }
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(TokenRefresherError::NoRuntime);
        }

        let delay = lifetime_delay(credential.expires_in);
        let mut slot = self.inner.timer.lock();
        arm_locked(&self.inner, &mut slot, delay, credential);
        Ok(())
    }

    /// Disarm the pending timer. Safe to call any number of times.
    pub fn cancel(&self) {
        let pending = self.inner.timer.lock().take();
        if let Some(timer) = pending {
            timer.cancel.cancel();
            self.inner.status.send_replace(RefreshStatus::Cancelled);
            info!(client_id = self.inner.client_id, "token_refresher.cancelled");
        }
    }

    /// Disabling cancels a pending timer.
    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::SeqCst);
        if !enabled {
            self.cancel();
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.inner.timer.lock().is_some()
    }

    /// Run one refresh cycle now.
    ///
    /// The elder refreshes through the token endpoint; other clients return
    /// the shared credential. While enabled, the timer is re-armed with the
    /// result.
    ///
    /// # Errors
    /// Returns the refresh failure; the stored credential is left untouched.
    pub async fn refresh_now(&self) -> Result<Credential, TokenRefresherError> {
        let credential = if self.inner.store.check_elder(self.inner.client_id).await? {
            self.inner.refresh_once(None).await?
        } else {
            self.inner.store.load_credential().await?.ok_or(TokenRefresherError::NoCredential)?
        };

        if self.is_enabled() {
            self.schedule(credential.clone())?;
        }
        Ok(credential)
    }

    /// Watch refresher state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<RefreshStatus> {
        self.inner.status.subscribe()
    }

    #[must_use]
    pub fn status(&self) -> RefreshStatus {
        self.inner.status.borrow().clone()
    }
}

fn lifetime_delay(expires_in: i64) -> Duration {
    Duration::from_secs(u64::try_from(expires_in).unwrap_or(0))
}

fn arm_locked(inner: &Arc<Inner>, slot: &mut Option<Timer>, delay: Duration, credential: Credential) {
    if let Some(previous) = slot.take() {
        previous.cancel.cancel();
    }

    let generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
    let cancel = CancellationToken::new();
    let task_cancel = cancel.clone();
    let weak = Arc::downgrade(inner);

    let handle = tokio::spawn(async move {
        tokio::select! {
            () = task_cancel.cancelled() => return,
            () = tokio::time::sleep(delay) => {}
        }
        if let Some(inner) = Weak::upgrade(&weak) {
            Inner::fire(inner, generation, credential).await;
        }
    });

    *slot = Some(Timer { generation, cancel, _handle: handle });

    let at = Utc::now()
        + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
    inner.status.send_replace(RefreshStatus::Scheduled { at });
    debug!(client_id = inner.client_id, delay_secs = delay.as_secs(), "token_refresher.armed");
}

impl Inner {
    async fn fire(self: Arc<Self>, generation: u64, scheduled: Credential) {
        let elder = match self.store.check_elder(self.client_id).await {
            Ok(elder) => elder,
            Err(err) => {
                self.fail(generation, &TokenRefresherError::Store(err));
                return;
            }
        };

        if elder {
            match self.refresh_once(Some(&scheduled)).await {
                Ok(credential) => {
                    let delay = lifetime_delay(credential.expires_in);
                    self.rearm_if_current(generation, delay, credential);
                }
                Err(err) => self.fail(generation, &err),
            }
            return;
        }

        match self.store.load_credential().await {
            Ok(Some(shared)) if shared != scheduled && shared.is_valid() => {
                debug!(client_id = self.client_id, "token_refresher.adopted_shared_credential");
                self.status.send_replace(RefreshStatus::Refreshed { expiry: shared.expiry });
                let remaining = (shared.expiry - Utc::now()).num_seconds();
                self.rearm_if_current(generation, lifetime_delay(remaining), shared);
            }
            Ok(_) => {
                debug!(client_id = self.client_id, "token_refresher.shared_credential_unchanged");
                self.rearm_if_current(generation, self.recheck_interval, scheduled);
            }
            Err(err) => self.fail(generation, &TokenRefresherError::Store(err)),
        }
    }

    async fn refresh_once(
        &self,
        fallback: Option<&Credential>,
    ) -> Result<Credential, TokenRefresherError> {
        let current = match self.store.load_credential().await? {
            Some(stored) => stored,
            None => fallback.cloned().ok_or(TokenRefresherError::NoCredential)?,
        };

        let refreshed = match self.client.refresh_access_token(&current.refresh_token).await {
            Ok(credential) => credential,
            Err(err) => {
                let err = TokenRefresherError::Refresh(err);
                self.status.send_replace(RefreshStatus::Failed { message: err.to_string() });
                return Err(err);
            }
        };
        self.store.publish_credential(refreshed.clone()).await?;

        self.status.send_replace(RefreshStatus::Refreshed { expiry: refreshed.expiry });
        info!(client_id = self.client_id, expiry = %refreshed.expiry, "token_refresher.refreshed");
        Ok(refreshed)
    }

    fn rearm_if_current(self: &Arc<Self>, generation: u64, delay: Duration, credential: Credential) {
        let mut slot = self.timer.lock();
        let current = slot.as_ref().is_some_and(|timer| timer.generation == generation);
        if !current {
            debug!(client_id = self.client_id, "token_refresher.rearm_skipped_cancelled");
            return;
        }
        if !self.enabled.load(Ordering::SeqCst) {
            *slot = None;
            return;
        }
        arm_locked(self, &mut slot, delay, credential);
    }

    fn fail(&self, generation: u64, err: &TokenRefresherError) {
        error!(client_id = self.client_id, error = %err, "token_refresher.failed");
        {
            let mut slot = self.timer.lock();
            if slot.as_ref().is_some_and(|timer| timer.generation == generation) {
                *slot = None;
            } else {
                warn!(client_id = self.client_id, "token_refresher.failure_after_rearm");
            }
        }
        self.status.send_replace(RefreshStatus::Failed { message: err.to_string() });
    }
}

//! Client session - wires the store, login flow, refresher and dispatcher
//!
//! One [`MarketLensSession`] per client. Construction registers with the
//! token store (shared when the region can be opened, private otherwise);
//! [`MarketLensSession::shutdown`] or drop unregisters again.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use marketlens_common::auth::{
    Credential, OAuthClient, OAuthClientTrait, OAuthConfig, TokenRefresher, TokenRefresherConfig,
    TokenStore,
};
use marketlens_core::{
    BoundArguments, DispatchHandle, DispatchRequest, RequestDispatcher, RouteCatalog,
};
use marketlens_domain::constants::{DEFAULT_SHARED_NAMESPACE, SHARED_API_KEY};
use marketlens_domain::{
    ClientSettings, MarketLensError, MergedResponse, PaginationPlan, Result, RouteDescriptor,
};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::api::{ResourceClient, SharedCredentialProvider};
use crate::auth::{BrowserOpener, OAuth2Flow, SystemBrowser};
use crate::errors::InfraError;
use crate::http::HttpClient;

/// Builder for [`MarketLensSession`].
pub struct SessionBuilder {
    settings: ClientSettings,
    catalog: Option<RouteCatalog>,
    browser: Option<Arc<dyn BrowserOpener>>,
    store: Option<TokenStore>,
    oauth_endpoints: Option<(String, String)>,
    oauth_client: Option<Arc<dyn OAuthClientTrait>>,
}

impl SessionBuilder {
    pub fn new(settings: ClientSettings) -> Self {
        Self {
            settings,
            catalog: None,
            browser: None,
            store: None,
            oauth_endpoints: None,
            oauth_client: None,
        }
    }

    /// Use an already loaded catalog instead of `reference_path`.
    #[must_use]
    pub fn catalog(mut self, catalog: RouteCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    #[must_use]
    pub fn browser(mut self, browser: Arc<dyn BrowserOpener>) -> Self {
        self.browser = Some(browser);
        self
    }

    /// Use this store instead of opening one from the settings.
    #[must_use]
    pub fn store(mut self, store: TokenStore) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn oauth_endpoints(
        mut self,
        authorization_endpoint: impl Into<String>,
        token_endpoint: impl Into<String>,
    ) -> Self {
        self.oauth_endpoints = Some((authorization_endpoint.into(), token_endpoint.into()));
        self
    }

    /// Replace the token endpoint client entirely.
    #[must_use]
    pub fn oauth_client(mut self, client: Arc<dyn OAuthClientTrait>) -> Self {
        self.oauth_client = Some(client);
        self
    }

    /// # Errors
    /// - `Config` for invalid settings, a missing reference document or no
    ///   API key (neither configured nor published by another client)
    /// - `Validation` for a malformed reference document
    /// - `Resource` when no client id can be registered
    pub fn build(self) -> Result<MarketLensSession> {
        let Self { settings, catalog, browser, store, oauth_endpoints, oauth_client } = self;
        settings.validate()?;

        let catalog = match (catalog, &settings.reference_path) {
            (Some(catalog), _) => catalog,
            (None, Some(path)) => RouteCatalog::from_path(path)?,
            (None, None) => {
                return Err(MarketLensError::Config(
                    "no reference document: set reference_path or supply a catalog".to_string(),
                ))
            }
        };

        let store = store.unwrap_or_else(|| {
            TokenStore::open_or_private(store_dir(&settings), &settings.shared_namespace)
        });
        let (store, client_id) = register(store)?;

        let api_key = match resolve_api_key(settings.api_key.as_deref(), &store) {
            Ok(api_key) => api_key,
            Err(err) => {
                release(&store, client_id);
                return Err(err);
            }
        };

        let http = HttpClient::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .max_attempts(settings.http_max_attempts)
            .proxy(&settings.proxy)
            .build();
        let http = match http {
            Ok(http) => http,
            Err(err) => {
                release(&store, client_id);
                return Err(err);
            }
        };

        let oauth_client = oauth_client.unwrap_or_else(|| {
            let mut config =
                OAuthConfig::new(api_key.clone(), settings.redirect_uri(), settings.scopes.clone());
            if let Some((authorization, token)) = oauth_endpoints {
                config = config.with_endpoints(authorization, token);
            }
            Arc::new(OAuthClient::with_http_client(config, http.inner().clone()))
        });

        let flow = OAuth2Flow::new(Arc::clone(&oauth_client), store.clone(), client_id)
            .with_browser(browser.unwrap_or_else(|| Arc::new(SystemBrowser)))
            .with_callback_address(settings.host.clone(), settings.port)
            .with_auto_close_browser(settings.auto_close_browser);

        let refresher = TokenRefresher::with_config(
            oauth_client,
            store.clone(),
            client_id,
            TokenRefresherConfig { enabled: settings.auto_refresh_token, ..Default::default() },
        );

        let transport = ResourceClient::new(
            http,
            settings.api_base_url.clone(),
            api_key,
            Arc::new(SharedCredentialProvider::new(store.clone())),
        );
        let transport = match transport {
            Ok(transport) => transport,
            Err(err) => {
                release(&store, client_id);
                return Err(err);
            }
        };
        let dispatcher =
            RequestDispatcher::new(Arc::new(transport)).with_max_concurrency(settings.max_concurrency);

        info!(
            client_id,
            shared = store.is_shared(),
            routes = catalog.len(),
            "session.created"
        );

        Ok(MarketLensSession {
            settings,
            catalog: Arc::new(catalog),
            store,
            client_id,
            flow,
            refresher,
            dispatcher,
            closed: AtomicBool::new(false),
        })
    }
}

/// A connected client: catalog, credentials and dispatcher.
pub struct MarketLensSession {
    settings: ClientSettings,
    catalog: Arc<RouteCatalog>,
    store: TokenStore,
    client_id: u64,
    flow: OAuth2Flow,
    refresher: TokenRefresher,
    dispatcher: RequestDispatcher,
    closed: AtomicBool,
}

impl MarketLensSession {
    pub fn builder(settings: ClientSettings) -> SessionBuilder {
        SessionBuilder::new(settings)
    }

    /// Make the session usable: reuse a valid stored credential, otherwise
    /// log in when `auto_start_auth` is set; then arm the refresher when
    /// `auto_refresh_token` is set.
    ///
    /// Returns the credential in effect, `None` when none is available and
    /// login was not requested.
    ///
    /// # Errors
    /// `Auth` when the login fails.
    #[instrument(skip(self), fields(client_id = self.client_id))]
    pub async fn connect(&self) -> Result<Option<Credential>> {
        let stored = self.store.load_credential().await.map_err(InfraError::from)?;
        let mut credential = stored.filter(Credential::is_valid);

        if credential.is_none() && self.settings.auto_start_auth {
            credential = Some(self.flow.authenticate(self.callback_timeout()).await?);
        }

        match &credential {
            Some(current) if self.settings.auto_refresh_token => {
                self.refresher.schedule(current.clone()).map_err(InfraError::from)?;
            }
            Some(_) => {}
            None => debug!("session.connected_without_credential"),
        }
        Ok(credential)
    }

    /// Run the login flow now, regardless of `auto_start_auth`.
    ///
    /// # Errors
    /// See [`OAuth2Flow::authenticate`].
    pub async fn login(&self) -> Result<Credential> {
        let credential = self.flow.authenticate(self.callback_timeout()).await?;
        if self.settings.auto_refresh_token {
            self.refresher.schedule(credential.clone()).map_err(InfraError::from)?;
        }
        Ok(credential)
    }

    /// Start a dispatch for the named route.
    ///
    /// # Errors
    /// - `NotFound` for an unknown route
    /// - `Validation` when the route's verb is disabled
    pub fn dispatch_by_name(
        &self,
        name: &str,
        arguments: BoundArguments,
        plan: PaginationPlan,
    ) -> Result<DispatchHandle> {
        let route = self.enabled_route(name)?;
        Ok(self.dispatcher.dispatch(DispatchRequest::new(route.clone(), arguments, plan)))
    }

    /// Dispatch and wait.
    ///
    /// # Errors
    /// As [`MarketLensSession::dispatch_by_name`], then the dispatch outcome.
    pub async fn execute_by_name(
        &self,
        name: &str,
        arguments: BoundArguments,
        plan: PaginationPlan,
    ) -> Result<MergedResponse> {
        let route = self.enabled_route(name)?;
        self.dispatcher.execute(DispatchRequest::new(route.clone(), arguments, plan)).await
    }

    /// Records `min..=max` in pages of the configured `page_limit`.
    ///
    /// # Errors
    /// As [`MarketLensSession::dispatch_by_name`].
    pub fn dispatch_range(
        &self,
        name: &str,
        arguments: BoundArguments,
        min: u64,
        max: u64,
    ) -> Result<DispatchHandle> {
        let plan = PaginationPlan::sequenced(min, max, self.settings.page_limit);
        self.dispatch_by_name(name, arguments, plan)
    }

    /// Routes whose verb is enabled.
    pub fn routes(&self) -> Vec<&RouteDescriptor> {
        self.catalog.routes_with_verbs(&self.settings.enabled_verbs)
    }

    pub fn catalog(&self) -> &RouteCatalog {
        &self.catalog
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    pub fn client_id(&self) -> u64 {
        self.client_id
    }

    pub fn flow(&self) -> &OAuth2Flow {
        &self.flow
    }

    pub fn refresher(&self) -> &TokenRefresher {
        &self.refresher
    }

    pub fn dispatcher(&self) -> &RequestDispatcher {
        &self.dispatcher
    }

    /// # Errors
    /// Returns `Resource` when the token store cannot be read.
    pub fn is_elder(&self) -> Result<bool> {
        self.flow.is_elder()
    }

    /// The API key in use, as published in the store.
    ///
    /// # Errors
    /// Returns `Resource` when the token store cannot be read.
    pub fn shared_api_key(&self) -> Result<Option<String>> {
        let value = self.store.get(SHARED_API_KEY, Value::Null).map_err(InfraError::from)?;
        Ok(value.as_str().map(ToString::to_string))
    }

    /// Cancel the refresher and unregister. Idempotent.
    ///
    /// # Errors
    /// Returns `Resource` if the token store cannot be updated.
    pub fn shutdown(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.refresher.cancel();
        self.store.unregister(self.client_id).map_err(InfraError::from)?;
        info!(client_id = self.client_id, "session.shutdown");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn enabled_route(&self, name: &str) -> Result<&RouteDescriptor> {
        if self.is_closed() {
            return Err(MarketLensError::Internal("session has been shut down".to_string()));
        }
        let route = self.catalog.find_by_name(name)?;
        if !self.settings.enabled_verbs.allows(route.verb) {
            return Err(MarketLensError::Validation(format!(
                "{} {} is disabled; enable the verb to call {name}",
                route.verb.as_str(),
                route.url_template
            )));
        }
        Ok(route)
    }

    fn callback_timeout(&self) -> Option<Duration> {
        self.settings.callback_timeout_secs.map(Duration::from_secs)
    }
}

impl Drop for MarketLensSession {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            warn!(client_id = self.client_id, error = %err, "session.shutdown_failed");
        }
    }
}

fn store_dir(settings: &ClientSettings) -> PathBuf {
    settings
        .token_store_dir
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().join(DEFAULT_SHARED_NAMESPACE))
}

/// Register with `store`, retrying on a private store when the shared
/// region refuses.
fn register(store: TokenStore) -> Result<(TokenStore, u64)> {
    match store.register() {
        Ok(client_id) => Ok((store, client_id)),
        Err(err) if store.is_shared() => {
            warn!(error = %err, "session.shared_register_failed_using_private");
            let private = TokenStore::private();
            let client_id = private.register().map_err(InfraError::from)?;
            Ok((private, client_id))
        }
        Err(err) => Err(InfraError::from(err).into()),
    }
}

fn release(store: &TokenStore, client_id: u64) {
    if let Err(err) = store.unregister(client_id) {
        warn!(client_id, error = %err, "session.release_failed");
    }
}

/// A configured key is published for later clients; without one the
/// published key is adopted.
fn resolve_api_key(configured: Option<&str>, store: &TokenStore) -> Result<String> {
    let published = store.get(SHARED_API_KEY, Value::Null).map_err(InfraError::from)?;
    let published = published.as_str().filter(|key| !key.is_empty());

    match (configured.filter(|key| !key.is_empty()), published) {
        (Some(key), Some(_)) => Ok(key.to_string()),
        (Some(key), None) => {
            store.set(SHARED_API_KEY, Value::from(key)).map_err(InfraError::from)?;
            debug!("session.api_key_published");
            Ok(key.to_string())
        }
        (None, Some(shared)) => {
            info!("session.api_key_adopted");
            Ok(shared.to_string())
        }
        (None, None) => Err(MarketLensError::Config(
            "no api_key configured and none published by another client".to_string(),
        )),
    }
}

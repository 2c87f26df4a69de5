//! Client configuration consumed by the auth and dispatch layers.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_CALLBACK_HOST, DEFAULT_CALLBACK_PORT, DEFAULT_HTTPS_PROXY, DEFAULT_HTTP_PROXY,
    DEFAULT_MAX_CONCURRENCY, DEFAULT_NO_PROXY, DEFAULT_PAGE_LIMIT, DEFAULT_REQUEST_TIMEOUT_SECS,
    DEFAULT_SCOPES, DEFAULT_SHARED_NAMESPACE, ETSY_API_BASE_URL,
};
use crate::errors::{MarketLensError, Result};
use crate::types::VerbFilter;

/// Outbound proxy configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxySettings {
    pub use_proxy: bool,
    pub http_proxy: String,
    pub https_proxy: String,
    /// Comma-separated hosts that bypass the proxy.
    pub no_proxy: String,
    /// Keep TLS verification on while proxying. Off by default because the
    /// usual proxy is a local intercepting one with its own certificate.
    pub verify_tls_with_proxy: bool,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            use_proxy: false,
            http_proxy: DEFAULT_HTTP_PROXY.to_string(),
            https_proxy: DEFAULT_HTTPS_PROXY.to_string(),
            no_proxy: DEFAULT_NO_PROXY.to_string(),
            verify_tls_with_proxy: false,
        }
    }
}

/// Settings for one client session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Application keystring, sent as `client_id` and `x-api-key`.
    pub api_key: Option<String>,
    pub auto_close_browser: bool,
    pub auto_refresh_token: bool,
    pub auto_start_auth: bool,
    /// Callback listener host.
    pub host: String,
    /// Callback listener port, 1..=65535.
    pub port: u16,
    pub max_concurrency: usize,
    pub page_limit: u64,
    pub proxy: ProxySettings,
    /// Debug-level logging toggle.
    pub verbose: bool,
    pub log_json: bool,
    pub scopes: Vec<String>,
    pub reference_path: Option<PathBuf>,
    pub token_store_dir: Option<PathBuf>,
    pub shared_namespace: String,
    /// `None` waits for the OAuth callback indefinitely.
    pub callback_timeout_secs: Option<u64>,
    pub api_base_url: String,
    pub enabled_verbs: VerbFilter,
    pub http_max_attempts: usize,
    pub request_timeout_secs: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            auto_close_browser: true,
            auto_refresh_token: false,
            auto_start_auth: true,
            host: DEFAULT_CALLBACK_HOST.to_string(),
            port: DEFAULT_CALLBACK_PORT,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            page_limit: DEFAULT_PAGE_LIMIT,
            proxy: ProxySettings::default(),
            verbose: false,
            log_json: false,
            scopes: DEFAULT_SCOPES.iter().map(ToString::to_string).collect(),
            reference_path: None,
            token_store_dir: None,
            shared_namespace: DEFAULT_SHARED_NAMESPACE.to_string(),
            callback_timeout_secs: None,
            api_base_url: ETSY_API_BASE_URL.to_string(),
            enabled_verbs: VerbFilter::default(),
            http_max_attempts: 1,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl ClientSettings {
    /// Check value ranges.
    ///
    /// # Errors
    /// Returns `MarketLensError::Config` describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(MarketLensError::Config("port must be within 1..=65535".to_string()));
        }
        if self.host.trim().is_empty() {
            return Err(MarketLensError::Config("callback host must not be empty".to_string()));
        }
        if self.max_concurrency == 0 {
            return Err(MarketLensError::Config(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.page_limit == 0 {
            return Err(MarketLensError::Config("page_limit must be at least 1".to_string()));
        }
        if self.http_max_attempts == 0 {
            return Err(MarketLensError::Config(
                "http_max_attempts must be at least 1".to_string(),
            ));
        }
        if self.shared_namespace.is_empty()
            || !self
                .shared_namespace
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(MarketLensError::Config(format!(
                "shared_namespace {:?} may only contain letters, digits, '_' and '-'",
                self.shared_namespace
            )));
        }
        if self.proxy.use_proxy {
            for url in [&self.proxy.http_proxy, &self.proxy.https_proxy] {
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(MarketLensError::Config(format!("invalid proxy URL: {url}")));
                }
            }
        }
        Ok(())
    }

    /// Redirect URI registered with the authorization server.
    #[must_use]
    pub fn redirect_uri(&self) -> String {
        format!("http://{}:{}/callback", self.host, self.port)
    }
}

//! One reqwest client per session, shared by the token exchange and the
//! resource transport. Proxy and TLS settings are fixed at build time.
//!
//! Resource requests may be retried on a 5xx answer or a connection
//! failure, but only for idempotent verbs: a retried `POST` could create a
//! listing twice. Sessions default to a single attempt
//! (`http_max_attempts = 1`).

use std::time::Duration;

use marketlens_domain::constants::DEFAULT_REQUEST_TIMEOUT_SECS;
use marketlens_domain::{MarketLensError, ProxySettings};
use reqwest::{Client as ReqwestClient, Method, NoProxy, Proxy, RequestBuilder, Response};
use tracing::{debug, info, warn};

use crate::errors::InfraError;

const USER_AGENT: &str = concat!("marketlens/", env!("CARGO_PKG_VERSION"));

/// Longest pause between two attempts.
const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Shared HTTP client with optional retries for idempotent requests.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: ReqwestClient,
    max_attempts: usize,
    base_backoff: Duration,
}

impl HttpClient {
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::default()
    }

    /// Client with default timeout, no proxy and a single attempt.
    ///
    /// # Errors
    /// `Unknown` if reqwest cannot initialise its TLS backend.
    pub fn new() -> Result<Self, MarketLensError> {
        Self::builder().build()
    }

    /// The underlying reqwest client; the token exchange drives it directly.
    pub fn inner(&self) -> &ReqwestClient {
        &self.client
    }

    pub fn request<U>(&self, method: Method, url: U) -> RequestBuilder
    where
        U: reqwest::IntoUrl,
    {
        self.client.request(method, url)
    }

    /// Send `builder`, retrying idempotent requests on a 5xx answer or a
    /// connection failure until `max_attempts` is reached. The last answer
    /// is returned as is; status classification is the caller's job.
    ///
    /// # Errors
    /// The transport failure of the last attempt.
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response, MarketLensError> {
        let mut request = builder.build().map_err(into_domain)?;
        let attempts = if request.method().is_idempotent() { self.max_attempts } else { 1 };

        let mut attempt = 1;
        loop {
            // Bodies are buffered JSON, so only a streaming body fails to clone.
            let next = if attempt < attempts { request.try_clone() } else { None };
            let method = request.method().clone();
            let url = request.url().clone();
            let outcome = self.client.execute(request).await;

            let Some(retry) = next else {
                return outcome.map_err(into_domain);
            };
            match outcome {
                Ok(response) if response.status().is_server_error() => {
                    let status = response.status().as_u16();
                    warn!(%method, %url, status, attempt, "http_client.retrying");
                }
                Err(err) if is_transient(&err) => {
                    warn!(%method, %url, error = %err, attempt, "http_client.retrying");
                }
                other => return other.map_err(into_domain),
            }

            let delay = self.backoff_delay(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            request = retry;
            attempt += 1;
        }
    }

    /// `base_backoff * 2^(attempt - 1)`, capped at [`MAX_BACKOFF`].
    fn backoff_delay(&self, attempt: usize) -> Duration {
        let shift = u32::try_from(attempt.saturating_sub(1)).unwrap_or(u32::MAX).min(8);
        self.base_backoff.saturating_mul(1 << shift).min(MAX_BACKOFF)
    }
}

/// Builder for [`HttpClient`].
#[derive(Debug)]
pub struct HttpClientBuilder {
    timeout: Duration,
    max_attempts: usize,
    base_backoff: Duration,
    proxy: Option<ProxySettings>,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            max_attempts: 1,
            base_backoff: Duration::from_millis(200),
            proxy: None,
        }
    }
}

impl HttpClientBuilder {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Total attempts for idempotent requests (initial try + retries).
    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn base_backoff(mut self, backoff: Duration) -> Self {
        self.base_backoff = backoff;
        self
    }

    /// Route traffic through the configured proxies when `use_proxy` is set.
    /// TLS verification is switched off unless `verify_tls_with_proxy`.
    pub fn proxy(mut self, settings: &ProxySettings) -> Self {
        self.proxy = settings.use_proxy.then(|| settings.clone());
        self
    }

    /// # Errors
    /// `Config` for an unparseable proxy URL.
    pub fn build(self) -> Result<HttpClient, MarketLensError> {
        let mut builder = ReqwestClient::builder().timeout(self.timeout).user_agent(USER_AGENT);

        match &self.proxy {
            Some(settings) => {
                let bypass = NoProxy::from_string(&settings.no_proxy);
                let http = Proxy::http(&settings.http_proxy)
                    .map_err(|err| config_error("http_proxy", &err))?
                    .no_proxy(bypass.clone());
                let https = Proxy::https(&settings.https_proxy)
                    .map_err(|err| config_error("https_proxy", &err))?
                    .no_proxy(bypass);
                builder = builder
                    .proxy(http)
                    .proxy(https)
                    .danger_accept_invalid_certs(!settings.verify_tls_with_proxy);
                info!(
                    http_proxy = %settings.http_proxy,
                    https_proxy = %settings.https_proxy,
                    verify_tls = settings.verify_tls_with_proxy,
                    "http_client.proxy_enabled"
                );
            }
            None => builder = builder.no_proxy(),
        }

        let client = builder.build().map_err(into_domain)?;
        debug!(
            max_attempts = self.max_attempts,
            timeout_secs = self.timeout.as_secs(),
            "http_client.built"
        );

        Ok(HttpClient { client, max_attempts: self.max_attempts, base_backoff: self.base_backoff })
    }
}

fn is_transient(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

fn into_domain(err: reqwest::Error) -> MarketLensError {
    InfraError::from(err).into()
}

fn config_error(field: &str, err: &reqwest::Error) -> MarketLensError {
    MarketLensError::Config(format!("invalid {field}: {err}"))
}

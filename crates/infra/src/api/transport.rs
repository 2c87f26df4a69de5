//! HTTP transport for prepared resource requests
//!
//! Implements the core [`ResourceTransport`] port on top of the shared
//! [`HttpClient`]. Every request carries the application keystring in
//! `x-api-key` and the current bearer token; non-2xx answers are classified
//! through [`MarketLensError::from_status`].

use std::sync::Arc;

use async_trait::async_trait;
use marketlens_core::{PreparedRequest, ResourceTransport};
use marketlens_domain::{MarketLensError, Result};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use tracing::{debug, instrument, warn};
use url::Url;

use super::auth::AccessTokenProvider;
use crate::errors::InfraError;
use crate::http::HttpClient;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Resource client bound to one API base URL and keystring.
pub struct ResourceClient {
    http: HttpClient,
    base_url: String,
    api_key: String,
    auth: Arc<dyn AccessTokenProvider>,
}

impl ResourceClient {
    /// # Errors
    /// Returns `Config` if `base_url` is not an absolute URL.
    pub fn new(
        http: HttpClient,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        auth: Arc<dyn AccessTokenProvider>,
    ) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Url::parse(&base_url)
            .map_err(|e| MarketLensError::Config(format!("invalid API base URL {base_url}: {e}")))?;
        Ok(Self { http, base_url, api_key: api_key.into(), auth })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, request: &PreparedRequest) -> Result<Url> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, request.path)).map_err(|e| {
            MarketLensError::Validation(format!("invalid request path {}: {e}", request.path))
        })?;
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(request.query.iter());
        }
        Ok(url)
    }
}

#[async_trait]
impl ResourceTransport for ResourceClient {
    #[instrument(skip(self, request), fields(route = %request.route_name, verb = %request.verb))]
    async fn execute(&self, request: PreparedRequest) -> Result<Value> {
        let url = self.url_for(&request)?;
        let token = self.auth.access_token().await?;
        let method = Method::from_bytes(request.verb.as_str().as_bytes())
            .map_err(|e| MarketLensError::Internal(format!("unsupported verb: {e}")))?;

        let mut builder = self
            .http
            .request(method, url.clone())
            .header(API_KEY_HEADER, &self.api_key)
            .bearer_auth(token);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        debug!(%url, "resource.request");
        let response = self.http.send(builder).await?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(InfraError::from)?;

        if !status.is_success() {
            let detail = String::from_utf8_lossy(&bytes).into_owned();
            warn!(%url, status = status.as_u16(), "resource.request_failed");
            return Err(MarketLensError::from_status(status.as_u16(), detail));
        }

        if bytes.is_empty() || status == StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }
        let body = serde_json::from_slice(&bytes).map_err(InfraError::from)?;
        Ok(body)
    }
}

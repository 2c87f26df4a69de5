//! Conversions from external infrastructure errors into domain errors.

use marketlens_common::auth::{OAuthClientError, TokenRefresherError, TokenStoreError};
use marketlens_domain::MarketLensError;
use reqwest::Error as HttpError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub MarketLensError);

impl From<InfraError> for MarketLensError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<MarketLensError> for InfraError {
    fn from(value: MarketLensError) -> Self {
        InfraError(value)
    }
}

/// Extension trait to make the conversion logic explicit in tests and within
/// this module.
trait IntoMarketLensError {
    fn into_marketlens(self) -> MarketLensError;
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → MarketLensError */
/* -------------------------------------------------------------------------- */

fn http_error_class(err: &HttpError) -> &'static str {
    if err.is_timeout() {
        return "timeout";
    }
    #[cfg(not(target_arch = "wasm32"))]
    if err.is_connect() {
        return "connect";
    }
    if err.is_decode() {
        return "decode";
    }
    if err.is_builder() {
        return "builder";
    }
    if err.is_redirect() {
        return "redirect";
    }
    if err.is_body() {
        return "body";
    }
    "request"
}

impl IntoMarketLensError for HttpError {
    fn into_marketlens(self) -> MarketLensError {
        if let Some(status) = self.status() {
            return MarketLensError::from_status(status.as_u16(), self.to_string());
        }

        MarketLensError::Unknown {
            type_name: format!("reqwest::Error({})", http_error_class(&self)),
            message: self.to_string(),
        }
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        InfraError(value.into_marketlens())
    }
}

/* -------------------------------------------------------------------------- */
/* serde_json::Error → MarketLensError */
/* -------------------------------------------------------------------------- */

impl From<serde_json::Error> for InfraError {
    fn from(value: serde_json::Error) -> Self {
        InfraError(MarketLensError::Unknown {
            type_name: "serde_json::Error".to_string(),
            message: value.to_string(),
        })
    }
}

/* -------------------------------------------------------------------------- */
/* auth layer errors → MarketLensError */
/* -------------------------------------------------------------------------- */

impl IntoMarketLensError for OAuthClientError {
    fn into_marketlens(self) -> MarketLensError {
        match self {
            OAuthClientError::RequestFailed(err) => err.into_marketlens(),
            other => MarketLensError::Auth(other.to_string()),
        }
    }
}

impl From<OAuthClientError> for InfraError {
    fn from(value: OAuthClientError) -> Self {
        InfraError(value.into_marketlens())
    }
}

impl From<TokenStoreError> for InfraError {
    fn from(value: TokenStoreError) -> Self {
        InfraError(MarketLensError::Resource(value.to_string()))
    }
}

impl From<TokenRefresherError> for InfraError {
    fn from(value: TokenRefresherError) -> Self {
        match value {
            TokenRefresherError::Store(err) => err.into(),
            other => InfraError(MarketLensError::Auth(other.to_string())),
        }
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */

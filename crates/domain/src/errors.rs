//! Error types used throughout MarketLens

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upstream HTTP statuses that get a dedicated classification.
///
/// Any other non-success status is reported as
/// [`MarketLensError::Unknown`] with the `UnexpectedStatus` type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HttpStatusKind {
    BadRequest,
    Unauthorised,
    Forbidden,
    NotFound,
    Conflict,
    InternalServerError,
}

impl HttpStatusKind {
    /// Map a raw status code onto its classification.
    #[must_use]
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            400 => Some(Self::BadRequest),
            401 => Some(Self::Unauthorised),
            403 => Some(Self::Forbidden),
            404 => Some(Self::NotFound),
            409 => Some(Self::Conflict),
            500 => Some(Self::InternalServerError),
            _ => None,
        }
    }

    #[must_use]
    pub fn code(self) -> u16 {
        match self {
            Self::BadRequest => 400,
            Self::Unauthorised => 401,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::InternalServerError => 500,
        }
    }

    /// User-facing message for the status.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::BadRequest => "400 Bad request.",
            Self::Unauthorised => "401 Unauthorised.",
            Self::Forbidden => "403 Forbidden.",
            Self::NotFound => "404 Not found.",
            Self::Conflict => "409 Conflict.",
            Self::InternalServerError => "500 Internal server error.",
        }
    }
}

/// Main error type for MarketLens
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "details")]
pub enum MarketLensError {
    /// Authorization, token exchange or refresh failed.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// A route argument is missing or violates its schema. Raised before
    /// any request is sent.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{} {detail}", .status.label())]
    HttpStatus { status: HttpStatusKind, detail: String },

    /// Shared token store could not be allocated or accessed.
    #[error("Resource error: {0}")]
    Resource(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Anything else raised by the HTTP layer, with the original type name
    /// preserved for display.
    #[error("{type_name}: {message}")]
    Unknown { type_name: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MarketLensError {
    /// Build an HTTP status error from a raw code, falling back to
    /// `Unknown` for codes without a dedicated classification.
    #[must_use]
    pub fn from_status(code: u16, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        match HttpStatusKind::from_code(code) {
            Some(status) => Self::HttpStatus { status, detail },
            None => Self::Unknown {
                type_name: "UnexpectedStatus".to_string(),
                message: format!("HTTP {code}: {detail}"),
            },
        }
    }

    /// Status code carried by an `HttpStatus` error.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(status.code()),
            _ => None,
        }
    }

    /// Whether repeating the same request could succeed. Auth, validation
    /// and cancellation failures never are.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::HttpStatus { status, .. } => *status == HttpStatusKind::InternalServerError,
            Self::Unknown { .. } => true,
            _ => false,
        }
    }

    /// Stable label suitable for structured logging.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Auth(_) => "auth",
            Self::Validation(_) => "validation",
            Self::HttpStatus { .. } => "http_status",
            Self::Resource(_) => "resource",
            Self::NotFound(_) => "not_found",
            Self::Unknown { .. } => "unknown",
            Self::Config(_) => "config",
            Self::Cancelled => "cancelled",
            Self::Internal(_) => "internal",
        }
    }
}

/// Result type alias for MarketLens operations
pub type Result<T> = std::result::Result<T, MarketLensError>;

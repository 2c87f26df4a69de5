//! Application constants
//!
//! Upstream endpoints and client defaults shared across crates.

// Upstream endpoints
pub const ETSY_API_BASE_URL: &str = "https://openapi.etsy.com";

// Callback listener
pub const DEFAULT_CALLBACK_HOST: &str = "localhost";
pub const DEFAULT_CALLBACK_PORT: u16 = 5000;
pub const CALLBACK_PATH: &str = "/callback";

// Dispatch
/// Upstream allows roughly ten requests per second; eight in flight keeps
/// a paginated call under that.
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;
pub const DEFAULT_PAGE_LIMIT: u64 = 100;
pub const OFFSET_PARAMETER: &str = "offset";
pub const LIMIT_PARAMETER: &str = "limit";
/// Upper bound on the windows one sequenced plan may expand to.
pub const MAX_PAGINATION_WINDOWS: u64 = 10_000;
/// Response fields summed across pagination windows.
pub const DEFAULT_ADDITIVE_FIELDS: &[&str] = &["count"];
/// Key used for list bodies that are not wrapped in an object.
pub const RESULTS_FIELD: &str = "results";
/// Key used for scalar bodies that are not wrapped in an object.
pub const VALUE_FIELD: &str = "value";

/// Argument names consumed by dispatch plumbing; never exposed as route
/// parameters.
pub const RESERVED_PARAMETER_NAMES: &[&str] = &["path", "method", "self"];

// Proxy
pub const DEFAULT_HTTP_PROXY: &str = "http://localhost:8080";
pub const DEFAULT_HTTPS_PROXY: &str = "https://localhost:8080";
pub const DEFAULT_NO_PROXY: &str = "127.0.0.1,localhost,.local";

// Shared token store
pub const DEFAULT_SHARED_NAMESPACE: &str = "marketlens";
pub const SHARED_API_KEY: &str = "api_key";

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Scopes requested when none are configured.
pub const DEFAULT_SCOPES: &[&str] = &[
    "address_r",
    "address_w",
    "billing_r",
    "cart_r",
    "cart_w",
    "email_r",
    "favorites_r",
    "favorites_w",
    "feedback_r",
    "listings_d",
    "listings_r",
    "listings_w",
    "profile_r",
    "profile_w",
    "recommend_r",
    "recommend_w",
    "shops_r",
    "shops_w",
    "transactions_r",
    "transactions_w",
];

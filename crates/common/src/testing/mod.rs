//! Testing utilities
//!
//! Scripted stand-ins for the token endpoint so that the refresher and the
//! login flow can be exercised without a network.
//!
//! ## Usage
//!
//! ```rust
//! # #[cfg(feature = "test-utils")]
//! # {
//! use marketlens_common::testing::MockOAuthClient;
//!
//! let client = MockOAuthClient::new().with_expires_in(60);
//! client.set_should_fail(true);
//! assert!(client.refresh_calls().is_empty());
//! # }
//! ```

pub mod mocks;

pub use mocks::MockOAuthClient;

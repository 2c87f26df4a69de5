//! Port interfaces for request dispatch
//!
//! The dispatcher only knows how to fan requests out and merge the answers;
//! the transport that actually talks HTTP lives in infrastructure.

use async_trait::async_trait;
use marketlens_domain::Result;
use serde_json::Value;

use crate::catalog::PreparedRequest;

/// Executes one prepared request and returns the decoded body.
#[async_trait]
pub trait ResourceTransport: Send + Sync {
    /// Send `request` and decode the JSON body.
    ///
    /// Failures must already be classified: `HttpStatus` for the upstream
    /// statuses with a dedicated label, `Unknown` for everything else.
    async fn execute(&self, request: PreparedRequest) -> Result<Value>;
}

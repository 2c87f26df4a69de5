//! Browser hand-off for the authorization URL.

use marketlens_domain::{MarketLensError, Result};
use tracing::info;

/// Opens the authorization URL for the user.
pub trait BrowserOpener: Send + Sync {
    /// # Errors
    /// Returns `Auth` when the URL could not be handed to a browser.
    fn open(&self, url: &str) -> Result<()>;
}

/// The desktop's default browser.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl BrowserOpener for SystemBrowser {
    fn open(&self, url: &str) -> Result<()> {
        open::that(url)
            .map_err(|err| MarketLensError::Auth(format!("failed to open browser: {err}")))
    }
}

/// Leaves opening to the caller; the URL is only logged.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManualBrowser;

impl BrowserOpener for ManualBrowser {
    fn open(&self, url: &str) -> Result<()> {
        info!(%url, "oauth_flow.open_url_manually");
        Ok(())
    }
}

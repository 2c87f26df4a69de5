//! Shared helpers for infra integration tests.

#![allow(dead_code)]

use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use marketlens_domain::{ClientSettings, MarketLensError, Result};
use marketlens_infra::auth::BrowserOpener;
use parking_lot::Mutex;
use url::Url;

/// A free loopback port. The probe socket is closed before returning.
pub fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port()
}

/// The reference document shipped with the core crate's tests.
pub fn reference_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../core/tests/fixtures/reference_getshop.json")
}

/// Settings for a loopback login against mock servers.
pub fn settings(api_base_url: &str, port: u16) -> ClientSettings {
    ClientSettings {
        api_key: Some("keystring".to_string()),
        host: "127.0.0.1".to_string(),
        port,
        api_base_url: api_base_url.to_string(),
        callback_timeout_secs: Some(5),
        scopes: vec!["shops_r".to_string(), "listings_r".to_string()],
        ..ClientSettings::default()
    }
}

/// Stands in for the user: follows the authorization URL straight to the
/// `redirect_uri` with a fixed code.
pub struct CallbackBrowser {
    code: String,
    state_override: Option<String>,
    opened: Mutex<Vec<String>>,
}

impl CallbackBrowser {
    pub fn new(code: &str) -> Arc<Self> {
        Arc::new(Self { code: code.to_string(), state_override: None, opened: Mutex::new(Vec::new()) })
    }

    /// Answer with this state instead of the one in the URL.
    pub fn forging(code: &str, state: &str) -> Arc<Self> {
        Arc::new(Self {
            code: code.to_string(),
            state_override: Some(state.to_string()),
            opened: Mutex::new(Vec::new()),
        })
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().clone()
    }
}

impl BrowserOpener for CallbackBrowser {
    fn open(&self, url: &str) -> Result<()> {
        self.opened.lock().push(url.to_string());

        let parsed = Url::parse(url).map_err(|e| MarketLensError::Auth(e.to_string()))?;
        let param = |name: &str| {
            parsed.query_pairs().find(|(key, _)| key == name).map(|(_, value)| value.into_owned())
        };
        let redirect = param("redirect_uri")
            .ok_or_else(|| MarketLensError::Auth("no redirect_uri".to_string()))?;
        let state = self.state_override.clone().or_else(|| param("state")).unwrap_or_default();

        let mut callback = Url::parse(&redirect).map_err(|e| MarketLensError::Auth(e.to_string()))?;
        callback.query_pairs_mut().append_pair("code", &self.code).append_pair("state", &state);

        tokio::spawn(async move {
            let http = reqwest::Client::builder().no_proxy().build().unwrap();
            // The listener may not be bound yet when `begin` opens the browser.
            for _ in 0..100 {
                if http.get(callback.clone()).send().await.is_ok() {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        });
        Ok(())
    }
}

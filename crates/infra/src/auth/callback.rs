//! Loopback listener for the OAuth redirect.
//!
//! Serves exactly one `GET /callback`. The first request is validated
//! (`code` present, `state` matching, no `error` parameter), answered with a
//! small HTML page and handed to [`CallbackListener::wait`]; the server then
//! shuts down gracefully. Anything that arrives in between gets a 410 page
//! and is otherwise ignored.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use marketlens_common::auth::states_match;
use marketlens_domain::constants::CALLBACK_PATH;
use marketlens_domain::{MarketLensError, Result};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Query parameters of an accepted callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: String,
    pub state: String,
}

struct CallbackShared {
    expected_state: String,
    auto_close: bool,
    outcome: Mutex<Option<oneshot::Sender<Result<CallbackParams>>>>,
    shutdown: CancellationToken,
}

/// Single-use loopback HTTP server.
pub struct CallbackListener {
    local_addr: SocketAddr,
    outcome: Option<oneshot::Receiver<Result<CallbackParams>>>,
    shutdown: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl CallbackListener {
    /// Bind `host:port` and start serving.
    ///
    /// # Errors
    /// Returns `Auth` if the address cannot be bound.
    pub async fn bind(
        host: &str,
        port: u16,
        expected_state: impl Into<String>,
        auto_close: bool,
    ) -> Result<Self> {
        let listener = TcpListener::bind((host, port)).await.map_err(|err| {
            MarketLensError::Auth(format!(
                "failed to bind OAuth callback listener on {host}:{port}: {err}"
            ))
        })?;
        let local_addr = listener.local_addr().map_err(|err| {
            MarketLensError::Auth(format!("failed to determine callback address: {err}"))
        })?;

        let (tx, rx) = oneshot::channel();
        let shutdown = CancellationToken::new();
        let shared = Arc::new(CallbackShared {
            expected_state: expected_state.into(),
            auto_close,
            outcome: Mutex::new(Some(tx)),
            shutdown: shutdown.clone(),
        });

        let app = Router::new().route(CALLBACK_PATH, get(handle_callback)).with_state(shared);

        let token = shutdown.clone();
        let handle = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await
            {
                error!(error = %err, "oauth_callback.server_error");
            }
        });

        info!(%local_addr, "oauth_callback.listening");
        Ok(Self { local_addr, outcome: Some(rx), shutdown, handle: Some(handle) })
    }

    /// Address actually bound (differs from the request when port 0 was
    /// asked for).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait for the one callback. `None` waits forever.
    ///
    /// # Errors
    /// Returns `Auth` on timeout, a state mismatch, a missing `code`, or an
    /// authorization error reported by the provider.
    pub async fn wait(mut self, timeout: Option<Duration>) -> Result<CallbackParams> {
        let receiver = self.outcome.take().ok_or_else(|| {
            MarketLensError::Internal("callback listener already consumed".to_string())
        })?;

        let received = match timeout {
            Some(limit) => match tokio::time::timeout(limit, receiver).await {
                Ok(received) => received,
                Err(_) => {
                    warn!(timeout_secs = limit.as_secs(), "oauth_callback.timed_out");
                    self.close().await;
                    return Err(MarketLensError::Auth(format!(
                        "timed out after {}s waiting for the authorization callback",
                        limit.as_secs()
                    )));
                }
            },
            None => receiver.await,
        };

        self.close().await;
        received.map_err(|_| {
            MarketLensError::Auth("callback listener stopped before a callback arrived".to_string())
        })?
    }

    async fn close(&mut self) {
        self.shutdown.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                if err.is_panic() {
                    error!(error = %err, "oauth_callback.server_panicked");
                }
            }
        }
        debug!(local_addr = %self.local_addr, "oauth_callback.closed");
    }
}

impl Drop for CallbackListener {
    fn drop(&mut self) {
        self.shutdown.cancel();
        if let Some(handle) = self.handle.take() {
            if !handle.is_finished() {
                handle.abort();
            }
        }
    }
}

async fn handle_callback(
    State(shared): State<Arc<CallbackShared>>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, Html<String>) {
    let Some(sender) = shared.outcome.lock().take() else {
        debug!("oauth_callback.repeat_request");
        let page = render_page(
            "Callback already handled",
            "This authorization attempt is already complete.",
            false,
        );
        return (StatusCode::GONE, Html(page));
    };

    let outcome = evaluate(&shared.expected_state, &params);
    let page = match &outcome {
        Ok(_) => {
            info!("oauth_callback.accepted");
            let page = render_page(
                "Authorization Successful",
                "You can close this window.",
                shared.auto_close,
            );
            (StatusCode::OK, Html(page))
        }
        Err(err) => {
            warn!(error = %err, "oauth_callback.rejected");
            let page = render_page(
                "Authorization Failed",
                &escape_html(&err.to_string()),
                shared.auto_close,
            );
            (StatusCode::BAD_REQUEST, Html(page))
        }
    };

    // Receiver may be gone after a timeout; nothing left to notify.
    let _ = sender.send(outcome);
    shared.shutdown.cancel();
    page
}

fn evaluate(expected_state: &str, params: &HashMap<String, String>) -> Result<CallbackParams> {
    if let Some(error) = params.get("error") {
        let message = match params.get("error_description") {
            Some(description) => format!("authorization denied: {error} ({description})"),
            None => format!("authorization denied: {error}"),
        };
        return Err(MarketLensError::Auth(message));
    }
    let Some(code) = params.get("code").filter(|c| !c.is_empty()) else {
        return Err(MarketLensError::Auth("callback is missing the `code` parameter".to_string()));
    };
    let state = params.get("state").map_or("", String::as_str);
    if !states_match(expected_state, state) {
        return Err(MarketLensError::Auth(
            "callback state does not match the authorization request".to_string(),
        ));
    }
    Ok(CallbackParams { code: code.clone(), state: state.to_string() })
}

fn render_page(title: &str, message: &str, auto_close: bool) -> String {
    let onload = if auto_close { r#" onload="window.top.close()""# } else { "" };
    format!(
        "<!DOCTYPE html>\n<html>\n<head><title>{title}</title></head>\n\
         <body{onload}><h1>{title}</h1><p>{message}</p></body>\n</html>"
    )
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;").replace('"', "&quot;")
}

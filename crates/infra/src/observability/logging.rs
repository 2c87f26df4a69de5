//! Global subscriber installation.

use marketlens_domain::{ClientSettings, MarketLensError, Result};
use tracing_subscriber::EnvFilter;

/// Default filter directive for the given verbosity. The `marketlens`
/// target prefix covers every workspace crate; dependencies stay at warn.
#[must_use]
pub fn log_filter(verbose: bool) -> String {
    let level = if verbose { "debug" } else { "info" };
    format!("marketlens={level},warn")
}

/// Install the global fmt subscriber.
///
/// `RUST_LOG` takes precedence over the settings.
///
/// # Errors
/// Returns `MarketLensError::Config` when a global subscriber is already
/// installed.
pub fn init_tracing(settings: &ClientSettings) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_filter(settings.verbose)));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let installed = if settings.log_json {
        subscriber.json().try_init()
    } else {
        subscriber.try_init()
    };

    installed.map_err(|err| {
        MarketLensError::Config(format!("failed to install tracing subscriber: {err}"))
    })
}

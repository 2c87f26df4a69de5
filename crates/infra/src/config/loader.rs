//! Configuration loader
//!
//! Loads [`ClientSettings`] from a file, environment variables, or both.
//!
//! ## Loading Strategy
//! 1. Start from the first config file [`probe_config_paths`] finds, or from
//!    defaults when there is none
//! 2. Overlay `MARKETLENS_*` environment variables
//! 3. Validate the result
//!
//! ## Environment Variables
//! - `MARKETLENS_API_KEY`: Application keystring
//! - `MARKETLENS_HOST` / `MARKETLENS_PORT`: OAuth callback listener address
//! - `MARKETLENS_MAX_CONCURRENCY`: Requests in flight per dispatch
//! - `MARKETLENS_PAGE_LIMIT`: Page size for sequenced dispatches
//! - `MARKETLENS_AUTO_CLOSE_BROWSER`: Close the callback tab (true/false)
//! - `MARKETLENS_AUTO_REFRESH_TOKEN`: Keep the token fresh (true/false)
//! - `MARKETLENS_AUTO_START_AUTH`: Authenticate on connect (true/false)
//! - `MARKETLENS_VERBOSE`: Debug logging (true/false)
//! - `MARKETLENS_USE_PROXY`: Route traffic through the proxies (true/false)
//! - `MARKETLENS_HTTP_PROXY` / `MARKETLENS_HTTPS_PROXY`: Proxy URLs
//! - `MARKETLENS_REFERENCE_PATH`: API reference document
//! - `MARKETLENS_TOKEN_STORE_DIR`: Directory of the shared token store
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./marketlens.toml` or `./marketlens.json` (current working directory)
//! 2. `./config.toml` or `./config.json` (current working directory)
//! 3. The same names next to the executable

use std::path::{Path, PathBuf};
use std::str::FromStr;

use marketlens_domain::{ClientSettings, MarketLensError, Result};

const CONFIG_FILE_NAMES: &[&str] =
    &["marketlens.toml", "marketlens.json", "config.toml", "config.json"];

/// Load configuration: file (if any), then environment, then validation.
///
/// # Errors
/// Returns `MarketLensError::Config` if the file cannot be parsed, an
/// environment variable holds an invalid value, or validation fails.
pub fn load() -> Result<ClientSettings> {
    let mut settings = match probe_config_paths() {
        Some(path) => read_file(&path)?,
        None => {
            tracing::debug!("config.no_file_found");
            ClientSettings::default()
        }
    };
    apply_env(&mut settings)?;
    settings.validate()?;
    Ok(settings)
}

/// Defaults overlaid with `MARKETLENS_*` environment variables.
///
/// # Errors
/// Returns `MarketLensError::Config` if a variable holds an invalid value.
pub fn load_from_env() -> Result<ClientSettings> {
    let mut settings = ClientSettings::default();
    apply_env(&mut settings)?;
    settings.validate()?;
    tracing::info!("config.loaded_from_env");
    Ok(settings)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes multiple locations for config files.
/// Supports both JSON and TOML formats (detected by file extension).
///
/// # Errors
/// Returns `MarketLensError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
pub fn load_from_file(path: Option<PathBuf>) -> Result<ClientSettings> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(MarketLensError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            MarketLensError::Config(
                "No config file found in any of the standard locations".to_string(),
            )
        })?,
    };

    let settings = read_file(&config_path)?;
    settings.validate()?;
    Ok(settings)
}

fn read_file(path: &Path) -> Result<ClientSettings> {
    tracing::info!(path = %path.display(), "config.loading_file");

    let contents = std::fs::read_to_string(path)
        .map_err(|e| MarketLensError::Config(format!("Failed to read config file: {e}")))?;

    parse_config(&contents, path)
}

/// Parse configuration from string content
///
/// Format is detected by file extension (`.json` or `.toml`).
///
/// # Errors
/// Returns `MarketLensError::Config` if format is invalid or parsing fails.
fn parse_config(contents: &str, path: &Path) -> Result<ClientSettings> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| MarketLensError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| MarketLensError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(MarketLensError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// Probe for a configuration file in the working directory, then next to
/// the executable. Returns the first that exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut roots = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        roots.push(cwd);
    }
    if let Some(exe_dir) =
        std::env::current_exe().ok().and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        roots.push(exe_dir);
    }

    roots
        .iter()
        .flat_map(|root| CONFIG_FILE_NAMES.iter().map(move |name| root.join(name)))
        .find(|path| path.exists())
}

fn apply_env(settings: &mut ClientSettings) -> Result<()> {
    if let Some(key) = env_string("MARKETLENS_API_KEY") {
        settings.api_key = Some(key);
    }
    if let Some(host) = env_string("MARKETLENS_HOST") {
        settings.host = host;
    }
    if let Some(port) = env_parse("MARKETLENS_PORT")? {
        settings.port = port;
    }
    if let Some(max) = env_parse("MARKETLENS_MAX_CONCURRENCY")? {
        settings.max_concurrency = max;
    }
    if let Some(limit) = env_parse("MARKETLENS_PAGE_LIMIT")? {
        settings.page_limit = limit;
    }

    settings.auto_close_browser =
        env_bool("MARKETLENS_AUTO_CLOSE_BROWSER", settings.auto_close_browser);
    settings.auto_refresh_token =
        env_bool("MARKETLENS_AUTO_REFRESH_TOKEN", settings.auto_refresh_token);
    settings.auto_start_auth = env_bool("MARKETLENS_AUTO_START_AUTH", settings.auto_start_auth);
    settings.verbose = env_bool("MARKETLENS_VERBOSE", settings.verbose);
    settings.proxy.use_proxy = env_bool("MARKETLENS_USE_PROXY", settings.proxy.use_proxy);

    if let Some(url) = env_string("MARKETLENS_HTTP_PROXY") {
        settings.proxy.http_proxy = url;
    }
    if let Some(url) = env_string("MARKETLENS_HTTPS_PROXY") {
        settings.proxy.https_proxy = url;
    }
    if let Some(path) = env_string("MARKETLENS_REFERENCE_PATH") {
        settings.reference_path = Some(PathBuf::from(path));
    }
    if let Some(dir) = env_string("MARKETLENS_TOKEN_STORE_DIR") {
        settings.token_store_dir = Some(PathBuf::from(dir));
    }
    Ok(())
}

/// Non-empty environment variable.
fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Parse a numeric environment variable, `None` when unset.
///
/// # Errors
/// Returns `MarketLensError::Config` if the value does not parse.
fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_string(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| MarketLensError::Config(format!("Invalid value for {key}: {e}")))
        })
        .transpose()
}

/// Parse boolean from environment variable
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
///
/// # Returns
/// The parsed boolean value, or `default` if not set.
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Mutex;

    use once_cell::sync::Lazy;
    use tempfile::NamedTempFile;

    use super::*;

    static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    const ALL_VARS: &[&str] = &[
        "MARKETLENS_API_KEY",
        "MARKETLENS_HOST",
        "MARKETLENS_PORT",
        "MARKETLENS_MAX_CONCURRENCY",
        "MARKETLENS_PAGE_LIMIT",
        "MARKETLENS_AUTO_CLOSE_BROWSER",
        "MARKETLENS_AUTO_REFRESH_TOKEN",
        "MARKETLENS_AUTO_START_AUTH",
        "MARKETLENS_VERBOSE",
        "MARKETLENS_USE_PROXY",
        "MARKETLENS_HTTP_PROXY",
        "MARKETLENS_HTTPS_PROXY",
        "MARKETLENS_REFERENCE_PATH",
        "MARKETLENS_TOKEN_STORE_DIR",
    ];

    fn clear_env() {
        for key in ALL_VARS {
            std::env::remove_var(key);
        }
    }

    fn temp_config(contents: &str, extension: &str) -> (NamedTempFile, PathBuf) {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(contents.as_bytes()).unwrap();
        let path = temp_file.path().with_extension(extension);
        std::fs::copy(temp_file.path(), &path).unwrap();
        (temp_file, path)
    }

    #[test]
    fn test_env_bool_parsing() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");

        for (i, value) in ["1", "true", "yes", "on", "TRUE"].iter().enumerate() {
            let key = format!("MARKETLENS_TEST_BOOL_TRUE_{i}");
            std::env::set_var(&key, value);
            assert!(env_bool(&key, false), "{value} should be true");
            std::env::remove_var(&key);
        }

        for (i, value) in ["0", "false", "no", "off"].iter().enumerate() {
            let key = format!("MARKETLENS_TEST_BOOL_FALSE_{i}");
            std::env::set_var(&key, value);
            assert!(!env_bool(&key, true), "{value} should be false");
            std::env::remove_var(&key);
        }

        std::env::remove_var("MARKETLENS_TEST_BOOL_MISSING");
        assert!(env_bool("MARKETLENS_TEST_BOOL_MISSING", true));
        assert!(!env_bool("MARKETLENS_TEST_BOOL_MISSING", false));
    }

    #[test]
    fn test_load_from_env_defaults() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();

        let settings = load_from_env().unwrap();
        assert_eq!(settings, ClientSettings::default());
    }

    #[test]
    fn test_load_from_env_all_vars_set() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();

        std::env::set_var("MARKETLENS_API_KEY", "keystring");
        std::env::set_var("MARKETLENS_HOST", "127.0.0.1");
        std::env::set_var("MARKETLENS_PORT", "5123");
        std::env::set_var("MARKETLENS_MAX_CONCURRENCY", "4");
        std::env::set_var("MARKETLENS_PAGE_LIMIT", "25");
        std::env::set_var("MARKETLENS_AUTO_CLOSE_BROWSER", "off");
        std::env::set_var("MARKETLENS_AUTO_REFRESH_TOKEN", "yes");
        std::env::set_var("MARKETLENS_AUTO_START_AUTH", "0");
        std::env::set_var("MARKETLENS_VERBOSE", "true");
        std::env::set_var("MARKETLENS_USE_PROXY", "1");
        std::env::set_var("MARKETLENS_HTTP_PROXY", "http://proxy.internal:3128");
        std::env::set_var("MARKETLENS_HTTPS_PROXY", "http://proxy.internal:3129");
        std::env::set_var("MARKETLENS_REFERENCE_PATH", "/srv/etsy/reference.json");
        std::env::set_var("MARKETLENS_TOKEN_STORE_DIR", "/tmp/marketlens-test");

        let result = load_from_env();
        clear_env();
        let settings = result.unwrap();

        assert_eq!(settings.api_key.as_deref(), Some("keystring"));
        assert_eq!(settings.redirect_uri(), "http://127.0.0.1:5123/callback");
        assert_eq!(settings.max_concurrency, 4);
        assert_eq!(settings.page_limit, 25);
        assert!(!settings.auto_close_browser);
        assert!(settings.auto_refresh_token);
        assert!(!settings.auto_start_auth);
        assert!(settings.verbose);
        assert!(settings.proxy.use_proxy);
        assert_eq!(settings.proxy.https_proxy, "http://proxy.internal:3129");
        assert_eq!(settings.reference_path, Some(PathBuf::from("/srv/etsy/reference.json")));
        assert_eq!(settings.token_store_dir, Some(PathBuf::from("/tmp/marketlens-test")));
    }

    #[test]
    fn test_load_from_env_invalid_values() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();

        std::env::set_var("MARKETLENS_PORT", "not-a-number");
        let bad_port = load_from_env();
        std::env::set_var("MARKETLENS_PORT", "0");
        let zero_port = load_from_env();
        std::env::set_var("MARKETLENS_PORT", "70000");
        let out_of_range = load_from_env();
        clear_env();

        assert!(matches!(bad_port, Err(MarketLensError::Config(_))));
        assert!(matches!(zero_port, Err(MarketLensError::Config(_))));
        assert!(matches!(out_of_range, Err(MarketLensError::Config(_))));
    }

    #[test]
    fn test_load_from_file_json() {
        let (_temp, path) = temp_config(
            r#"{
                "api_key": "from-json",
                "port": 5050,
                "max_concurrency": 2,
                "proxy": {"use_proxy": false, "no_proxy": "localhost"}
            }"#,
            "json",
        );

        let settings = load_from_file(Some(path.clone())).unwrap();
        assert_eq!(settings.api_key.as_deref(), Some("from-json"));
        assert_eq!(settings.port, 5050);
        assert_eq!(settings.max_concurrency, 2);
        assert_eq!(settings.proxy.no_proxy, "localhost");
        assert_eq!(settings.page_limit, 100);

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_load_from_file_toml() {
        let (_temp, path) = temp_config(
            r#"
api_key = "from-toml"
auto_refresh_token = true
enabled_verbs = ["GET", "POST"]

[proxy]
use_proxy = true
http_proxy = "http://localhost:8888"
https_proxy = "http://localhost:8888"
"#,
            "toml",
        );

        let settings = load_from_file(Some(path.clone())).unwrap();
        assert_eq!(settings.api_key.as_deref(), Some("from-toml"));
        assert!(settings.auto_refresh_token);
        assert!(settings.proxy.use_proxy);
        assert!(settings.enabled_verbs.allows(marketlens_domain::HttpVerb::Post));
        assert!(!settings.enabled_verbs.allows(marketlens_domain::HttpVerb::Delete));

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_load_from_file_rejects_invalid_settings() {
        let (_temp, path) = temp_config(r#"{"shared_namespace": "../escape"}"#, "json");

        let result = load_from_file(Some(path.clone()));
        assert!(matches!(result, Err(MarketLensError::Config(_))));

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_load_from_file_not_found() {
        let result = load_from_file(Some(PathBuf::from("/nonexistent/marketlens.json")));
        assert!(matches!(result, Err(MarketLensError::Config(_))));
    }

    #[test]
    fn test_load_from_file_invalid_json() {
        let (_temp, path) = temp_config(r#"{ "this is": "not valid json" "#, "json");

        let result = load_from_file(Some(path.clone()));
        assert!(result.is_err(), "Should fail with invalid JSON");

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_parse_config_unsupported_format() {
        let result = parse_config("some content", &PathBuf::from("test.yaml"));
        assert!(result.is_err(), "Should fail with unsupported format");
    }
}

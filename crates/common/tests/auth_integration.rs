//! Integration tests for auth module
//!
//! Tests the PKCE authorization URL, code exchange and refresh grants
//! against a mock token endpoint, and credential round trips through the
//! token store.

#![cfg(feature = "platform")]

use marketlens_common::auth::{
    code_challenge_for, Credential, OAuthClient, OAuthClientError, OAuthConfig, TokenStore,
    MAX_CREDENTIAL_LIFETIME_SECS,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer) -> OAuthConfig {
    OAuthConfig::new(
        "keystring".to_string(),
        "http://localhost:5000/callback".to_string(),
        vec!["shops_r".to_string(), "transactions_r".to_string()],
    )
    .with_endpoints(format!("{}/oauth/connect", server.uri()), format!("{}/oauth/token", server.uri()))
}

fn query_param(url: &str, name: &str) -> Option<String> {
    let (_, query) = url.split_once('?')?;
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == name).then(|| urlencoding::decode(value).ok().map(|v| v.into_owned()))?
    })
}

/// Validates the authorization URL against the token exchange.
///
/// # Test Steps
/// 1. Generate the authorization URL
/// 2. Capture the verifier sent with the exchange
/// 3. Verify the URL's challenge is the S256 hash of that verifier
#[tokio::test]
async fn test_challenge_matches_exchanged_verifier() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "a",
            "refresh_token": "r",
            "expires_in": 3600,
        })))
        .expect(1)
        .mount(&server)
        .await;
    let client = OAuthClient::new(config(&server));

    let (url, state) = client.generate_authorization_url().await.unwrap();
    assert_eq!(query_param(&url, "response_type").as_deref(), Some("code"));
    assert_eq!(query_param(&url, "scope").as_deref(), Some("shops_r transactions_r"));
    assert!(url.contains("scope=shops_r%20transactions_r"));
    assert_eq!(query_param(&url, "state"), Some(state.clone()));

    client.exchange_code_for_tokens("code", &state).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let verifier = body["code_verifier"].as_str().unwrap();
    assert_eq!(query_param(&url, "code_challenge"), Some(code_challenge_for(verifier)));
}

/// Validates that the pending attempt is single use.
///
/// # Test Steps
/// 1. Exchange once successfully
/// 2. Verify a replay of the same state fails before any request
#[tokio::test]
async fn test_exchange_is_single_use() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "a",
            "refresh_token": "r",
            "expires_in": 3600,
        })))
        .expect(1)
        .mount(&server)
        .await;
    let client = OAuthClient::new(config(&server));

    let (_, state) = client.generate_authorization_url().await.unwrap();
    client.exchange_code_for_tokens("code", &state).await.unwrap();

    let replay = client.exchange_code_for_tokens("code", &state).await;
    assert!(matches!(replay, Err(OAuthClientError::ConfigError(_))));
}

/// Validates a refresh that does not rotate the refresh token.
///
/// # Test Steps
/// 1. Refresh against an endpoint that omits `refresh_token`
/// 2. Verify the old refresh token is carried over
/// 3. Publish through the store and read it back unchanged
#[tokio::test]
async fn test_refresh_carries_refresh_token_through_store() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_partial_json(json!({
            "grant_type": "refresh_token",
            "client_id": "keystring",
            "refresh_token": "long-lived",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "fresh",
            "expires_in": 3600,
        })))
        .expect(1)
        .mount(&server)
        .await;
    let client = OAuthClient::new(config(&server));

    let credential = client.refresh_access_token("long-lived").await?;
    assert_eq!(credential.access_token, "fresh");
    assert_eq!(credential.refresh_token, "long-lived");

    let store = TokenStore::private();
    store.store_credential(&credential)?;
    let stored: Option<Credential> = store.credential()?;
    assert_eq!(stored, Some(credential));
    Ok(())
}

/// Validates classification of unexpected token endpoint answers.
#[tokio::test]
async fn test_refresh_unexpected_status_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;
    let client = OAuthClient::new(config(&server));

    let err = client.refresh_access_token("r").await.unwrap_err();
    assert!(matches!(
        err,
        OAuthClientError::UnexpectedStatus { status: 503, ref body } if body == "maintenance"
    ));
}

/// Validates a token endpoint that reports an absurd lifetime.
///
/// Assertions:
/// - `expires_in = i64::MAX` yields a credential instead of a panic
/// - Expiry is clamped to the maximum honored lifetime
#[tokio::test]
async fn test_refresh_with_oversized_lifetime_is_clamped() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "forever",
            "refresh_token": "r2",
            "expires_in": i64::MAX,
        })))
        .expect(1)
        .mount(&server)
        .await;
    let client = OAuthClient::new(config(&server));

    let credential = client.refresh_access_token("r1").await?;

    assert!(credential.is_valid());
    assert_eq!(credential.expires_in, i64::MAX);
    assert!(credential.seconds_until_expiry() <= MAX_CREDENTIAL_LIFETIME_SECS);
    assert!(credential.seconds_until_expiry() > MAX_CREDENTIAL_LIFETIME_SECS - 60);
    Ok(())
}

//! Integration tests for `MarketLensSession`
//!
//! One wiremock server plays both the token endpoint and the resource API;
//! sessions share a file-backed token store in a temp dir.

mod support;

use marketlens_core::BoundArguments;
use marketlens_domain::{HttpStatusKind, MarketLensError, PaginationPlan};
use marketlens_infra::MarketLensSession;
use serde_json::json;
use support::{free_port, reference_path, settings, CallbackBrowser};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SHOP_PATH: &str = "/v3/application/shops/42";

async fn mount_token_endpoint(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "session-access",
            "refresh_token": "session-refresh",
            "expires_in": 3600,
        })))
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_page(server: &MockServer, offset: u64, limit: u64) {
    Mock::given(method("GET"))
        .and(path(SHOP_PATH))
        .and(query_param("offset", offset.to_string()))
        .and(query_param("limit", limit.to_string()))
        .and(header("x-api-key", "keystring"))
        .and(header("authorization", "Bearer session-access"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": 1,
            "results": [{"offset": offset}],
        })))
        .expect(1)
        .mount(server)
        .await;
}

/// Validates login, shared credentials and a paginated dispatch.
///
/// Assertions:
/// - First session logs in and publishes credential and API key
/// - Second session without a key adopts both and skips the login
/// - Range dispatch merges pages in window order, summing `count`
#[tokio::test]
async fn login_then_paginated_dispatch() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server).await;
    mount_page(&server, 0, 100).await;
    mount_page(&server, 100, 100).await;
    mount_page(&server, 200, 50).await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = settings(&server.uri(), free_port());
    config.reference_path = Some(reference_path());
    config.token_store_dir = Some(dir.path().to_path_buf());
    config.shared_namespace = "session_it".to_string();

    let elder = MarketLensSession::builder(config.clone())
        .browser(CallbackBrowser::new("session-code"))
        .oauth_endpoints(format!("{}/oauth/connect", server.uri()), format!("{}/oauth/token", server.uri()))
        .build()
        .unwrap();
    assert!(elder.store().is_shared());
    let credential = elder.connect().await.unwrap().unwrap();
    assert_eq!(credential.access_token, "session-access");

    config.api_key = None;
    let follower_browser = CallbackBrowser::new("unused");
    let follower = MarketLensSession::builder(config)
        .browser(follower_browser.clone())
        .build()
        .unwrap();
    assert!(!follower.is_elder().unwrap());
    assert_eq!(follower.connect().await.unwrap(), Some(credential));
    assert!(follower_browser.opened().is_empty());

    let merged = follower
        .dispatch_range("getShop", BoundArguments::new().with("shop_id", 42), 0, 249)
        .unwrap()
        .outcome()
        .await
        .unwrap();

    assert_eq!(merged.get("count"), Some(&json!(3)));
    let offsets: Vec<_> = merged.results().iter().map(|r| r["offset"].clone()).collect();
    assert_eq!(offsets, vec![json!(0), json!(100), json!(200)]);
    assert_eq!(merged.windows().len(), 3);

    follower.shutdown().unwrap();
    elder.shutdown().unwrap();
}

/// Validates that one failing page fails the whole dispatch.
///
/// Assertions:
/// - 404 on a window surfaces as `HttpStatus(NotFound)`
/// - Invalid arguments fail before any request is sent
#[tokio::test]
async fn failing_page_fails_dispatch() {
    let server = MockServer::start().await;
    mount_page(&server, 0, 10).await;
    Mock::given(method("GET"))
        .and(path(SHOP_PATH))
        .and(query_param("offset", "10"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such shop"))
        .mount(&server)
        .await;

    let mut config = settings(&server.uri(), free_port());
    config.reference_path = Some(reference_path());
    config.auto_start_auth = false;

    let session = MarketLensSession::builder(config)
        .store(marketlens_common::auth::TokenStore::private())
        .build()
        .unwrap();
    session
        .store()
        .store_credential(&marketlens_common::auth::Credential::issue(
            "session-access".into(),
            "session-refresh".into(),
            3600,
        ))
        .unwrap();

    let err = session
        .execute_by_name(
            "getShop",
            BoundArguments::new().with("shop_id", 42),
            PaginationPlan::sequenced(0, 19, 10),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        MarketLensError::HttpStatus { status: HttpStatusKind::NotFound, .. }
    ));

    let invalid = session
        .execute_by_name("getShop", BoundArguments::new().with("shop_id", 0), PaginationPlan::default())
        .await;
    assert!(matches!(invalid, Err(MarketLensError::Validation(_))));
}

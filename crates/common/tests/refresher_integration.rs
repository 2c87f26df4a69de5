//! Integration tests for the refresh chain
//!
//! Time is paused, so sleeping in a test advances the tokio clock to the next
//! pending timer without waiting.

#![cfg(feature = "test-utils")]

use std::sync::Arc;
use std::time::Duration;

use marketlens_common::auth::{
    Credential, RefreshStatus, TokenRefresher, TokenRefresherConfig, TokenStore,
};
use marketlens_common::testing::MockOAuthClient;

/// Validates the self re-arming chain on the elder.
///
/// # Test Steps
/// 1. Schedule a credential that lives 60s
/// 2. Let 61s pass: first refresh, chain re-armed for the mock's 120s
/// 3. Let another 120s pass: second refresh
///
/// Assertions:
/// - Each refresh uses the refresh token issued by the previous one.
/// - The store always holds the latest credential.
#[tokio::test(start_paused = true)]
async fn test_elder_refresh_chain_rearms() {
    let store = TokenStore::private();
    let id = store.register().unwrap();
    let client = Arc::new(MockOAuthClient::new().with_expires_in(120));
    let refresher = TokenRefresher::new(client.clone(), store.clone(), id);

    let initial = Credential::issue("a0".into(), "r0".into(), 60);
    store.store_credential(&initial).unwrap();
    refresher.schedule(initial).unwrap();

    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(client.refresh_calls(), vec!["r0".to_string()]);
    assert_eq!(store.credential().unwrap().unwrap().access_token, "access-r1");
    assert!(refresher.is_armed());

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(client.refresh_calls(), vec!["r0".to_string(), "refresh-r1".to_string()]);
    assert_eq!(store.credential().unwrap().unwrap().access_token, "access-r2");

    refresher.cancel();
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(client.refresh_calls().len(), 2);
}

/// Validates that a failed refresh stops the chain and keeps the old
/// credential.
///
/// Assertions:
/// - Status ends in `Failed`.
/// - Timer is disarmed and no retry follows.
/// - Stored credential is the original.
#[tokio::test(start_paused = true)]
async fn test_failed_refresh_is_surfaced_without_retry() {
    let store = TokenStore::private();
    let id = store.register().unwrap();
    let client = Arc::new(MockOAuthClient::new());
    client.set_should_fail(true);
    let refresher = TokenRefresher::new(client.clone(), store.clone(), id);
    let mut status = refresher.subscribe();

    let initial = Credential::issue("a0".into(), "r0".into(), 30);
    store.store_credential(&initial).unwrap();
    refresher.schedule(initial.clone()).unwrap();

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert!(matches!(*status.borrow_and_update(), RefreshStatus::Failed { .. }));
    assert!(!refresher.is_armed());

    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert_eq!(client.refresh_calls().len(), 1);
    assert_eq!(store.credential().unwrap(), Some(initial));
}

/// Validates cooperative mode: only the elder calls the token endpoint and
/// the follower adopts what it publishes.
///
/// # Test Steps
/// 1. Register elder (id 0) and follower (id 1) on one store
/// 2. Schedule the follower only, with a 10s credential
/// 3. After 11s the follower re-reads, sees no change, re-checks in 5s
/// 4. Elder publishes a new credential, follower adopts it on its recheck
#[tokio::test(start_paused = true)]
async fn test_follower_never_refreshes() {
    let store = TokenStore::private();
    let _elder = store.register().unwrap();
    let follower_id = store.register().unwrap();
    let client = Arc::new(MockOAuthClient::new());
    let follower = TokenRefresher::with_config(
        client.clone(),
        store.clone(),
        follower_id,
        TokenRefresherConfig { enabled: true, recheck_interval: Duration::from_secs(5) },
    );

    let initial = Credential::issue("a0".into(), "r0".into(), 10);
    store.store_credential(&initial).unwrap();
    follower.schedule(initial).unwrap();

    tokio::time::sleep(Duration::from_secs(11)).await;
    assert!(follower.is_armed());
    assert!(matches!(follower.status(), RefreshStatus::Scheduled { .. }));

    let published = Credential::issue("a1".into(), "r1".into(), 3600);
    store.store_credential(&published).unwrap();

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(client.refresh_calls().is_empty());
    assert!(follower.is_armed());
    assert_eq!(store.credential().unwrap(), Some(published));
}

/// Validates that dropping every handle stops the chain.
#[tokio::test(start_paused = true)]
async fn test_dropping_refresher_stops_timer() {
    let store = TokenStore::private();
    let id = store.register().unwrap();
    let client = Arc::new(MockOAuthClient::new());

    let refresher = TokenRefresher::new(client.clone(), store.clone(), id);
    refresher.schedule(Credential::issue("a0".into(), "r0".into(), 5)).unwrap();
    drop(refresher);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(client.refresh_calls().is_empty());
}

//! End-to-end dispatch scenarios against the bundled reference fixture.
//!
//! The transport is scripted; tokio's paused clock drives the delays so
//! completion order is deterministic.

mod support;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use marketlens_core::{BoundArguments, DispatchRequest, RequestDispatcher};
use marketlens_domain::{HttpStatusKind, HttpVerb, MarketLensError, PaginationPlan, VerbFilter};
use serde_json::json;
use support::{catalog, MockTransport};

fn get_shop(plan: PaginationPlan) -> DispatchRequest {
    let catalog = catalog();
    let route = catalog.find_by_name("getShop").expect("getShop is listed").clone();
    DispatchRequest::new(route, BoundArguments::new().with("shop_id", 42), plan)
}

/// Validates the fixture is parsed in file order with inherited parameters.
///
/// Assertions:
/// - Every operation is listed, `getShop` resolves by name and by URL
/// - The default verb filter only exposes GET routes
#[test]
fn catalog_lists_fixture_routes() {
    let catalog = catalog();

    let names: Vec<_> = catalog.list_routes().iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["ping", "getShop", "updateShop"]);

    let by_url = catalog.find_by_url("/v3/application/shops/{shop_id}", HttpVerb::Get).unwrap();
    assert_eq!(by_url.name, "getShop");
    assert!(by_url.accepts("shop_id"));

    let readable: Vec<_> =
        catalog.routes_with_verbs(&VerbFilter::default()).iter().map(|r| r.name.clone()).collect();
    assert_eq!(readable, vec!["ping".to_string(), "getShop".to_string()]);
}

/// Validates a sequenced range splits into windows and merges in order.
///
/// Assertions:
/// - Range 0..=249 with limit 100 sends three requests
/// - Results are concatenated by window position even when the last window
///   answers first
/// - `count` is summed across windows
#[tokio::test(start_paused = true)]
async fn sequenced_range_merges_in_window_order() {
    let transport = MockTransport::new();
    transport.delay(0, Duration::from_millis(30));
    transport.delay(100, Duration::from_millis(20));
    transport.delay(200, Duration::from_millis(5));
    let dispatcher = RequestDispatcher::new(transport.clone());

    let merged = dispatcher.execute(get_shop(PaginationPlan::sequenced(0, 249, 100))).await.unwrap();

    assert_eq!(transport.request_count(), 3);
    let mut paths: Vec<_> = transport.requests().iter().map(|r| r.path.clone()).collect();
    paths.dedup();
    assert_eq!(paths, vec!["/v3/application/shops/42".to_string()]);

    let results = merged.results();
    assert_eq!(results.len(), 250);
    assert_eq!(results[0], json!({"shop_id": 0}));
    assert_eq!(results[100], json!({"shop_id": 100}));
    assert_eq!(results[249], json!({"shop_id": 249}));
    assert_eq!(merged.get("count"), Some(&json!(250)));
    assert_eq!(merged.windows().len(), 3);
}

/// Validates a single plan forwards the caller's offset and limit.
///
/// Assertions:
/// - Exactly one request with `offset=40` and `limit=20`
#[tokio::test]
async fn single_plan_sends_one_request() {
    let transport = MockTransport::new();
    let dispatcher = RequestDispatcher::new(transport.clone());

    let merged = dispatcher.execute(get_shop(PaginationPlan::single(40, 20))).await.unwrap();

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].query_value("offset"), Some("40"));
    assert_eq!(requests[0].query_value("limit"), Some("20"));
    assert_eq!(merged.results().len(), 20);
}

/// Validates that a range over a route without paging parameters is sent
/// once instead of once per window.
///
/// Assertions:
/// - One request for a three-window plan
/// - The merged body holds that single answer, not three copies
#[tokio::test]
async fn sequenced_plan_on_unpaged_route_is_sent_once() {
    let transport = MockTransport::new();
    let dispatcher = RequestDispatcher::new(transport.clone());
    let route = catalog().find_by_name("ping").expect("ping is listed").clone();

    let merged = dispatcher
        .execute(DispatchRequest::new(route, BoundArguments::new(), PaginationPlan::sequenced(0, 249, 100)))
        .await
        .unwrap();

    assert_eq!(transport.request_count(), 1);
    assert_eq!(transport.requests()[0].query_value("offset"), None);
    assert_eq!(merged.results().len(), 1);
    assert_eq!(merged.windows().len(), 1);
}

/// Validates the all-or-nothing outcome.
///
/// Assertions:
/// - One 404 window fails the whole dispatch with the 404 kind
/// - Sibling windows still run to completion
#[tokio::test(start_paused = true)]
async fn failing_window_fails_dispatch_without_cancelling_siblings() {
    let transport = MockTransport::new();
    transport.fail(100, 404);
    transport.delay(0, Duration::from_millis(50));
    transport.delay(200, Duration::from_millis(50));
    let dispatcher = RequestDispatcher::new(transport.clone());

    let err = dispatcher.execute(get_shop(PaginationPlan::sequenced(0, 249, 100))).await.unwrap_err();

    assert!(matches!(err, MarketLensError::HttpStatus { status: HttpStatusKind::NotFound, .. }));
    assert_eq!(transport.completed(), 3);
}

/// Validates the lowest-positioned failure is the one reported.
///
/// Assertions:
/// - With failures at offsets 0 and 200, the offset-0 status wins even
///   though it completes last
#[tokio::test(start_paused = true)]
async fn lowest_window_failure_is_reported() {
    let transport = MockTransport::new();
    transport.fail(0, 500);
    transport.fail(200, 400);
    transport.delay(0, Duration::from_millis(40));
    let dispatcher = RequestDispatcher::new(transport.clone());

    let err = dispatcher.execute(get_shop(PaginationPlan::sequenced(0, 249, 100))).await.unwrap_err();

    assert_eq!(err.status_code(), Some(500));
}

/// Validates argument checks run before any network call.
///
/// Assertions:
/// - Missing `shop_id` and an unknown argument are `Validation` errors
/// - The transport is never called
#[tokio::test]
async fn invalid_arguments_send_nothing() {
    let transport = MockTransport::new();
    let dispatcher = RequestDispatcher::new(transport.clone());
    let route = catalog().find_by_name("getShop").unwrap().clone();

    let missing = DispatchRequest::new(route.clone(), BoundArguments::new(), PaginationPlan::default());
    assert!(matches!(dispatcher.execute(missing).await, Err(MarketLensError::Validation(_))));

    let unknown = DispatchRequest::new(
        route,
        BoundArguments::new().with("shop_id", 1).with("colour", "red"),
        PaginationPlan::default(),
    );
    assert!(matches!(dispatcher.execute(unknown).await, Err(MarketLensError::Validation(_))));

    let inverted = get_shop(PaginationPlan::sequenced(10, 5, 100));
    assert!(matches!(dispatcher.execute(inverted).await, Err(MarketLensError::Validation(_))));

    assert_eq!(transport.request_count(), 0);
}

/// Validates the concurrency bound.
///
/// Assertions:
/// - Ten windows with a bound of three never exceed three in flight
/// - All ten windows are still requested
#[tokio::test(start_paused = true)]
async fn in_flight_requests_respect_bound() {
    let transport = MockTransport::new();
    for page in 0..10u64 {
        transport.delay(page * 10, Duration::from_millis(10 + page));
    }
    let dispatcher = RequestDispatcher::new(transport.clone()).with_max_concurrency(3);

    let merged = dispatcher.execute(get_shop(PaginationPlan::sequenced(0, 99, 10))).await.unwrap();

    assert_eq!(transport.request_count(), 10);
    assert_eq!(transport.max_in_flight(), 3);
    assert_eq!(merged.results().len(), 100);
}

/// Validates cancellation discards results.
///
/// Assertions:
/// - The handle reports `Cancelled`
/// - Queued windows are never sent once cancelled
#[tokio::test(start_paused = true)]
async fn cancelled_dispatch_reports_cancelled() {
    let transport = MockTransport::new();
    for page in 0..4u64 {
        transport.delay(page * 100, Duration::from_millis(100));
    }
    let dispatcher = RequestDispatcher::new(transport.clone()).with_max_concurrency(1);

    let handle = dispatcher.dispatch(get_shop(PaginationPlan::sequenced(0, 399, 100)));
    tokio::time::sleep(Duration::from_millis(10)).await;
    handle.cancel();

    assert!(handle.is_cancelled());
    assert!(matches!(handle.outcome().await, Err(MarketLensError::Cancelled)));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(transport.request_count(), 1);
}

/// Validates the completion callback contract.
///
/// Assertions:
/// - A completed dispatch hands its merged result to the callback
/// - A cancelled dispatch never invokes the callback
#[tokio::test(start_paused = true)]
async fn callback_runs_once_unless_cancelled() {
    let transport = MockTransport::new();
    let dispatcher = RequestDispatcher::new(transport.clone());

    let (tx, rx) = tokio::sync::oneshot::channel();
    let handle = dispatcher.dispatch_with_callback(get_shop(PaginationPlan::single(0, 5)), move |outcome| {
        let _ = tx.send(outcome.map(|merged| merged.results().len()));
    });
    handle.outcome().await.unwrap();
    assert_eq!(rx.await.unwrap().unwrap(), 5);

    transport.delay(0, Duration::from_millis(100));
    let called = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&called);
    let handle = dispatcher.dispatch_with_callback(get_shop(PaginationPlan::single(0, 5)), move |_| {
        flag.store(true, Ordering::SeqCst);
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    handle.cancel();

    assert!(matches!(handle.outcome().await, Err(MarketLensError::Cancelled)));
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(!called.load(Ordering::SeqCst));
}

//! Shared test helpers for `marketlens-core` integration tests.
//!
//! A scripted [`MockTransport`] stands in for HTTP so dispatch scenarios can
//! control completion order, inject failures and observe concurrency.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use marketlens_core::{PreparedRequest, ResourceTransport, RouteCatalog};
use marketlens_domain::{MarketLensError, Result};
use parking_lot::Mutex;
use serde_json::{json, Value};

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures").join(name)
}

pub fn catalog() -> RouteCatalog {
    RouteCatalog::from_path(fixture_path("reference_getshop.json")).expect("fixture loads")
}

#[derive(Default)]
pub struct MockTransport {
    requests: Mutex<Vec<PreparedRequest>>,
    delays: Mutex<HashMap<u64, Duration>>,
    failures: Mutex<HashMap<u64, u16>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    completed: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Delay the response for the window starting at `offset`.
    pub fn delay(&self, offset: u64, delay: Duration) {
        self.delays.lock().insert(offset, delay);
    }

    /// Answer the window starting at `offset` with an HTTP error.
    pub fn fail(&self, offset: u64, status: u16) {
        self.failures.lock().insert(offset, status);
    }

    pub fn requests(&self) -> Vec<PreparedRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResourceTransport for MockTransport {
    async fn execute(&self, request: PreparedRequest) -> Result<Value> {
        let offset = request.query_value("offset").and_then(|v| v.parse::<u64>().ok()).unwrap_or(0);
        let limit = request.query_value("limit").and_then(|v| v.parse::<u64>().ok()).unwrap_or(1);
        self.requests.lock().push(request);

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = self.delays.lock().get(&offset).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        } else {
            tokio::task::yield_now().await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);

        let status = self.failures.lock().get(&offset).copied();
        if let Some(status) = status {
            return Err(MarketLensError::from_status(status, format!("window at offset {offset}")));
        }

        let results: Vec<Value> = (offset..offset + limit).map(|i| json!({"shop_id": i})).collect();
        Ok(json!({"count": limit, "results": results}))
    }
}

//! Bounded-concurrency fan-out over pagination windows.
//!
//! Every window is prepared (and validated) before the first request goes
//! out. A route without an `offset` parameter cannot be paged, so a
//! multi-window plan against it collapses to its first window. Requests then run as tasks gated by a semaphore; a failing window
//! does not cancel its siblings. Once all windows are in, either every
//! window succeeded and the bodies are merged in position order, or the
//! failure of the lowest-positioned window is reported and nothing is
//! merged.

use std::sync::Arc;

use marketlens_domain::constants::{DEFAULT_MAX_CONCURRENCY, LIMIT_PARAMETER, OFFSET_PARAMETER};
use marketlens_domain::{
    MarketLensError, MergedResponse, PaginationPlan, PaginationWindow, Result, RouteDescriptor,
};
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::merge::MergePolicy;
use super::ports::ResourceTransport;
use crate::catalog::{prepare, BoundArguments, PreparedRequest};

/// Route, arguments and pagination for one dispatch.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub route: RouteDescriptor,
    pub arguments: BoundArguments,
    pub plan: PaginationPlan,
}

impl DispatchRequest {
    #[must_use]
    pub fn new(route: RouteDescriptor, arguments: BoundArguments, plan: PaginationPlan) -> Self {
        Self { route, arguments, plan }
    }
}

/// Handle to a running dispatch.
///
/// Cancelling lets in-flight requests finish but discards their results;
/// the outcome is then `Cancelled`.
#[derive(Debug)]
pub struct DispatchHandle<T = MergedResponse> {
    cancel: CancellationToken,
    task: JoinHandle<Result<T>>,
}

impl<T> DispatchHandle<T> {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the terminal outcome.
    ///
    /// # Errors
    /// The classified dispatch failure, or `Cancelled`.
    pub async fn outcome(self) -> Result<T> {
        match self.task.await {
            Ok(result) => result,
            Err(err) if err.is_cancelled() => Err(MarketLensError::Cancelled),
            Err(err) => Err(MarketLensError::Unknown {
                type_name: "JoinError".to_string(),
                message: err.to_string(),
            }),
        }
    }
}

/// Fans a route out over its pagination windows.
///
/// Owns its transport; configuration is fixed at construction.
#[derive(Clone)]
pub struct RequestDispatcher {
    transport: Arc<dyn ResourceTransport>,
    max_concurrency: usize,
    merge_policy: MergePolicy,
}

impl std::fmt::Debug for RequestDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestDispatcher")
            .field("max_concurrency", &self.max_concurrency)
            .field("merge_policy", &self.merge_policy)
            .finish_non_exhaustive()
    }
}

impl RequestDispatcher {
    #[must_use]
    pub fn new(transport: Arc<dyn ResourceTransport>) -> Self {
        Self {
            transport,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            merge_policy: MergePolicy::default(),
        }
    }

    /// Upper bound on requests in flight; values below 1 are raised to 1.
    #[must_use]
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    #[must_use]
    pub fn with_merge_policy(mut self, merge_policy: MergePolicy) -> Self {
        self.merge_policy = merge_policy;
        self
    }

    #[must_use]
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Run a dispatch to completion on the current task.
    ///
    /// # Errors
    /// `Validation` before any request is sent, otherwise the classified
    /// failure of the lowest-positioned failing window.
    pub async fn execute(&self, request: DispatchRequest) -> Result<MergedResponse> {
        self.run(request, CancellationToken::new()).await
    }

    /// Start a dispatch in the background. Must be called inside a tokio
    /// runtime.
    #[must_use]
    pub fn dispatch(&self, request: DispatchRequest) -> DispatchHandle {
        let cancel = CancellationToken::new();
        let dispatcher = self.clone();
        let token = cancel.clone();
        let task = tokio::spawn(async move { dispatcher.run(request, token).await });
        DispatchHandle { cancel, task }
    }

    /// Start a dispatch and hand its outcome to `on_complete`.
    ///
    /// The callback runs exactly once unless the dispatch is cancelled, in
    /// which case it never runs and the handle reports `Cancelled`.
    pub fn dispatch_with_callback<F>(&self, request: DispatchRequest, on_complete: F) -> DispatchHandle<()>
    where
        F: FnOnce(Result<MergedResponse>) + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let dispatcher = self.clone();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            let outcome = dispatcher.run(request, token.clone()).await;
            if token.is_cancelled() {
                debug!("dispatch.callback_suppressed");
                return Err(MarketLensError::Cancelled);
            }
            on_complete(outcome);
            Ok(())
        });
        DispatchHandle { cancel, task }
    }

    async fn run(&self, request: DispatchRequest, cancel: CancellationToken) -> Result<MergedResponse> {
        let DispatchRequest { route, arguments, plan } = request;
        let mut windows = plan.windows()?;
        if windows.len() > 1 && !route.accepts(OFFSET_PARAMETER) {
            info!(route = %route.name, windows = windows.len(), "dispatch.pagination_ignored");
            windows.truncate(1);
        }

        let prepared = windows
            .iter()
            .map(|window| {
                let args = window_arguments(&route, &arguments, *window);
                prepare(&route, &args).map(|request| (*window, request))
            })
            .collect::<Result<Vec<_>>>()?;

        info!(
            route = %route.name,
            windows = prepared.len(),
            max_concurrency = self.max_concurrency,
            "dispatch.started"
        );

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();
        for (window, request) in prepared {
            tasks.spawn(run_window(
                Arc::clone(&self.transport),
                Arc::clone(&semaphore),
                cancel.clone(),
                window,
                request,
            ));
        }

        let mut successes: Vec<(PaginationWindow, Value)> = Vec::with_capacity(windows.len());
        let mut failures: Vec<(Option<PaginationWindow>, MarketLensError)> = Vec::new();

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    // In-flight requests finish on their own; queued ones skip.
                    tasks.detach_all();
                    info!(route = %route.name, "dispatch.cancelled");
                    return Err(MarketLensError::Cancelled);
                }
                joined = tasks.join_next() => match joined {
                    None => break,
                    Some(Ok((window, Ok(body)))) => {
                        debug!(offset = window.offset, limit = window.limit, "dispatch.window_completed");
                        successes.push((window, body));
                    }
                    Some(Ok((window, Err(err)))) => {
                        warn!(
                            route = %route.name,
                            offset = window.offset,
                            limit = window.limit,
                            error = %err,
                            kind = err.label(),
                            "dispatch.window_failed"
                        );
                        failures.push((Some(window), err));
                    }
                    Some(Err(join_err)) => {
                        warn!(route = %route.name, error = %join_err, "dispatch.window_task_failed");
                        failures.push((None, MarketLensError::Unknown {
                            type_name: "JoinError".to_string(),
                            message: join_err.to_string(),
                        }));
                    }
                },
            }
        }

        if cancel.is_cancelled() {
            info!(route = %route.name, "dispatch.cancelled");
            return Err(MarketLensError::Cancelled);
        }

        if !failures.is_empty() {
            failures.sort_by_key(|(window, _)| {
                window.map_or((u64::MAX, u64::MAX), |w| (w.position(), w.offset))
            });
            let failed = failures.len();
            let (_, first) = failures.swap_remove(0);
            warn!(route = %route.name, failed, "dispatch.failed");
            return Err(first);
        }

        let merged = self.merge_policy.merge(successes);
        info!(
            route = %route.name,
            windows = merged.windows().len(),
            results = merged.results().len(),
            "dispatch.merged"
        );
        Ok(merged)
    }
}

/// Bound arguments plus the window's offset/limit, for routes that take
/// them.
fn window_arguments(
    route: &RouteDescriptor,
    arguments: &BoundArguments,
    window: PaginationWindow,
) -> BoundArguments {
    let mut args = arguments.clone();
    if route.accepts(OFFSET_PARAMETER) {
        args.insert(OFFSET_PARAMETER, window.offset);
    }
    if route.accepts(LIMIT_PARAMETER) {
        args.insert(LIMIT_PARAMETER, window.limit);
    }
    args
}

async fn run_window(
    transport: Arc<dyn ResourceTransport>,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
    window: PaginationWindow,
    request: PreparedRequest,
) -> (PaginationWindow, Result<Value>) {
    let Ok(_permit) = semaphore.acquire_owned().await else {
        return (window, Err(MarketLensError::Internal("dispatch semaphore closed".to_string())));
    };
    if cancel.is_cancelled() {
        return (window, Err(MarketLensError::Cancelled));
    }
    let result = transport.execute(request).await;
    (window, result)
}

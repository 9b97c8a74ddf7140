//! Per-endpoint dispatcher: debounced batch windows in front of a rate limiter.

use super::policy::{BatchPolicy, NoBatching};
use crate::key::Endpoint;
use crate::resilience::{RateLimiter, RateLimiterConfig, RateLimiterSnapshot};
use crate::transport::{Response, Transport};
use crate::{Error, ErrorContext, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::Instrument;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Debounce window for batchable inputs.
    pub batch_delay: Duration,
    pub limiter: RateLimiterConfig,
    /// Upper bound for a single transport call. `None` waits forever.
    pub request_timeout: Option<Duration>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            batch_delay: Duration::from_millis(100),
            limiter: RateLimiterConfig::default(),
            request_timeout: None,
        }
    }
}

impl DispatcherConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_batch_delay(mut self, d: Duration) -> Self {
        self.batch_delay = d;
        self
    }
    pub fn with_limiter(mut self, l: RateLimiterConfig) -> Self {
        self.limiter = l;
        self
    }
    pub fn with_request_timeout(mut self, t: Option<Duration>) -> Self {
        self.request_timeout = t;
        self
    }
}

/// One caller waiting on a batch window.
struct BatchQueueEntry {
    input: Value,
    reply: oneshot::Sender<Result<Response>>,
}

#[derive(Default)]
struct BatchState {
    queues: HashMap<String, Vec<BatchQueueEntry>>,
    // Open window per batch id. A timer only flushes the window it was started
    // for, so a late timer never cuts a newer window short.
    windows: HashMap<String, u64>,
    next_window: u64,
}

/// Turns input-level requests for one endpoint into transport calls.
///
/// Inputs the policy cannot batch are dispatched immediately. Batchable inputs
/// wait in a window keyed by their batch id; when the window's timer fires the
/// whole window is detached, sent as one aggregate call, and the split results
/// are handed back in enqueue order. Every call goes through the rate limiter.
pub struct Dispatcher {
    endpoint: Endpoint,
    transport: Arc<dyn Transport>,
    policy: Arc<dyn BatchPolicy>,
    limiter: RateLimiter,
    cfg: DispatcherConfig,
    batches: Mutex<BatchState>,
}

impl Dispatcher {
    pub fn new(
        endpoint: Endpoint,
        transport: Arc<dyn Transport>,
        policy: Option<Arc<dyn BatchPolicy>>,
        cfg: DispatcherConfig,
    ) -> Self {
        Self {
            endpoint,
            transport,
            policy: policy.unwrap_or_else(|| Arc::new(NoBatching)),
            limiter: RateLimiter::new(cfg.limiter.clone()),
            cfg,
            batches: Mutex::new(BatchState::default()),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.cfg
    }

    pub fn limiter_snapshot(&self) -> RateLimiterSnapshot {
        self.limiter.snapshot()
    }

    /// Number of callers currently waiting in open batch windows.
    pub fn pending_batched(&self) -> usize {
        self.lock_batches().queues.values().map(Vec::len).sum()
    }

    fn lock_batches(&self) -> MutexGuard<'_, BatchState> {
        self.batches.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Request `input`, batching it if the endpoint policy allows.
    ///
    /// A batched input whose split response has `ok == false` comes back as
    /// [`Error::RequestFailed`]; an unbatched one comes back as `Ok` with the
    /// failed response.
    pub async fn request(self: &Arc<Self>, input: Value) -> Result<Response> {
        match self.policy.can_batch(&input) {
            None => self.fetch(input).await,
            Some(batch_id) => {
                let rx = self.enqueue(batch_id, input);
                rx.await.map_err(|_| {
                    Error::runtime_with_context(
                        "batch flush ended without a reply",
                        ErrorContext::new()
                            .with_source("dispatcher")
                            .with_details(self.endpoint.to_string()),
                    )
                })?
            }
        }
    }

    fn enqueue(self: &Arc<Self>, batch_id: String, input: Value) -> oneshot::Receiver<Result<Response>> {
        let (reply, rx) = oneshot::channel();
        let mut state = self.lock_batches();
        let queue = state.queues.entry(batch_id.clone()).or_default();
        queue.push(BatchQueueEntry { input, reply });
        tracing::trace!(endpoint = %self.endpoint, batch_id = %batch_id, queued = queue.len(), "input queued for batch");

        if !state.windows.contains_key(&batch_id) {
            state.next_window += 1;
            let window = state.next_window;
            state.windows.insert(batch_id.clone(), window);

            let this = Arc::clone(self);
            let delay = self.cfg.batch_delay;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                this.flush(&batch_id, window).await;
            });
        }
        rx
    }

    /// Detach the window under the lock, then process it. Inputs arriving after
    /// the detach open a new window.
    async fn flush(&self, batch_id: &str, window: u64) {
        let queue = {
            let mut state = self.lock_batches();
            if state.windows.get(batch_id) != Some(&window) {
                // Already taken by flush_all.
                return;
            }
            state.windows.remove(batch_id);
            state.queues.remove(batch_id).unwrap_or_default()
        };
        self.process_window(batch_id, queue).await;
    }

    async fn process_window(&self, batch_id: &str, queue: Vec<BatchQueueEntry>) {
        if queue.is_empty() {
            return;
        }
        let (inputs, replies): (Vec<Value>, Vec<_>) =
            queue.into_iter().map(|e| (e.input, e.reply)).unzip();

        let span = tracing::debug_span!(
            "batch_flush",
            endpoint = %self.endpoint,
            batch_id,
            flush_id = %Uuid::new_v4(),
            size = inputs.len(),
        );
        self.process_batch(inputs, replies).instrument(span).await;
    }

    async fn process_batch(&self, inputs: Vec<Value>, replies: Vec<oneshot::Sender<Result<Response>>>) {
        let aggregate = self.policy.batch_input(&inputs);
        let response = match self.fetch(aggregate).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "batched transport call failed");
                for reply in replies {
                    let _ = reply.send(Err(e.clone()));
                }
                return;
            }
        };

        let outputs = self.policy.unbatch_output(&inputs, response);
        if outputs.len() != replies.len() {
            tracing::warn!(
                expected = replies.len(),
                got = outputs.len(),
                "unbatched output does not line up with queued inputs"
            );
        }

        let mut outputs = outputs.into_iter();
        for (i, reply) in replies.into_iter().enumerate() {
            let outcome = match outputs.next() {
                Some(r) if r.ok => Ok(r),
                Some(r) => Err(Error::RequestFailed { response: r }),
                None => Err(Error::runtime_with_context(
                    "no response for queued input",
                    ErrorContext::new()
                        .with_field_path(format!("batch[{i}]"))
                        .with_source("dispatcher"),
                )),
            };
            // The caller may have gone away.
            let _ = reply.send(outcome);
        }
        tracing::debug!("batch distributed");
    }

    /// Flush every open window now instead of waiting for its timer.
    ///
    /// All windows are detached in one critical section. Their timers stay
    /// alive and find nothing to do when they fire.
    pub async fn flush_all(&self) {
        let windows: Vec<(String, Vec<BatchQueueEntry>)> = {
            let mut state = self.lock_batches();
            state.windows.clear();
            state.queues.drain().collect()
        };
        for (id, queue) in windows {
            self.process_window(&id, queue).await;
        }
    }

    /// One transport call through the limiter.
    async fn fetch(&self, input: Value) -> Result<Response> {
        self.limiter
            .schedule(async {
                tracing::debug!(endpoint = %self.endpoint, "dispatching transport call");
                let call = self
                    .transport
                    .request(&self.endpoint.path, &self.endpoint.method, &input);
                match self.cfg.request_timeout {
                    Some(after) => tokio::time::timeout(after, call).await.map_err(|_| {
                        Error::Timeout {
                            after_ms: after.as_millis() as u64,
                        }
                    })?,
                    None => call.await,
                }
            })
            .await
    }
}

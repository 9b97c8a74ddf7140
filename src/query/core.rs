use super::state::{QueryState, QueryStatus};
use crate::cache::{Cache, Ttl};
use crate::dispatch::Dispatcher;
use crate::key::Endpoint;
use crate::transport::Response;
use crate::{Error, ErrorContext, Result};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

type PendingRequest = Shared<BoxFuture<'static, Result<Response>>>;

/// One (endpoint, input) pair, shared by every caller that asks for it.
///
/// Cloning a `Query` is cheap and yields a handle to the same state.
#[derive(Clone)]
pub struct Query {
    inner: Arc<QueryInner>,
}

struct QueryInner {
    endpoint: Endpoint,
    input: Value,
    cache_key: String,
    ttl: Ttl,
    dispatcher: Arc<Dispatcher>,
    cache: Arc<Cache<Response>>,
    state: watch::Sender<QueryState>,
    pending: Mutex<Option<PendingRequest>>,
}

impl Query {
    pub(crate) fn new(
        endpoint: Endpoint,
        input: Value,
        dispatcher: Arc<Dispatcher>,
        cache: Arc<Cache<Response>>,
        ttl: Ttl,
    ) -> Self {
        let cache_key = endpoint.cache_key(&input);
        cache.register(&cache_key, ttl);
        let (state, _) = watch::channel(QueryState::default());
        Self {
            inner: Arc::new(QueryInner {
                endpoint,
                input,
                cache_key,
                ttl,
                dispatcher,
                cache,
                state,
                pending: Mutex::new(None),
            }),
        }
    }

    /// Fetch the response, from the cache if it is fresh.
    ///
    /// Concurrent callers on a cache miss share one dispatcher call. A response
    /// with `ok == false` is returned as `Ok` and recorded as the `Error` state;
    /// only transport-level failures come back as `Err`.
    pub async fn request(&self) -> Result<Response> {
        let inner = &self.inner;
        if let Some(cached) = inner.cached()? {
            tracing::trace!(key = %inner.cache_key, "query served from cache");
            return Ok(cached);
        }

        let pending = {
            let mut slot = inner.lock_pending();
            // A request that finished since the lookup above stores its
            // response before releasing the slot.
            if let Some(cached) = inner.cached()? {
                return Ok(cached);
            }
            inner.set_loading();
            match slot.as_ref() {
                Some(p) => {
                    tracing::trace!(key = %inner.cache_key, "joining in-flight request");
                    p.clone()
                }
                None => {
                    let p = Self::start(Arc::clone(inner));
                    *slot = Some(p.clone());
                    p
                }
            }
        };
        pending.await
    }

    fn start(inner: Arc<QueryInner>) -> PendingRequest {
        tracing::debug!(endpoint = %inner.endpoint, key = %inner.cache_key, "query cache miss, dispatching");
        // Spawned so the request completes and releases the slot even if every
        // caller stops waiting.
        let task = tokio::spawn(inner.run());
        async move {
            task.await.map_err(|e| {
                Error::runtime_with_context(
                    format!("query task aborted: {e}"),
                    ErrorContext::new().with_source("query"),
                )
            })?
        }
        .boxed()
        .shared()
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.inner.endpoint
    }

    pub fn input(&self) -> &Value {
        &self.inner.input
    }

    pub fn cache_key(&self) -> &str {
        &self.inner.cache_key
    }

    pub fn is_cached(&self) -> bool {
        self.inner.cache.has(&self.inner.cache_key)
    }

    /// Invalidate the cached response so the next `request()` dispatches again.
    pub fn reset_cache(&self) {
        if self.inner.cache.reset(&self.inner.cache_key) {
            tracing::debug!(key = %self.inner.cache_key, "query cache reset");
        }
    }

    /// Whether a dispatcher call is outstanding for this query.
    pub fn is_pending(&self) -> bool {
        self.inner.lock_pending().is_some()
    }

    pub fn state(&self) -> QueryState {
        self.inner.state.borrow().clone()
    }

    pub fn status(&self) -> QueryStatus {
        self.inner.state.borrow().status
    }

    pub fn data(&self) -> Option<Value> {
        self.inner.state.borrow().data.clone()
    }

    pub fn error_data(&self) -> Option<Value> {
        self.inner.state.borrow().error_data.clone()
    }

    pub fn data_as<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        self.data().map(serde_json::from_value).transpose().map_err(Into::into)
    }

    pub fn error_data_as<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        self.error_data()
            .map(serde_json::from_value)
            .transpose()
            .map_err(Into::into)
    }

    /// Receiver notified at every status transition.
    pub fn subscribe(&self) -> watch::Receiver<QueryState> {
        self.inner.state.subscribe()
    }
}

impl std::fmt::Debug for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("endpoint", &self.inner.endpoint)
            .field("cache_key", &self.inner.cache_key)
            .field("status", &self.status())
            .finish()
    }
}

/// Releases the pending slot when the request task ends, including by panic.
struct PendingGuard<'a> {
    inner: &'a QueryInner,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        *self.inner.lock_pending() = None;
    }
}

impl QueryInner {
    fn lock_pending(&self) -> MutexGuard<'_, Option<PendingRequest>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cache lookup that re-registers the key if it was deregistered, e.g. when
    /// the query was evicted from its registry while this handle stayed alive.
    fn cached(&self) -> Result<Option<Response>> {
        match self.cache.get(&self.cache_key) {
            Err(Error::UnregisteredKey { .. }) => {
                tracing::debug!(key = %self.cache_key, "cache key re-registered");
                self.cache.register(&self.cache_key, self.ttl);
                Ok(None)
            }
            other => other,
        }
    }

    fn set_loading(&self) {
        self.state.send_if_modified(|s| {
            if s.status == QueryStatus::Loading {
                false
            } else {
                s.status = QueryStatus::Loading;
                true
            }
        });
    }

    async fn run(self: Arc<Self>) -> Result<Response> {
        let _guard = PendingGuard { inner: &self };

        let response = match self.dispatcher.request(self.input.clone()).await {
            Ok(r) => r,
            Err(e) => match e.failed_response() {
                // A batched item that failed is still an answer from the endpoint.
                Some(response) => response.clone(),
                None => {
                    if e.is_misuse() {
                        tracing::error!(endpoint = %self.endpoint, error = %e, "query misconfigured");
                    } else {
                        tracing::warn!(endpoint = %self.endpoint, error = %e, "query transport failed");
                    }
                    self.state.send_modify(|s| s.status = QueryStatus::Error);
                    return Err(e);
                }
            },
        };

        // Error responses are cached too, so a failing endpoint is not hammered
        // until the TTL runs out.
        if let Err(e) = self.cache.set(&self.cache_key, response.clone()) {
            tracing::warn!(key = %self.cache_key, error = %e, "response not cached");
        }

        self.apply(&response)?;
        Ok(response)
    }

    fn apply(&self, response: &Response) -> Result<()> {
        let body = if response.body().is_empty() {
            Ok(Value::Null)
        } else {
            response.json::<Value>()
        };

        match body {
            Ok(body) if response.ok => {
                self.state.send_modify(|s| {
                    s.status = QueryStatus::Success;
                    s.data = Some(body);
                });
                tracing::debug!(key = %self.cache_key, "query succeeded");
                Ok(())
            }
            Ok(body) => {
                self.state.send_modify(|s| {
                    s.status = QueryStatus::Error;
                    s.error_data = Some(body);
                });
                tracing::debug!(key = %self.cache_key, status = response.status, "query failed");
                Ok(())
            }
            Err(e) => {
                self.state.send_modify(|s| s.status = QueryStatus::Error);
                Err(e)
            }
        }
    }
}

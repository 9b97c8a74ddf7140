//! 注册表：按端点与输入创建并复用 Dispatcher 与 Query
//!
//! The registry owns one [`Dispatcher`] per endpoint and one [`Query`] per
//! endpoint plus serialized input, so independent call sites asking for the
//! same data share one cache entry and one in-flight request. The maps are
//! reachable only through keyed get-or-create accessors.
//!
//! A process-wide instance can be installed once at startup with [`install`]
//! and fetched anywhere with [`global`].

mod builder;

pub use builder::RegistryBuilder;

use crate::cache::{Cache, Ttl};
use crate::config::OrchestratorConfig;
use crate::dispatch::{BatchPolicy, Dispatcher};
use crate::key::Endpoint;
use crate::query::Query;
use crate::schema::SchemaRegistry;
use crate::transport::{Response, Transport};
use crate::{Error, ErrorContext, Result};
use once_cell::sync::OnceCell;
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

static GLOBAL: OnceCell<Arc<Registry>> = OnceCell::new();

/// Install the process-wide registry. Fails if one is already installed.
pub fn install(registry: Registry) -> Result<Arc<Registry>> {
    let registry = Arc::new(registry);
    GLOBAL.set(Arc::clone(&registry)).map_err(|_| {
        Error::configuration_with_context(
            "a global registry is already installed",
            ErrorContext::new().with_source("registry"),
        )
    })?;
    tracing::debug!("global registry installed");
    Ok(registry)
}

/// The process-wide registry, if [`install`] has been called.
pub fn global() -> Option<Arc<Registry>> {
    GLOBAL.get().cloned()
}

pub struct Registry {
    transport: Arc<dyn Transport>,
    config: OrchestratorConfig,
    cache: Arc<Cache<Response>>,
    policies: HashMap<String, Arc<dyn BatchPolicy>>,
    schemas: SchemaRegistry,
    dispatchers: Mutex<HashMap<String, Arc<Dispatcher>>>,
    queries: Mutex<HashMap<String, Query>>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub(crate) fn from_parts(
        transport: Arc<dyn Transport>,
        config: OrchestratorConfig,
        policies: HashMap<String, Arc<dyn BatchPolicy>>,
        schemas: SchemaRegistry,
    ) -> Self {
        Self {
            transport,
            config,
            cache: Arc::new(Cache::new()),
            policies,
            schemas,
            dispatchers: Mutex::new(HashMap::new()),
            queries: Mutex::new(HashMap::new()),
        }
    }

    /// Get or create the query for `(path, method, input)` with the default TTL.
    pub fn query<T>(&self, path: &str, method: Method, input: &T) -> Result<Query>
    where
        T: Serialize + ?Sized,
    {
        self.query_with_ttl(path, method, input, self.config.default_ttl())
    }

    /// Like [`Registry::query`], with a TTL used only if this call creates the
    /// query. An existing query keeps the TTL it was registered with.
    pub fn query_with_ttl<T>(&self, path: &str, method: Method, input: &T, ttl: Ttl) -> Result<Query>
    where
        T: Serialize + ?Sized,
    {
        let endpoint = Endpoint::new(path, method);
        let input = serde_json::to_value(input)?;
        if self.config.validate_inputs {
            self.schemas.validate(&endpoint, &input)?;
        }

        let key = endpoint.cache_key(&input);
        if let Some(q) = self.lock_queries().get(&key) {
            return Ok(q.clone());
        }

        // Dispatcher lookup takes its own lock; done before re-locking queries
        // so the two maps are never held together.
        let dispatcher = self.dispatcher_for(&endpoint);
        let mut queries = self.lock_queries();
        let query = queries
            .entry(key)
            .or_insert_with(|| {
                tracing::debug!(%endpoint, ?ttl, "creating query");
                Query::new(endpoint, input, dispatcher, Arc::clone(&self.cache), ttl)
            })
            .clone();
        Ok(query)
    }

    /// Get or create the dispatcher for `(path, method)`.
    pub fn dispatcher(&self, path: &str, method: Method) -> Arc<Dispatcher> {
        self.dispatcher_for(&Endpoint::new(path, method))
    }

    fn dispatcher_for(&self, endpoint: &Endpoint) -> Arc<Dispatcher> {
        let key = endpoint.batch_key();
        let mut dispatchers = self.lock_dispatchers();
        if let Some(d) = dispatchers.get(&key) {
            return Arc::clone(d);
        }
        let policy = self.policies.get(&key).cloned();
        tracing::debug!(%endpoint, batching = policy.is_some(), "creating dispatcher");
        let d = Arc::new(Dispatcher::new(
            endpoint.clone(),
            Arc::clone(&self.transport),
            policy,
            self.config.dispatcher_config(),
        ));
        dispatchers.insert(key, Arc::clone(&d));
        d
    }

    /// Check `input` against the endpoint's schema regardless of
    /// `validate_inputs`.
    pub fn validate<T>(&self, path: &str, method: Method, input: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let input: Value = serde_json::to_value(input)?;
        self.schemas.validate(&Endpoint::new(path, method), &input)
    }

    /// Drop the query for `(path, method, input)` and its cache entry.
    ///
    /// Handles already given out keep working: their next request misses the
    /// cache and re-registers the key with the TTL they were created with. They
    /// no longer share in-flight requests or state with queries created
    /// afterwards. Returns `false` if no such query existed.
    pub fn evict_query<T>(&self, path: &str, method: Method, input: &T) -> Result<bool>
    where
        T: Serialize + ?Sized,
    {
        let input: Value = serde_json::to_value(input)?;
        let key = Endpoint::new(path, method).cache_key(&input);
        let removed = self.lock_queries().remove(&key).is_some();
        if removed {
            self.cache.deregister(&key);
            tracing::debug!(key = %key, "query evicted");
        }
        Ok(removed)
    }

    pub fn cache(&self) -> &Arc<Cache<Response>> {
        &self.cache
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn query_count(&self) -> usize {
        self.lock_queries().len()
    }

    pub fn dispatcher_count(&self) -> usize {
        self.lock_dispatchers().len()
    }

    fn lock_queries(&self) -> MutexGuard<'_, HashMap<String, Query>> {
        self.queries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_dispatchers(&self) -> MutexGuard<'_, HashMap<String, Arc<Dispatcher>>> {
        self.dispatchers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("config", &self.config)
            .field("queries", &self.query_count())
            .field("dispatchers", &self.dispatcher_count())
            .field("batching", &self.policies.keys().collect::<Vec<_>>())
            .field("schemas", &self.schemas)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingTransport {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Transport for CountingTransport {
        async fn request(&self, _path: &str, _method: &Method, input: &Value) -> Result<Response> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Response::from_json(200, input)
        }
    }

    fn registry() -> (Registry, Arc<CountingTransport>) {
        let transport = Arc::new(CountingTransport::default());
        let reg = Registry::builder()
            .transport(transport.clone())
            .build()
            .unwrap();
        (reg, transport)
    }

    #[test]
    fn test_same_key_same_query() {
        let (reg, _) = registry();
        let a = reg.query("/users", Method::GET, &json!({"id": 1, "page": 2})).unwrap();
        let b = reg.query("/users", Method::GET, &json!({"page": 2, "id": 1})).unwrap();
        assert_eq!(a.cache_key(), b.cache_key());
        assert_eq!(reg.query_count(), 1);
        assert_eq!(reg.dispatcher_count(), 1);
        assert!(reg.cache().is_registered(a.cache_key()));
    }

    #[test]
    fn test_method_separates_dispatchers() {
        let (reg, _) = registry();
        let get = reg.dispatcher("/users", Method::GET);
        let post = reg.dispatcher("/users", Method::POST);
        assert!(!Arc::ptr_eq(&get, &post));
        assert!(Arc::ptr_eq(&get, &reg.dispatcher("/users", Method::GET)));
    }

    #[tokio::test]
    async fn test_handles_share_state() {
        let (reg, transport) = registry();
        let a = reg.query("/users", Method::GET, &json!({"id": 1})).unwrap();
        a.request().await.unwrap();
        let b = reg.query("/users", Method::GET, &json!({"id": 1})).unwrap();
        assert_eq!(b.data(), Some(json!({"id": 1})));
        b.request().await.unwrap();
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_evict_query() {
        let (reg, _) = registry();
        let q = reg.query("/users", Method::GET, &json!({"id": 1})).unwrap();
        assert!(reg.evict_query("/users", Method::GET, &json!({"id": 1})).unwrap());
        assert!(!reg.cache().is_registered(q.cache_key()));
        assert_eq!(reg.query_count(), 0);
        assert!(!reg.evict_query("/users", Method::GET, &json!({"id": 1})).unwrap());
    }

    #[tokio::test]
    async fn test_evicted_handle_keeps_working() {
        let (reg, transport) = registry();
        let q = reg
            .query_with_ttl("/users", Method::GET, &json!({"id": 1}), Ttl::from_millis(60_000))
            .unwrap();
        q.request().await.unwrap();
        assert!(reg.evict_query("/users", Method::GET, &json!({"id": 1})).unwrap());

        let resp = q.request().await.unwrap();
        assert!(resp.ok);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
        assert_eq!(reg.cache().ttl(q.cache_key()), Some(Ttl::from_millis(60_000)));
        assert!(q.is_cached());

        q.request().await.unwrap();
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_validation_gate() {
        let reg = Registry::builder()
            .transport(Arc::new(CountingTransport::default()))
            .validate_inputs(true)
            .schema("/users", Method::GET, &json!({"type": "object", "required": ["id"]}))
            .unwrap()
            .build()
            .unwrap();

        assert!(matches!(
            reg.query("/users", Method::GET, &json!({})),
            Err(Error::Validation { .. })
        ));
        assert!(matches!(
            reg.query("/posts", Method::GET, &json!({})),
            Err(Error::SchemaMissing { .. })
        ));
        assert!(reg.query("/users", Method::GET, &json!({"id": 3})).is_ok());
        assert_eq!(reg.query_count(), 1);
    }

    #[test]
    fn test_validation_off_by_default() {
        let (reg, _) = registry();
        assert!(reg.query("/anything", Method::GET, &json!(null)).is_ok());
        assert!(matches!(
            reg.validate("/anything", Method::GET, &json!(null)),
            Err(Error::SchemaMissing { .. })
        ));
    }

    #[test]
    fn test_query_ttl_override_is_first_wins() {
        let (reg, _) = registry();
        let q = reg
            .query_with_ttl("/users", Method::GET, &json!({"id": 1}), Ttl::Infinite)
            .unwrap();
        reg.query("/users", Method::GET, &json!({"id": 1})).unwrap();
        assert_eq!(reg.cache().ttl(q.cache_key()), Some(Ttl::Infinite));
    }
}

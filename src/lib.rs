//! # api-query
//!
//! 面向端点的请求编排层：响应缓存、请求去重、批处理与限流。
//!
//! Request orchestration for remote endpoints: a TTL response cache, in-flight
//! deduplication of identical requests, debounced batching, and per-endpoint
//! rate limiting, behind a small observable [`Query`] object.
//!
//! ## Overview
//!
//! Callers ask a [`Registry`] for the query identified by an endpoint (path and
//! HTTP method) plus an input value. Every call site asking for the same triple
//! gets a handle to the same query, and therefore the same cache entry and the
//! same in-flight request.
//!
//! ```text
//! Registry ──▶ Query ──miss──▶ Dispatcher ──▶ RateLimiter ──▶ Transport
//!                │                 │
//!                └──── Cache ◀─────┘ (response stored with the query's TTL)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use api_query::{HttpTransport, Method, Registry};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> api_query::Result<()> {
//!     let registry = Registry::builder()
//!         .transport(Arc::new(HttpTransport::new("https://api.example.com")?))
//!         .build()?;
//!
//!     let users = registry.query("/users", Method::GET, &json!({ "page": 1 }))?;
//!     let response = users.request().await?;
//!     println!("{} -> {:?}", response.status, users.data());
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`cache`] | Registered-key response cache with per-key TTL |
//! | [`dispatch`] | Per-endpoint batching and rate-limited dispatch |
//! | [`query`] | Deduplicated, observable request objects |
//! | [`registry`] | Get-or-create access to dispatchers and queries |
//! | [`resilience`] | Concurrency and spacing limiter |
//! | [`schema`] | Per-endpoint JSON Schema validation |
//! | [`transport`] | Transport trait, response type, HTTP implementation |
//! | [`config`] | Orchestrator configuration (code, YAML, environment) |
//! | [`key`] | Endpoint identity and stable key derivation |

pub mod cache;
pub mod config;
pub mod dispatch;
pub mod key;
pub mod query;
pub mod registry;
pub mod resilience;
pub mod schema;
pub mod transport;

pub use cache::{Cache, Ttl};
pub use config::OrchestratorConfig;
pub use dispatch::{BatchPolicy, Dispatcher, DispatcherConfig, FnBatchPolicy, NoBatching};
pub use key::{stable_serialize, Endpoint};
pub use query::{Query, QueryState, QueryStatus};
pub use registry::{Registry, RegistryBuilder};
pub use reqwest::Method;
pub use transport::{HttpTransport, Response, Transport, TransportError};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};

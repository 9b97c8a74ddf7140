//! 响应缓存模块：按键注册 TTL 的进程内缓存。
//!
//! # Response Cache Module
//!
//! A keyed store mapping a cache key to `{ttl, updated_at, value}`. It knows
//! nothing about endpoints or batching; queries register their key once and
//! then treat every `get` purely as a freshness check.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`Cache`] | Registered-key store with per-key TTL |
//! | [`Ttl`] | Finite duration or infinite |
//! | [`CacheStats`] | Hit/miss/set counters |
//!
//! ## Example
//!
//! ```rust
//! use api_query::cache::{Cache, Ttl};
//! use std::time::Duration;
//!
//! let cache: Cache<String> = Cache::new();
//! cache.register("users_GET_{}", Ttl::Finite(Duration::from_secs(300)));
//! cache.set("users_GET_{}", "[]".to_string()).unwrap();
//! assert!(cache.has("users_GET_{}"));
//! ```
//!
//! States of a key:
//! - unregistered: `get`/`set` fail with `UnregisteredKey`
//! - registered, empty or expired: `get` is a miss
//! - registered and fresh: `get` returns the value

mod entry;
mod store;

pub use entry::Ttl;
pub use store::{Cache, CacheStats};

//! 查询模块：按 (端点, 输入) 去重的可观察请求对象。
//!
//! # Query Module
//!
//! A [`Query`] is the unit callers observe. There is one per distinct endpoint
//! and serialized input, shared by every caller asking for that combination.
//!
//! ## State machine
//!
//! ```text
//! Idle ──request() miss──▶ Loading ──ok──────▶ Success
//!                             ▲      └─!ok────▶ Error
//!                             └──── next request() that misses the cache
//! ```
//!
//! - A fresh cache hit returns immediately and leaves the state untouched
//! - Concurrent misses share one in-flight dispatcher call
//! - Both successful and failed responses are cached until their TTL expires
//! - [`Query::subscribe`] yields a `watch` receiver notified on every transition

mod core;
mod state;

pub use self::core::Query;
pub use state::{QueryState, QueryStatus};

//! 弹性模式模块：为每个端点提供并发与调度间隔限制。
//!
//! # Resilience Primitives Module
//!
//! Every transport call made by a dispatcher, batched or not, passes through a
//! per-endpoint [`RateLimiter`](rate_limiter::RateLimiter). It bounds how many
//! calls are in flight and how closely two calls may start after one another.
//!
//! ```rust
//! use api_query::resilience::rate_limiter::{RateLimiter, RateLimiterConfig};
//! use std::time::Duration;
//!
//! # async fn run() -> api_query::Result<()> {
//! let limiter = RateLimiter::new(
//!     RateLimiterConfig::new()
//!         .with_max_concurrent(5)
//!         .with_min_time(Duration::from_millis(100)),
//! );
//! let answer = limiter.schedule(async { Ok(42) }).await?;
//! assert_eq!(answer, 42);
//! # Ok(())
//! # }
//! ```
//!
//! The limiter is not a priority queue: first submitted is first admitted,
//! subject to concurrency headroom.

pub mod rate_limiter;

pub use rate_limiter::{RateLimiter, RateLimiterConfig, RateLimiterSnapshot};

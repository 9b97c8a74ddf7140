//! 请求调度模块：按端点进行防抖批处理与限流调度。
//!
//! # Request Dispatch Module
//!
//! One [`Dispatcher`] exists per endpoint. It converts input-level requests into
//! transport calls, always through the endpoint's rate limiter, and coalesces
//! inputs into batch windows when the endpoint's [`BatchPolicy`] allows it.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`Dispatcher`] | Batch windows, flush, rate-limited transport calls |
//! | [`DispatcherConfig`] | Debounce delay, limiter settings, optional timeout |
//! | [`BatchPolicy`] | `can_batch` / `batch_input` / `unbatch_output` |
//! | [`NoBatching`] | Default policy: every input dispatched on its own |
//! | [`FnBatchPolicy`] | Policy built from three closures |
//!
//! ## Batch windows
//!
//! - The first input for a batch id starts the window's timer
//! - When the timer fires the window is detached atomically; later inputs start
//!   a fresh window
//! - The aggregate input is dispatched exactly once, and results are handed back
//!   in enqueue order
//! - A split response with `ok == false` rejects only its own caller; a failed
//!   transport call rejects every caller in the window

mod dispatcher;
mod policy;

pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use policy::{BatchPolicy, FnBatchPolicy, NoBatching};

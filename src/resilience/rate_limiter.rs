use crate::{Error, ErrorContext, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimiterSnapshot {
    pub max_concurrent: usize,
    pub in_flight: usize,
    pub available: usize,
    pub min_time_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimiterConfig {
    /// Maximum number of calls running at once.
    pub max_concurrent: usize,
    /// Minimum spacing between two admissions.
    pub min_time: Duration,
}

impl RateLimiterConfig {
    pub fn new() -> Self {
        Self {
            max_concurrent: 5,
            min_time: Duration::from_millis(100),
        }
    }

    /// Spacing derived from a requests-per-second budget; `0` disables spacing.
    pub fn from_rps(rps: f64) -> Option<Self> {
        if !rps.is_finite() || rps < 0.0 {
            return None;
        }
        let min_time = if rps == 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(1.0 / rps)
        };
        Some(Self {
            min_time,
            ..Self::new()
        })
    }

    pub fn with_max_concurrent(mut self, n: usize) -> Self {
        self.max_concurrent = n;
        self
    }

    pub fn with_min_time(mut self, min_time: Duration) -> Self {
        self.min_time = min_time;
        self
    }
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Admission gate: bounded concurrency plus minimum spacing between starts.
///
/// - Admission is first-come first-served; callers are never reordered
/// - Only start times are delayed, completion order is whatever the calls do
/// - The permit is held until the scheduled future finishes
pub struct RateLimiter {
    cfg: RateLimiterConfig,
    permits: Arc<Semaphore>,
    // Start time of the last admission. The lock is held while a caller waits
    // for a permit and its spacing slot, which is what keeps admission FIFO.
    last_admitted: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(mut cfg: RateLimiterConfig) -> Self {
        cfg.max_concurrent = cfg.max_concurrent.max(1);
        let permits = Arc::new(Semaphore::new(cfg.max_concurrent));
        Self {
            cfg,
            permits,
            last_admitted: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.cfg
    }

    /// Wait for admission (may sleep). The returned permit frees a slot on drop.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit> {
        let mut last = self.last_admitted.lock().await;

        let permit = self.permits.clone().acquire_owned().await.map_err(|_| {
            Error::runtime_with_context(
                "rate limiter closed",
                ErrorContext::new().with_source("rate_limiter"),
            )
        })?;

        if let Some(prev) = *last {
            let ready_at = prev + self.cfg.min_time;
            if ready_at > Instant::now() {
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
        Ok(permit)
    }

    /// Run `job` once admitted, holding a concurrency slot for its whole duration.
    pub async fn schedule<F, T>(&self, job: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let _permit = self.acquire().await?;
        job.await
    }

    pub fn snapshot(&self) -> RateLimiterSnapshot {
        let available = self.permits.available_permits();
        RateLimiterSnapshot {
            max_concurrent: self.cfg.max_concurrent,
            in_flight: self.cfg.max_concurrent.saturating_sub(available),
            available,
            min_time_ms: self.cfg.min_time.as_millis() as u64,
        }
    }
}

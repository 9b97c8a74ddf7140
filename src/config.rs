//! Orchestrator configuration.
//!
//! Values come from code (`with_*` builders), YAML, or `API_QUERY_*`
//! environment variables layered on top of the defaults.

use crate::cache::Ttl;
use crate::dispatch::DispatcherConfig;
use crate::resilience::RateLimiterConfig;
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const ENV_CACHE_TTL_MS: &str = "API_QUERY_CACHE_TTL_MS";
const ENV_BATCH_DELAY_MS: &str = "API_QUERY_BATCH_DELAY_MS";
const ENV_MAX_CONCURRENT: &str = "API_QUERY_MAX_CONCURRENT";
const ENV_MIN_TIME_MS: &str = "API_QUERY_MIN_TIME_MS";
const ENV_RATE_PER_SEC: &str = "API_QUERY_RATE_PER_SEC";
const ENV_REQUEST_TIMEOUT_MS: &str = "API_QUERY_REQUEST_TIMEOUT_MS";
const ENV_VALIDATE_INPUTS: &str = "API_QUERY_VALIDATE_INPUTS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// TTL applied to every query's cache entry. `None` never expires.
    pub default_ttl_ms: Option<u64>,
    /// Debounce window for batchable inputs.
    pub batch_delay_ms: u64,
    /// Per-endpoint bound on in-flight transport calls.
    pub max_concurrent: usize,
    /// Per-endpoint minimum spacing between dispatch starts.
    pub min_time_ms: u64,
    /// Per-call transport deadline. `None` waits forever.
    pub request_timeout_ms: Option<u64>,
    /// Validate every query input against its endpoint schema.
    pub validate_inputs: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            default_ttl_ms: Some(5 * 60 * 1000),
            batch_delay_ms: 100,
            max_concurrent: 5,
            min_time_ms: 100,
            request_timeout_ms: None,
            validate_inputs: false,
        }
    }
}

impl OrchestratorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `API_QUERY_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|name| std::env::var(name).ok())
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let cfg: Self = serde_yaml::from_str(yaml).map_err(|e| {
            Error::configuration_with_context(
                format!("invalid orchestrator config: {e}"),
                ErrorContext::new().with_source("config"),
            )
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Apply overrides from `lookup` (an environment-like source). Unparseable
    /// values are ignored with a warning.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(name: &str, raw: Option<String>) -> Option<T> {
            let raw = raw?;
            match raw.trim().parse::<T>() {
                Ok(v) => Some(v),
                Err(_) => {
                    tracing::warn!(name, value = %raw, "ignoring unparseable config override");
                    None
                }
            }
        }

        if let Some(raw) = lookup(ENV_CACHE_TTL_MS) {
            if matches!(raw.trim(), "inf" | "infinite") {
                self.default_ttl_ms = None;
            } else if let Some(ms) = parsed(ENV_CACHE_TTL_MS, Some(raw)) {
                self.default_ttl_ms = Some(ms);
            }
        }
        if let Some(v) = parsed(ENV_BATCH_DELAY_MS, lookup(ENV_BATCH_DELAY_MS)) {
            self.batch_delay_ms = v;
        }
        if let Some(v) = parsed(ENV_MAX_CONCURRENT, lookup(ENV_MAX_CONCURRENT)) {
            self.max_concurrent = v;
        }
        if let Some(v) = parsed(ENV_MIN_TIME_MS, lookup(ENV_MIN_TIME_MS)) {
            self.min_time_ms = v;
        }
        // Takes precedence over API_QUERY_MIN_TIME_MS.
        if let Some(rps) = parsed::<f64>(ENV_RATE_PER_SEC, lookup(ENV_RATE_PER_SEC)) {
            match RateLimiterConfig::from_rps(rps) {
                Some(limiter) => self.min_time_ms = limiter.min_time.as_millis() as u64,
                None => tracing::warn!(name = ENV_RATE_PER_SEC, rps, "ignoring invalid rate override"),
            }
        }
        if let Some(v) = parsed(ENV_REQUEST_TIMEOUT_MS, lookup(ENV_REQUEST_TIMEOUT_MS)) {
            self.request_timeout_ms = Some(v);
        }
        if let Some(v) = parsed(ENV_VALIDATE_INPUTS, lookup(ENV_VALIDATE_INPUTS)) {
            self.validate_inputs = v;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent == 0 {
            return Err(Error::configuration_with_context(
                "max_concurrent must be at least 1",
                ErrorContext::new()
                    .with_field_path("max_concurrent")
                    .with_source("config"),
            ));
        }
        if self.request_timeout_ms == Some(0) {
            return Err(Error::configuration_with_context(
                "request_timeout_ms must be positive",
                ErrorContext::new()
                    .with_field_path("request_timeout_ms")
                    .with_source("config"),
            ));
        }
        Ok(())
    }

    pub fn with_default_ttl(mut self, ttl: Ttl) -> Self {
        self.default_ttl_ms = match ttl {
            Ttl::Finite(d) => Some(d.as_millis() as u64),
            Ttl::Infinite => None,
        };
        self
    }

    pub fn with_batch_delay(mut self, d: Duration) -> Self {
        self.batch_delay_ms = d.as_millis() as u64;
        self
    }

    pub fn with_max_concurrent(mut self, n: usize) -> Self {
        self.max_concurrent = n;
        self
    }

    pub fn with_min_time(mut self, d: Duration) -> Self {
        self.min_time_ms = d.as_millis() as u64;
        self
    }

    /// Set `min_time_ms` from a requests-per-second budget; `0` disables spacing.
    pub fn with_rate_per_second(mut self, rps: f64) -> Result<Self> {
        let limiter = RateLimiterConfig::from_rps(rps).ok_or_else(|| {
            Error::configuration_with_context(
                format!("invalid rate {rps}: must be finite and non-negative"),
                ErrorContext::new()
                    .with_field_path("rate_per_second")
                    .with_source("config"),
            )
        })?;
        self.min_time_ms = limiter.min_time.as_millis() as u64;
        Ok(self)
    }

    pub fn with_request_timeout(mut self, d: Option<Duration>) -> Self {
        self.request_timeout_ms = d.map(|d| d.as_millis() as u64);
        self
    }

    pub fn with_validate_inputs(mut self, v: bool) -> Self {
        self.validate_inputs = v;
        self
    }

    pub fn default_ttl(&self) -> Ttl {
        self.default_ttl_ms.map(Ttl::from_millis).unwrap_or(Ttl::Infinite)
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig::new()
            .with_batch_delay(Duration::from_millis(self.batch_delay_ms))
            .with_limiter(
                RateLimiterConfig::new()
                    .with_max_concurrent(self.max_concurrent)
                    .with_min_time(Duration::from_millis(self.min_time_ms)),
            )
            .with_request_timeout(self.request_timeout_ms.map(Duration::from_millis))
    }
}

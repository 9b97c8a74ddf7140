//! Cache entry and expiry policy.

use std::time::Duration;
use tokio::time::Instant;

/// How long a stored value stays trustworthy after it was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    Finite(Duration),
    Infinite,
}

impl Ttl {
    pub fn from_millis(ms: u64) -> Self {
        Ttl::Finite(Duration::from_millis(ms))
    }

    /// Fresh while `now <= updated_at + ttl`, inclusive at the boundary.
    pub fn is_fresh(&self, updated_at: Instant, now: Instant) -> bool {
        match self {
            Ttl::Infinite => true,
            Ttl::Finite(ttl) => now.saturating_duration_since(updated_at) <= *ttl,
        }
    }
}

impl From<Duration> for Ttl {
    fn from(d: Duration) -> Self {
        Ttl::Finite(d)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct CacheEntry<V> {
    pub(crate) ttl: Ttl,
    pub(crate) updated_at: Option<Instant>,
    pub(crate) value: Option<V>,
}

impl<V> CacheEntry<V> {
    pub(crate) fn registered(ttl: Ttl) -> Self {
        Self {
            ttl,
            updated_at: None,
            value: None,
        }
    }

    pub(crate) fn store(&mut self, value: V, now: Instant) {
        self.value = Some(value);
        self.updated_at = Some(now);
    }

    pub(crate) fn clear(&mut self) {
        self.value = None;
        self.updated_at = None;
    }

    /// The value, if it was ever written and has not expired.
    pub(crate) fn fresh(&self, now: Instant) -> Option<&V> {
        let updated_at = self.updated_at?;
        if self.ttl.is_fresh(updated_at, now) {
            self.value.as_ref()
        } else {
            None
        }
    }
}

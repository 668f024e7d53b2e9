//! Concurrent registry of per-key counters.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::{debug, trace, warn};

use super::clock::{Clock, SystemClock};
use super::counter::{Counter, CounterBackend, LimitValue, LocalCounterBackend};
use super::key::RateLimitKey;
use crate::error::{Result, TollgateError};

/// Default bound on a single counter call.
pub const DEFAULT_BACKEND_TIMEOUT: Duration = Duration::from_secs(1);

/// Maps rate-limit keys to lazily created counters.
///
/// Creation is atomic per key: concurrent first observations of a key share
/// one counter.
pub struct LimiterRegistry {
    counters: DashMap<RateLimitKey, Arc<dyn Counter>>,
    backend: Arc<dyn CounterBackend>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl LimiterRegistry {
    /// Registry backed by in-process fixed-window counters.
    pub fn new() -> Self {
        Self::with_backend(Arc::new(LocalCounterBackend))
    }

    pub fn with_backend(backend: Arc<dyn CounterBackend>) -> Self {
        Self {
            counters: DashMap::new(),
            backend,
            clock: Arc::new(SystemClock),
            timeout: DEFAULT_BACKEND_TIMEOUT,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Bound every counter call by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Count one hit against `key` and report whether the limit was exceeded.
    ///
    /// `limit` is only used when `key` has not been seen before; an existing
    /// counter keeps the limit it was created with.
    pub async fn check_and_count(&self, key: &RateLimitKey, limit: LimitValue) -> Result<bool> {
        let counter = self.counter_for(key, limit);
        let now = self.clock.now();

        trace!(key = %key, "Checking rate limit");

        let admitted = match tokio::time::timeout(self.timeout, counter.allow(now, 1)).await {
            Ok(result) => result.map_err(|e| {
                warn!(key = %key, error = %e, "Counter backend failed");
                e
            })?,
            Err(_) => {
                warn!(key = %key, timeout = ?self.timeout, "Counter backend timed out");
                return Err(TollgateError::BackendTimeout {
                    key: key.to_string(),
                    timeout: self.timeout,
                });
            }
        };

        if !admitted {
            debug!(key = %key, limit = %counter.limit(), "Rate limit exceeded");
        }
        Ok(!admitted)
    }

    fn counter_for(&self, key: &RateLimitKey, limit: LimitValue) -> Arc<dyn Counter> {
        if let Some(existing) = self.counters.get(key) {
            return existing.value().clone();
        }

        self.counters
            .entry(key.clone())
            .or_insert_with(|| {
                debug!(key = %key, limit = %limit, "Creating new rate limit counter");
                self.backend.new_counter(&key.storage_key(), limit)
            })
            .value()
            .clone()
    }

    /// Limit of the counter for `key`, if one exists.
    pub fn limit_for(&self, key: &RateLimitKey) -> Option<LimitValue> {
        self.counters.get(key).map(|c| c.limit())
    }

    /// Number of keys observed so far.
    pub fn counter_count(&self) -> usize {
        self.counters.len()
    }

    /// Drop every counter.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.counters.clear();
    }
}

impl Default for LimiterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LimiterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LimiterRegistry")
            .field("counters", &self.counters.len())
            .field("timeout", &self.timeout)
            .finish()
    }
}

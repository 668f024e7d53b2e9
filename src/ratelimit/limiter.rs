//! A limiter: one policy plus the buckets it owns.

use std::sync::Arc;

use http::header::{HeaderName, HeaderValue};
use http::HeaderMap;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::debug;

use super::counter::LimitValue;
use super::key::RateLimitKey;
use super::policy::LimiterPolicy;
use super::registry::LimiterRegistry;
use crate::error::Result;

pub const RATE_LIMIT_LIMIT_HEADER: &str = "x-rate-limit-limit";
pub const RATE_LIMIT_DURATION_HEADER: &str = "x-rate-limit-duration";

/// Why a request was turned away.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectionReason {
    pub message: String,
    pub status_code: u16,
    pub content_type: String,
}

impl RejectionReason {
    pub fn from_policy(policy: &LimiterPolicy) -> Self {
        Self {
            message: policy.message.clone(),
            status_code: policy.status_code,
            content_type: policy.content_type.clone(),
        }
    }
}

/// A policy together with its own counter registry.
///
/// The policy is swapped copy-on-write, so requests in flight keep the
/// snapshot they started with.
#[derive(Debug)]
pub struct RateLimiter {
    policy: RwLock<Arc<LimiterPolicy>>,
    registry: LimiterRegistry,
}

impl RateLimiter {
    /// Create a limiter with in-process counters.
    pub fn new(policy: LimiterPolicy) -> Self {
        Self::with_registry(policy, LimiterRegistry::new())
    }

    pub fn with_registry(policy: LimiterPolicy, registry: LimiterRegistry) -> Self {
        Self {
            policy: RwLock::new(Arc::new(policy)),
            registry,
        }
    }

    /// Current policy snapshot.
    pub fn policy(&self) -> Arc<LimiterPolicy> {
        self.policy.read().clone()
    }

    /// Apply `update` to a copy of the policy and publish the copy.
    pub fn update_policy<F>(&self, update: F)
    where
        F: FnOnce(&mut LimiterPolicy),
    {
        let mut guard = self.policy.write();
        let mut next = LimiterPolicy::clone(&guard);
        update(&mut next);
        *guard = Arc::new(next);
        debug!(shape = ?guard.key_shape(), "Limiter policy updated");
    }

    pub fn registry(&self) -> &LimiterRegistry {
        &self.registry
    }

    /// Count one hit against `key`, creating its bucket with
    /// `limit_override` or the policy default.
    pub async fn check_and_count(
        &self,
        key: &RateLimitKey,
        limit_override: Option<LimitValue>,
    ) -> Result<bool> {
        let limit = limit_override.unwrap_or(self.policy().default_limit);
        self.registry.check_and_count(key, limit).await
    }

    /// Count one hit against an explicit key.
    pub async fn limit_by_keys<I, S>(
        &self,
        components: I,
        limit_override: Option<LimitValue>,
    ) -> Result<Option<RejectionReason>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let key = RateLimitKey::new(components);
        if self.check_and_count(&key, limit_override).await? {
            return Ok(Some(RejectionReason::from_policy(&self.policy())));
        }
        Ok(None)
    }

    /// `X-Rate-Limit-Limit` and `X-Rate-Limit-Duration` for the default rate.
    pub fn rate_limit_headers(&self) -> HeaderMap {
        let limit = self.policy().default_limit;
        let mut headers = HeaderMap::new();

        headers.insert(
            HeaderName::from_static(RATE_LIMIT_LIMIT_HEADER),
            HeaderValue::from(limit.max),
        );
        if let Ok(window) = HeaderValue::from_str(&format!("{:?}", limit.window)) {
            headers.insert(HeaderName::from_static(RATE_LIMIT_DURATION_HEADER), window);
        }
        headers
    }
}

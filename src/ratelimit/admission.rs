//! Top-level admission decisions.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, trace, warn};

use super::identity::resolve_identity;
use super::key::build_keys;
use super::limiter::{RateLimiter, RejectionReason};
use super::overrides::RouteOverrideTable;
use super::request::RequestInfo;
use crate::error::Result;

/// What to do when the counter backend fails or times out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailMode {
    /// Treat the failure as an exceeded limit
    #[default]
    Closed,
    /// Treat the failure as admitted and move on to the next key
    Open,
    /// Hand the error to the caller
    Propagate,
}

/// Decides whether requests are admitted.
///
/// The override table is shared state; clone the `Arc` to let several
/// controllers see the same overrides.
#[derive(Debug, Clone)]
pub struct AdmissionController {
    overrides: Arc<RouteOverrideTable>,
    fail_mode: FailMode,
}

impl AdmissionController {
    pub fn new(overrides: Arc<RouteOverrideTable>) -> Self {
        Self {
            overrides,
            fail_mode: FailMode::default(),
        }
    }

    pub fn with_fail_mode(mut self, fail_mode: FailMode) -> Self {
        self.fail_mode = fail_mode;
        self
    }

    pub fn fail_mode(&self) -> FailMode {
        self.fail_mode
    }

    pub fn overrides(&self) -> &Arc<RouteOverrideTable> {
        &self.overrides
    }

    /// Register a per-route rate. See [`RouteOverrideTable::register`].
    pub fn register_override(
        &self,
        pattern: &str,
        method: &str,
        max: u64,
        window: Duration,
    ) -> Result<()> {
        self.overrides.register(pattern, method, max, window)
    }

    pub fn reset_overrides(&self) {
        self.overrides.reset();
    }

    /// Decide on `request` under `limiter`'s policy.
    ///
    /// Keys are checked in order and checking stops at the first exceeded
    /// key, so later keys are not counted for a rejected request.
    #[instrument(
        skip(self, limiter, request),
        fields(method = %request.method, path = %request.path)
    )]
    pub async fn admit(
        &self,
        limiter: &RateLimiter,
        request: &RequestInfo,
    ) -> Result<Option<RejectionReason>> {
        let policy = limiter.policy();

        let identity = resolve_identity(&policy.ip_lookups, request);
        if identity.is_empty() {
            trace!("No client identity, request not limited");
            return Ok(None);
        }

        let limit_override = self
            .overrides
            .resolve(&request.path, request.method.as_str());
        let limit = limit_override.unwrap_or(policy.default_limit);

        let keys = build_keys(&policy, &identity, request);
        trace!(identity = %identity, keys = keys.len(), "Composed rate limit keys");

        for key in &keys {
            match limiter.registry().check_and_count(key, limit).await {
                Ok(false) => continue,
                Ok(true) => {
                    debug!(key = %key, "Request rejected");
                    return Ok(Some(RejectionReason::from_policy(&policy)));
                }
                Err(e) if e.is_backend() => match self.fail_mode {
                    FailMode::Closed => {
                        warn!(key = %key, error = %e, "Counter unavailable, rejecting request");
                        return Ok(Some(RejectionReason::from_policy(&policy)));
                    }
                    FailMode::Open => {
                        warn!(key = %key, error = %e, "Counter unavailable, admitting request");
                        continue;
                    }
                    FailMode::Propagate => return Err(e),
                },
                Err(e) => return Err(e),
            }
        }

        Ok(None)
    }
}

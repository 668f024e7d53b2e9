//! Counter capability consumed by the registry, plus the in-process
//! fixed-window implementation.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::Result;

/// A (max, window) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LimitValue {
    /// Requests admitted per window
    pub max: u64,
    /// Length of one window
    pub window: Duration,
}

impl LimitValue {
    pub fn new(max: u64, window: Duration) -> Self {
        Self { max, window }
    }
}

impl fmt::Display for LimitValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{:?}", self.max, self.window)
    }
}

/// Counting state for one key.
///
/// Implementations may talk to a remote store; the registry bounds every
/// call with a timeout.
#[async_trait]
pub trait Counter: Send + Sync {
    /// Record `hits` at `now`. Returns `true` if the hits were admitted.
    async fn allow(&self, now: Instant, hits: u64) -> Result<bool>;

    /// The limit this counter was created with.
    fn limit(&self) -> LimitValue;
}

/// Factory for counters.
///
/// `new_counter` runs while the registry holds the shard lock for `key`, so
/// it must not block. Connection setup for remote stores belongs in `allow`.
pub trait CounterBackend: Send + Sync {
    fn new_counter(&self, key: &str, limit: LimitValue) -> Arc<dyn Counter>;
}

#[derive(Debug, Default)]
struct WindowState {
    count: u64,
    window_start: Option<Instant>,
}

/// Fixed-window counter whose first window opens on first use.
#[derive(Debug)]
pub struct FixedWindowCounter {
    limit: LimitValue,
    state: Mutex<WindowState>,
}

impl FixedWindowCounter {
    pub fn new(limit: LimitValue) -> Self {
        Self {
            limit,
            state: Mutex::new(WindowState::default()),
        }
    }

    /// Admit `hits` if they fit in the current window. Rejected hits are not
    /// recorded.
    pub fn try_acquire(&self, now: Instant, hits: u64) -> bool {
        let mut state = self.state.lock();
        Self::roll_window(&mut state, self.limit.window, now);

        match state.count.checked_add(hits) {
            Some(next) if next <= self.limit.max => {
                state.count = next;
                true
            }
            _ => false,
        }
    }

    /// Count recorded in the window active at `now`.
    pub fn current_count(&self, now: Instant) -> u64 {
        let mut state = self.state.lock();
        Self::roll_window(&mut state, self.limit.window, now);
        state.count
    }

    /// Remaining quota in the window active at `now`.
    pub fn remaining(&self, now: Instant) -> u64 {
        self.limit.max.saturating_sub(self.current_count(now))
    }

    /// Time until the active window closes. Zero if no window is open.
    pub fn duration_until_reset(&self, now: Instant) -> Duration {
        let state = self.state.lock();
        match state.window_start {
            Some(start) => self
                .limit
                .window
                .saturating_sub(now.saturating_duration_since(start)),
            None => Duration::ZERO,
        }
    }

    fn roll_window(state: &mut WindowState, window: Duration, now: Instant) {
        let start = *state.window_start.get_or_insert(now);
        if now.saturating_duration_since(start) >= window {
            state.count = 0;
            state.window_start = Some(now);
        }
    }
}

#[async_trait]
impl Counter for FixedWindowCounter {
    async fn allow(&self, now: Instant, hits: u64) -> Result<bool> {
        Ok(self.try_acquire(now, hits))
    }

    fn limit(&self) -> LimitValue {
        self.limit
    }
}

/// In-process backend handing out [`FixedWindowCounter`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalCounterBackend;

impl CounterBackend for LocalCounterBackend {
    fn new_counter(&self, _key: &str, limit: LimitValue) -> Arc<dyn Counter> {
        Arc::new(FixedWindowCounter::new(limit))
    }
}

//! Per-route overrides of the default rate.
//!
//! Overrides are matched by HTTP method and an unanchored regular expression
//! on the path. The longest pattern is tried first.

use std::time::Duration;

use parking_lot::RwLock;
use regex::Regex;
use tracing::{debug, info};

use super::counter::LimitValue;
use crate::error::{Result, TollgateError};

/// One registered override.
#[derive(Debug, Clone)]
pub struct RouteOverride {
    /// Compiled path pattern
    pub pattern: Regex,
    /// HTTP method, compared exactly
    pub method: String,
    /// Rate applied to matching requests
    pub limit: LimitValue,
}

impl RouteOverride {
    fn matches(&self, path: &str, method: &str) -> bool {
        self.method == method && self.pattern.is_match(path)
    }
}

/// Table of route overrides shared between limiters.
#[derive(Debug, Default)]
pub struct RouteOverrideTable {
    entries: RwLock<Vec<RouteOverride>>,
}

impl RouteOverrideTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an override for `method` requests whose path matches
    /// `pattern`.
    ///
    /// A pattern that fails to compile is rejected and the table is left
    /// untouched.
    pub fn register(
        &self,
        pattern: &str,
        method: &str,
        max: u64,
        window: Duration,
    ) -> Result<()> {
        let compiled = Regex::new(pattern).map_err(|source| TollgateError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;

        let mut entries = self.entries.write();
        entries.push(RouteOverride {
            pattern: compiled,
            method: method.to_string(),
            limit: LimitValue::new(max, window),
        });
        // Stable: equal lengths keep registration order
        entries.sort_by(|a, b| b.pattern.as_str().len().cmp(&a.pattern.as_str().len()));

        info!(
            pattern = %pattern,
            method = %method,
            max = max,
            window = ?window,
            total = entries.len(),
            "Registered route override"
        );
        Ok(())
    }

    /// Find the override for a request, if any.
    pub fn resolve(&self, path: &str, method: &str) -> Option<LimitValue> {
        let entries = self.entries.read();
        let found = entries
            .iter()
            .find(|entry| entry.matches(path, method))
            .map(|entry| entry.limit);

        if let Some(limit) = found {
            debug!(path = %path, method = %method, limit = %limit, "Route override matched");
        }
        found
    }

    /// Remove every override.
    pub fn reset(&self) {
        self.entries.write().clear();
    }

    /// Snapshot of the table in match order.
    pub fn entries(&self) -> Vec<RouteOverride> {
        self.entries.read().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const SECOND: Duration = Duration::from_secs(1);

    #[test]
    fn test_resolve_empty_table() {
        let table = RouteOverrideTable::new();
        assert!(table.resolve("/", "GET").is_none());
    }

    #[test]
    fn test_longest_pattern_wins_in_either_order() {
        let forwards = RouteOverrideTable::new();
        forwards.register("/matters", "POST", 2, SECOND).unwrap();
        forwards.register("/matters/.*", "POST", 3, SECOND).unwrap();

        let backwards = RouteOverrideTable::new();
        backwards.register("/matters/.*", "POST", 3, SECOND).unwrap();
        backwards.register("/matters", "POST", 2, SECOND).unwrap();

        for table in [&forwards, &backwards] {
            assert_eq!(
                table.resolve("/matters/5", "POST"),
                Some(LimitValue::new(3, SECOND))
            );
            assert_eq!(
                table.resolve("/matters", "POST"),
                Some(LimitValue::new(2, SECOND))
            );
        }
    }

    #[test]
    fn test_method_must_match_exactly() {
        let table = RouteOverrideTable::new();
        table.register("/matters", "POST", 2, SECOND).unwrap();

        assert!(table.resolve("/matters", "GET").is_none());
        assert!(table.resolve("/matters", "post").is_none());
    }

    #[test]
    fn test_pattern_is_a_search() {
        let table = RouteOverrideTable::new();
        table.register("/matters", "POST", 2, SECOND).unwrap();

        assert!(table.resolve("/api/matters/5", "POST").is_some());
        assert!(table.resolve("/doesntmatter", "POST").is_none());

        table.reset();
        table.register("^/matters$", "POST", 2, SECOND).unwrap();
        assert!(table.resolve("/api/matters", "POST").is_none());
        assert!(table.resolve("/matters", "POST").is_some());
    }

    #[test]
    fn test_equal_lengths_keep_registration_order() {
        let table = RouteOverrideTable::new();
        table.register("/a.", "GET", 1, SECOND).unwrap();
        table.register("/.b", "GET", 2, SECOND).unwrap();

        assert_eq!(table.resolve("/ab", "GET"), Some(LimitValue::new(1, SECOND)));
        let patterns: Vec<_> = table
            .entries()
            .iter()
            .map(|e| e.pattern.as_str().to_string())
            .collect();
        assert_eq!(patterns, vec!["/a.", "/.b"]);
    }

    #[test]
    fn test_invalid_pattern_is_reported() {
        let table = RouteOverrideTable::new();
        let err = table.register("/matters/(", "POST", 2, SECOND).unwrap_err();

        assert!(matches!(
            err,
            TollgateError::InvalidPattern { ref pattern, .. } if pattern == "/matters/("
        ));
        assert!(table.is_empty());
    }

    #[test]
    fn test_reset_clears_everything() {
        let table = RouteOverrideTable::new();
        table.register("/matters", "POST", 2, SECOND).unwrap();
        table.register(".*", "GET", 2, SECOND).unwrap();
        assert_eq!(table.len(), 2);

        table.reset();
        assert!(table.is_empty());
        for (path, method) in [("/matters", "POST"), ("/", "GET"), ("", "")] {
            assert!(table.resolve(path, method).is_none());
        }
    }

    #[test]
    fn test_concurrent_readers_see_sorted_tables() {
        let table = Arc::new(RouteOverrideTable::new());

        let writer = {
            let table = table.clone();
            std::thread::spawn(move || {
                for i in 0..200 {
                    let pattern = format!("/r{}", "x".repeat(i % 17));
                    table.register(&pattern, "GET", i as u64, SECOND).unwrap();
                }
            })
        };

        for _ in 0..200 {
            let lengths: Vec<_> = table
                .entries()
                .iter()
                .map(|e| e.pattern.as_str().len())
                .collect();
            assert!(lengths.windows(2).all(|w| w[0] >= w[1]));
        }

        writer.join().unwrap();
        assert_eq!(table.len(), 200);
    }
}

//! Configuration management for Tollgate.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, TollgateError};
use crate::ratelimit::{
    AdmissionController, FailMode, IdentityLookup, LimitValue, LimiterPolicy, LimiterRegistry,
    RateLimiter, RouteOverrideTable, DEFAULT_BACKEND_TIMEOUT, DEFAULT_CONTENT_TYPE,
    DEFAULT_MESSAGE, DEFAULT_STATUS_CODE,
};

/// Environment variable prefix for overrides, e.g. `TOLLGATE__BACKEND__TIMEOUT_MS`.
pub const ENV_PREFIX: &str = "TOLLGATE";

/// Main configuration for Tollgate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TollgateConfig {
    /// Limiter policy
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Per-route overrides
    #[serde(default)]
    pub overrides: Vec<OverrideConfig>,

    /// Counter backend behaviour
    #[serde(default)]
    pub backend: BackendConfig,
}

/// Time unit for rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Second,
    Minute,
    Hour,
    Day,
}

impl TimeUnit {
    /// Get the duration of this time unit.
    pub fn duration(&self) -> Duration {
        match self {
            TimeUnit::Second => Duration::from_secs(1),
            TimeUnit::Minute => Duration::from_secs(60),
            TimeUnit::Hour => Duration::from_secs(3600),
            TimeUnit::Day => Duration::from_secs(86400),
        }
    }
}

/// Limiter policy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Requests allowed per unit when no override matches
    #[serde(default = "default_requests_per_unit")]
    pub requests_per_unit: u64,

    #[serde(default = "default_unit")]
    pub unit: TimeUnit,

    /// Client address lookups, tried in order
    #[serde(default = "default_ip_lookups")]
    pub ip_lookups: Vec<String>,

    #[serde(default)]
    pub methods: Vec<String>,

    #[serde(default)]
    pub headers: Vec<String>,

    #[serde(default)]
    pub basic_auth_users: Vec<String>,

    #[serde(default = "default_message")]
    pub message: String,

    #[serde(default = "default_content_type")]
    pub content_type: String,

    #[serde(default = "default_status_code")]
    pub status_code: u16,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            requests_per_unit: default_requests_per_unit(),
            unit: default_unit(),
            ip_lookups: default_ip_lookups(),
            methods: Vec::new(),
            headers: Vec::new(),
            basic_auth_users: Vec::new(),
            message: default_message(),
            content_type: default_content_type(),
            status_code: default_status_code(),
        }
    }
}

fn default_requests_per_unit() -> u64 {
    1000
}

fn default_unit() -> TimeUnit {
    TimeUnit::Second
}

fn default_ip_lookups() -> Vec<String> {
    IdentityLookup::default_order()
        .iter()
        .map(|l| l.as_str().to_string())
        .collect()
}

fn default_message() -> String {
    DEFAULT_MESSAGE.to_string()
}

fn default_content_type() -> String {
    DEFAULT_CONTENT_TYPE.to_string()
}

fn default_status_code() -> u16 {
    DEFAULT_STATUS_CODE
}

/// A per-route override.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverrideConfig {
    /// Regular expression searched in the request path
    pub path: String,
    /// HTTP method, matched exactly
    pub method: String,
    pub requests_per_unit: u64,
    pub unit: TimeUnit,
}

/// Counter backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Bound on each counter call in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Behaviour when the counter fails or times out
    #[serde(default)]
    pub fail_mode: FailMode,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            fail_mode: FailMode::default(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    DEFAULT_BACKEND_TIMEOUT.as_millis() as u64
}

/// Everything needed to make admission decisions.
#[derive(Debug)]
pub struct Tollgate {
    pub limiter: RateLimiter,
    pub controller: AdmissionController,
}

impl TollgateConfig {
    /// Load configuration from a YAML file, with `TOLLGATE__*` environment
    /// variables layered on top.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        if !path.exists() {
            return Err(TollgateError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("config file not found: {}", path.display()),
            )));
        }

        config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Yaml))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| TollgateError::Config(e.to_string()))
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| TollgateError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Build the limiter policy this configuration describes.
    pub fn policy(&self) -> Result<LimiterPolicy> {
        let p = &self.policy;
        let ip_lookups = p
            .ip_lookups
            .iter()
            .map(|name| name.parse::<IdentityLookup>())
            .collect::<Result<Vec<_>>>()?;

        Ok(LimiterPolicy {
            default_limit: LimitValue::new(p.requests_per_unit, p.unit.duration()),
            ip_lookups,
            methods: p.methods.iter().cloned().collect::<BTreeSet<_>>(),
            headers: p.headers.clone(),
            basic_auth_users: p.basic_auth_users.iter().cloned().collect::<BTreeSet<_>>(),
            message: p.message.clone(),
            content_type: p.content_type.clone(),
            status_code: p.status_code,
        })
    }

    /// Build a limiter and controller with in-process counters.
    pub fn build(&self) -> Result<Tollgate> {
        self.build_with_registry(LimiterRegistry::new())
    }

    /// Build a limiter and controller around a caller-provided registry.
    ///
    /// The registry's timeout is replaced with the configured one.
    pub fn build_with_registry(&self, registry: LimiterRegistry) -> Result<Tollgate> {
        let policy = self.policy()?;

        let overrides = Arc::new(RouteOverrideTable::new());
        for o in &self.overrides {
            overrides.register(&o.path, &o.method, o.requests_per_unit, o.unit.duration())?;
        }

        let registry = registry.with_timeout(Duration::from_millis(self.backend.timeout_ms));
        info!(
            shape = ?policy.key_shape(),
            default_limit = %policy.default_limit,
            overrides = overrides.len(),
            fail_mode = ?self.backend.fail_mode,
            "Tollgate configured"
        );

        Ok(Tollgate {
            limiter: RateLimiter::with_registry(policy, registry),
            controller: AdmissionController::new(overrides).with_fail_mode(self.backend.fail_mode),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::KeyShape;

    #[test]
    fn test_defaults() {
        let config = TollgateConfig::from_yaml("{}").unwrap();
        let policy = config.policy().unwrap();

        assert_eq!(policy.default_limit, LimitValue::new(1000, Duration::from_secs(1)));
        assert_eq!(policy.ip_lookups, IdentityLookup::default_order());
        assert_eq!(policy.status_code, 429);
        assert_eq!(policy.message, "You have reached maximum request limit.");
        assert_eq!(config.backend.timeout_ms, 1000);
        assert_eq!(config.backend.fail_mode, FailMode::Closed);
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
policy:
  requests_per_unit: 10
  unit: minute
  ip_lookups: [X-Real-IP, RemoteAddr]
  methods: [GET, POST]
  headers: [X-Auth-Token]
  message: Slow down
  status_code: 503
overrides:
  - path: "/matters/.*"
    method: POST
    requests_per_unit: 2
    unit: second
backend:
  timeout_ms: 250
  fail_mode: open
"#;
        let config = TollgateConfig::from_yaml(yaml).unwrap();
        let policy = config.policy().unwrap();

        assert_eq!(policy.default_limit, LimitValue::new(10, Duration::from_secs(60)));
        assert_eq!(
            policy.ip_lookups,
            vec![IdentityLookup::XRealIp, IdentityLookup::RemoteAddr]
        );
        assert_eq!(policy.key_shape(), KeyShape::MethodHeaders);
        assert_eq!(policy.status_code, 503);
        assert_eq!(config.backend.fail_mode, FailMode::Open);

        let tollgate = config.build().unwrap();
        assert_eq!(tollgate.controller.fail_mode(), FailMode::Open);
        assert_eq!(tollgate.limiter.registry().timeout(), Duration::from_millis(250));
        assert_eq!(
            tollgate.controller.overrides().resolve("/matters/5", "POST"),
            Some(LimitValue::new(2, Duration::from_secs(1)))
        );
    }

    #[test]
    fn test_unknown_lookup_is_a_config_error() {
        let yaml = "policy:\n  ip_lookups: [RemoteAddr, X-Client-IP]\n";
        let config = TollgateConfig::from_yaml(yaml).unwrap();

        assert!(matches!(
            config.build(),
            Err(TollgateError::UnknownLookup(name)) if name == "X-Client-IP"
        ));
    }

    #[test]
    fn test_bad_override_pattern_fails_build() {
        let yaml = r#"
overrides:
  - path: "/matters/("
    method: POST
    requests_per_unit: 2
    unit: second
"#;
        let config = TollgateConfig::from_yaml(yaml).unwrap();
        assert!(matches!(
            config.build(),
            Err(TollgateError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_invalid_yaml() {
        assert!(matches!(
            TollgateConfig::from_yaml("policy: [unclosed"),
            Err(TollgateError::Config(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let path = std::env::temp_dir().join(format!("tollgate-{}.yaml", std::process::id()));
        std::fs::write(&path, "policy:\n  requests_per_unit: 7\n  unit: hour\n").unwrap();

        let config = TollgateConfig::from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.policy.requests_per_unit, 7);
        assert_eq!(config.policy.unit, TimeUnit::Hour);
    }

    #[test]
    fn test_from_missing_file() {
        assert!(matches!(
            TollgateConfig::from_file("/nonexistent/tollgate.yaml"),
            Err(TollgateError::Io(_))
        ));
    }

    #[test]
    fn test_time_unit_duration() {
        assert_eq!(TimeUnit::Second.duration(), Duration::from_secs(1));
        assert_eq!(TimeUnit::Minute.duration(), Duration::from_secs(60));
        assert_eq!(TimeUnit::Hour.duration(), Duration::from_secs(3600));
        assert_eq!(TimeUnit::Day.duration(), Duration::from_secs(86400));
    }
}

//! Engine configuration.
//!
//! Everything the checks compare against lives in [`EngineConfig`]: the
//! expected identity, the indicator lists, monitor timing and where the
//! host environment finds its files. It is loaded once at startup from a
//! JSON file or from `TAMPERSCOPE_*` variables and then shared read-only.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::env::HostConfig;
use crate::error::ConfigError;
use crate::indicators::IndicatorSet;

/// Capability whose value must be the organization wildcard by default.
pub const DEFAULT_WILDCARD_CAPABILITY: &str = "keychain-access-groups";

/// Environment variable prefix for [`EngineConfig::from_env`].
pub const ENV_PREFIX: &str = "TAMPERSCOPE_";

/// Expected signing identity of the application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityPolicy {
    /// Application identifier the binary must run as.
    pub expected_app_id: String,
    /// Signing organization (team) identifier.
    pub expected_org_id: String,
    /// Capability keys that must be present in the entitlements.
    #[serde(default)]
    pub required_capabilities: BTreeSet<String>,
    /// Capability whose value must be `"{expected_org_id}.*"`.
    #[serde(default = "default_wildcard_capability")]
    pub wildcard_capability_key: String,
}

fn default_wildcard_capability() -> String {
    DEFAULT_WILDCARD_CAPABILITY.to_string()
}

impl IdentityPolicy {
    /// Policy with no extra required capabilities.
    pub fn new(expected_app_id: impl Into<String>, expected_org_id: impl Into<String>) -> Self {
        Self {
            expected_app_id: expected_app_id.into(),
            expected_org_id: expected_org_id.into(),
            required_capabilities: BTreeSet::new(),
            wildcard_capability_key: default_wildcard_capability(),
        }
    }

    /// Add required capability keys.
    pub fn with_required_capabilities<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_capabilities
            .extend(keys.into_iter().map(Into::into));
        self
    }

    /// The exact value the wildcard capability must carry.
    pub fn expected_wildcard(&self) -> String {
        format!("{}.*", self.expected_org_id)
    }

    /// Reject empty identifiers.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.expected_app_id.trim().is_empty() {
            return Err(ConfigError::InvalidField {
                field: "policy.expected_app_id",
                reason: "must not be empty".into(),
            });
        }
        if self.expected_org_id.trim().is_empty() {
            return Err(ConfigError::InvalidField {
                field: "policy.expected_org_id",
                reason: "must not be empty".into(),
            });
        }
        if self.wildcard_capability_key.is_empty() {
            return Err(ConfigError::InvalidField {
                field: "policy.wildcard_capability_key",
                reason: "must not be empty".into(),
            });
        }
        Ok(())
    }
}

/// Timing of the continuous debugger monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Shortest pause between checks, in milliseconds.
    pub min_interval_ms: u64,
    /// Longest pause between checks, in milliseconds.
    pub max_interval_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 1_000,
            max_interval_ms: 5_000,
        }
    }
}

impl MonitorConfig {
    /// Bounds from durations.
    pub fn from_bounds(min: Duration, max: Duration) -> Self {
        Self {
            min_interval_ms: u64::try_from(min.as_millis()).unwrap_or(u64::MAX),
            max_interval_ms: u64::try_from(max.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Shortest pause.
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    /// Longest pause.
    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }

    /// Require `0 < min <= max`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_interval_ms == 0 {
            return Err(ConfigError::InvalidField {
                field: "monitor.min_interval_ms",
                reason: "must be positive".into(),
            });
        }
        if self.min_interval_ms > self.max_interval_ms {
            return Err(ConfigError::InvalidField {
                field: "monitor.max_interval_ms",
                reason: format!(
                    "{} is below min_interval_ms {}",
                    self.max_interval_ms, self.min_interval_ms
                ),
            });
        }
        Ok(())
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Expected identity.
    pub policy: IdentityPolicy,
    /// Indicator lists.
    #[serde(default)]
    pub indicators: IndicatorSet,
    /// Monitor timing.
    #[serde(default)]
    pub monitor: MonitorConfig,
    /// Host environment file locations.
    #[serde(default)]
    pub host: HostConfig,
}

impl EngineConfig {
    /// Default indicators, monitor and host settings around a policy.
    pub fn new(policy: IdentityPolicy) -> Self {
        Self {
            policy,
            indicators: IndicatorSet::default(),
            monitor: MonitorConfig::default(),
            host: HostConfig::default(),
        }
    }

    /// Parse and validate a JSON document.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Build from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any `TAMPERSCOPE_*` variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| lookup(&format!("{ENV_PREFIX}{suffix}"));
        let required = |suffix: &str, field: &'static str| {
            var(suffix).ok_or_else(|| ConfigError::InvalidField {
                field,
                reason: format!("{ENV_PREFIX}{suffix} is not set"),
            })
        };

        let mut policy = IdentityPolicy::new(
            required("APP_ID", "policy.expected_app_id")?,
            required("ORG_ID", "policy.expected_org_id")?,
        );
        if let Some(list) = var("REQUIRED_CAPABILITIES") {
            policy = policy.with_required_capabilities(
                list.split(',')
                    .map(str::trim)
                    .filter(|key| !key.is_empty()),
            );
        }

        let mut config = Self::new(policy);
        if let Some(path) = var("CONTAINER_PATH") {
            config.host.container_path = Some(PathBuf::from(path));
        }
        if let Some(path) = var("BUNDLE_METADATA_PATH") {
            config.host.bundle_metadata_path = Some(PathBuf::from(path));
        }
        if let Some(ms) = var("MONITOR_MIN_MS") {
            config.monitor.min_interval_ms = parse_millis(&ms, "monitor.min_interval_ms")?;
        }
        if let Some(ms) = var("MONITOR_MAX_MS") {
            config.monitor.max_interval_ms = parse_millis(&ms, "monitor.max_interval_ms")?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.policy.validate()?;
        self.monitor.validate()
    }
}

fn parse_millis(value: &str, field: &'static str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|e| ConfigError::InvalidField {
            field,
            reason: format!("{value:?}: {e}"),
        })
}

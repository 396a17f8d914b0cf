//! Serializable configuration for promotion runs.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{PromoteError, Result};

/// Tunables shared by every promotion an engine performs.
///
/// Can be loaded from YAML or JSON; missing keys take their defaults.
///
/// # Example YAML
///
/// ```yaml
/// registry_namespace: jx
/// chart_repo_prefix: dev
/// poll_interval_secs: 20
/// poll_timeout_secs: 3600
/// max_concurrent: 4
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PromoteConfig {
    /// Namespace the environment registry is queried in.
    pub registry_namespace: String,

    /// Prefix for new declarations (`<prefix>/<app>`).
    pub chart_repo_prefix: String,

    /// Chart repository written into new pinned-version dependencies.
    pub chart_repository_url: String,

    /// Prefix of the deterministic promotion branch.
    pub branch_prefix: String,

    /// Base branch used when neither the environment nor the clone names one.
    pub default_base_branch: String,

    /// Seconds between merge polls.
    pub poll_interval_secs: u64,

    /// Upper bound on the time spent waiting for a merge.
    pub poll_timeout_secs: u64,

    /// Maximum number of environments promoted concurrently.
    pub max_concurrent: usize,

    /// Label that asks the host's merge bot to merge the pull request.
    pub auto_merge_label: String,
}

impl Default for PromoteConfig {
    fn default() -> Self {
        Self {
            registry_namespace: "jx".into(),
            chart_repo_prefix: "dev".into(),
            chart_repository_url: "http://jenkins-x-chartmuseum:8080".into(),
            branch_prefix: "promote".into(),
            default_base_branch: "master".into(),
            poll_interval_secs: 20,
            poll_timeout_secs: 3600,
            max_concurrent: 4,
            auto_merge_label: "updatebot".into(),
        }
    }
}

impl PromoteConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load config from a YAML file.
    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            PromoteError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read config file: {}", e),
            ))
        })?;

        let config: Self = serde_yaml::from_str(&content).map_err(|e| {
            PromoteError::InvalidConfig(format!("Failed to parse YAML config: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from a JSON file.
    pub fn from_json(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            PromoteError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read config file: {}", e),
            ))
        })?;

        let config: Self = serde_json::from_str(&content).map_err(|e| {
            PromoteError::InvalidConfig(format!("Failed to parse JSON config: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_secs == 0 {
            return Err(PromoteError::InvalidConfig(
                "poll_interval_secs must be greater than zero".into(),
            ));
        }
        if self.max_concurrent == 0 {
            return Err(PromoteError::InvalidConfig(
                "max_concurrent must be greater than zero".into(),
            ));
        }
        if self.branch_prefix.trim().is_empty() {
            return Err(PromoteError::InvalidConfig(
                "branch_prefix must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Set the poll interval and timeout.
    pub fn with_polling(mut self, interval: Duration, timeout: Duration) -> Self {
        self.poll_interval_secs = interval.as_secs().max(1);
        self.poll_timeout_secs = timeout.as_secs();
        self
    }

    /// Set the registry namespace.
    pub fn with_registry_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.registry_namespace = namespace.into();
        self
    }

    /// Set the worker pool bound.
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Number of state reads the merge poller performs before giving up.
    pub fn max_poll_attempts(&self) -> u32 {
        let interval = self.poll_interval_secs.max(1);
        let attempts = self.poll_timeout_secs.div_ceil(interval).max(1);
        u32::try_from(attempts).unwrap_or(u32::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_yaml_takes_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("promote.yaml");
        std::fs::write(&path, "registry_namespace: cd\npoll_interval_secs: 5\n").unwrap();

        let config = PromoteConfig::from_yaml(&path).unwrap();
        assert_eq!(config.registry_namespace, "cd");
        assert_eq!(config.poll_interval_secs, 5);
        assert_eq!(config.chart_repo_prefix, "dev");
        assert_eq!(config.max_concurrent, 4);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("promote.json");
        std::fs::write(&path, r#"{"poll_interval_secs": 0}"#).unwrap();

        let err = PromoteConfig::from_json(&path).unwrap_err();
        assert!(matches!(err, PromoteError::InvalidConfig(_)));
    }

    #[test]
    fn test_max_poll_attempts_rounds_up() {
        let config = PromoteConfig {
            poll_interval_secs: 20,
            poll_timeout_secs: 50,
            ..Default::default()
        };
        assert_eq!(config.max_poll_attempts(), 3);

        let config = PromoteConfig {
            poll_timeout_secs: 0,
            ..Default::default()
        };
        assert_eq!(config.max_poll_attempts(), 1);
    }
}

//! Configuration for taskflow graphs
//!
//! Values come from defaults, an optional YAML file and `TASKFLOW_*`
//! environment variables, in that order.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use tracing::{info, warn};

use crate::application::background_sync::{FailurePolicy, RetryPolicy, SyncConfig, SyncMode};
use crate::domain::layout::LayoutConfig;
use crate::CoreError;

/// Which persistence backend to replicate to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceBackend {
    /// Process-local store, nothing leaves the process
    #[default]
    InMemory,
    /// Remote REST API
    Http,
}

/// Persistence settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Backend selection
    #[serde(default)]
    pub backend: PersistenceBackend,

    /// Base URL of the REST API, required for `http`
    #[serde(default)]
    pub base_url: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Bearer token sent with every request
    #[serde(default)]
    pub api_token: Option<String>,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            backend: PersistenceBackend::default(),
            base_url: None,
            timeout_secs: default_timeout_secs(),
            api_token: None,
        }
    }
}

/// Top level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskflowConfig {
    /// Layout gaps
    #[serde(default)]
    pub layout: LayoutConfig,

    /// Background sync behaviour
    #[serde(default)]
    pub sync: SyncConfig,

    /// Persistence backend
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TaskflowConfig {
    fn default() -> Self {
        Self {
            layout: LayoutConfig::default(),
            sync: SyncConfig::default(),
            persistence: PersistenceConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl TaskflowConfig {
    /// Load configuration from defaults and environment variables
    pub fn load() -> Result<Self, CoreError> {
        let mut config = Self::default();
        config.apply_env(|key| env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file, then apply environment overrides
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml(&content)?;
        config.apply_env(|key| env::var(key).ok());
        config.validate()?;

        info!(path = %path.display(), "Loaded taskflow configuration");
        Ok(config)
    }

    /// Parse a YAML document without environment overrides
    pub fn from_yaml(content: &str) -> Result<Self, CoreError> {
        let config: Self = serde_yaml::from_str(content)?;
        Ok(config)
    }

    /// Apply `TASKFLOW_*` overrides read through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(gap) = lookup("TASKFLOW_HORIZONTAL_GAP") {
            match gap.parse::<f64>() {
                Ok(gap) => self.layout.horizontal_gap = gap,
                Err(_) => warn!("Invalid TASKFLOW_HORIZONTAL_GAP value: {}", gap),
            }
        }

        if let Some(gap) = lookup("TASKFLOW_VERTICAL_GAP") {
            match gap.parse::<f64>() {
                Ok(gap) => self.layout.vertical_gap = gap,
                Err(_) => warn!("Invalid TASKFLOW_VERTICAL_GAP value: {}", gap),
            }
        }

        if let Some(depth) = lookup("TASKFLOW_MAX_DEPTH") {
            match depth.parse::<usize>() {
                Ok(depth) => self.layout.max_depth = depth,
                Err(_) => warn!("Invalid TASKFLOW_MAX_DEPTH value: {}", depth),
            }
        }

        if let Some(mode) = lookup("TASKFLOW_SYNC_MODE") {
            match mode.to_lowercase().as_str() {
                "concurrent" => self.sync.mode = SyncMode::Concurrent,
                "ordered" => self.sync.mode = SyncMode::Ordered,
                _ => warn!("Invalid TASKFLOW_SYNC_MODE value: {}", mode),
            }
        }

        if let Some(retries) = lookup("TASKFLOW_SYNC_MAX_RETRIES") {
            match retries.parse::<u32>() {
                Ok(0) => self.sync.failure_policy = FailurePolicy::BestEffort,
                Ok(max_retries) => {
                    let mut policy = match &self.sync.failure_policy {
                        FailurePolicy::Retry(policy) => policy.clone(),
                        FailurePolicy::BestEffort => RetryPolicy::default(),
                    };
                    policy.max_retries = max_retries;
                    self.sync.failure_policy = FailurePolicy::Retry(policy);
                }
                Err(_) => warn!("Invalid TASKFLOW_SYNC_MAX_RETRIES value: {}", retries),
            }
        }

        if let Some(capacity) = lookup("TASKFLOW_DEAD_LETTER_CAPACITY") {
            match capacity.parse::<usize>() {
                Ok(capacity) => self.sync.dead_letter_capacity = capacity,
                Err(_) => warn!("Invalid TASKFLOW_DEAD_LETTER_CAPACITY value: {}", capacity),
            }
        }

        if let Some(backend) = lookup("TASKFLOW_PERSISTENCE") {
            match backend.to_lowercase().as_str() {
                "memory" | "in_memory" => self.persistence.backend = PersistenceBackend::InMemory,
                "http" => self.persistence.backend = PersistenceBackend::Http,
                _ => warn!("Invalid TASKFLOW_PERSISTENCE value: {}", backend),
            }
        }

        if let Some(base_url) = lookup("TASKFLOW_API_URL") {
            self.persistence.base_url = Some(base_url);
        }

        if let Some(timeout) = lookup("TASKFLOW_API_TIMEOUT_SECS") {
            match timeout.parse::<u64>() {
                Ok(timeout) => self.persistence.timeout_secs = timeout,
                Err(_) => warn!("Invalid TASKFLOW_API_TIMEOUT_SECS value: {}", timeout),
            }
        }

        if let Some(token) = lookup("TASKFLOW_API_TOKEN") {
            self.persistence.api_token = Some(token);
        }

        if let Some(log_level) = lookup("TASKFLOW_LOG_LEVEL") {
            self.log_level = log_level;
        }
    }

    /// Reject values the layout and persistence layers cannot work with
    pub fn validate(&self) -> Result<(), CoreError> {
        let layout = &self.layout;
        if !layout.horizontal_gap.is_finite() || layout.horizontal_gap <= 0.0 {
            return Err(CoreError::ConfigurationError(format!(
                "horizontal_gap must be a positive number, got {}",
                layout.horizontal_gap
            )));
        }
        if !layout.vertical_gap.is_finite() || layout.vertical_gap <= 0.0 {
            return Err(CoreError::ConfigurationError(format!(
                "vertical_gap must be a positive number, got {}",
                layout.vertical_gap
            )));
        }
        if layout.max_depth == 0 {
            return Err(CoreError::ConfigurationError(
                "max_depth must be at least 1".to_string(),
            ));
        }

        if self.persistence.backend == PersistenceBackend::Http
            && self.persistence.base_url.is_none()
        {
            return Err(CoreError::ConfigurationError(
                "http persistence requires base_url".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = TaskflowConfig::default();
        assert_eq!(config.layout.horizontal_gap, 400.0);
        assert_eq!(config.layout.vertical_gap, 200.0);
        assert_eq!(config.sync.mode, SyncMode::Concurrent);
        assert_eq!(config.sync.failure_policy, FailurePolicy::BestEffort);
        assert_eq!(config.persistence.backend, PersistenceBackend::InMemory);
        assert_eq!(config.log_level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = TaskflowConfig::from_yaml(
            "layout:\n  vertical_gap: 150\npersistence:\n  backend: http\n  base_url: http://localhost:3000\n",
        )
        .unwrap();

        assert_eq!(config.layout.horizontal_gap, 400.0);
        assert_eq!(config.layout.vertical_gap, 150.0);
        assert_eq!(config.persistence.backend, PersistenceBackend::Http);
        assert_eq!(config.persistence.timeout_secs, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = TaskflowConfig::default();
        config.apply_env(lookup(&[
            ("TASKFLOW_HORIZONTAL_GAP", "320"),
            ("TASKFLOW_SYNC_MODE", "Ordered"),
            ("TASKFLOW_SYNC_MAX_RETRIES", "5"),
            ("TASKFLOW_API_TOKEN", "secret"),
            ("TASKFLOW_LOG_LEVEL", "debug"),
        ]));

        assert_eq!(config.layout.horizontal_gap, 320.0);
        assert_eq!(config.sync.mode, SyncMode::Ordered);
        match &config.sync.failure_policy {
            FailurePolicy::Retry(policy) => assert_eq!(policy.max_retries, 5),
            other => panic!("expected retry policy, got {:?}", other),
        }
        assert_eq!(config.persistence.api_token.as_deref(), Some("secret"));
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_invalid_env_values_are_ignored() {
        let mut config = TaskflowConfig::default();
        config.apply_env(lookup(&[
            ("TASKFLOW_VERTICAL_GAP", "wide"),
            ("TASKFLOW_SYNC_MODE", "sometimes"),
        ]));

        assert_eq!(config, TaskflowConfig::default());
    }

    #[test]
    fn test_validation_rejects_bad_gaps_and_missing_url() {
        let mut config = TaskflowConfig::default();
        config.layout.vertical_gap = 0.0;
        assert!(matches!(
            config.validate(),
            Err(CoreError::ConfigurationError(_))
        ));

        let mut config = TaskflowConfig::default();
        config.persistence.backend = PersistenceBackend::Http;
        assert!(matches!(
            config.validate(),
            Err(CoreError::ConfigurationError(_))
        ));
    }
}

//! Configuration types for Waypost.
//!
//! Configuration is loaded from a single YAML file (usually `waypost.yaml`)
//! into a [`WaypostConfig`]. Every section is optional and falls back to
//! its defaults.
//!
//! ```yaml
//! audit:
//!   enabled: true
//!   storage:
//!     backend: file
//!     directory: /var/lib/waypost
//! activities:
//!   start_to_close_timeout_ms: 5000
//! logging:
//!   filter: "info,waypost_runtime=debug"
//! ```

pub mod audit;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

pub use audit::{AuditConfig, StorageBackend, StorageConfig};

/// Complete Waypost configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WaypostConfig {
    /// Audit trail storage.
    #[serde(default)]
    pub audit: AuditConfig,

    /// Activity execution settings for the local engine.
    #[serde(default)]
    pub activities: ActivityConfig,

    /// Log output settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Activity execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityConfig {
    /// Upper bound for a single activity invocation, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub start_to_close_timeout_ms: u64,
}

impl ActivityConfig {
    pub fn start_to_close_timeout(&self) -> Duration {
        Duration::from_millis(self.start_to_close_timeout_ms)
    }
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            start_to_close_timeout_ms: default_timeout_ms(),
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing_subscriber` env-filter directive, overridden by `RUST_LOG`.
    #[serde(default = "default_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_filter() -> String {
    "info".to_string()
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl WaypostConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML content.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` when given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.activities.start_to_close_timeout_ms == 0 {
            return Err(ConfigError::Config(
                "activities.start_to_close_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.audit.storage.journal_file.trim().is_empty() {
            return Err(ConfigError::Config(
                "audit.storage.journal_file must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = WaypostConfig::default();
        assert!(config.audit.enabled);
        assert_eq!(config.audit.storage.backend, StorageBackend::Memory);
        assert_eq!(
            config.activities.start_to_close_timeout(),
            Duration::from_secs(10)
        );
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let config = WaypostConfig::from_yaml("{}").unwrap();
        assert!(config.audit.enabled);
        assert_eq!(config.activities.start_to_close_timeout_ms, 10_000);
    }

    #[test]
    fn test_parse_file_backend() {
        let yaml = r#"
audit:
  storage:
    backend: file
    directory: /tmp/waypost
activities:
  start_to_close_timeout_ms: 250
logging:
  filter: debug
"#;
        let config = WaypostConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.audit.storage.backend, StorageBackend::File);
        assert_eq!(
            config.audit.storage.journal_path(),
            Path::new("/tmp/waypost/processes.log")
        );
        assert_eq!(config.activities.start_to_close_timeout_ms, 250);
        assert_eq!(config.logging.filter, "debug");
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let yaml = "activities:\n  start_to_close_timeout_ms: 0\n";
        let err = WaypostConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::Config(_)));
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let yaml = "audit:\n  storage:\n    backend: postgres\n";
        assert!(matches!(
            WaypostConfig::from_yaml(yaml),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "audit:\n  enabled: false").unwrap();

        let config = WaypostConfig::load_or_default(Some(file.path())).unwrap();
        assert!(!config.audit.enabled);

        let config = WaypostConfig::load_or_default(None).unwrap();
        assert!(config.audit.enabled);
    }
}

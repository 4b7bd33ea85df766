//! Process configuration loading: YAML file with environment variable
//! interpolation and layered defaults, in the same shape as the rest of
//! this crate's ambient stack.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::reconciliation::ReconciliationConfig;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        /// Path to the config file.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },
    /// Failed to parse YAML configuration.
    #[error("failed to parse config YAML: {0}")]
    ParseError(#[from] serde_yaml_bw::Error),
    /// Configuration validation failed.
    #[error("config validation failed: {0}")]
    ValidationError(String),
    /// Missing required environment variable.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
}

/// Root configuration for the reconciliation process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Reconciliation cycle tuning.
    #[serde(default)]
    pub reconciliation: ReconciliationConfig,
    /// Address the Prometheus exporter listens on.
    #[serde(default = "default_metrics_listen_addr")]
    pub metrics_listen_addr: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            reconciliation: ReconciliationConfig::default(),
            metrics_listen_addr: default_metrics_listen_addr(),
        }
    }
}

fn default_metrics_listen_addr() -> String {
    "0.0.0.0:9090".to_string()
}

/// Load configuration from a YAML file with environment variable
/// interpolation. Defaults to `config.yaml` when `path` is `None`.
///
/// # Errors
///
/// Returns a `ConfigError` if the file cannot be read, parsed, or validated.
pub fn load_config(path: Option<&str>) -> Result<AppConfig, ConfigError> {
    let path = path.unwrap_or("config.yaml");
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_string(),
        source: e,
    })?;
    load_config_from_string(&contents)
}

/// Load configuration from a YAML string (useful for testing).
///
/// # Errors
///
/// Returns a `ConfigError` if the YAML cannot be parsed or validated.
pub fn load_config_from_string(yaml: &str) -> Result<AppConfig, ConfigError> {
    let interpolated = interpolate_env_vars(yaml);
    let config: AppConfig = serde_yaml_bw::from_str(&interpolated)?;
    validate_config(&config)?;
    Ok(config)
}

/// Interpolate environment variables in a string.
///
/// Supports both `${VAR}` and `${VAR:-default}` syntax.
#[allow(clippy::expect_used)]
fn interpolate_env_vars(input: &str) -> String {
    use std::sync::OnceLock;

    static ENV_VAR_REGEX: OnceLock<regex::Regex> = OnceLock::new();

    let mut result = input.to_string();
    let re = ENV_VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("env var regex is valid")
    });

    for cap in re.captures_iter(input) {
        let Some(full_match) = cap.get(0) else {
            continue;
        };
        let Some(var_match) = cap.get(1) else {
            continue;
        };
        let full_match = full_match.as_str();
        let var_name = var_match.as_str();
        let default_value = cap.get(2).map(|m| m.as_str());

        let value = match std::env::var(var_name) {
            Ok(v) if !v.is_empty() => v,
            _ => default_value.map_or_else(String::new, str::to_string),
        };

        result = result.replace(full_match, &value);
    }

    result
}

fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.reconciliation.poll_interval_seconds == 0 {
        return Err(ConfigError::ValidationError(
            "reconciliation.poll_interval_seconds must be positive".to_string(),
        ));
    }
    if config.reconciliation.timeout_seconds <= 0.0 {
        return Err(ConfigError::ValidationError(
            "reconciliation.timeout_seconds must be positive".to_string(),
        ));
    }
    if config.metrics_listen_addr.parse::<std::net::SocketAddr>().is_err() {
        return Err(ConfigError::ValidationError(format!(
            "metrics_listen_addr '{}' is not a valid socket address",
            config.metrics_listen_addr
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.reconciliation.poll_interval_seconds, 300);
        assert_eq!(config.metrics_listen_addr, "0.0.0.0:9090");
    }

    #[test]
    fn test_load_minimal_config() {
        let yaml = "reconciliation:\n  poll_interval_seconds: 60\n";
        let config = load_config_from_string(yaml).expect("should load minimal config");
        assert_eq!(config.reconciliation.poll_interval_seconds, 60);
        assert_eq!(config.reconciliation.timeout_seconds, 300.0);
    }

    #[test]
    fn test_env_var_with_default_when_missing() {
        let input = "mode: ${CREAM_CONFIG_TEST_NONEXISTENT_VAR:-PAPER}";
        let result = interpolate_env_vars(input);
        assert_eq!(result, "mode: PAPER");
    }

    #[test]
    fn test_env_var_without_default_becomes_empty() {
        let input = "api_key: ${CREAM_CONFIG_TEST_UNLIKELY_TO_EXIST}";
        let result = interpolate_env_vars(input);
        assert_eq!(result, "api_key: ");
    }

    #[test]
    fn test_validation_rejects_zero_poll_interval() {
        let yaml = "reconciliation:\n  poll_interval_seconds: 0\n";
        let result = load_config_from_string(yaml);
        let Err(err) = result else {
            panic!("expected error for zero poll interval");
        };
        assert!(err.to_string().contains("poll_interval_seconds"));
    }

    #[test]
    fn test_validation_rejects_bad_metrics_addr() {
        let yaml = "metrics_listen_addr: not-an-address\n";
        let result = load_config_from_string(yaml);
        let Err(err) = result else {
            panic!("expected error for invalid metrics address");
        };
        assert!(err.to_string().contains("metrics_listen_addr"));
    }
}

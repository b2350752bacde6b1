//! Configuration for the Flower exporter.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use flower_exporter_common::LoggingConfig;

use crate::normalize::Variant;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] flower_exporter_common::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete exporter configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// Upstream Flower polling settings.
    #[serde(default)]
    pub flower: FlowerConfig,

    /// Prometheus exporter settings.
    #[serde(default)]
    pub prometheus: PrometheusConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// What happens to a target's series once it becomes unreachable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnreachablePolicy {
    /// Leave the series at their last reported values.
    #[default]
    Keep,
    /// Set every series of the target to zero.
    Zero,
}

/// Flower polling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowerConfig {
    /// Flower base URLs, one poller each.
    #[serde(default = "default_targets")]
    pub targets: Vec<String>,

    /// Payload shape to poll and normalize.
    #[serde(default)]
    pub variant: Variant,

    /// Delay between two polls of the same target (milliseconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Upper bound for a whole upstream request (milliseconds).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Upper bound for establishing the upstream connection (milliseconds).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Series handling when a target becomes unreachable.
    #[serde(default)]
    pub on_unreachable: UnreachablePolicy,

    /// Exit the process once every target has stopped.
    #[serde(default)]
    pub exit_when_all_stopped: bool,
}

fn default_targets() -> Vec<String> {
    vec!["http://127.0.0.1:5555".to_string()]
}

fn default_poll_interval() -> u64 {
    1_000
}

fn default_request_timeout() -> u64 {
    5_000
}

fn default_connect_timeout() -> u64 {
    2_000
}

impl Default for FlowerConfig {
    fn default() -> Self {
        Self {
            targets: default_targets(),
            variant: Variant::default(),
            poll_interval_ms: default_poll_interval(),
            request_timeout_ms: default_request_timeout(),
            connect_timeout_ms: default_connect_timeout(),
            on_unreachable: UnreachablePolicy::default(),
            exit_when_all_stopped: false,
        }
    }
}

impl FlowerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Targets with trailing slashes removed and duplicates dropped.
    pub fn normalized_targets(&self) -> Vec<String> {
        let mut targets: Vec<String> = Vec::with_capacity(self.targets.len());
        for target in &self.targets {
            let target = target.trim().trim_end_matches('/').to_string();
            if !targets.contains(&target) {
                targets.push(target);
            }
        }
        targets
    }
}

/// Prometheus HTTP endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrometheusConfig {
    /// Address to listen on (default: "0.0.0.0:8888").
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Path for metrics endpoint (default: "/metrics").
    #[serde(default = "default_path")]
    pub path: String,
}

fn default_listen() -> String {
    "0.0.0.0:8888".to_string()
}

fn default_path() -> String {
    "/metrics".to_string()
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            path: default_path(),
        }
    }
}

impl ExporterConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: ExporterConfig = flower_exporter_common::load_config(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: ExporterConfig = flower_exporter_common::parse_config(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.flower.targets.is_empty() {
            return Err(ConfigError::Validation(
                "at least one Flower target is required".to_string(),
            ));
        }

        for target in &self.flower.targets {
            let url = reqwest::Url::parse(target.trim()).map_err(|e| {
                ConfigError::Validation(format!("Invalid target URL '{}': {}", target, e))
            })?;
            if url.scheme() != "http" && url.scheme() != "https" {
                return Err(ConfigError::Validation(format!(
                    "Invalid target URL '{}': scheme must be http or https",
                    target
                )));
            }
        }

        if self.flower.poll_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "poll_interval_ms must be > 0".to_string(),
            ));
        }

        if self.flower.request_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "request_timeout_ms must be > 0".to_string(),
            ));
        }

        if self.flower.connect_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "connect_timeout_ms must be > 0".to_string(),
            ));
        }

        // A connect phase cut short by the request timeout reads as a transient timeout.
        if self.flower.connect_timeout_ms > self.flower.request_timeout_ms {
            return Err(ConfigError::Validation(format!(
                "connect_timeout_ms ({}) must not exceed request_timeout_ms ({})",
                self.flower.connect_timeout_ms, self.flower.request_timeout_ms
            )));
        }

        if self
            .prometheus
            .listen
            .parse::<std::net::SocketAddr>()
            .is_err()
        {
            return Err(ConfigError::Validation(format!(
                "Invalid listen address: {}",
                self.prometheus.listen
            )));
        }

        if !self.prometheus.path.starts_with('/') {
            return Err(ConfigError::Validation(
                "Metrics path must start with /".to_string(),
            ));
        }

        self.logging.validate()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_minimal_config() {
        let config = ExporterConfig::parse("{}").unwrap();

        assert_eq!(config.flower.targets, vec!["http://127.0.0.1:5555"]);
        assert_eq!(config.flower.variant, Variant::QueueLength);
        assert_eq!(config.flower.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.flower.on_unreachable, UnreachablePolicy::Keep);
        assert!(!config.flower.exit_when_all_stopped);
        assert_eq!(config.prometheus.listen, "0.0.0.0:8888");
        assert_eq!(config.prometheus.path, "/metrics");
    }

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            flower: {
                targets: ["http://flower-a:5555", "https://flower-b.internal/"],
                variant: "queue_state",
                poll_interval_ms: 2500,
                request_timeout_ms: 800,
                connect_timeout_ms: 300,
                on_unreachable: "zero",
                exit_when_all_stopped: true,
            },
            prometheus: {
                listen: "127.0.0.1:9808",
                path: "/flower/metrics",
            },
            logging: {
                level: "debug",
                format: "json"
            }
        }"#;

        let config = ExporterConfig::parse(json).unwrap();

        assert_eq!(config.flower.targets.len(), 2);
        assert_eq!(config.flower.variant, Variant::QueueState);
        assert_eq!(config.flower.poll_interval(), Duration::from_millis(2500));
        assert_eq!(config.flower.request_timeout(), Duration::from_millis(800));
        assert_eq!(config.flower.connect_timeout(), Duration::from_millis(300));
        assert_eq!(config.flower.on_unreachable, UnreachablePolicy::Zero);
        assert!(config.flower.exit_when_all_stopped);
        assert_eq!(config.prometheus.listen, "127.0.0.1:9808");
        assert_eq!(config.prometheus.path, "/flower/metrics");
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_normalized_targets() {
        let config = FlowerConfig {
            targets: vec![
                "http://flower:5555/".to_string(),
                "http://flower:5555".to_string(),
                " http://other:5555 ".to_string(),
            ],
            ..Default::default()
        };

        assert_eq!(
            config.normalized_targets(),
            vec!["http://flower:5555", "http://other:5555"]
        );
    }

    #[test]
    fn test_validate_empty_targets() {
        let result = ExporterConfig::parse("{ flower: { targets: [] } }");
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("at least one Flower target")
        );
    }

    #[test]
    fn test_validate_invalid_target() {
        let result = ExporterConfig::parse(r#"{ flower: { targets: ["not a url"] } }"#);
        assert!(result.unwrap_err().to_string().contains("Invalid target URL"));

        let result = ExporterConfig::parse(r#"{ flower: { targets: ["ftp://flower:21"] } }"#);
        assert!(result.unwrap_err().to_string().contains("http or https"));
    }

    #[test]
    fn test_validate_invalid_listen() {
        let result = ExporterConfig::parse(r#"{ prometheus: { listen: "not-an-address" } }"#);
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Invalid listen address")
        );
    }

    #[test]
    fn test_validate_invalid_path() {
        let result = ExporterConfig::parse(r#"{ prometheus: { path: "metrics" } }"#);
        assert!(result.unwrap_err().to_string().contains("must start with /"));
    }

    #[test]
    fn test_validate_zero_interval() {
        let result = ExporterConfig::parse("{ flower: { poll_interval_ms: 0 } }");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_connect_timeout_within_request_timeout() {
        let result = ExporterConfig::parse(
            "{ flower: { request_timeout_ms: 1000, connect_timeout_ms: 3000 } }",
        );
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("must not exceed request_timeout_ms"));

        let config = ExporterConfig::parse(
            "{ flower: { request_timeout_ms: 1000, connect_timeout_ms: 1000 } }",
        )
        .unwrap();
        assert_eq!(config.flower.connect_timeout(), config.flower.request_timeout());
    }

    #[test]
    fn test_validate_log_level() {
        let result = ExporterConfig::parse(r#"{ logging: { level: "chatty" } }"#);
        assert!(matches!(result, Err(ConfigError::Load(_))));
    }

    #[test]
    fn test_unknown_variant_rejected() {
        let result = ExporterConfig::parse(r#"{ flower: { variant: "auto" } }"#);
        assert!(matches!(result, Err(ConfigError::Load(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{ flower: {{ targets: ["http://flower:5555"], variant: "worker_totals" }} }}"#
        )
        .unwrap();

        let config = ExporterConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.flower.variant, Variant::WorkerTotals);
    }
}

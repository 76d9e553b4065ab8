//! Configuration file management.
//!
//! Settings can come from three places, merged with clear precedence:
//!
//! 1. Built-in defaults (lowest priority)
//! 2. A TOML configuration file (`certcheck.toml` or `--config <path>`)
//! 3. Command-line arguments (highest priority)
//!
//! Every field is optional so partial configurations merge cleanly; a file
//! that only sets `threshold` leaves everything else alone.
//!
//! # Example Configuration File
//!
//! ```toml
//! hosts = ["example.com", "example.com:8443"]
//! output = "table"
//! exit_code = 1
//! threshold = 30
//!
//! [prometheus]
//! enabled = true
//! address = "http://localhost:9091"
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Main configuration structure.
///
/// All fields are optional to support partial configuration and merging.
/// Missing values fall back to defaults or are overridden by CLI arguments.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// Target specs to check (`host`, `host:port`, or URL form)
    pub hosts: Option<Vec<String>>,
    /// Output format: table, json
    pub output: Option<String>,
    /// Exit code to use when any target is not valid
    pub exit_code: Option<i32>,
    /// Warning threshold in days before expiry
    pub threshold: Option<i64>,
    /// Per-target connection timeout in seconds
    pub timeout: Option<u64>,
    /// Deadline for the whole run in seconds
    pub global_timeout: Option<u64>,
    /// Number of targets checked concurrently
    pub concurrency: Option<usize>,
    /// Prometheus configuration
    pub prometheus: Option<PrometheusConfig>,
}

/// Prometheus Push Gateway settings.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PrometheusConfig {
    /// Enable prometheus metrics pushing
    pub enabled: Option<bool>,
    /// Push gateway address (e.g., "http://localhost:9091")
    pub address: Option<String>,
}

impl Default for Config {
    /// Defaults: table output, exit code 1 on failure, 30-day warning
    /// threshold, 30s per-target timeout, 300s run deadline, 4 workers,
    /// metrics disabled.
    fn default() -> Self {
        Config {
            hosts: None,
            output: Some("table".to_string()),
            exit_code: Some(1),
            threshold: Some(30),
            timeout: Some(30),
            global_timeout: Some(300),
            concurrency: Some(4),
            prometheus: Some(PrometheusConfig {
                enabled: Some(false),
                address: Some("http://localhost:9091".to_string()),
            }),
        }
    }
}

impl Config {
    /// Loads configuration from a TOML file.
    ///
    /// Returns `ConfigError::Io` if the file cannot be read and
    /// `ConfigError::Parse` if it is not valid TOML.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io(e.to_string()))?;

        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;

        Ok(config)
    }

    /// Merges this configuration with another, prioritizing the other's
    /// values. Fields that are `None` in `other` keep their current value.
    pub fn merge_with(mut self, other: Config) -> Self {
        if other.hosts.is_some() {
            self.hosts = other.hosts;
        }
        if other.output.is_some() {
            self.output = other.output;
        }
        if other.exit_code.is_some() {
            self.exit_code = other.exit_code;
        }
        if other.threshold.is_some() {
            self.threshold = other.threshold;
        }
        if other.timeout.is_some() {
            self.timeout = other.timeout;
        }
        if other.global_timeout.is_some() {
            self.global_timeout = other.global_timeout;
        }
        if other.concurrency.is_some() {
            self.concurrency = other.concurrency;
        }
        if let Some(other_prom) = other.prometheus {
            if let Some(ref mut self_prom) = self.prometheus {
                if other_prom.enabled.is_some() {
                    self_prom.enabled = other_prom.enabled;
                }
                if other_prom.address.is_some() {
                    self_prom.address = other_prom.address;
                }
            } else {
                self.prometheus = Some(other_prom);
            }
        }
        self
    }

    /// Builds a partial `Config` from command-line arguments for merging.
    /// Only arguments the user actually passed (`Some`) override the file
    /// and default layers.
    #[allow(clippy::too_many_arguments)]
    pub fn from_cli_args(
        hosts: Option<Vec<String>>,
        output: Option<String>,
        exit_code: Option<i32>,
        threshold: Option<i64>,
        timeout: Option<u64>,
        global_timeout: Option<u64>,
        concurrency: Option<usize>,
        prometheus: Option<bool>,
        prometheus_address: Option<String>,
    ) -> Self {
        Config {
            hosts,
            output,
            exit_code,
            threshold,
            timeout,
            global_timeout,
            concurrency,
            prometheus: Some(PrometheusConfig {
                enabled: prometheus,
                address: prometheus_address,
            }),
        }
    }

    /// Generates an example configuration file in TOML format, useful for
    /// bootstrapping a new deployment.
    pub fn example_toml() -> String {
        let example = Config {
            hosts: Some(vec![
                "example.com".to_string(),
                "example.com:8443".to_string(),
                "https://secure.example.com:9443".to_string(),
                "expired.badssl.com".to_string(),
            ]),
            output: Some("table".to_string()),
            exit_code: Some(1),
            threshold: Some(30),
            timeout: Some(30),
            global_timeout: Some(300),
            concurrency: Some(4),
            prometheus: Some(PrometheusConfig {
                enabled: Some(true),
                address: Some("http://localhost:9091".to_string()),
            }),
        };

        toml::to_string_pretty(&example)
            .unwrap_or_else(|_| "# Error generating example".to_string())
    }
}

/// Errors that can occur during configuration loading and parsing.
#[derive(Debug)]
pub enum ConfigError {
    /// I/O error (file not found, permission denied, etc.)
    Io(String),
    /// TOML parsing error (invalid syntax, type mismatch, etc.)
    Parse(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(msg) => write!(f, "IO Error: {}", msg),
            ConfigError::Parse(msg) => write!(f, "Parse Error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

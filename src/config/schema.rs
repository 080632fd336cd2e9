//! Configuration schema definitions.
//!
//! Every section has serde defaults, so a settings file only needs the keys
//! it changes. The operator-facing part is `[connection]`
//! (`selected_port`, `auto_connect`).

use super::error::{ConfigError, ConfigResult};
use crate::port::BENCH_BAUD_RATE;
use crate::report::VerdictRule;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Upper bound for each timing value, one hour.
pub const MAX_TIMING_MS: u64 = 60 * 60 * 1000;

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub connection: ConnectionConfig,
    pub timing: TimingConfig,
    pub reports: ReportsConfig,
    pub logging: LoggingConfig,
}

impl Config {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.connection.baud_rate == 0 {
            return Err(ConfigError::invalid(
                "connection.baud_rate",
                "must be greater than zero",
            ));
        }
        if self.connection.read_timeout_ms == 0 {
            return Err(ConfigError::invalid(
                "connection.read_timeout_ms",
                "must be greater than zero",
            ));
        }
        if self.timing.response_timeout_ms == 0 {
            return Err(ConfigError::invalid(
                "timing.response_timeout_ms",
                "must be greater than zero",
            ));
        }
        if self.timing.grace_interval_ms > MAX_TIMING_MS {
            return Err(ConfigError::invalid(
                "timing.grace_interval_ms",
                format!("must not exceed {MAX_TIMING_MS}"),
            ));
        }
        if self.timing.response_timeout_ms > MAX_TIMING_MS {
            return Err(ConfigError::invalid(
                "timing.response_timeout_ms",
                format!("must not exceed {MAX_TIMING_MS}"),
            ));
        }
        if self.reports.directory.as_os_str().is_empty() {
            return Err(ConfigError::invalid("reports.directory", "must not be empty"));
        }
        Ok(())
    }
}

/// Serial link and operator preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Port chosen in the port picker; empty when none was chosen yet
    pub selected_port: String,
    /// Connect to `selected_port` at startup and on selection
    pub auto_connect: bool,
    pub baud_rate: u32,
    pub read_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            selected_port: String::new(),
            auto_connect: false,
            baud_rate: BENCH_BAUD_RATE,
            read_timeout_ms: 1000,
        }
    }
}

impl ConnectionConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// The selected port, if one was chosen.
    pub fn port(&self) -> Option<&str> {
        let port = self.selected_port.trim();
        (!port.is_empty()).then_some(port)
    }
}

/// Timing of a single test exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Time the controller is given to run the test before it must answer
    pub grace_interval_ms: u64,
    /// Additional wait for the reply line after the grace interval
    pub response_timeout_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            grace_interval_ms: 2000,
            response_timeout_ms: 1000,
        }
    }
}

impl TimingConfig {
    /// Total time a test waits for its reply after the frame was sent.
    pub fn response_window(&self) -> Duration {
        Duration::from_millis(self.grace_interval_ms.saturating_add(self.response_timeout_ms))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportsConfig {
    pub directory: PathBuf,
    pub verdict_rule: VerdictRule,
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("reports"),
            verdict_rule: VerdictRule::AnyOk,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"; `RUST_LOG` wins
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line with colors
    #[default]
    Pretty,
    Compact,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.connection.baud_rate, 9600);
        assert_eq!(config.connection.read_timeout(), Duration::from_secs(1));
        assert_eq!(config.timing.response_window(), Duration::from_secs(3));
        assert_eq!(config.reports.directory, PathBuf::from("reports"));
        assert_eq!(config.reports.verdict_rule, VerdictRule::AnyOk);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_selected_port() {
        let mut connection = ConnectionConfig::default();
        assert_eq!(connection.port(), None);
        connection.selected_port = " COM3 ".into();
        assert_eq!(connection.port(), Some("COM3"));
    }

    #[test]
    fn test_config_serialization() {
        let toml_str = toml::to_string_pretty(&Config::default()).unwrap();
        assert!(toml_str.contains("[connection]"));
        assert!(toml_str.contains("[timing]"));
        assert!(toml_str.contains("verdict_rule = \"any_ok\""));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let toml_str = r#"
            [connection]
            selected_port = "/dev/ttyACM0"
            auto_connect = true

            [reports]
            verdict_rule = "all_ok"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.connection.port(), Some("/dev/ttyACM0"));
        assert!(config.connection.auto_connect);
        assert_eq!(config.connection.baud_rate, 9600);
        assert_eq!(config.reports.verdict_rule, VerdictRule::AllOk);
        assert_eq!(config.timing.grace_interval_ms, 2000);
    }

    #[test]
    fn test_validation_rejects_zero_baud() {
        let mut config = Config::default();
        config.connection.baud_rate = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_validation_rejects_huge_timing() {
        let mut config = Config::default();
        config.timing.grace_interval_ms = u64::MAX;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { key, .. }) if key == "timing.grace_interval_ms"
        ));

        config.timing.grace_interval_ms = MAX_TIMING_MS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_response_window_saturates() {
        let timing = TimingConfig {
            grace_interval_ms: u64::MAX,
            response_timeout_ms: 1000,
        };
        assert_eq!(timing.response_window(), Duration::from_millis(u64::MAX));
    }
}

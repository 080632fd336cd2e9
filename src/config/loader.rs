//! Settings resolution, persistence and environment overrides.

use super::error::{ConfigError, ConfigResult};
use super::schema::Config;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

const ENV_PREFIX: &str = "DUT_BENCH";

const CONFIG_FILE_NAME: &str = "dut-bench.toml";

/// Explicit settings path; wins over every other location.
pub const CONFIG_PATH_ENV: &str = "DUT_BENCH_CONFIG";

/// Loaded settings bound to the single file they are read from and saved to.
///
/// `config` is the effective configuration (file plus environment
/// overrides). Saving writes the file values only, so an override set for
/// one session never leaks into the settings file.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    path: PathBuf,
    stored: Config,
    config: Config,
}

impl ConfigLoader {
    /// Load from the canonical settings path.
    ///
    /// A missing file is not an error: defaults are used and the file is
    /// created on the first save.
    pub fn load() -> ConfigResult<Self> {
        Self::load_from(settings_path())
    }

    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref().to_path_buf();
        let stored = if path.exists() {
            load_from_file(&path)?
        } else {
            debug!(path = %path.display(), "No settings file, using defaults");
            Config::default()
        };

        let mut config = stored.clone();
        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self {
            path,
            stored,
            config,
        })
    }

    /// Defaults bound to `path`, ignoring whatever is on disk.
    pub fn with_defaults(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            stored: Config::default(),
            config: Config::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Remember the chosen port and persist it immediately.
    pub fn set_selected_port(&mut self, port: impl Into<String>) -> ConfigResult<()> {
        let port = port.into();
        self.stored.connection.selected_port = port.clone();
        self.config.connection.selected_port = port;
        self.save()
    }

    /// Toggle auto-connect and persist it immediately.
    pub fn set_auto_connect(&mut self, enabled: bool) -> ConfigResult<()> {
        self.stored.connection.auto_connect = enabled;
        self.config.connection.auto_connect = enabled;
        self.save()
    }

    pub fn save(&self) -> ConfigResult<()> {
        save_to_file(&self.stored, &self.path)?;
        info!(path = %self.path.display(), "Settings saved");
        Ok(())
    }
}

/// The one file settings are loaded from and saved to.
///
/// 1. `DUT_BENCH_CONFIG`
/// 2. `./dut-bench.toml`, if it exists
/// 3. the per-user config directory (`~/.config/dut-bench/` and friends)
/// 4. `./dut-bench.toml` when no user directory can be determined
pub fn settings_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_PATH_ENV).filter(|p| !p.is_empty()) {
        return PathBuf::from(path);
    }

    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.exists() {
        return local;
    }

    default_settings_dir()
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .unwrap_or(local)
}

pub fn default_settings_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "dut-bench").map(|dirs| dirs.config_dir().to_path_buf())
}

fn load_from_file(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(toml::from_str(&content)?)
}

fn save_to_file(config: &Config, path: &Path) -> ConfigResult<()> {
    let write_err = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(write_err)
}

fn env_value(key: &str) -> Option<(String, String)> {
    let var = format!("{ENV_PREFIX}_{key}");
    std::env::var(&var).ok().map(|value| (var, value))
}

fn parse_env<T: FromStr>(var: &str, value: &str, what: &str) -> ConfigResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env(var, format!("expected {what}, got '{value}'")))
}

fn parse_bool(var: &str, value: &str) -> ConfigResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::env(var, format!("expected a boolean, got '{value}'"))),
    }
}

/// `DUT_BENCH_<SECTION>_<KEY>` overrides.
fn apply_env_overrides(config: &mut Config) -> ConfigResult<()> {
    if let Some((_, value)) = env_value("CONNECTION_PORT") {
        config.connection.selected_port = value;
    }
    if let Some((var, value)) = env_value("CONNECTION_BAUD") {
        config.connection.baud_rate = parse_env(&var, &value, "a baud rate")?;
    }
    if let Some((var, value)) = env_value("CONNECTION_AUTO_CONNECT") {
        config.connection.auto_connect = parse_bool(&var, &value)?;
    }
    if let Some((var, value)) = env_value("TIMING_GRACE_MS") {
        config.timing.grace_interval_ms = parse_env(&var, &value, "milliseconds")?;
    }
    if let Some((var, value)) = env_value("TIMING_RESPONSE_MS") {
        config.timing.response_timeout_ms = parse_env(&var, &value, "milliseconds")?;
    }
    if let Some((_, value)) = env_value("REPORTS_DIR") {
        config.reports.directory = PathBuf::from(value);
    }
    if let Some((_, value)) = env_value("LOG_LEVEL") {
        config.logging.level = value;
    }
    Ok(())
}

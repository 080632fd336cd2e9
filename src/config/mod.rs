//! Bench settings.
//!
//! Settings live in a single TOML file. The same path is used for reading at
//! startup and for writing when the operator picks a port or toggles
//! auto-connect (see [`settings_path`]).
//!
//! Any value can be overridden for one session through
//! `DUT_BENCH_<SECTION>_<KEY>`, e.g. `DUT_BENCH_CONNECTION_PORT=COM4` or
//! `DUT_BENCH_TIMING_GRACE_MS=500`.
//!
//! ```rust,no_run
//! use dut_bench::config::ConfigLoader;
//!
//! let mut loader = ConfigLoader::load()?;
//! loader.set_selected_port("/dev/ttyUSB0")?;
//! println!("reports go to {}", loader.config().reports.directory.display());
//! # Ok::<(), dut_bench::config::ConfigError>(())
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{default_settings_dir, settings_path, ConfigLoader, CONFIG_PATH_ENV};
pub use schema::{
    Config, ConnectionConfig, LogFormat, LoggingConfig, ReportsConfig, TimingConfig,
};

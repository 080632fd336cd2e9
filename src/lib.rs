//! Test bench orchestration.
//!
//! Drives a bench controller over a serial line: the operator fills in an
//! [`OperatorRecord`], starts one of five tests, the controller answers with
//! a status line, and every completed test refreshes a text protocol in the
//! reports directory.
//!
//! # Modules
//!
//! - `port`: serial port abstraction, the real `serialport` backend and a scripted mock
//! - `connection`: the single session with the controller
//! - `protocol`: command frames and reply classification
//! - `interpreter`: reply to slot outcome, display text and indicator color
//! - `state`: slots, operator record, worker-owned state
//! - `orchestrator`: the worker thread and its async handle
//! - `report`: verdict rules and report files
//! - `config`: TOML settings with environment overrides

pub mod config;
pub mod connection;
pub mod error;
pub mod interpreter;
pub mod orchestrator;
pub mod port;
pub mod protocol;
pub mod report;
pub mod state;

pub use config::{Config, ConfigError, ConfigLoader, ConfigResult};
pub use connection::{ConnectionError, ConnectionManager, ConnectionState};
pub use error::{BenchError, BenchResult};
pub use orchestrator::{Bench, BenchEvent, BenchHandle, BenchSnapshot, RunError, TestReport};
pub use port::{MockPortOpener, MockSerialPort, PortError, PortOpener, SystemPortOpener};
pub use protocol::{CommandFrame, ResponseFrame, ResponseKind, SlotIndex};
pub use report::{ReportError, ReportGenerator, ReportVerdict, VerdictRule};
pub use state::{OperatorRecord, SlotOutcome, TestSlot, ValidationError};

//! Test orchestration.
//!
//! A single worker thread owns the serial connection and the slot table.
//! Callers talk to it through a cloneable [`BenchHandle`]; every request is
//! a message on one queue, handled strictly in arrival order, so the port is
//! never touched by two operations at once. State changes are also
//! published as [`BenchEvent`]s for whatever presentation layer is attached.
//!
//! ```rust,no_run
//! use dut_bench::config::Config;
//! use dut_bench::orchestrator::Bench;
//! use dut_bench::port::SystemPortOpener;
//! use dut_bench::protocol::SlotIndex;
//! use dut_bench::state::OperatorRecord;
//!
//! # async fn demo(record: OperatorRecord) -> Result<(), Box<dyn std::error::Error>> {
//! let (bench, _events) = Bench::spawn(Box::new(SystemPortOpener), &Config::default())?;
//! bench.connect("/dev/ttyUSB0").await?;
//! let report = bench.run_test(SlotIndex::new(2)?, record).await?;
//! println!("{}", report.interpretation.text);
//! # Ok(())
//! # }
//! ```

mod handle;
mod run;
mod worker;

pub use handle::{Bench, BenchHandle, PendingRun};
pub use run::{RunPhase, TestReport};

use crate::connection::{ConnectionError, ConnectionInfo, ConnectionState};
use crate::interpreter::{IndicatorColor, TEXT_NO_RESPONSE};
use crate::protocol::SlotIndex;
use crate::report::ReportError;
use crate::state::{SlotTable, TestSlot, ValidationError};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Failure of an operation submitted to the bench worker.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("{}", TEXT_NO_RESPONSE)]
    NoResponse { slot: SlotIndex },

    #[error("a test is already running")]
    Busy,

    #[error("test run {0} was cancelled")]
    Cancelled(Uuid),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error("bench worker is not running")]
    WorkerStopped,
}

/// Cooperative cancellation for one test run.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Notifications published by the worker.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BenchEvent {
    ConnectionChanged {
        state: ConnectionState,
        info: Option<ConnectionInfo>,
    },
    RunPhaseChanged {
        run_id: Uuid,
        slot: SlotIndex,
        phase: RunPhase,
    },
    SlotUpdated {
        slot: TestSlot,
        text: &'static str,
        color: IndicatorColor,
    },
    /// The device did not answer in time; shown as an error message.
    NoResponse { run_id: Uuid, slot: SlotIndex },
    ReportGenerated { path: PathBuf },
    ReportFailed { message: String },
}

/// Point-in-time copy of the bench state.
#[derive(Debug, Clone, Serialize)]
pub struct BenchSnapshot {
    pub connection: ConnectionState,
    pub info: Option<ConnectionInfo>,
    pub slots: SlotTable,
    pub last_report: Option<PathBuf>,
    pub busy: bool,
}

/// Sending side of the event channel. Events are dropped once nobody listens.
#[derive(Debug, Clone)]
pub(crate) struct EventSink(mpsc::UnboundedSender<BenchEvent>);

impl EventSink {
    pub(crate) fn emit(&self, event: BenchEvent) {
        let _ = self.0.send(event);
    }
}

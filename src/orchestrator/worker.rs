//! The thread that owns the bench.

use super::run::{self, RunEnv, RunRequest, TestReport};
use super::{BenchEvent, BenchSnapshot, EventSink, RunError};
use crate::config::TimingConfig;
use crate::connection::{ConnectionError, ConnectionInfo, ConnectionState};
use crate::report::{compute_verdict, ReportGenerator, VerdictRule};
use crate::state::{OperatorRecord, SystemState};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

type Reply<T> = oneshot::Sender<T>;

/// Clears the shared busy flag when the run it guards is finished or dropped.
#[derive(Debug)]
pub(crate) struct BusyGuard(pub(crate) Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub(crate) enum Request {
    Connect {
        port: String,
        reply: Reply<Result<ConnectionInfo, ConnectionError>>,
    },
    Disconnect {
        reply: Reply<Result<(), ConnectionError>>,
    },
    Toggle {
        port: String,
        reply: Reply<Result<ConnectionState, ConnectionError>>,
    },
    Run {
        run: RunRequest,
        busy: BusyGuard,
        reply: Reply<Result<TestReport, RunError>>,
    },
    Sample {
        deadline: Duration,
        reply: Reply<Result<Option<String>, ConnectionError>>,
    },
    Report {
        record: OperatorRecord,
        reply: Reply<Result<PathBuf, RunError>>,
    },
    Snapshot {
        reply: Reply<BenchSnapshot>,
    },
}

pub(crate) struct Worker {
    pub state: SystemState,
    pub baud_rate: u32,
    pub timing: TimingConfig,
    pub reports: ReportGenerator,
    pub verdict_rule: VerdictRule,
    pub events: EventSink,
    pub busy: Arc<AtomicBool>,
}

impl Worker {
    /// Serve requests until every handle is gone, then close the port.
    pub fn run(mut self, mut rx: mpsc::UnboundedReceiver<Request>) {
        info!("Bench worker started");
        while let Some(request) = rx.blocking_recv() {
            // A panicking request drops its reply; the bench keeps serving
            if panic::catch_unwind(AssertUnwindSafe(|| self.handle(request))).is_err() {
                error!("Bench request panicked");
            }
        }

        if self.state.connection.is_connected() {
            let _ = self.state.connection.disconnect();
        }
        info!("Bench worker stopped");
    }

    fn handle(&mut self, request: Request) {
        match request {
            Request::Connect { port, reply } => {
                let result = self.connect(&port);
                let _ = reply.send(result);
            }
            Request::Disconnect { reply } => {
                let result = self.disconnect();
                let _ = reply.send(result);
            }
            Request::Toggle { port, reply } => {
                let result = if self.state.connection.is_connected() {
                    self.disconnect().map(|_| ConnectionState::Disconnected)
                } else {
                    self.connect(&port).map(|_| ConnectionState::Connected)
                };
                let _ = reply.send(result);
            }
            Request::Run { run, busy, reply } => {
                let env = RunEnv {
                    timing: &self.timing,
                    reports: &self.reports,
                    verdict_rule: self.verdict_rule,
                    events: &self.events,
                };
                let result = run::execute(&mut self.state, &env, run);
                // Release before replying so the caller can start the next test at once
                drop(busy);
                let _ = reply.send(result);
            }
            Request::Sample { deadline, reply } => {
                let result = self.state.connection.receive_line(deadline, &|| false);
                debug!(?result, "Line sampled");
                let _ = reply.send(result);
            }
            Request::Report { record, reply } => {
                let _ = reply.send(self.manual_report(&record));
            }
            Request::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    fn connect(&mut self, port: &str) -> Result<ConnectionInfo, ConnectionError> {
        self.state.connection.connect(port, self.baud_rate)?;
        self.publish_connection();
        self.state
            .connection
            .info()
            .ok_or(ConnectionError::NotConnected)
    }

    fn disconnect(&mut self) -> Result<(), ConnectionError> {
        self.state.connection.disconnect()?;
        self.publish_connection();
        Ok(())
    }

    fn publish_connection(&self) {
        self.events.emit(BenchEvent::ConnectionChanged {
            state: self.state.connection.state(),
            info: self.state.connection.info(),
        });
    }

    fn manual_report(&mut self, record: &OperatorRecord) -> Result<PathBuf, RunError> {
        record.validate()?;
        let verdict = compute_verdict(&self.state.slots, self.verdict_rule);
        let env = RunEnv {
            timing: &self.timing,
            reports: &self.reports,
            verdict_rule: self.verdict_rule,
            events: &self.events,
        };
        run::write_report(&mut self.state, &env, record, verdict).map_err(|e| {
            warn!(error = %e, "Manual report failed");
            RunError::from(e)
        })
    }

    fn snapshot(&self) -> BenchSnapshot {
        BenchSnapshot {
            connection: self.state.connection.state(),
            info: self.state.connection.info(),
            slots: self.state.slots.clone(),
            last_report: self.state.last_report.clone(),
            busy: self.busy.load(Ordering::Acquire),
        }
    }
}

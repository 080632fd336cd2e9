//! One test invocation, start to finish, on the worker thread.

use super::{BenchEvent, CancelFlag, EventSink, RunError};
use crate::config::TimingConfig;
use crate::interpreter::{display_for, interpret, Interpretation};
use crate::protocol::{CommandFrame, ResponseFrame, SlotIndex};
use crate::report::{compute_verdict, ReportGenerator, ReportVerdict, VerdictRule};
use crate::state::{OperatorRecord, SlotOutcome, SystemState};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    Armed,
    Running,
    Completed,
    TimedOut,
    Rejected,
}

impl RunPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::TimedOut | Self::Rejected)
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct TestReport {
    pub run_id: Uuid,
    pub slot: SlotIndex,
    /// The reply line exactly as received, without the terminator
    pub response: String,
    pub interpretation: Interpretation,
    pub verdict: ReportVerdict,
    pub report_path: Option<PathBuf>,
    /// Set when the report could not be written; the run itself still counts
    pub report_error: Option<String>,
}

pub(crate) struct RunRequest {
    pub run_id: Uuid,
    pub slot: SlotIndex,
    pub record: OperatorRecord,
    pub cancel: CancelFlag,
}

/// Everything a run needs besides the state it mutates.
pub(crate) struct RunEnv<'a> {
    pub timing: &'a TimingConfig,
    pub reports: &'a ReportGenerator,
    pub verdict_rule: VerdictRule,
    pub events: &'a EventSink,
}

struct Tracker<'a> {
    run_id: Uuid,
    slot: SlotIndex,
    phase: RunPhase,
    events: &'a EventSink,
}

impl Tracker<'_> {
    fn advance(&mut self, next: RunPhase) {
        debug!(
            run_id = %self.run_id,
            slot = %self.slot,
            from = ?self.phase,
            to = ?next,
            "Run phase"
        );
        self.phase = next;
        self.events.emit(BenchEvent::RunPhaseChanged {
            run_id: self.run_id,
            slot: self.slot,
            phase: next,
        });
    }

    fn reject(&mut self, error: RunError) -> RunError {
        warn!(run_id = %self.run_id, slot = %self.slot, %error, "Run rejected");
        self.advance(RunPhase::Rejected);
        error
    }
}

pub(crate) fn execute(
    state: &mut SystemState,
    env: &RunEnv<'_>,
    request: RunRequest,
) -> Result<TestReport, RunError> {
    let RunRequest {
        run_id,
        slot,
        record,
        cancel,
    } = request;
    let mut tracker = Tracker {
        run_id,
        slot,
        phase: RunPhase::Idle,
        events: env.events,
    };
    info!(%run_id, %slot, "Test requested");

    record.validate().map_err(|e| tracker.reject(e.into()))?;
    tracker.advance(RunPhase::Armed);

    if cancel.is_cancelled() {
        return Err(tracker.reject(RunError::Cancelled(run_id)));
    }

    let frame = CommandFrame::encode(slot);
    state
        .connection
        .send(frame.to_line().as_bytes())
        .map_err(|e| tracker.reject(e.into()))?;
    tracker.advance(RunPhase::Running);

    let received = state
        .connection
        .receive_line(env.timing.response_window(), &|| cancel.is_cancelled());

    let line = match received {
        Ok(Some(line)) => line,
        Ok(None) => {
            mark_unknown(state, env.events, slot);
            if cancel.is_cancelled() {
                return Err(tracker.reject(RunError::Cancelled(run_id)));
            }
            warn!(%run_id, %slot, "No response from device");
            env.events.emit(BenchEvent::NoResponse { run_id, slot });
            tracker.advance(RunPhase::TimedOut);
            return Err(RunError::NoResponse { slot });
        }
        Err(e) => {
            mark_unknown(state, env.events, slot);
            return Err(tracker.reject(e.into()));
        }
    };

    let response = ResponseFrame::decode(&line);
    let interpretation = interpret(Some(&response));
    publish_slot(state, env.events, slot, interpretation.outcome);
    tracker.advance(RunPhase::Completed);
    info!(
        %run_id,
        %slot,
        outcome = ?interpretation.outcome,
        reply = %response.raw,
        "Test completed"
    );

    let verdict = compute_verdict(&state.slots, env.verdict_rule);
    let (report_path, report_error) = match write_report(state, env, &record, verdict) {
        Ok(path) => (Some(path), None),
        Err(e) => (None, Some(e.to_string())),
    };

    Ok(TestReport {
        run_id,
        slot,
        response: response.raw,
        interpretation,
        verdict,
        report_path,
        report_error,
    })
}

/// Render a report from the current slots and remember where it went.
pub(crate) fn write_report(
    state: &mut SystemState,
    env: &RunEnv<'_>,
    record: &OperatorRecord,
    verdict: ReportVerdict,
) -> Result<PathBuf, crate::report::ReportError> {
    match env.reports.generate(record, verdict, &state.slots) {
        Ok(path) => {
            state.last_report = Some(path.clone());
            env.events.emit(BenchEvent::ReportGenerated { path: path.clone() });
            Ok(path)
        }
        Err(e) => {
            env.events.emit(BenchEvent::ReportFailed {
                message: e.to_string(),
            });
            Err(e)
        }
    }
}

fn mark_unknown(state: &mut SystemState, events: &EventSink, slot: SlotIndex) {
    publish_slot(state, events, slot, SlotOutcome::Unknown);
}

fn publish_slot(
    state: &mut SystemState,
    events: &EventSink,
    slot: SlotIndex,
    outcome: SlotOutcome,
) {
    let updated = state.set_outcome(slot, outcome).clone();
    let (text, color) = display_for(outcome);
    events.emit(BenchEvent::SlotUpdated {
        slot: updated,
        text,
        color,
    });
}

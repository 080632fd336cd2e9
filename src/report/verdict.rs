use crate::state::{SlotOutcome, TestSlot};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportVerdict {
    Success,
    Failure,
}

/// How the overall verdict is derived from the five slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictRule {
    /// Success as soon as one slot passed. This is what deployed benches do,
    /// even though the report text claims every test passed.
    #[default]
    AnyOk,
    /// Success only when every slot passed.
    AllOk,
}

pub fn compute_verdict(slots: &[TestSlot], rule: VerdictRule) -> ReportVerdict {
    let passed = |slot: &TestSlot| slot.outcome == SlotOutcome::Ok;
    let success = match rule {
        VerdictRule::AnyOk => slots.iter().any(passed),
        VerdictRule::AllOk => !slots.is_empty() && slots.iter().all(passed),
    };

    if success {
        ReportVerdict::Success
    } else {
        ReportVerdict::Failure
    }
}

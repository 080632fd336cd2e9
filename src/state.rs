use crate::connection::ConnectionManager;
use crate::protocol::{SlotIndex, ALL_SLOTS, SLOT_COUNT};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Date format printed on reports and prefilled into new records.
pub const DATE_FORMAT: &str = "%d.%m.%Y";

/// Result of the most recent run of one test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotOutcome {
    /// The test has not been run in this process.
    #[default]
    Unset,
    Ok,
    Error,
    Unknown,
}

/// One of the five tests on the bench.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSlot {
    pub index: SlotIndex,
    pub label: String,
    pub outcome: SlotOutcome,
}

impl TestSlot {
    fn new(index: SlotIndex) -> Self {
        Self {
            index,
            label: format!("Тест {}", index.get() + 1),
            outcome: SlotOutcome::Unset,
        }
    }
}

/// The five slots, fixed for the life of the process.
pub type SlotTable = [TestSlot; SLOT_COUNT];

pub fn fresh_slots() -> SlotTable {
    ALL_SLOTS.map(TestSlot::new)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("required fields are empty: {}", .missing.join(", "))]
pub struct ValidationError {
    /// Human-readable names of the empty fields, in form order.
    pub missing: Vec<&'static str>,
}

/// Identifying metadata the operator enters before testing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorRecord {
    pub operator_name: String,
    pub date: String,
    pub object: String,
    pub block_number: String,
    pub test_place: String,
    pub connection_name: String,
}

impl OperatorRecord {
    /// An empty record with today's date filled in.
    pub fn dated_today() -> Self {
        Self {
            date: Local::now().format(DATE_FORMAT).to_string(),
            ..Self::default()
        }
    }

    /// Field labels paired with their values, in form order.
    pub fn fields(&self) -> [(&'static str, &str); 6] {
        [
            ("ФИО оператора", self.operator_name.as_str()),
            ("Дата испытаний", self.date.as_str()),
            ("Объект", self.object.as_str()),
            ("Номер блока", self.block_number.as_str()),
            ("Место испытаний", self.test_place.as_str()),
            ("Наименование присоединения", self.connection_name.as_str()),
        ]
    }

    /// Every field must contain something other than whitespace.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let missing: Vec<_> = self
            .fields()
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(label, _)| *label)
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { missing })
        }
    }
}

/// Everything the bench worker owns.
///
/// Only the worker thread ever touches this value; other threads see copies
/// delivered over channels.
#[derive(Debug)]
pub struct SystemState {
    pub connection: ConnectionManager,
    pub slots: SlotTable,
    pub last_report: Option<PathBuf>,
}

impl SystemState {
    pub fn new(connection: ConnectionManager) -> Self {
        Self {
            connection,
            slots: fresh_slots(),
            last_report: None,
        }
    }

    pub fn set_outcome(&mut self, slot: SlotIndex, outcome: SlotOutcome) -> &TestSlot {
        let entry = &mut self.slots[slot.get()];
        entry.outcome = outcome;
        entry
    }
}

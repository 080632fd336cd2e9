//! Turns a report document into file bytes.

use super::verdict::ReportVerdict;
use super::ReportError;
use crate::interpreter::display_for;
use crate::state::{OperatorRecord, SlotTable, DATE_FORMAT};
use chrono::{DateTime, Local};
use std::fmt::Write as _;

pub const TITLE: &str = "Протокол проверки блока (ячейки)";
pub const SIGNATURE_LINE: &str = "Подпись оператора: ____________________";

const SUCCESS_NARRATIVE: [&str; 2] = [
    "В результате проверки блок признан исправным и работоспособным.",
    "Все тесты пройдены успешно.",
];

const FAILURE_NARRATIVE: [&str; 2] = [
    "В результате проверки блок признан неисправным.",
    "Один или более тестов завершились с ошибкой.",
];

/// Everything that goes into one report.
#[derive(Debug, Clone)]
pub struct ReportDocument<'a> {
    pub record: &'a OperatorRecord,
    pub verdict: ReportVerdict,
    pub slots: &'a SlotTable,
    pub generated_at: DateTime<Local>,
}

impl ReportDocument<'_> {
    pub fn narrative(&self) -> [&'static str; 2] {
        match self.verdict {
            ReportVerdict::Success => SUCCESS_NARRATIVE,
            ReportVerdict::Failure => FAILURE_NARRATIVE,
        }
    }
}

/// Output format of the report artifact.
pub trait ReportRenderer: Send {
    /// File extension without the dot.
    fn extension(&self) -> &'static str;

    fn render(&self, document: &ReportDocument<'_>) -> Result<Vec<u8>, ReportError>;
}

/// Plain UTF-8 text laid out like the printed protocol.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextReportRenderer;

impl ReportRenderer for TextReportRenderer {
    fn extension(&self) -> &'static str {
        "txt"
    }

    fn render(&self, document: &ReportDocument<'_>) -> Result<Vec<u8>, ReportError> {
        let mut out = String::new();
        render_text(&mut out, document).map_err(|e| ReportError::Render(e.to_string()))?;
        Ok(out.into_bytes())
    }
}

fn render_text(out: &mut String, doc: &ReportDocument<'_>) -> std::fmt::Result {
    writeln!(out, "{TITLE}")?;
    writeln!(out)?;

    let record = doc.record;
    writeln!(out, "ФИО оператора: {}", record.operator_name)?;
    writeln!(out, "Объект: {}", record.object)?;
    writeln!(out, "Номер блока: {}", record.block_number)?;
    writeln!(out, "Место испытаний: {}", record.test_place)?;
    writeln!(out, "Наименование присоединения: {}", record.connection_name)?;
    writeln!(out, "Дата испытаний: {}", record.date)?;
    writeln!(out, "Дата: {}", doc.generated_at.format(DATE_FORMAT))?;
    writeln!(out)?;

    for slot in doc.slots.iter() {
        let (text, _) = display_for(slot.outcome);
        writeln!(out, "{}: {}", slot.label, text)?;
    }
    writeln!(out)?;

    for line in doc.narrative() {
        writeln!(out, "{line}")?;
    }
    writeln!(out)?;
    writeln!(out)?;
    writeln!(out, "{SIGNATURE_LINE}")
}

//! Maps device replies to slot outcomes and indicator state.

use crate::protocol::{ResponseFrame, ResponseKind};
use crate::state::SlotOutcome;
use serde::{Deserialize, Serialize};

pub const TEXT_OK: &str = "Успех";
pub const TEXT_ERROR: &str = "Ошибка";
pub const TEXT_UNKNOWN: &str = "Неизвестный результат";
pub const TEXT_NO_RESPONSE: &str = "Нет ответа от устройства";
pub const TEXT_UNSET: &str = "Поле результата для теста";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorColor {
    Green,
    Red,
    Gray,
}

/// What the presentation layer should show for one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Interpretation {
    pub outcome: SlotOutcome,
    pub text: &'static str,
    /// `None` when the result must be raised as an error message instead of
    /// a plain indicator change.
    pub color: Option<IndicatorColor>,
}

impl Interpretation {
    pub fn is_user_error(&self) -> bool {
        self.color.is_none()
    }
}

/// Interpret a reply, or its absence when the deadline passed.
pub fn interpret(response: Option<&ResponseFrame>) -> Interpretation {
    match response.map(|frame| frame.kind) {
        Some(ResponseKind::Error) => Interpretation {
            outcome: SlotOutcome::Error,
            text: TEXT_ERROR,
            color: Some(IndicatorColor::Red),
        },
        Some(ResponseKind::Ok) => Interpretation {
            outcome: SlotOutcome::Ok,
            text: TEXT_OK,
            color: Some(IndicatorColor::Green),
        },
        Some(ResponseKind::Unknown) => Interpretation {
            outcome: SlotOutcome::Unknown,
            text: TEXT_UNKNOWN,
            color: Some(IndicatorColor::Gray),
        },
        None => Interpretation {
            outcome: SlotOutcome::Unknown,
            text: TEXT_NO_RESPONSE,
            color: None,
        },
    }
}

/// Indicator text and color for a stored outcome.
pub fn display_for(outcome: SlotOutcome) -> (&'static str, IndicatorColor) {
    match outcome {
        SlotOutcome::Unset => (TEXT_UNSET, IndicatorColor::Gray),
        SlotOutcome::Ok => (TEXT_OK, IndicatorColor::Green),
        SlotOutcome::Error => (TEXT_ERROR, IndicatorColor::Red),
        SlotOutcome::Unknown => (TEXT_UNKNOWN, IndicatorColor::Gray),
    }
}

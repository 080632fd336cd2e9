//! Bench controller wire protocol.
//!
//! Requests are five `;`-separated tokens, one of them `START`, terminated
//! by a newline. Responses are a single free-form line that is classified by
//! the markers it contains.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Number of independent tests the bench exposes.
pub const SLOT_COUNT: usize = 5;

const SEPARATOR: char = ';';

/// Marker that classifies a response as a failed test. Checked first.
pub const ERROR_MARKER: &str = "ERROR";

/// Marker that classifies a response as a passed test.
pub const OK_MARKER: &str = "OK";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("slot index {0} is out of range 0..{SLOT_COUNT}")]
    InvalidSlot(usize),

    #[error("malformed command frame: {0}")]
    MalformedFrame(String),
}

/// Index of one of the five tests, always in `0..SLOT_COUNT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub struct SlotIndex(u8);

impl SlotIndex {
    pub fn new(index: usize) -> Result<Self, ProtocolError> {
        if index < SLOT_COUNT {
            Ok(Self(index as u8))
        } else {
            Err(ProtocolError::InvalidSlot(index))
        }
    }

    pub fn get(self) -> usize {
        usize::from(self.0)
    }

    /// All five slots in order.
    pub fn all() -> impl Iterator<Item = SlotIndex> {
        ALL_SLOTS.into_iter()
    }
}

pub const ALL_SLOTS: [SlotIndex; SLOT_COUNT] = [
    SlotIndex(0),
    SlotIndex(1),
    SlotIndex(2),
    SlotIndex(3),
    SlotIndex(4),
];

impl TryFrom<usize> for SlotIndex {
    type Error = ProtocolError;

    fn try_from(index: usize) -> Result<Self, Self::Error> {
        Self::new(index)
    }
}

impl From<SlotIndex> for usize {
    fn from(slot: SlotIndex) -> Self {
        slot.get()
    }
}

impl fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    Unused,
    Start,
}

impl Token {
    pub fn as_str(self) -> &'static str {
        match self {
            Token::Unused => "UNUSED",
            Token::Start => "START",
        }
    }
}

impl std::str::FromStr for Token {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UNUSED" => Ok(Token::Unused),
            "START" => Ok(Token::Start),
            other => Err(ProtocolError::MalformedFrame(format!(
                "unknown token {other:?}"
            ))),
        }
    }
}

/// A request to run exactly one test.
///
/// Only the position of `START` is stored, so a frame with zero or several
/// `START` tokens cannot be constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandFrame {
    start: SlotIndex,
}

impl CommandFrame {
    pub fn encode(slot: SlotIndex) -> Self {
        Self { start: slot }
    }

    pub fn slot(&self) -> SlotIndex {
        self.start
    }

    pub fn tokens(&self) -> [Token; SLOT_COUNT] {
        let mut tokens = [Token::Unused; SLOT_COUNT];
        tokens[self.start.get()] = Token::Start;
        tokens
    }

    /// Wire form including the trailing newline.
    pub fn to_line(&self) -> String {
        format!("{self}\n")
    }

    /// Parse a wire line (terminator optional) back into a frame.
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let body = line.trim_end_matches(['\r', '\n']);
        let tokens = body
            .split(SEPARATOR)
            .map(str::parse::<Token>)
            .collect::<Result<Vec<_>, _>>()?;

        if tokens.len() != SLOT_COUNT {
            return Err(ProtocolError::MalformedFrame(format!(
                "expected {SLOT_COUNT} tokens, got {}",
                tokens.len()
            )));
        }

        let mut starts = tokens
            .iter()
            .enumerate()
            .filter(|(_, token)| **token == Token::Start)
            .map(|(index, _)| index);

        match (starts.next(), starts.next()) {
            (Some(index), None) => Ok(Self::encode(SlotIndex::new(index)?)),
            (None, _) => Err(ProtocolError::MalformedFrame("no START token".into())),
            (Some(_), Some(_)) => Err(ProtocolError::MalformedFrame(
                "more than one START token".into(),
            )),
        }
    }
}

impl fmt::Display for CommandFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, token) in self.tokens().iter().enumerate() {
            if i > 0 {
                write!(f, "{SEPARATOR}")?;
            }
            f.write_str(token.as_str())?;
        }
        Ok(())
    }
}

/// Classification of a device reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    Ok,
    Error,
    Unknown,
}

/// A device reply line together with its classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseFrame {
    pub kind: ResponseKind,
    pub raw: String,
}

impl ResponseFrame {
    /// Classify a reply line.
    ///
    /// `ERROR` wins over `OK` when both appear, so `"OK ERROR"` is an error.
    /// Lines with neither marker, including empty ones, are `Unknown`.
    pub fn decode(raw_line: &str) -> Self {
        let line = raw_line.trim();
        let kind = if line.contains(ERROR_MARKER) {
            ResponseKind::Error
        } else if line.contains(OK_MARKER) {
            ResponseKind::Ok
        } else {
            ResponseKind::Unknown
        };

        Self {
            kind,
            raw: line.to_string(),
        }
    }

    /// Classify raw bytes; invalid UTF-8 is replaced before matching.
    pub fn decode_bytes(raw: &[u8]) -> Self {
        Self::decode(&String::from_utf8_lossy(raw))
    }
}

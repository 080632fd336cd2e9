//! Crate-level error, used where several layers meet (the CLI, port selection).

use crate::config::ConfigError;
use crate::connection::ConnectionError;
use crate::orchestrator::RunError;
use crate::protocol::ProtocolError;
use crate::report::ReportError;
use crate::state::ValidationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BenchError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error(transparent)]
    Run(#[from] RunError),

    #[error("no port given and auto-connect is off; pass --port or enable auto-connect")]
    NoPort,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BenchError {
    /// Whether the operator can fix this by correcting their input.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::Protocol(_)
                | Self::NoPort
                | Self::Run(RunError::Validation(_) | RunError::Busy | RunError::NoResponse { .. })
        )
    }
}

pub type BenchResult<T> = Result<T, BenchError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::SlotIndex;

    #[test]
    fn test_messages_pass_through() {
        let err: BenchError = RunError::NoResponse {
            slot: SlotIndex::new(2).unwrap(),
        }
        .into();
        assert_eq!(err.to_string(), "Нет ответа от устройства");
        assert!(err.is_user_error());

        let err: BenchError = ConnectionError::NotConnected.into();
        assert_eq!(err.to_string(), "not connected");
        assert!(!err.is_user_error());
    }

    #[test]
    fn test_invalid_slot() {
        let err: BenchError = SlotIndex::new(9).unwrap_err().into();
        assert!(err.is_user_error());
    }
}

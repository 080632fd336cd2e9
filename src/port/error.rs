//! Faults of the serial line itself.
//!
//! The connection layer wraps these into `ConnectionError` with the port name
//! attached.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PortError {
    #[error("serial port not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The driver refused the requested line settings
    #[error("invalid port settings: {0}")]
    Config(String),

    #[error("short write: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },

    #[error(transparent)]
    Serial(#[from] serialport::Error),
}

impl PortError {
    pub fn not_found(port_name: impl Into<String>) -> Self {
        Self::NotFound(port_name.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// True when a read merely found nothing to return.
    ///
    /// Hardware reports an expired read timeout as `TimedOut`, the mock an
    /// empty queue as `WouldBlock`.
    pub fn is_no_data(&self) -> bool {
        matches!(
            self,
            Self::Io(e) if matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
            )
        )
    }
}

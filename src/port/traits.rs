//! The seam between the bench and a serial line.
//!
//! `SerialPortAdapter` is what the connection layer reads and writes through;
//! `PortOpener` turns a port name into one. Real hardware and the scripted
//! mock both sit behind these two traits.

use super::error::PortError;
use std::time::Duration;

/// Baud rate the bench controller firmware listens on.
pub const BENCH_BAUD_RATE: u32 = 9600;

/// Read timeout applied to every freshly opened port.
pub const BENCH_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// How to open the line. Framing is always 8 data bits, no parity, one stop
/// bit and no flow control; the controller supports nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortConfiguration {
    pub baud_rate: u32,
    /// Upper bound for a single blocking read
    pub timeout: Duration,
}

impl Default for PortConfiguration {
    fn default() -> Self {
        Self::with_baud(BENCH_BAUD_RATE, BENCH_READ_TIMEOUT)
    }
}

impl PortConfiguration {
    pub fn with_baud(baud_rate: u32, timeout: Duration) -> Self {
        Self { baud_rate, timeout }
    }
}

/// Byte-level access to an open line.
pub trait SerialPortAdapter: Send + std::fmt::Debug {
    /// Returns how many bytes were accepted.
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError>;

    /// Returns how many bytes were placed in `buffer`. "Nothing yet" may be
    /// reported as `Ok(0)` or as a no-data error, see [`PortError::is_no_data`].
    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError>;

    fn name(&self) -> &str;

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), PortError>;

    /// Drop unread input and unsent output.
    fn clear_buffers(&mut self) -> Result<(), PortError>;

    fn bytes_to_read(&self) -> Option<usize> {
        None
    }
}

pub trait PortOpener: Send {
    fn open(
        &self,
        port_name: &str,
        config: &PortConfiguration,
    ) -> Result<Box<dyn SerialPortAdapter>, PortError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_bench_line() {
        let config = PortConfiguration::default();
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_with_baud() {
        let config = PortConfiguration::with_baud(19200, Duration::from_millis(250));
        assert_eq!(
            config,
            PortConfiguration {
                baud_rate: 19200,
                timeout: Duration::from_millis(250),
            }
        );
    }
}

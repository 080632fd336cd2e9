//! The real line, through the `serialport` crate.

use super::error::PortError;
use super::traits::{PortConfiguration, PortOpener, SerialPortAdapter};
use serialport::{ClearBuffer, DataBits, ErrorKind, FlowControl, Parity, SerialPort, StopBits};
use std::io::{Read, Write};
use std::time::Duration;

pub struct SyncSerialPort {
    inner: Box<dyn SerialPort>,
    name: String,
}

impl SyncSerialPort {
    /// Open `port_name` as 8N1 without flow control.
    ///
    /// ```no_run
    /// use dut_bench::port::{PortConfiguration, SyncSerialPort};
    ///
    /// let port = SyncSerialPort::open("/dev/ttyUSB0", &PortConfiguration::default())?;
    /// # Ok::<(), dut_bench::port::PortError>(())
    /// ```
    pub fn open(port_name: &str, config: &PortConfiguration) -> Result<Self, PortError> {
        let inner = serialport::new(port_name, config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(config.timeout)
            .open()
            .map_err(|e| classify_open_error(port_name, e))?;

        Ok(Self {
            inner,
            name: port_name.to_string(),
        })
    }
}

fn classify_open_error(port_name: &str, error: serialport::Error) -> PortError {
    match error.kind() {
        ErrorKind::NoDevice | ErrorKind::Io(std::io::ErrorKind::NotFound) => {
            PortError::not_found(port_name)
        }
        ErrorKind::InvalidInput => PortError::config(error.to_string()),
        _ => PortError::Serial(error),
    }
}

impl SerialPortAdapter for SyncSerialPort {
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        let written = self.inner.write(data)?;
        self.inner.flush()?;
        Ok(written)
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        Ok(self.inner.read(buffer)?)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), PortError> {
        Ok(self.inner.set_timeout(timeout)?)
    }

    fn clear_buffers(&mut self) -> Result<(), PortError> {
        Ok(self.inner.clear(ClearBuffer::All)?)
    }

    fn bytes_to_read(&self) -> Option<usize> {
        self.inner.bytes_to_read().ok().map(|n| n as usize)
    }
}

impl std::fmt::Debug for SyncSerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncSerialPort")
            .field("name", &self.name)
            .field("baud_rate", &self.inner.baud_rate().ok())
            .finish()
    }
}

/// Opens ports through the operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPortOpener;

impl PortOpener for SystemPortOpener {
    fn open(
        &self,
        port_name: &str,
        config: &PortConfiguration,
    ) -> Result<Box<dyn SerialPortAdapter>, PortError> {
        let port = SyncSerialPort::open(port_name, config)?;
        Ok(Box::new(port))
    }
}

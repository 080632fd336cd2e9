//! In-memory line with a scripted bench controller on the far end.
//!
//! Writes are recorded; a write that matches a scripted request queues the
//! scripted reply for reading, which is enough to play the controller in
//! tests and demos. Clones share one line, so a test can keep a clone to
//! script and inspect traffic while the connection owns another.

use super::error::PortError;
use super::traits::{PortConfiguration, PortOpener, SerialPortAdapter};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::io::{Error, ErrorKind};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug)]
struct Line {
    /// Bytes the bench has yet to read
    inbound: VecDeque<u8>,
    sent: Vec<Vec<u8>>,
    script: HashMap<Vec<u8>, Vec<u8>>,
    default_reply: Option<Vec<u8>>,
    write_fault: bool,
    read_fault: bool,
    timeout: Duration,
    clears: usize,
}

/// ```
/// use dut_bench::port::{MockSerialPort, SerialPortAdapter};
///
/// let mut port = MockSerialPort::new("MOCK0");
/// port.reply_on_write(b"UNUSED;START;UNUSED;UNUSED;UNUSED\n", b"STATUS OK\n");
///
/// port.write_bytes(b"UNUSED;START;UNUSED;UNUSED;UNUSED\n").unwrap();
///
/// let mut buffer = [0u8; 16];
/// let n = port.read_bytes(&mut buffer).unwrap();
/// assert_eq!(&buffer[..n], b"STATUS OK\n");
/// ```
#[derive(Clone)]
pub struct MockSerialPort {
    name: String,
    line: Arc<Mutex<Line>>,
}

impl MockSerialPort {
    pub fn new(name: impl Into<String>) -> Self {
        let line = Line {
            inbound: VecDeque::new(),
            sent: Vec::new(),
            script: HashMap::new(),
            default_reply: None,
            write_fault: false,
            read_fault: false,
            timeout: Duration::from_secs(1),
            clears: 0,
        };
        Self {
            name: name.into(),
            line: Arc::new(Mutex::new(line)),
        }
    }

    /// Make `data` readable now, as if the controller sent it unprompted.
    pub fn enqueue_read(&self, data: &[u8]) {
        self.line.lock().inbound.extend(data);
    }

    /// Answer with `reply` whenever exactly `request` is written.
    pub fn reply_on_write(&self, request: &[u8], reply: &[u8]) {
        self.line
            .lock()
            .script
            .insert(request.to_vec(), reply.to_vec());
    }

    /// Answer every unscripted write with `reply`.
    pub fn reply_to_any_write(&self, reply: &[u8]) {
        self.line.lock().default_reply = Some(reply.to_vec());
    }

    /// Every write so far, one entry per call.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.line.lock().sent.clone()
    }

    pub fn written_lines(&self) -> Vec<String> {
        self.line
            .lock()
            .sent
            .iter()
            .map(|w| String::from_utf8_lossy(w).into_owned())
            .collect()
    }

    /// Fail writes as if the cable was pulled.
    pub fn set_fail_writes(&self, fail: bool) {
        self.line.lock().write_fault = fail;
    }

    /// Fail reads as if the cable was pulled.
    pub fn set_fail_reads(&self, fail: bool) {
        self.line.lock().read_fault = fail;
    }

    pub fn clear_count(&self) -> usize {
        self.line.lock().clears
    }

    /// Timeout most recently set through the adapter.
    pub fn timeout(&self) -> Duration {
        self.line.lock().timeout
    }

    pub fn available_bytes(&self) -> usize {
        self.line.lock().inbound.len()
    }
}

fn unplugged() -> PortError {
    Error::new(ErrorKind::BrokenPipe, "device disconnected").into()
}

impl SerialPortAdapter for MockSerialPort {
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        let mut line = self.line.lock();
        if line.write_fault {
            return Err(unplugged());
        }

        line.sent.push(data.to_vec());
        let reply = match line.script.get(data) {
            Some(reply) => Some(reply.clone()),
            None => line.default_reply.clone(),
        };
        if let Some(reply) = reply {
            line.inbound.extend(reply);
        }
        Ok(data.len())
    }

    /// An empty line answers `WouldBlock`, like a non-blocking port.
    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        let mut line = self.line.lock();
        if line.read_fault {
            return Err(unplugged());
        }
        if line.inbound.is_empty() {
            return Err(Error::new(ErrorKind::WouldBlock, "no data available").into());
        }

        let n = buffer.len().min(line.inbound.len());
        for (slot, byte) in buffer.iter_mut().zip(line.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), PortError> {
        self.line.lock().timeout = timeout;
        Ok(())
    }

    fn clear_buffers(&mut self) -> Result<(), PortError> {
        let mut line = self.line.lock();
        line.inbound.clear();
        line.clears += 1;
        Ok(())
    }

    fn bytes_to_read(&self) -> Option<usize> {
        Some(self.available_bytes())
    }
}

impl std::fmt::Debug for MockSerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSerialPort")
            .field("name", &self.name)
            .field("pending", &self.available_bytes())
            .finish()
    }
}

/// Opens mock ports by name; unknown names are `NotFound`.
#[derive(Debug, Clone, Default)]
pub struct MockPortOpener {
    ports: Arc<Mutex<HashMap<String, MockSerialPort>>>,
    opened: Arc<Mutex<Vec<(String, PortConfiguration)>>>,
}

impl MockPortOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a port; returns a clone sharing the port's line.
    pub fn add_port(&self, port: MockSerialPort) -> MockSerialPort {
        self.ports.lock().insert(port.name.clone(), port.clone());
        port
    }

    /// Every successful open, in order, with the settings used.
    pub fn open_calls(&self) -> Vec<(String, PortConfiguration)> {
        self.opened.lock().clone()
    }
}

impl PortOpener for MockPortOpener {
    fn open(
        &self,
        port_name: &str,
        config: &PortConfiguration,
    ) -> Result<Box<dyn SerialPortAdapter>, PortError> {
        let port = self
            .ports
            .lock()
            .get(port_name)
            .cloned()
            .ok_or_else(|| PortError::not_found(port_name))?;
        self.opened.lock().push((port_name.to_string(), *config));
        Ok(Box::new(port))
    }
}

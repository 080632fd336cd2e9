//! Lifecycle of the single serial session with the bench controller.
//!
//! `ConnectionManager` is a plain synchronous state machine. It is not shared
//! between threads: the orchestrator's worker owns it and serializes every
//! call, see `crate::orchestrator`.

use crate::port::{
    PortConfiguration, PortError, PortOpener, SerialPortAdapter, BENCH_READ_TIMEOUT,
};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Sleep between polls when the port reports "no data" without blocking.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

const READ_CHUNK: usize = 256;

/// Longest wait `receive_line` honours; longer deadlines are cut to this.
pub const MAX_RECEIVE_WAIT: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("failed to open {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: PortError,
    },

    #[error("not connected")]
    NotConnected,

    #[error("already connected to {0}")]
    AlreadyConnected(String),

    #[error("write to {port} failed: {source}")]
    Write {
        port: String,
        #[source]
        source: PortError,
    },

    #[error("read from {port} failed: {source}")]
    Read {
        port: String,
        #[source]
        source: PortError,
    },

    #[error("failed to enumerate serial ports: {0}")]
    Enumerate(#[from] serialport::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// Public view of the live (or last attempted) connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub port_id: String,
    pub baud_rate: u32,
    pub state: ConnectionState,
}

/// A port offered to the operator by the port picker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSummary {
    pub port_name: String,
    pub kind: String,
}

/// Enumerate serial ports present on this machine.
pub fn list_ports() -> Result<Vec<PortSummary>, ConnectionError> {
    let ports = serialport::available_ports()?;
    Ok(ports
        .into_iter()
        .map(|p| PortSummary {
            kind: match p.port_type {
                serialport::SerialPortType::UsbPort(_) => "usb",
                serialport::SerialPortType::PciPort => "pci",
                serialport::SerialPortType::BluetoothPort => "bluetooth",
                serialport::SerialPortType::Unknown => "unknown",
            }
            .to_string(),
            port_name: p.port_name,
        })
        .collect())
}

struct Live {
    port: Box<dyn SerialPortAdapter>,
    baud_rate: u32,
    /// Bytes read past the last returned line.
    pending: Vec<u8>,
}

pub struct ConnectionManager {
    opener: Box<dyn PortOpener>,
    read_timeout: Duration,
    live: Option<Live>,
}

impl ConnectionManager {
    pub fn new(opener: Box<dyn PortOpener>) -> Self {
        Self::with_read_timeout(opener, BENCH_READ_TIMEOUT)
    }

    pub fn with_read_timeout(opener: Box<dyn PortOpener>, read_timeout: Duration) -> Self {
        Self {
            opener,
            read_timeout,
            live: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        if self.live.is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    pub fn is_connected(&self) -> bool {
        self.live.is_some()
    }

    pub fn info(&self) -> Option<ConnectionInfo> {
        self.live.as_ref().map(|live| ConnectionInfo {
            port_id: live.port.name().to_string(),
            baud_rate: live.baud_rate,
            state: ConnectionState::Connected,
        })
    }

    /// Open `port_id` at `baud_rate`, 8N1, with the configured read timeout.
    pub fn connect(&mut self, port_id: &str, baud_rate: u32) -> Result<(), ConnectionError> {
        if let Some(live) = &self.live {
            return Err(ConnectionError::AlreadyConnected(live.port.name().to_string()));
        }

        let config = PortConfiguration::with_baud(baud_rate, self.read_timeout);
        let port = self
            .opener
            .open(port_id, &config)
            .map_err(|source| {
                warn!(port = port_id, error = %source, "Failed to open port");
                ConnectionError::Open {
                    port: port_id.to_string(),
                    source,
                }
            })?;

        info!(port = port_id, baud_rate, "Connected");
        self.live = Some(Live {
            port,
            baud_rate,
            pending: Vec::new(),
        });
        Ok(())
    }

    pub fn disconnect(&mut self) -> Result<(), ConnectionError> {
        match self.live.take() {
            Some(live) => {
                info!(port = live.port.name(), "Disconnected");
                Ok(())
            }
            None => Err(ConnectionError::NotConnected),
        }
    }

    /// Write `data` as one line, appending `\n` if it is missing.
    ///
    /// Unread input is discarded first so a stale line cannot be taken for
    /// the reply to this request.
    pub fn send(&mut self, data: &[u8]) -> Result<(), ConnectionError> {
        let live = self.live.as_mut().ok_or(ConnectionError::NotConnected)?;
        let port_name = live.port.name().to_string();
        let write_err = |source| ConnectionError::Write {
            port: port_name.clone(),
            source,
        };

        live.pending.clear();
        live.port.clear_buffers().map_err(write_err)?;

        let mut line = data.to_vec();
        if line.last() != Some(&b'\n') {
            line.push(b'\n');
        }

        let written = live.port.write_bytes(&line).map_err(write_err)?;
        if written != line.len() {
            return Err(write_err(PortError::ShortWrite {
                written,
                expected: line.len(),
            }));
        }

        debug!(port = %port_name, line = %String::from_utf8_lossy(&line).trim_end(), "Sent");
        Ok(())
    }

    /// Wait up to `deadline` for one `\n`-terminated line.
    ///
    /// Returns `Ok(None)` when the deadline passes first. `interrupted` is
    /// polled between reads; when it returns true the wait ends like a timeout.
    /// Deadlines above [`MAX_RECEIVE_WAIT`] are clamped to it.
    pub fn receive_line(
        &mut self,
        deadline: Duration,
        interrupted: &dyn Fn() -> bool,
    ) -> Result<Option<String>, ConnectionError> {
        let read_timeout = self.read_timeout;
        let live = self.live.as_mut().ok_or(ConnectionError::NotConnected)?;
        let ends_at = Instant::now() + deadline.min(MAX_RECEIVE_WAIT);
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            if let Some(line) = take_line(&mut live.pending) {
                debug!(port = live.port.name(), %line, "Received");
                return Ok(Some(line));
            }

            let now = Instant::now();
            if now >= ends_at || interrupted() {
                return Ok(None);
            }

            // Never let a single blocking read overshoot the caller's deadline
            let wait = (ends_at - now).min(read_timeout);
            let read = live
                .port
                .set_timeout(wait)
                .and_then(|_| live.port.read_bytes(&mut chunk));

            match read {
                Ok(0) => std::thread::sleep(POLL_INTERVAL.min(wait)),
                Ok(n) => live.pending.extend_from_slice(&chunk[..n]),
                Err(e) if e.is_no_data() => std::thread::sleep(POLL_INTERVAL.min(wait)),
                Err(source) => {
                    live.pending.clear();
                    return Err(ConnectionError::Read {
                        port: live.port.name().to_string(),
                        source,
                    });
                }
            }
        }
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.state())
            .field("info", &self.info())
            .finish()
    }
}

/// Split the first complete line off `buffer`, without its `\n` or `\r\n`.
fn take_line(buffer: &mut Vec<u8>) -> Option<String> {
    let end = memchr::memchr(b'\n', buffer)?;
    let mut line: Vec<u8> = buffer.drain(..=end).collect();
    line.pop();
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    Some(String::from_utf8_lossy(&line).into_owned())
}

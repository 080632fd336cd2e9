//! Port discovery and setup for tests against a real bench controller.

use dut_bench::config::Config;
use dut_bench::port::{PortConfiguration, BENCH_BAUD_RATE, BENCH_READ_TIMEOUT};
use serialport::{available_ports, SerialPortType};
use std::env;
use std::time::{Duration, Instant};

/// Bench port taken from the environment.
pub struct TestPortConfig {
    pub port_name: String,
    pub baud_rate: u32,
}

impl TestPortConfig {
    /// `DUT_BENCH_TEST_PORT` (required) and `DUT_BENCH_TEST_BAUD`.
    pub fn from_env() -> Option<Self> {
        let port_name = env::var("DUT_BENCH_TEST_PORT").ok()?;
        let baud_rate = env::var("DUT_BENCH_TEST_BAUD")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(BENCH_BAUD_RATE);

        Some(Self {
            port_name,
            baud_rate,
        })
    }

    pub fn to_port_config(&self) -> PortConfiguration {
        PortConfiguration::with_baud(self.baud_rate, BENCH_READ_TIMEOUT)
    }

    /// Production timing, reports under `reports_dir`.
    pub fn bench_config(&self, reports_dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.connection.baud_rate = self.baud_rate;
        config.reports.directory = reports_dir.to_path_buf();
        config
    }
}

/// Print the ports present so a skipped run still tells the operator what to set.
pub fn print_available_ports() {
    let ports = available_ports().unwrap_or_default();
    if ports.is_empty() {
        println!("No serial ports detected on this system");
        return;
    }

    println!("Available serial ports ({}):", ports.len());
    for port in ports {
        let kind = match port.port_type {
            SerialPortType::UsbPort(usb) => format!("USB {:04x}:{:04x}", usb.vid, usb.pid),
            SerialPortType::PciPort => "PCI".into(),
            SerialPortType::BluetoothPort => "Bluetooth".into(),
            SerialPortType::Unknown => "unknown".into(),
        };
        println!("  {} ({kind})", port.port_name);
    }
}

/// Skip helper: returns the config or explains why the test does nothing.
pub fn hardware_or_skip() -> Option<TestPortConfig> {
    let config = TestPortConfig::from_env();
    if config.is_none() {
        println!("Skipping hardware test: DUT_BENCH_TEST_PORT not set");
        print_available_ports();
    }
    config
}

pub struct Stopwatch(Instant);

impl Stopwatch {
    pub fn start() -> Self {
        Self(Instant::now())
    }

    pub fn elapsed(&self) -> Duration {
        self.0.elapsed()
    }
}

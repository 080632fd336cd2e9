//! Shared helpers for the integration tests.
//!
//! - a bench wired to a scripted mock controller
//! - operator record builders
//! - event collection

#![allow(dead_code)]

use dut_bench::config::Config;
use dut_bench::orchestrator::{Bench, BenchEvent, BenchHandle};
use dut_bench::port::{MockPortOpener, MockSerialPort};
use dut_bench::state::OperatorRecord;
use std::path::PathBuf;
use tempfile::TempDir;
use tokio::sync::mpsc;

pub const MOCK_PORT: &str = "MOCK0";

/// Request frame for each slot, as it appears on the wire.
pub const FRAMES: [&[u8]; 5] = [
    b"START;UNUSED;UNUSED;UNUSED;UNUSED\n",
    b"UNUSED;START;UNUSED;UNUSED;UNUSED\n",
    b"UNUSED;UNUSED;START;UNUSED;UNUSED\n",
    b"UNUSED;UNUSED;UNUSED;START;UNUSED\n",
    b"UNUSED;UNUSED;UNUSED;UNUSED;START\n",
];

pub fn filled_record() -> OperatorRecord {
    OperatorRecord {
        operator_name: "Кузнецов А.В.".into(),
        date: "14.03.2025".into(),
        object: "ПС 35 кВ Заречная".into(),
        block_number: "КРУ-10 яч. 6".into(),
        test_place: "Испытательная лаборатория".into(),
        connection_name: "Фидер 6".into(),
    }
}

/// Settings with short timing and reports under `dir`.
pub fn fast_config(dir: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.timing.grace_interval_ms = 50;
    config.timing.response_timeout_ms = 150;
    config.reports.directory = dir.join("reports");
    config
}

/// A running bench whose only port is a scripted mock controller.
pub struct MockBench {
    pub bench: BenchHandle,
    pub events: mpsc::UnboundedReceiver<BenchEvent>,
    /// Shares state with the port the bench opens
    pub port: MockSerialPort,
    pub opener: MockPortOpener,
    pub dir: TempDir,
}

impl MockBench {
    pub fn start() -> Self {
        Self::start_with(|_| {})
    }

    pub fn start_with(tweak: impl FnOnce(&mut Config)) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = fast_config(dir.path());
        tweak(&mut config);

        let opener = MockPortOpener::new();
        let port = opener.add_port(MockSerialPort::new(MOCK_PORT));
        let (bench, events) =
            Bench::spawn(Box::new(opener.clone()), &config).expect("spawn bench worker");

        Self {
            bench,
            events,
            port,
            opener,
            dir,
        }
    }

    pub async fn connected() -> Self {
        let mock = Self::start();
        mock.bench.connect(MOCK_PORT).await.expect("connect mock");
        mock
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.dir.path().join("reports")
    }

    pub fn report_files(&self) -> Vec<PathBuf> {
        match std::fs::read_dir(self.reports_dir()) {
            Ok(entries) => entries.filter_map(|e| e.ok().map(|e| e.path())).collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Events published so far, without waiting.
    pub fn drain_events(&mut self) -> Vec<BenchEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

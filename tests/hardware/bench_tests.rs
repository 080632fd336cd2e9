//! Tests against a real bench controller.
//!
//! ```bash
//! export DUT_BENCH_TEST_PORT=/dev/ttyUSB0   # or COM3
//! export DUT_BENCH_TEST_BAUD=9600           # optional
//! cargo test --features hardware-tests --test integration_hardware -- --ignored
//! ```
//!
//! The controller must be powered and wired to a block under test.

use super::utils::{hardware_or_skip, Stopwatch};
use dut_bench::connection::ConnectionManager;
use dut_bench::orchestrator::{Bench, RunError};
use dut_bench::port::{SerialPortAdapter, SyncSerialPort, SystemPortOpener};
use dut_bench::protocol::{CommandFrame, SlotIndex};
use dut_bench::state::OperatorRecord;
use std::time::Duration;

fn record() -> OperatorRecord {
    OperatorRecord {
        operator_name: "hardware test".into(),
        date: "01.01.2025".into(),
        object: "lab".into(),
        block_number: "0".into(),
        test_place: "bench".into(),
        connection_name: "test".into(),
    }
}

#[test]
#[ignore]
fn test_open_bench_port() {
    let Some(config) = hardware_or_skip() else {
        return;
    };

    let port = SyncSerialPort::open(&config.port_name, &config.to_port_config())
        .expect("open bench port");
    assert_eq!(port.name(), config.port_name);
}

#[test]
#[ignore]
fn test_controller_answers_within_window() {
    let Some(config) = hardware_or_skip() else {
        return;
    };

    let mut connection = ConnectionManager::new(Box::new(SystemPortOpener));
    connection
        .connect(&config.port_name, config.baud_rate)
        .expect("connect");

    let frame = CommandFrame::encode(SlotIndex::new(0).unwrap());
    connection.send(frame.to_line().as_bytes()).expect("send");

    let watch = Stopwatch::start();
    let reply = connection
        .receive_line(Duration::from_secs(3), &|| false)
        .expect("read");
    println!("reply {reply:?} after {:?}", watch.elapsed());
    assert!(reply.is_some(), "controller did not answer");
}

#[tokio::test]
#[ignore]
async fn test_full_run_on_every_slot() {
    let Some(config) = hardware_or_skip() else {
        return;
    };
    let tmp = tempfile::tempdir().unwrap();
    let (bench, _events) =
        Bench::spawn(Box::new(SystemPortOpener), &config.bench_config(tmp.path())).unwrap();
    bench.connect(&config.port_name).await.expect("connect");

    for slot in SlotIndex::all() {
        match bench.run_test(slot, record()).await {
            Ok(report) => println!("slot {slot}: {}", report.interpretation.text),
            Err(RunError::NoResponse { .. }) => println!("slot {slot}: no response"),
            Err(e) => panic!("slot {slot}: {e}"),
        }
    }

    bench.disconnect().await.expect("disconnect");
}

use super::run::{RunRequest, TestReport};
use super::worker::{BusyGuard, Request, Worker};
use super::{BenchEvent, BenchSnapshot, CancelFlag, EventSink, RunError};
use crate::config::{Config, ConfigLoader, ConnectionConfig};
use crate::connection::{ConnectionInfo, ConnectionManager, ConnectionState};
use crate::error::BenchError;
use crate::port::PortOpener;
use crate::protocol::SlotIndex;
use crate::report::ReportGenerator;
use crate::state::{OperatorRecord, SystemState};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};
use uuid::Uuid;

pub struct Bench;

impl Bench {
    /// Start the worker thread.
    ///
    /// The worker stops and closes the port once every handle is dropped.
    pub fn spawn(
        opener: Box<dyn PortOpener>,
        config: &Config,
    ) -> std::io::Result<(BenchHandle, mpsc::UnboundedReceiver<BenchEvent>)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let busy = Arc::new(AtomicBool::new(false));

        let connection =
            ConnectionManager::with_read_timeout(opener, config.connection.read_timeout());
        let worker = Worker {
            state: SystemState::new(connection),
            baud_rate: config.connection.baud_rate,
            timing: config.timing.clone(),
            reports: ReportGenerator::new(&config.reports.directory),
            verdict_rule: config.reports.verdict_rule,
            events: EventSink(event_tx),
            busy: busy.clone(),
        };

        std::thread::Builder::new()
            .name("bench-worker".into())
            .spawn(move || worker.run(rx))?;

        Ok((BenchHandle { tx, busy }, event_rx))
    }
}

/// Cloneable front end of the bench worker.
#[derive(Debug, Clone)]
pub struct BenchHandle {
    tx: mpsc::UnboundedSender<Request>,
    busy: Arc<AtomicBool>,
}

/// A test that has been queued on the worker.
#[derive(Debug)]
pub struct PendingRun {
    pub run_id: Uuid,
    pub slot: SlotIndex,
    cancel: CancelFlag,
    result: oneshot::Receiver<Result<TestReport, RunError>>,
}

impl PendingRun {
    /// Ask the run to stop waiting for the device.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub async fn wait(self) -> Result<TestReport, RunError> {
        self.result.await.map_err(|_| RunError::WorkerStopped)?
    }
}

impl BenchHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Request,
    ) -> Result<T, RunError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .map_err(|_| RunError::WorkerStopped)?;
        rx.await.map_err(|_| RunError::WorkerStopped)
    }

    pub async fn connect(&self, port: &str) -> Result<ConnectionInfo, RunError> {
        let port = port.to_string();
        Ok(self
            .request(|reply| Request::Connect { port, reply })
            .await??)
    }

    pub async fn disconnect(&self) -> Result<(), RunError> {
        Ok(self.request(|reply| Request::Disconnect { reply }).await??)
    }

    /// Disconnect when connected, otherwise connect to `port`.
    pub async fn toggle_connection(&self, port: &str) -> Result<ConnectionState, RunError> {
        let port = port.to_string();
        Ok(self
            .request(|reply| Request::Toggle { port, reply })
            .await??)
    }

    /// Queue a test on `slot`.
    ///
    /// Fails with [`RunError::Busy`] while another test is queued or running.
    pub fn start_test(
        &self,
        slot: SlotIndex,
        record: OperatorRecord,
    ) -> Result<PendingRun, RunError> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!(%slot, "Test rejected, another test is in progress");
            return Err(RunError::Busy);
        }
        let busy = BusyGuard(self.busy.clone());

        let run_id = Uuid::new_v4();
        let cancel = CancelFlag::default();
        let (reply, result) = oneshot::channel();
        let run = RunRequest {
            run_id,
            slot,
            record,
            cancel: cancel.clone(),
        };

        // On failure the request, and with it the guard, is dropped here
        self.tx
            .send(Request::Run { run, busy, reply })
            .map_err(|_| RunError::WorkerStopped)?;

        Ok(PendingRun {
            run_id,
            slot,
            cancel,
            result,
        })
    }

    pub async fn run_test(
        &self,
        slot: SlotIndex,
        record: OperatorRecord,
    ) -> Result<TestReport, RunError> {
        self.start_test(slot, record)?.wait().await
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub async fn snapshot(&self) -> Result<BenchSnapshot, RunError> {
        self.request(|reply| Request::Snapshot { reply }).await
    }

    /// Read one line from the device, in turn with tests.
    pub async fn sample_line(&self, deadline: Duration) -> Result<Option<String>, RunError> {
        Ok(self
            .request(|reply| Request::Sample { deadline, reply })
            .await??)
    }

    /// Write a report from the current slot table without running a test.
    pub async fn generate_report(&self, record: OperatorRecord) -> Result<PathBuf, RunError> {
        self.request(|reply| Request::Report { record, reply })
            .await?
    }

    /// Connect to the remembered port if auto-connect is on.
    ///
    /// Returns `None` when there was nothing to do.
    pub async fn auto_connect(
        &self,
        settings: &ConnectionConfig,
    ) -> Option<Result<ConnectionInfo, RunError>> {
        let port = settings.port().filter(|_| settings.auto_connect)?;
        info!(port, "Auto-connecting");
        Some(self.connect(port).await)
    }

    /// Remember `port` in the settings file and, with auto-connect on,
    /// switch the live connection over to it.
    pub async fn select_port(
        &self,
        settings: &mut ConfigLoader,
        port: &str,
    ) -> Result<Option<ConnectionInfo>, BenchError> {
        settings.set_selected_port(port)?;
        if !settings.config().connection.auto_connect {
            return Ok(None);
        }

        let current = self.snapshot().await?.info;
        match current {
            Some(info) if info.port_id == port => return Ok(Some(info)),
            Some(_) => self.disconnect().await?,
            None => {}
        }
        Ok(Some(self.connect(port).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionError;
    use crate::port::{MockPortOpener, MockSerialPort};
    use crate::state::SlotOutcome;

    fn quick_config(dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.timing.grace_interval_ms = 0;
        config.timing.response_timeout_ms = 200;
        config.reports.directory = dir.join("reports");
        config
    }

    fn record() -> OperatorRecord {
        OperatorRecord {
            operator_name: "Смирнов".into(),
            date: "05.05.2025".into(),
            object: "КТП-4".into(),
            block_number: "1".into(),
            test_place: "Стенд 2".into(),
            connection_name: "Отходящая 3".into(),
        }
    }

    #[tokio::test]
    async fn test_connect_and_toggle() {
        let tmp = tempfile::tempdir().unwrap();
        let opener = MockPortOpener::new();
        opener.add_port(MockSerialPort::new("COM3"));
        let (bench, mut events) =
            Bench::spawn(Box::new(opener), &quick_config(tmp.path())).unwrap();

        let info = bench.connect("COM3").await.unwrap();
        assert_eq!(info.baud_rate, 9600);
        assert!(matches!(
            events.recv().await,
            Some(BenchEvent::ConnectionChanged {
                state: ConnectionState::Connected,
                ..
            })
        ));

        let state = bench.toggle_connection("COM3").await.unwrap();
        assert_eq!(state, ConnectionState::Disconnected);
        let state = bench.toggle_connection("COM3").await.unwrap();
        assert_eq!(state, ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_connect_twice_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let opener = MockPortOpener::new();
        opener.add_port(MockSerialPort::new("COM3"));
        let (bench, _events) = Bench::spawn(Box::new(opener), &quick_config(tmp.path())).unwrap();

        bench.connect("COM3").await.unwrap();
        let err = bench.connect("COM3").await.unwrap_err();
        assert!(matches!(
            err,
            RunError::Connection(ConnectionError::AlreadyConnected(_))
        ));
    }

    #[tokio::test]
    async fn test_second_start_is_busy() {
        let tmp = tempfile::tempdir().unwrap();
        let opener = MockPortOpener::new();
        let port = opener.add_port(MockSerialPort::new("COM3"));
        let (bench, _events) = Bench::spawn(Box::new(opener), &quick_config(tmp.path())).unwrap();
        bench.connect("COM3").await.unwrap();

        let slot = SlotIndex::new(1).unwrap();
        let first = bench.start_test(slot, record()).unwrap();
        assert!(matches!(
            bench.start_test(slot, record()),
            Err(RunError::Busy)
        ));

        // silent device: the first run times out and frees the bench
        assert!(matches!(
            first.wait().await,
            Err(RunError::NoResponse { .. })
        ));
        assert!(!bench.is_busy());
        assert_eq!(port.writes().len(), 1);

        port.reply_to_any_write(b"OK\n");
        let report = bench.run_test(slot, record()).await.unwrap();
        assert_eq!(report.interpretation.outcome, SlotOutcome::Ok);
    }

    #[tokio::test]
    async fn test_cancel_while_waiting() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = quick_config(tmp.path());
        config.timing.response_timeout_ms = 5_000;
        let opener = MockPortOpener::new();
        opener.add_port(MockSerialPort::new("COM3"));
        let (bench, _events) = Bench::spawn(Box::new(opener), &config).unwrap();
        bench.connect("COM3").await.unwrap();

        let pending = bench.start_test(SlotIndex::new(0).unwrap(), record()).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        pending.cancel();

        let started = std::time::Instant::now();
        assert!(matches!(pending.wait().await, Err(RunError::Cancelled(_))));
        assert!(started.elapsed() < Duration::from_secs(2));

        let snapshot = bench.snapshot().await.unwrap();
        assert_eq!(snapshot.slots[0].outcome, SlotOutcome::Unknown);
    }

    #[tokio::test]
    async fn test_sample_line_and_manual_report() {
        let tmp = tempfile::tempdir().unwrap();
        let opener = MockPortOpener::new();
        let port = opener.add_port(MockSerialPort::new("COM3"));
        let (bench, _events) = Bench::spawn(Box::new(opener), &quick_config(tmp.path())).unwrap();
        bench.connect("COM3").await.unwrap();

        port.enqueue_read(b"U=229.8\n");
        let line = bench.sample_line(Duration::from_millis(200)).await.unwrap();
        assert_eq!(line.as_deref(), Some("U=229.8"));
        assert_eq!(bench.sample_line(Duration::from_millis(20)).await.unwrap(), None);

        let path = bench.generate_report(record()).await.unwrap();
        assert!(path.exists());
        assert_eq!(bench.snapshot().await.unwrap().last_report, Some(path));

        let err = bench
            .generate_report(OperatorRecord::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::Validation(_)));
    }

    #[tokio::test]
    async fn test_unbounded_sample_deadline_keeps_worker_alive() {
        let tmp = tempfile::tempdir().unwrap();
        let opener = MockPortOpener::new();
        let port = opener.add_port(MockSerialPort::new("COM3"));
        let (bench, _events) = Bench::spawn(Box::new(opener), &quick_config(tmp.path())).unwrap();
        bench.connect("COM3").await.unwrap();

        port.enqueue_read(b"U=231.0\n");
        let line = bench.sample_line(Duration::MAX).await.unwrap();
        assert_eq!(line.as_deref(), Some("U=231.0"));

        let snapshot = bench.snapshot().await.unwrap();
        assert_eq!(snapshot.connection, ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_select_port_with_auto_connect() {
        let tmp = tempfile::tempdir().unwrap();
        let opener = MockPortOpener::new();
        opener.add_port(MockSerialPort::new("COM3"));
        opener.add_port(MockSerialPort::new("COM4"));
        let (bench, _events) = Bench::spawn(Box::new(opener), &quick_config(tmp.path())).unwrap();

        let mut settings = ConfigLoader::with_defaults(tmp.path().join("settings.toml"));
        assert_eq!(bench.select_port(&mut settings, "COM3").await.unwrap(), None);

        settings.set_auto_connect(true).unwrap();
        let info = bench
            .select_port(&mut settings, "COM4")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(info.port_id, "COM4");

        let reloaded = ConfigLoader::load_from(settings.path()).unwrap();
        assert_eq!(reloaded.config().connection.port(), Some("COM4"));
        // already on COM4, so auto-connect has nothing left to open
        assert!(matches!(
            bench.auto_connect(&reloaded.config().connection).await,
            Some(Err(RunError::Connection(ConnectionError::AlreadyConnected(_))))
        ));
    }

    #[tokio::test]
    async fn test_worker_gone() {
        let tmp = tempfile::tempdir().unwrap();
        let (bench, events) =
            Bench::spawn(Box::new(MockPortOpener::new()), &quick_config(tmp.path())).unwrap();
        drop(events);
        let clone = bench.clone();
        drop(bench);

        // The clone keeps the worker alive
        assert!(clone.snapshot().await.is_ok());
    }
}

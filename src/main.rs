use clap::{Args, Parser, Subcommand};
use dut_bench::config::{ConfigLoader, LogFormat, LoggingConfig};
use dut_bench::connection::list_ports;
use dut_bench::orchestrator::{Bench, BenchEvent, BenchHandle};
use dut_bench::port::SystemPortOpener;
use dut_bench::protocol::SlotIndex;
use dut_bench::state::OperatorRecord;
use dut_bench::{BenchError, BenchResult};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "dut-bench",
    version,
    about = "Runs bench controller tests over a serial line and writes test protocols."
)]
struct Cli {
    /// Settings file to use instead of the default location.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List serial ports present on this machine.
    Ports {
        #[arg(long)]
        json: bool,
    },
    /// Run one of the five tests and write a report.
    Run {
        /// Test number, 1 to 5.
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
        slot: u8,
        /// Port to use instead of the selected one.
        #[arg(long)]
        port: Option<String>,
        #[command(flatten)]
        record: RecordArgs,
        #[arg(long)]
        json: bool,
    },
    /// Write a report without running a test.
    ///
    /// Each invocation starts a fresh bench, so every slot reads as not run
    /// and the report always carries the failure verdict. Use `run` to test
    /// and report in one go.
    Report {
        #[command(flatten)]
        record: RecordArgs,
    },
    /// Read one line from the controller (e.g. the mains voltage readout).
    Sample {
        #[arg(long)]
        port: Option<String>,
        #[arg(long, default_value_t = 2000)]
        timeout_ms: u64,
    },
    /// Show or change the stored settings.
    Config {
        /// Remember this port.
        #[arg(long)]
        set_port: Option<String>,
        #[arg(long)]
        auto_connect: Option<bool>,
    },
}

/// Operator record fields.
#[derive(Args, Debug)]
struct RecordArgs {
    #[arg(long, default_value = "")]
    operator: String,
    /// Test date, DD.MM.YYYY; today if omitted.
    #[arg(long)]
    date: Option<String>,
    #[arg(long, default_value = "")]
    object: String,
    #[arg(long, default_value = "")]
    block: String,
    #[arg(long, default_value = "")]
    place: String,
    #[arg(long, default_value = "")]
    connection_name: String,
}

impl From<RecordArgs> for OperatorRecord {
    fn from(args: RecordArgs) -> Self {
        let today = OperatorRecord::dated_today();
        Self {
            operator_name: args.operator,
            date: args.date.unwrap_or(today.date),
            object: args.object,
            block_number: args.block,
            test_place: args.place,
            connection_name: args.connection_name,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match cli.config {
        Some(ref path) => ConfigLoader::load_from(path),
        None => ConfigLoader::load(),
    };
    let mut settings = match settings {
        Ok(settings) => settings,
        Err(e) => {
            init_tracing(&LoggingConfig::default());
            error!(error = %e, "Failed to load settings");
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&settings.config().logging);
    debug!(path = %settings.path().display(), "Settings loaded");

    match dispatch(cli.command, &mut settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if !e.is_user_error() {
                error!(error = %e, "Command failed");
            }
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr so `--json` output stays clean. `RUST_LOG` wins over
/// the configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let _ = match logging.format {
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
    };
}

async fn dispatch(command: Command, settings: &mut ConfigLoader) -> BenchResult<()> {
    match command {
        Command::Ports { json } => {
            let ports = list_ports()?;
            if json {
                print_json(&ports);
            } else if ports.is_empty() {
                println!("no serial ports found");
            } else {
                for port in ports {
                    println!("{}\t{}", port.port_name, port.kind);
                }
            }
            Ok(())
        }
        Command::Run {
            slot,
            port,
            record,
            json,
        } => {
            let slot = SlotIndex::new(usize::from(slot) - 1)?;
            let bench = open_bench(settings, port.as_deref()).await?;
            let report = bench.run_test(slot, record.into()).await?;

            if json {
                print_json(&report);
            } else {
                println!("Тест {}: {}", slot.get() + 1, report.interpretation.text);
                match (&report.report_path, &report.report_error) {
                    (Some(path), _) => println!("report: {}", path.display()),
                    (None, Some(e)) => eprintln!("report not written: {e}"),
                    (None, None) => {}
                }
            }
            Ok(())
        }
        Command::Report { record } => {
            let bench = spawn_bench(settings)?;
            let path = bench.generate_report(record.into()).await?;
            println!("{}", path.display());
            Ok(())
        }
        Command::Sample { port, timeout_ms } => {
            let bench = open_bench(settings, port.as_deref()).await?;
            match bench.sample_line(Duration::from_millis(timeout_ms)).await? {
                Some(line) => println!("{line}"),
                None => eprintln!("nothing received"),
            }
            Ok(())
        }
        Command::Config {
            set_port,
            auto_connect,
        } => {
            if let Some(port) = set_port {
                settings.set_selected_port(port)?;
            }
            if let Some(enabled) = auto_connect {
                settings.set_auto_connect(enabled)?;
            }
            println!("# {}", settings.path().display());
            let text = toml::to_string_pretty(settings.config())
                .map_err(dut_bench::config::ConfigError::from)?;
            print!("{text}");
            Ok(())
        }
    }
}

fn spawn_bench(settings: &ConfigLoader) -> BenchResult<BenchHandle> {
    let (bench, events) = Bench::spawn(Box::new(SystemPortOpener), settings.config())?;
    tokio::spawn(log_events(events));
    Ok(bench)
}

/// Spawn the bench and connect to `port`, or auto-connect to the selected one.
async fn open_bench(settings: &ConfigLoader, port: Option<&str>) -> BenchResult<BenchHandle> {
    let bench = spawn_bench(settings)?;
    match port {
        Some(port) => {
            bench.connect(port).await?;
        }
        None => {
            bench
                .auto_connect(&settings.config().connection)
                .await
                .ok_or(BenchError::NoPort)??;
        }
    }
    Ok(bench)
}

async fn log_events(mut events: mpsc::UnboundedReceiver<BenchEvent>) {
    while let Some(event) = events.recv().await {
        match &event {
            BenchEvent::RunPhaseChanged { phase, .. } if phase.is_terminal() => {
                info!(?event, "Run finished")
            }
            _ => debug!(?event, "Bench event"),
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(e) => eprintln!("failed to encode output: {e}"),
    }
}

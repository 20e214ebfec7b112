//! probescope - command line front end
//!
//! Connects to the probe service, optionally builds, flashes or erases,
//! streams the requested variables for a while and writes a CSV export.

use anyhow::{bail, Context};
use clap::Parser;
use probescope::backend::parse_compile_output;
use probescope::config::{ensure_app_data_dir, ConsoleConfig};
use probescope::{ConsoleEvent, Orchestrator, Transport};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "probescope", version, about = "Device session and live telemetry console")]
struct Args {
    /// Configuration file (defaults to the app data directory)
    #[arg(short, long, env = "PROBESCOPE_CONFIG")]
    config: Option<PathBuf>,

    /// Print a default configuration and exit
    #[arg(long)]
    generate_config: bool,

    /// Chip family to connect to (e.g. stm32f1)
    #[arg(long)]
    chip: Option<String>,

    /// Debug transport
    #[arg(long, default_value = "swd")]
    transport: Transport,

    /// Build this project after connecting
    #[arg(long)]
    project: Option<String>,

    /// Flash the build after a successful compile
    #[arg(long, requires = "project")]
    flash: bool,

    /// Erase the whole chip before anything else
    #[arg(long)]
    erase: bool,

    /// Variable to watch (repeatable)
    #[arg(short, long = "watch")]
    watch: Vec<String>,

    /// How long to stream, in seconds
    #[arg(long, default_value_t = 10)]
    duration: u64,

    /// Directory for the CSV export (skipped if not given)
    #[arg(long)]
    export_dir: Option<PathBuf>,

    /// Also write daily log files to the app data directory
    #[arg(long)]
    log_to_file: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.generate_config {
        println!("{}", ConsoleConfig::default().to_toml()?);
        return Ok(());
    }

    let _log_guard = init_logging(args.log_to_file)?;
    info!("Starting probescope v{}", env!("CARGO_PKG_VERSION"));

    let config = match &args.config {
        Some(path) => ConsoleConfig::load(path)?,
        None => ConsoleConfig::load_or_default(ConsoleConfig::default_path()),
    };
    let Some(chip) = args.chip.as_deref() else {
        bail!("--chip is required");
    };

    let console = Orchestrator::from_config(config).context("Invalid configuration")?;
    let events = console.subscribe();

    let result = run(&console, &args, chip).await;

    info!("Shutting down...");
    console.shutdown().await;
    for event in events.drain() {
        if let ConsoleEvent::OperationFailed { operation, message } = event {
            warn!("{} failed: {}", operation, message);
        }
    }
    result
}

async fn run(console: &Orchestrator, args: &Args, chip: &str) -> anyhow::Result<()> {
    let session = console.connect(chip, args.transport).await?;
    println!(
        "Connected: session {} ({} over {})",
        session.session_id, session.chip_family, session.transport
    );
    if let Some(info) = &session.probe.chip_info {
        println!("  Target: {}", info);
    }

    if args.erase {
        let erased = console.erase().await?;
        println!("Erased in {} ms", erased.time_ms);
    }

    if let Some(project) = &args.project {
        let artifact = console.build(project).await.map_err(|e| {
            if let Some(output) = e.diagnostics() {
                let parsed = parse_compile_output(output);
                if parsed.errors.is_empty() {
                    eprintln!("{}", output);
                }
                for diagnostic in parsed.errors.iter().chain(&parsed.warnings) {
                    eprintln!("{}", diagnostic);
                }
            }
            e
        })?;
        for diagnostic in artifact.errors.iter().chain(&artifact.warnings) {
            eprintln!("{}", diagnostic);
        }
        println!("Built {}: {:?}", project, artifact.output_files);
        if let Some(usage) = artifact.memory_usage {
            println!(
                "  Flash {:.1}%  RAM {:.1}%",
                usage.flash_percent(),
                usage.ram_percent()
            );
        }

        if args.flash {
            let flashed = console.flash().await?;
            println!(
                "Flashed {} ({} bytes at {:#010x}, verified: {}) in {} ms",
                flashed.file, flashed.size, flashed.address, flashed.verified, flashed.time_ms
            );
        }
    }

    if args.watch.is_empty() {
        return Ok(());
    }
    for name in &args.watch {
        console.add_variable(name)?;
    }
    console.start_watch().await?;
    console.configure_waveform().await?;
    info!("Streaming for {} s", args.duration);

    tokio::select! {
        _ = console.run_telemetry() => warn!("Telemetry socket closed early"),
        _ = tokio::time::sleep(Duration::from_secs(args.duration)) => {}
    }

    for name in &args.watch {
        if let Some(var) = console.variable(name) {
            let (min, max, avg) = var.buffer().clone().recalculate_statistics();
            println!(
                "{}: {} samples, current {:?}, min {:.3}, max {:.3}, avg {:.3}",
                name,
                var.buffer().len(),
                var.current_value,
                min,
                max,
                avg
            );
        }
    }

    if let Some(dir) = &args.export_dir {
        let path = console.write_csv(dir)?;
        println!("Exported {}", path.display());
    }
    Ok(())
}

/// Console logging, plus a daily rolling file when requested
fn init_logging(to_file: bool) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,probescope=debug"));
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    if to_file {
        let dir = ensure_app_data_dir()?.join("logs");
        let appender = tracing_appender::rolling::daily(dir, "probescope.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(writer),
            )
            .init();
        Ok(Some(guard))
    } else {
        registry.init();
        Ok(None)
    }
}

//! echobeats — phase-synchronized lane scheduler
//!
//! Usage:
//!   echobeats run                          → run until ctrl-c, one block per step
//!   echobeats run --steps 24 --json        → bounded run, JSON lines
//!   echobeats run --fail-lane relevance --fail-from 5
//!                                          → fault drill on one lane
//!   echobeats dump-config                  → print the default config as TOML
//!   echobeats version                      → show version

use clap::{Args, Parser, Subcommand};
use echobeats::format::{format_report, format_snapshot, FormatOptions};
use echobeats_core::{LaneId, Step};
use echobeats_handlers::{create_default_registry, inject_fault, FaultKind};
use echobeats_runtime::{Scheduler, SchedulerConfig};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "echobeats",
    about = "Five-lane phase-synchronized cooperative scheduler",
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler with the built-in handlers
    Run(RunArgs),
    /// Print the default configuration as TOML
    DumpConfig,
    /// Show version
    Version,
}

#[derive(Args)]
struct RunArgs {
    /// Path to scheduler config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Stop after this many steps
    #[arg(short, long)]
    steps: Option<u64>,

    /// Step duration in milliseconds
    #[arg(long)]
    step_ms: Option<u64>,

    /// Handler timeout in milliseconds (default: a quarter of --step-ms)
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Print snapshots and the final report as JSON lines
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Print handler payloads under each lane
    #[arg(long, default_value_t = false)]
    payloads: bool,

    /// Make this lane's handlers fail (affordance, relevance, salience, opponent, narrative)
    #[arg(long)]
    fail_lane: Option<LaneId>,

    /// First step at which the injected fault applies
    #[arg(long, default_value_t = 0)]
    fail_from: u64,

    /// Injected fault hangs instead of returning an error
    #[arg(long, default_value_t = false)]
    hang: bool,

    /// Write logs to a file (in addition to stderr)
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run(args).await?,
        Commands::DumpConfig => print!("{}", SchedulerConfig::default().to_toml()),
        Commands::Version => println!("echobeats v{}", env!("CARGO_PKG_VERSION")),
    }

    Ok(())
}

/// Logs go to stderr so stdout stays clean for snapshots. The returned
/// guard flushes the file writer and must live until exit.
fn init_tracing(log_file: Option<&Path>) -> Option<WorkerGuard> {
    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .map(|n| n.to_os_string())
                .unwrap_or_else(|| "echobeats.log".into());
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "echobeats=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    guard
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    let _guard = init_tracing(args.log_file.as_deref());

    let mut config = match &args.config {
        Some(path) => SchedulerConfig::load(path),
        None => SchedulerConfig::default(),
    };
    if let Some(steps) = args.steps {
        config.max_steps = Some(steps);
    }
    if let Some(ms) = args.step_ms {
        config.step_duration_ms = ms;
        if args.timeout_ms.is_none() {
            config.handler_timeout_ms = (ms / 4).max(1);
        }
    }
    if let Some(ms) = args.timeout_ms {
        config.handler_timeout_ms = ms;
    }

    let mut registry = create_default_registry();
    if let Some(lane) = args.fail_lane {
        let kind = if args.hang {
            FaultKind::Hang
        } else {
            FaultKind::Error
        };
        inject_fault(&mut registry, lane, Step(args.fail_from), kind);
    }

    let scheduler = Scheduler::new(config, registry)?;
    let opts = FormatOptions {
        json: args.json,
        show_payloads: args.payloads,
        ..Default::default()
    };

    let mut stream = scheduler.subscribe();
    let handle = scheduler.start();

    let cancel = handle.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, stopping");
            cancel.cancel();
        }
    });

    while let Some(delivery) = stream.recv().await {
        if delivery.dropped > 0 {
            tracing::warn!(dropped = delivery.dropped, "output fell behind, snapshots skipped");
        }
        if opts.json {
            println!("{}", format_snapshot(&delivery.snapshot, &opts));
        } else {
            print!("{}", format_snapshot(&delivery.snapshot, &opts));
        }
    }

    let report = handle.join().await?;
    if opts.json {
        println!("{}", format_report(&report, &opts));
    } else {
        print!("\n{}", format_report(&report, &opts));
    }
    Ok(())
}

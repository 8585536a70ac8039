use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use vitals_sdk::{
    BudgetReport, InteractionKind, LoaderStatus, Output, Session, TeardownFlush, TeardownReason,
};

mod duration;
mod replay;
mod settings;

use settings::CliConfig;

/// Time given to the dispatcher to finish in-flight sends before exit.
const DRAIN_GRACE: Duration = Duration::from_millis(250);

#[derive(Parser, Debug)]
#[command(name = "vitals")]
#[command(about = "Replay recorded performance entries through a vitals session")]
struct Args {
    /// Recorded performance entries, one JSON object per line
    entries: PathBuf,

    /// TOML config with session settings and the bundle manifest
    #[arg(short = 'f', long)]
    config: Option<PathBuf>,

    /// Append batches to a file as newline-delimited JSON
    #[arg(short, long, conflicts_with = "connect")]
    output: Option<PathBuf>,

    /// Send batches to a TCP collector (host:port)
    #[arg(short, long, conflicts_with = "output")]
    connect: Option<String>,

    /// Override the batch size from config
    #[arg(long)]
    batch_size: Option<usize>,

    /// Override the flush interval (e.g., "10s", "500ms")
    #[arg(long)]
    flush_interval: Option<String>,

    /// Simulate a first user interaction once entries are replayed
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    interact: bool,

    /// How long idle-time preloading may run before teardown (e.g., "2s")
    #[arg(long, default_value = "2s")]
    settle: String,

    /// Write the loader status and budget report to a JSON file
    #[arg(short, long)]
    report: Option<PathBuf>,
}

/// Summary written at the end of a replay.
#[derive(Debug, Serialize)]
struct Report {
    session_id: String,
    entries: usize,
    loader: LoaderStatus,
    budget: BudgetReport,
    teardown: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Batches may go to stdout, so logs stay on stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;
    let settle = duration::parse_duration(&args.settle)?;

    let report = run(&args, config, settle).await?;

    match &args.report {
        Some(path) => write_report(path, &report)?,
        None => info!(
            loaded = report.loader.loaded.len(),
            failed = report.loader.failed.len(),
            score = report.budget.score,
            within_budget = report.budget.is_within_budget(),
            "replay finished"
        ),
    }
    Ok(())
}

/// Merge command-line overrides into the loaded configuration.
fn load_config(args: &Args) -> Result<CliConfig> {
    let mut config = CliConfig::load(args.config.as_deref())?;

    if let Some(size) = args.batch_size {
        config.session.batcher.batch_size = size;
    }
    if let Some(ref interval) = args.flush_interval {
        let interval = duration::parse_duration(interval)?;
        config.session.batcher.flush_interval_ms = interval.as_millis() as u64;
    }
    Ok(config)
}

fn output_for(args: &Args) -> Output {
    if let Some(ref path) = args.output {
        return Output::file(path);
    }
    if let Some(ref addr) = args.connect {
        return Output::tcp(addr);
    }
    Output::Stdout
}

async fn run(args: &Args, config: CliConfig, settle: Duration) -> Result<Report> {
    let entries = replay::read_entries(&args.entries).await?;

    let session = Session::builder()
        .config(config.session)
        .bundles(config.bundles.iter().map(|b| b.descriptor()))
        .output(output_for(args))
        .build();
    let handle = session.start();
    info!(session = session.id(), entries = entries.len(), "replaying entries");

    let count = entries.len();
    for entry in entries {
        session.monitor().observe(entry);
    }

    if args.interact {
        session.interaction_signal().notify(InteractionKind::Click);
    }

    tokio::time::sleep(settle).await;

    let budget = session.monitor().budget();
    session.teardown_signal().fire(TeardownReason::Unload);
    let outcome = handle.shutdown();
    if let TeardownFlush::Dropped { metrics } = outcome {
        warn!(metrics, "teardown batch could not be delivered");
    }

    tokio::time::sleep(DRAIN_GRACE).await;

    Ok(Report {
        session_id: session.id().to_string(),
        entries: count,
        loader: session.loader().status(),
        budget,
        teardown: format!("{:?}", outcome),
    })
}

fn write_report(path: &Path, report: &Report) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write report to {}", path.display()))?;
    info!(path = %path.display(), "report written");
    Ok(())
}

//! Convoy detector - finds vehicles travelling together in ALPR reads
//!
//! Loads one case's reads and the reader directory, runs convoy detection and
//! writes the JSON report to a file or stdout.
//!
//! Module structure:
//! - `domain/` - Core types (reads, readers, pairs, results, errors)
//! - `io/` - File-backed read source, reader directory and report writer
//! - `services/` - Detection pipeline and runner
//! - `infra/` - Infrastructure (Config, Metrics)

use anyhow::Context;
use clap::Parser;
use convoy_detector::domain::DetectionError;
use convoy_detector::infra::{Config, Metrics};
use convoy_detector::io::{InMemoryReaderDirectory, JsonlReadSource, ReportTarget, ReportWriter};
use convoy_detector::services::{block_on_detached, DetectionLimits, DetectionRunner};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Convoy detector - co-travelling vehicle analysis over ALPR reads
#[derive(Parser, Debug)]
#[command(name = "convoy-detector", version, about)]
struct Args {
    /// Path to TOML configuration file (default: $CONFIG_FILE or config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// JSONL file of ALPR reads
    #[arg(long)]
    reads: Option<String>,

    /// JSON array of reader metadata
    #[arg(long)]
    readers: Option<String>,

    /// Only use reads belonging to this case
    #[arg(long)]
    case_id: Option<i64>,

    /// Only report pairs containing this plate
    #[arg(long)]
    target_plate: Option<String>,

    /// Co-travel window in seconds
    #[arg(long, allow_hyphen_values = true)]
    window_seconds: Option<i64>,

    /// Minimum distinct readers/days for a pair to be reported
    #[arg(long, allow_hyphen_values = true)]
    min_coincidences: Option<i64>,

    /// First day to include (YYYY-MM-DD)
    #[arg(long)]
    date_from: Option<String>,

    /// Last day to include, whole day (YYYY-MM-DD)
    #[arg(long)]
    date_to: Option<String>,

    /// Earliest time of day to include (HH:MM)
    #[arg(long)]
    time_from: Option<String>,

    /// Latest time of day to include (HH:MM)
    #[arg(long)]
    time_to: Option<String>,

    /// Report file (stdout when omitted)
    #[arg(short, long)]
    output: Option<String>,
}

fn main() -> ExitCode {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Logs go to stderr so stdout stays clean for the report
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    info!(
        version = %env!("CARGO_PKG_VERSION"),
        commit = %env!("CONVOY_BUILD_COMMIT"),
        "convoy_detector_starting"
    );

    let args = Args::parse();

    // A timed-out detection worker keeps running on the blocking pool; the
    // runtime is shut down without waiting for it so the process exits now
    let result = match block_on_detached(run(args)) {
        Ok(result) => result,
        Err(e) => {
            error!(error = %e, "runtime_start_failed");
            return ExitCode::from(1);
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let (kind, code) = match e.downcast_ref::<DetectionError>() {
                Some(err) if err.is_client_error() => (err.kind(), 2),
                Some(err) => (err.kind(), 1),
                None => ("io", 1),
            };
            error!(kind = %kind, error = %format!("{e:#}"), "convoy_detector_failed");
            ExitCode::from(code)
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config_path = args.config.clone().unwrap_or_else(|| Config::resolve_config_path(&[]));
    let config = Config::load_from_path(&config_path);
    config.validate()?;

    info!(
        config_file = %config.config_file(),
        window_secs = %config.window_seconds(),
        min_coincidences = %config.min_coincidences(),
        max_events = %config.max_events(),
        max_events_per_window = %config.max_events_per_window(),
        timeout_secs = %config.timeout_secs(),
        "config_loaded"
    );

    // CLI flags override the config file
    let mut request = config.detection_request();
    if let Some(window_seconds) = args.window_seconds {
        request.window_seconds = window_seconds;
    }
    if let Some(min_coincidences) = args.min_coincidences {
        request.min_coincidences = min_coincidences;
    }
    request.target_plate = args.target_plate;
    request.date_from = args.date_from;
    request.date_to = args.date_to;
    request.time_from = args.time_from;
    request.time_to = args.time_to;

    let reads_path = args
        .reads
        .or_else(|| config.reads_file().map(str::to_string))
        .context("No reads file given (--reads or [input].reads)")?;
    let readers_path = args
        .readers
        .or_else(|| config.readers_file().map(str::to_string))
        .context("No reader directory given (--readers or [input].readers)")?;
    let case_id = args.case_id.or(config.case_id());
    let output = args.output.or_else(|| config.output_file().map(str::to_string));

    let directory = Arc::new(InMemoryReaderDirectory::from_file(&readers_path)?);
    let provider = JsonlReadSource::new(&reads_path);

    let metrics = Arc::new(Metrics::new());

    // Start metrics reporter (lock-free reads with full summary)
    let metrics_interval = config.metrics_interval_secs();
    if metrics_interval > 0 {
        let metrics_clone = metrics.clone();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
            loop {
                interval.tick().await;
                metrics_clone.report().log();
            }
        });
    }

    let runner = DetectionRunner::new(DetectionLimits::from_config(&config), metrics.clone());
    let outcome = runner.run_request(&request, &provider, case_id, directory).await;
    metrics.report().log();
    let outcome = outcome?;

    let writer = ReportWriter::new(ReportTarget::from_arg(output.as_deref()), config.pretty());
    writer
        .write(&outcome.run_id, &outcome.report)
        .context("Failed to write detection report")?;

    info!(
        run_id = %outcome.run_id,
        flagged_plates = %outcome.report.result.flagged_plates.len(),
        target_reads = %outcome.report.result.target_reads.len(),
        details = %outcome.report.result.details.len(),
        reads_skipped_malformed = %outcome.load_stats.skipped_malformed,
        "convoy_detector_done"
    );
    Ok(())
}

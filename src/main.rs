//! tokenmeter - measure the token cost of a source tree.
//!
//! Usage:
//!   tkm [PATH]                   Scan and print a cost summary
//!   tkm [PATH] --format json     Machine-readable report
//!   tkm [PATH] --include '**/*.rs' --ignore '*.lock'
//!   tkm --help                   Show help

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{ArgAction, Parser, ValueEnum};
use color_eyre::eyre::{Context, Result, bail};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tokenmeter_analyze::{AggregateConfig, Aggregator, CostReport, format_text};
use tokenmeter_core::{
    ByteRatioEstimator, DEFAULT_DIR_CONCURRENCY, DEFAULT_SAMPLE_SIZE, DiscoveryResult, ScanRequest,
};
use tokenmeter_scan::{ConcurrencyLimiter, DisplayMode, Scanner};

/// Log targets raised by `-v`. Binary targets follow the binary name.
const LOG_TARGETS: &[&str] = &[
    "tkm",
    "tokenmeter",
    "tokenmeter_core",
    "tokenmeter_scan",
    "tokenmeter_analyze",
];

/// Exit code when the scan was cancelled and the report is partial.
const EXIT_PARTIAL: u8 = 2;

#[derive(Parser)]
#[command(
    name = "tokenmeter",
    version,
    about = "Measure the token cost of a source tree",
    long_about = "tokenmeter walks a directory, estimates the token count of every file \
                  and reports totals by extension, by directory and the most expensive files.\n\n\
                  Build and VCS directories (target, node_modules, .git, ...) are always skipped."
)]
struct Cli {
    /// Directory to scan (defaults to current directory)
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Number of most expensive files to show
    #[arg(short = 'n', long, default_value = "10")]
    top: usize,

    /// Only count files whose path matches this glob (repeatable)
    #[arg(short, long, value_name = "GLOB")]
    include: Vec<String>,

    /// Skip files and directories whose name matches this glob (repeatable)
    #[arg(short = 'x', long, value_name = "GLOB")]
    ignore: Vec<String>,

    /// Skip hidden files and directories
    #[arg(long)]
    no_hidden: bool,

    /// Concurrent directory listings
    #[arg(long, default_value_t = DEFAULT_DIR_CONCURRENCY)]
    dir_concurrency: usize,

    /// Concurrent file reads (defaults to a multiple of the CPU count)
    #[arg(long)]
    io_concurrency: Option<usize>,

    /// Files above this size are estimated from their size (e.g., "512KB", "10MB")
    #[arg(long, default_value = "10MB")]
    max_file_size: String,

    /// File sizes sampled during discovery
    #[arg(long, default_value_t = DEFAULT_SAMPLE_SIZE)]
    sample_size: usize,

    /// Skip the discovery pass (no total or ETA in progress output)
    #[arg(long)]
    single_pass: bool,

    /// Progress display
    #[arg(long, value_enum, default_value = "auto")]
    progress: ProgressMode,

    /// Cancel the scan after this many seconds and report partial results
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
enum ProgressMode {
    /// Redraw on a terminal, log lines otherwise
    #[default]
    Auto,
    /// Single-line redraw on stderr
    Tty,
    /// Periodic log lines
    Log,
    /// No progress output
    Off,
}

impl ProgressMode {
    fn display_mode(self) -> DisplayMode {
        match self {
            Self::Auto => DisplayMode::Auto,
            Self::Tty => DisplayMode::Interactive,
            Self::Log => DisplayMode::Log,
            Self::Off => DisplayMode::Silent,
        }
    }

    /// Whether progress goes through `tracing`.
    fn logs(self) -> bool {
        match self {
            Self::Log => true,
            Self::Auto => !std::io::stderr().is_terminal(),
            Self::Tty | Self::Off => false,
        }
    }
}

/// JSON output: the report plus the scan context.
#[derive(Serialize)]
struct JsonOutput<'a> {
    root: &'a Path,
    #[serde(flatten)]
    report: &'a CostReport,
    discovery: Option<&'a DiscoveryResult>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;

    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.progress.logs())?;

    let max_file_size = parse_size(&cli.max_file_size)
        .wrap_err_with(|| format!("Invalid --max-file-size `{}`", cli.max_file_size))?;

    let cancel = CancellationToken::new();
    let request = ScanRequest::builder()
        .root(cli.path.clone())
        .cancel(cancel.clone())
        .include_patterns(cli.include.clone())
        .ignore_patterns(cli.ignore.clone())
        .include_hidden(!cli.no_hidden)
        .dir_concurrency(cli.dir_concurrency)
        .io_concurrency(
            cli.io_concurrency
                .unwrap_or_else(ConcurrencyLimiter::default_parallelism),
        )
        .sample_size(cli.sample_size)
        .large_file_threshold(max_file_size)
        .discovery(!cli.single_pass)
        .build()
        .context("Invalid scan options")?;

    spawn_cancel_watchers(&cancel, cli.timeout.map(Duration::from_secs));

    let scanner =
        Scanner::new(Arc::new(ByteRatioEstimator)).with_display(cli.progress.display_mode());
    let result = scanner
        .scan(&request)
        .await
        .wrap_err_with(|| format!("Failed to scan {}", cli.path.display()))?;

    let config = AggregateConfig::builder().top_files(cli.top).build()?;
    let report = Aggregator::with_config(config).aggregate(&result);
    let root = cli.path.canonicalize().unwrap_or_else(|_| cli.path.clone());

    match cli.format {
        OutputFormat::Text => {
            println!();
            print!("{}", format_text(&report, &root));
        }
        OutputFormat::Json => {
            let output = JsonOutput {
                root: &root,
                report: &report,
                discovery: result.discovery.as_ref(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    if result.aborted {
        warn!("Scan was cancelled, report is partial");
        return Ok(ExitCode::from(EXIT_PARTIAL));
    }
    Ok(ExitCode::SUCCESS)
}

fn setup_logging(verbose: u8, progress_logs: bool) -> Result<()> {
    let default = match verbose {
        0 if progress_logs => "tokenmeter_scan=info,warn".to_string(),
        0 => "warn".to_string(),
        1 => crate_directives("debug"),
        _ => crate_directives("trace"),
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}

/// Our crates at `level`, everything else at `warn`.
fn crate_directives(level: &str) -> String {
    let mut directives: Vec<String> = LOG_TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect();
    directives.push("warn".to_string());
    directives.join(",")
}

/// Cancel on Ctrl-C and, if set, after `timeout`.
fn spawn_cancel_watchers(cancel: &CancellationToken, timeout: Option<Duration>) {
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, finishing in-flight files");
            token.cancel();
        }
    });

    if let Some(timeout) = timeout {
        let token = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    warn!(timeout_secs = timeout.as_secs(), "Timeout reached, cancelling scan");
                    token.cancel();
                }
            }
        });
    }
}

/// Parse a size string (e.g., "1KB", "10MB", "1GB"). Units are binary.
fn parse_size(s: &str) -> Result<u64> {
    let s = s.trim().to_uppercase();
    let digits_end = s
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(s.len());
    let (num, unit) = s.split_at(digits_end);

    let multiplier: u64 = match unit.trim() {
        "" | "B" => 1,
        "K" | "KB" | "KIB" => 1024,
        "M" | "MB" | "MIB" => 1024 * 1024,
        "G" | "GB" | "GIB" => 1024 * 1024 * 1024,
        other => bail!("unknown size unit `{other}`"),
    };
    let num: f64 = num.parse().wrap_err("expected a number")?;
    if !num.is_finite() || num < 0.0 {
        bail!("size must be a non-negative number");
    }

    Ok((num * multiplier as f64) as u64)
}

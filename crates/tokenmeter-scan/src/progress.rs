//! Scan progress tracking and display.
//!
//! The [`ProgressTracker`] owns all progress state. Workers never touch it
//! directly: their outcomes arrive as [`ProgressTick`]s through a channel,
//! and the task draining that channel is the tracker's only caller. Output
//! goes to a [`ProgressSink`], chosen through [`DisplayMode`].

use std::io::{IsTerminal, Write};
use std::time::{Duration, Instant};

use humansize::{BINARY, format_size};
use tracing::info;

use tokenmeter_core::DiscoveryResult;

use crate::rate::{DEFAULT_ALPHA, RateEstimator};

/// Default minimum time between two progress renders.
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_millis(200);

/// Log-mode progress is reported in steps of this many percent.
const LOG_STEP_PERCENT: f64 = 5.0;

/// Log-mode interval when the total is unknown.
const LOG_INTERVAL_UNKNOWN_TOTAL: Duration = Duration::from_secs(5);

/// Periodic discovery status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryProgress {
    /// Directories listed so far.
    pub dirs_scanned: u64,
    /// Files found so far.
    pub files_found: u64,
    /// Time since discovery started.
    pub elapsed: Duration,
}

/// Work reported by one finished file task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressTick {
    /// Files finished (successfully or not).
    pub files: u64,
    /// Bytes those files contained.
    pub bytes: u64,
    /// How many of those files failed.
    pub errors: u64,
}

impl ProgressTick {
    /// One successfully processed file.
    pub fn processed(bytes: u64) -> Self {
        Self {
            files: 1,
            bytes,
            errors: 0,
        }
    }

    /// One failed file.
    pub fn failed(bytes: u64) -> Self {
        Self {
            files: 1,
            bytes,
            errors: 1,
        }
    }
}

/// Point-in-time view of processing progress.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    /// Files finished, failures included.
    pub files_done: u64,
    /// Bytes in finished files.
    pub bytes_done: u64,
    /// Failed files.
    pub errors: u64,
    /// Expected number of files, when discovery ran.
    pub total_files: Option<u64>,
    /// Percent complete, when the total is known.
    pub percent: Option<f64>,
    /// Smoothed file throughput.
    pub files_per_sec: Option<f64>,
    /// Smoothed byte throughput.
    pub bytes_per_sec: Option<f64>,
    /// Estimated time to completion.
    pub eta: Option<Duration>,
    /// Time since the first tick.
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrackerState {
    Idle,
    Running { started: Instant },
}

/// Running totals, throughput and ETA for the processing phase.
///
/// Idle until the first tick, then running. [`finish`](Self::finish) prints
/// the summary and stops rendering; later ticks still count but are not
/// shown.
pub struct ProgressTracker {
    sink: Box<dyn ProgressSink>,
    update_interval: Duration,
    total_files: Option<u64>,
    avg_bytes_per_file: Option<f64>,
    state: TrackerState,
    files_done: u64,
    bytes_done: u64,
    errors: u64,
    files_rate: RateEstimator,
    bytes_rate: RateEstimator,
    last_render: Option<Instant>,
    last_sample: Option<(Instant, u64, u64)>,
    finished: bool,
}

impl ProgressTracker {
    /// Create a tracker rendering to `sink`, with no known total.
    pub fn new(sink: Box<dyn ProgressSink>) -> Self {
        Self {
            sink,
            update_interval: DEFAULT_UPDATE_INTERVAL,
            total_files: None,
            avg_bytes_per_file: None,
            state: TrackerState::Idle,
            files_done: 0,
            bytes_done: 0,
            errors: 0,
            files_rate: RateEstimator::new(DEFAULT_ALPHA),
            bytes_rate: RateEstimator::new(DEFAULT_ALPHA),
            last_render: None,
            last_sample: None,
            finished: false,
        }
    }

    /// Set the minimum time between renders.
    pub fn with_update_interval(mut self, interval: Duration) -> Self {
        self.update_interval = interval;
        self
    }

    /// Set the expected number of files.
    pub fn with_total_files(mut self, total: Option<u64>) -> Self {
        self.total_files = total;
        self
    }

    /// Set the average file size used for the byte-based ETA.
    pub fn with_avg_bytes_per_file(mut self, avg: Option<f64>) -> Self {
        self.avg_bytes_per_file = avg;
        self
    }

    /// Take the total and average size from a discovery census.
    pub fn with_discovery(self, discovery: Option<&DiscoveryResult>) -> Self {
        match discovery {
            Some(discovery) => self
                .with_total_files(Some(discovery.total_files))
                .with_avg_bytes_per_file(discovery.avg_bytes_per_file),
            None => self,
        }
    }

    /// Record finished work using the wall clock.
    pub fn tick(&mut self, tick: ProgressTick) -> Option<ProgressSnapshot> {
        self.tick_at(Instant::now(), tick)
    }

    /// Record finished work at `now`. Returns the snapshot when one was rendered.
    pub fn tick_at(&mut self, now: Instant, tick: ProgressTick) -> Option<ProgressSnapshot> {
        if self.state == TrackerState::Idle {
            self.state = TrackerState::Running { started: now };
            self.last_sample = Some((now, self.files_done, self.bytes_done));
        }

        self.files_done = self.files_done.saturating_add(tick.files);
        self.bytes_done = self.bytes_done.saturating_add(tick.bytes);
        self.errors = self.errors.saturating_add(tick.errors);

        if self.finished {
            return None;
        }
        let due = self
            .last_render
            .is_none_or(|last| now.saturating_duration_since(last) >= self.update_interval);
        if !due {
            return None;
        }

        self.sample_rates(now);
        self.last_render = Some(now);
        let snapshot = self.snapshot_at(now);
        self.sink.update(&snapshot);
        Some(snapshot)
    }

    /// Print the final summary using the wall clock.
    pub fn finish(&mut self) -> ProgressSnapshot {
        self.finish_at(Instant::now())
    }

    /// Print the final summary and stop rendering. Idempotent.
    pub fn finish_at(&mut self, now: Instant) -> ProgressSnapshot {
        let snapshot = self.snapshot_at(now);
        if !self.finished {
            self.finished = true;
            self.sink.finish(&snapshot);
        }
        snapshot
    }

    /// Check if at least one tick arrived.
    pub fn is_running(&self) -> bool {
        matches!(self.state, TrackerState::Running { .. })
    }

    /// Check if [`finish`](Self::finish) was called.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Current progress as of `now`.
    pub fn snapshot_at(&self, now: Instant) -> ProgressSnapshot {
        let elapsed = match self.state {
            TrackerState::Idle => Duration::ZERO,
            TrackerState::Running { started } => now.saturating_duration_since(started),
        };
        let percent = self.total_files.map(|total| {
            if total == 0 {
                100.0
            } else {
                (self.files_done as f64 / total as f64 * 100.0).min(100.0)
            }
        });

        ProgressSnapshot {
            files_done: self.files_done,
            bytes_done: self.bytes_done,
            errors: self.errors,
            total_files: self.total_files,
            percent,
            files_per_sec: self.files_rate.estimate(),
            bytes_per_sec: self.bytes_rate.estimate(),
            eta: self.eta(),
            elapsed,
        }
    }

    fn sample_rates(&mut self, now: Instant) {
        let Some((at, files, bytes)) = self.last_sample else {
            self.last_sample = Some((now, self.files_done, self.bytes_done));
            return;
        };
        let elapsed = now.saturating_duration_since(at);
        if elapsed.is_zero() {
            return;
        }
        self.files_rate
            .update_rate((self.files_done - files) as f64, elapsed);
        if self.bytes_done > 0 {
            self.bytes_rate
                .update_rate((self.bytes_done - bytes) as f64, elapsed);
        }
        self.last_sample = Some((now, self.files_done, self.bytes_done));
    }

    /// The larger of the file-count and byte-based projections.
    fn eta(&self) -> Option<Duration> {
        let total = self.total_files?;
        let remaining = total.saturating_sub(self.files_done);
        if remaining == 0 {
            return Some(Duration::ZERO);
        }
        let remaining = remaining as f64;

        let by_files = self
            .files_rate
            .estimate()
            .filter(|rate| *rate > 0.0)
            .map(|rate| remaining / rate);
        let by_bytes = match (self.avg_bytes_per_file, self.bytes_rate.estimate()) {
            (Some(avg), Some(rate)) if rate > 0.0 => Some(remaining * avg / rate),
            _ => None,
        };

        let secs = match (by_files, by_bytes) {
            (Some(files), Some(bytes)) => files.max(bytes),
            (files, bytes) => files.or(bytes)?,
        };
        Duration::try_from_secs_f64(secs).ok()
    }
}

impl std::fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("state", &self.state)
            .field("files_done", &self.files_done)
            .field("bytes_done", &self.bytes_done)
            .field("errors", &self.errors)
            .field("total_files", &self.total_files)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

/// Destination for rendered progress.
pub trait ProgressSink: Send {
    /// Discovery status, about once per second.
    fn discovery(&mut self, _progress: &DiscoveryProgress) {}

    /// Discovery is over, with or without a processing phase to follow.
    fn discovery_finished(&mut self, _result: &DiscoveryResult) {}

    /// Throttled processing status.
    fn update(&mut self, snapshot: &ProgressSnapshot);

    /// Final processing summary.
    fn finish(&mut self, snapshot: &ProgressSnapshot);
}

/// Discards all progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentSink;

impl ProgressSink for SilentSink {
    fn update(&mut self, _snapshot: &ProgressSnapshot) {}

    fn finish(&mut self, _snapshot: &ProgressSnapshot) {}
}

/// Redraws a single status line, for interactive terminals.
#[derive(Debug)]
pub struct TerminalSink<W: Write + Send> {
    out: W,
}

impl<W: Write + Send> TerminalSink<W> {
    /// Create a sink drawing to `out`.
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Consume the sink, returning the writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn redraw(&mut self, line: &str) {
        // Progress output is best effort.
        let _ = write!(self.out, "\r\x1b[2K{line}");
        let _ = self.out.flush();
    }
}

impl<W: Write + Send> ProgressSink for TerminalSink<W> {
    fn discovery(&mut self, progress: &DiscoveryProgress) {
        self.redraw(&format_discovery(progress));
    }

    fn discovery_finished(&mut self, result: &DiscoveryResult) {
        self.redraw(&format_discovered(result));
        let _ = writeln!(self.out);
        let _ = self.out.flush();
    }

    fn update(&mut self, snapshot: &ProgressSnapshot) {
        self.redraw(&format_status(snapshot));
    }

    fn finish(&mut self, snapshot: &ProgressSnapshot) {
        self.redraw(&format_summary(snapshot));
        let _ = writeln!(self.out);
        let _ = self.out.flush();
    }
}

/// Emits discrete log lines, for non-interactive output.
///
/// With a known total, one line per 5 % of progress; otherwise one line
/// every five seconds.
#[derive(Debug, Default)]
pub struct LogSink {
    last_step: Option<u64>,
    last_logged: Option<Instant>,
}

impl LogSink {
    /// Create a log sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if a snapshot crosses into a new reporting step.
    fn should_log(&mut self, snapshot: &ProgressSnapshot, now: Instant) -> bool {
        match snapshot.percent {
            Some(percent) => {
                let step = (percent / LOG_STEP_PERCENT).floor() as u64;
                if self.last_step.is_some_and(|last| step <= last) {
                    return false;
                }
                self.last_step = Some(step);
                true
            }
            None => {
                if self
                    .last_logged
                    .is_some_and(|last| now.saturating_duration_since(last) < LOG_INTERVAL_UNKNOWN_TOTAL)
                {
                    return false;
                }
                self.last_logged = Some(now);
                true
            }
        }
    }
}

impl ProgressSink for LogSink {
    fn discovery(&mut self, progress: &DiscoveryProgress) {
        info!(
            dirs = progress.dirs_scanned,
            files = progress.files_found,
            "{}",
            format_discovery(progress)
        );
    }

    fn update(&mut self, snapshot: &ProgressSnapshot) {
        if self.should_log(snapshot, Instant::now()) {
            info!(
                files = snapshot.files_done,
                errors = snapshot.errors,
                "{}",
                format_status(snapshot)
            );
        }
    }

    fn finish(&mut self, snapshot: &ProgressSnapshot) {
        info!(
            files = snapshot.files_done,
            errors = snapshot.errors,
            "{}",
            format_summary(snapshot)
        );
    }
}

/// How progress is displayed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DisplayMode {
    /// No progress output.
    #[default]
    Silent,
    /// Terminal redraw when stderr is a terminal, log lines otherwise.
    Auto,
    /// Single-line redraw on stderr.
    Interactive,
    /// Discrete `tracing` lines.
    Log,
}

impl DisplayMode {
    /// Create the sink for this mode.
    pub fn sink(self) -> Box<dyn ProgressSink> {
        match self {
            Self::Silent => Box::new(SilentSink),
            Self::Interactive => Box::new(TerminalSink::new(std::io::stderr())),
            Self::Log => Box::new(LogSink::new()),
            Self::Auto if std::io::stderr().is_terminal() => {
                Box::new(TerminalSink::new(std::io::stderr()))
            }
            Self::Auto => Box::new(LogSink::new()),
        }
    }
}

/// One-line discovery status.
pub fn format_discovery(progress: &DiscoveryProgress) -> String {
    format!(
        "Discovering: {} dirs, {} files ({:.1}s)",
        progress.dirs_scanned,
        progress.files_found,
        progress.elapsed.as_secs_f64()
    )
}

/// One-line discovery summary.
pub fn format_discovered(result: &DiscoveryResult) -> String {
    format!(
        "Discovered {} files in {} dirs ({:.1}s){}",
        result.total_files,
        result.total_dirs,
        result.elapsed.as_secs_f64(),
        if result.aborted { ", cancelled" } else { "" }
    )
}

/// One-line processing status.
pub fn format_status(snapshot: &ProgressSnapshot) -> String {
    let mut line = match (snapshot.percent, snapshot.total_files) {
        (Some(percent), Some(total)) => {
            format!("{percent:5.1}% {}/{total} files", snapshot.files_done)
        }
        _ => format!("{} files", snapshot.files_done),
    };
    if snapshot.errors > 0 {
        line.push_str(&format!(", {} errors", snapshot.errors));
    }
    if let Some(rate) = snapshot.files_per_sec {
        line.push_str(&format!(", {rate:.0} files/s"));
    }
    if let Some(rate) = snapshot.bytes_per_sec {
        line.push_str(&format!(", {}/s", format_size(rate as u64, BINARY)));
    }
    if let Some(eta) = snapshot.eta {
        line.push_str(&format!(", ETA {}", format_duration(eta)));
    }
    line
}

/// Final processing summary line.
pub fn format_summary(snapshot: &ProgressSnapshot) -> String {
    format!(
        "Processed {} files ({}, {} errors) in {:.2}s",
        snapshot.files_done,
        format_size(snapshot.bytes_done, BINARY),
        snapshot.errors,
        snapshot.elapsed.as_secs_f64()
    )
}

/// Compact duration: `1h 02m`, `3m 05s`, `12s`.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 3600 {
        format!("{}h {:02}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{secs}s")
    }
}

//! Concurrent scanning engine for tokenmeter.
//!
//! This crate walks a directory tree and totals a per-file cost (a token
//! count) with bounded parallelism.
//!
//! # Overview
//!
//! A scan runs in two phases:
//!
//! - **Discovery** counts files and directories and samples file sizes
//!   without reading contents, so the second phase knows its total.
//! - **Processing** re-walks the tree and runs the [`CostEstimator`] on every
//!   file through a separate file limiter, with throttled progress and ETA.
//!
//! Both phases share the same entry rules: a built-in deny-list of build and
//! VCS directories, optional hidden-entry skipping, glob ignore/include
//! patterns and an optional external [`SkipPredicate`]. Symlinks are never
//! followed and every directory is listed at most once.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokenmeter_core::{ByteRatioEstimator, ScanRequest};
//! use tokenmeter_scan::{DisplayMode, Scanner};
//!
//! # async fn run() -> Result<(), tokenmeter_core::ScanError> {
//! let scanner = Scanner::new(Arc::new(ByteRatioEstimator)).with_display(DisplayMode::Auto);
//! let result = scanner.scan(&ScanRequest::new("/path/to/repo")).await?;
//!
//! println!("Total cost: {}", result.total_cost);
//! println!("Files: {} ({} failed)", result.processed_count, result.error_count);
//! # Ok(())
//! # }
//! ```
//!
//! # Progress Monitoring
//!
//! Subscribe to scan events, or take them as a stream:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio_stream::StreamExt;
//! use tokenmeter_core::{ByteRatioEstimator, ScanRequest};
//! use tokenmeter_scan::{ScanEvent, Scanner};
//!
//! # async fn run() {
//! let scanner = Scanner::new(Arc::new(ByteRatioEstimator));
//! let (mut events, handle) = scanner.scan_stream(ScanRequest::new("."));
//!
//! while let Some(event) = events.next().await {
//!     if let ScanEvent::Progress(snapshot) = event {
//!         println!("{} files done", snapshot.files_done);
//!     }
//! }
//! let result = handle.await;
//! # }
//! ```
//!
//! [`CostEstimator`]: tokenmeter_core::CostEstimator
//! [`SkipPredicate`]: tokenmeter_core::SkipPredicate

mod discovery;
mod filter;
mod limiter;
mod processing;
mod progress;
mod rate;
mod sampler;
mod scanner;
mod visited;
mod walk;

pub use discovery::{DISCOVERY_PROGRESS_INTERVAL, DiscoveryWalker};
pub use filter::{EntryFilter, GlobSkip};
pub use limiter::ConcurrencyLimiter;
pub use processing::ProcessingWalker;
pub use progress::{
    DEFAULT_UPDATE_INTERVAL, DiscoveryProgress, DisplayMode, LogSink, ProgressSink,
    ProgressSnapshot, ProgressTick, ProgressTracker, SilentSink, TerminalSink, format_discovered,
    format_discovery, format_duration, format_status, format_summary,
};
pub use rate::{DEFAULT_ALPHA, RateEstimator};
pub use sampler::{SharedSampler, SizeSampler};
pub use scanner::{ScanEvent, Scanner};
pub use visited::VisitedSet;
pub use walk::{ListedFile, Listing, WalkItem, WalkSummary};

// Re-export core types for convenience
pub use tokenmeter_core::{
    ByteRatioEstimator, CostError, CostEstimator, DiscoveryResult, FileRecord, ProcessingResult,
    ScanError, ScanRequest, ScanWarning, SkipPredicate, WarningKind,
};

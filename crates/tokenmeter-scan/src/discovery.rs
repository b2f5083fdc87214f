//! Phase 1: a fast census of the tree.
//!
//! Counts files and directories and estimates the average file size from a
//! reservoir sample, without reading any file contents.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tokenmeter_core::{DiscoveryResult, ScanRequest};

use crate::filter::EntryFilter;
use crate::limiter::ConcurrencyLimiter;
use crate::progress::DiscoveryProgress;
use crate::sampler::{SharedSampler, SizeSampler};
use crate::walk::{TreeWalker, WalkContext, WalkItem, WalkSummary};

/// Default interval between discovery progress reports.
pub const DISCOVERY_PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// Discovery walker for one scan.
#[derive(Debug)]
pub struct DiscoveryWalker {
    root: PathBuf,
    filter: Arc<EntryFilter>,
    cancel: CancellationToken,
    dir_concurrency: usize,
    sample_size: usize,
    sample_seed: Option<u64>,
    progress_interval: Duration,
}

impl DiscoveryWalker {
    /// Create a walker for an already canonical `root`.
    pub fn new(root: &Path, request: &ScanRequest, filter: Arc<EntryFilter>) -> Self {
        Self {
            root: root.to_path_buf(),
            filter,
            cancel: request.cancel_token(),
            dir_concurrency: request.dir_concurrency,
            sample_size: request.sample_size,
            sample_seed: request.sample_seed,
            progress_interval: DISCOVERY_PROGRESS_INTERVAL,
        }
    }

    /// Override the progress report interval.
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Walk the tree. `on_progress` is called on every progress interval.
    pub async fn run<F>(&self, mut on_progress: F) -> DiscoveryResult
    where
        F: FnMut(&DiscoveryProgress),
    {
        let start = Instant::now();
        let sampler = SharedSampler::new(SizeSampler::new(self.sample_size, self.sample_seed));
        let ctx = WalkContext::new(
            self.root.clone(),
            Arc::clone(&self.filter),
            Some(sampler.clone()),
            self.cancel.clone(),
        );
        let limiter = ConcurrencyLimiter::new(self.dir_concurrency);
        let (walk, mut items) = TreeWalker::new(ctx, limiter).spawn();

        let mut ticker = tokio::time::interval_at(
            tokio::time::Instant::now() + self.progress_interval,
            self.progress_interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut files_found: u64 = 0;
        let mut dirs_scanned: u64 = 0;

        loop {
            tokio::select! {
                item = items.recv() => match item {
                    Some(WalkItem::Listing(listing)) => {
                        dirs_scanned += 1;
                        files_found += listing.files.len() as u64;
                    }
                    Some(WalkItem::Unreadable { .. }) => {}
                    None => break,
                },
                _ = ticker.tick() => {
                    let progress = DiscoveryProgress {
                        dirs_scanned,
                        files_found,
                        elapsed: start.elapsed(),
                    };
                    debug!(dirs = dirs_scanned, files = files_found, "Discovery in progress");
                    on_progress(&progress);
                }
            }
        }

        let summary = walk.await.unwrap_or_else(|error| {
            warn!(%error, "Discovery walk failed");
            WalkSummary {
                aborted: true,
                ..Default::default()
            }
        });

        let result = DiscoveryResult {
            total_files: files_found,
            total_dirs: dirs_scanned,
            unreadable_dirs: summary.unreadable,
            avg_bytes_per_file: sampler.mean(),
            sampled_files: sampler.len(),
            elapsed: start.elapsed(),
            aborted: summary.aborted,
        };

        info!(
            files = result.total_files,
            dirs = result.total_dirs,
            unreadable = result.unreadable_dirs,
            avg_bytes = result.avg_bytes_per_file,
            aborted = result.aborted,
            elapsed_ms = result.elapsed.as_millis() as u64,
            "Discovery finished"
        );

        result
    }
}

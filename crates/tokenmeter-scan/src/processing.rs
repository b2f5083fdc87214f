//! Phase 2: cost accounting for every file.
//!
//! Re-walks the tree with the discovery rules and runs one task per file
//! through a dedicated file limiter. Every task outcome goes over a channel
//! to a collector task that owns the [`ProgressTracker`] and the record
//! list, so counts have a single writer.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tokenmeter_core::{
    CostEstimator, DiscoveryResult, FileRecord, ProcessingResult, ScanRequest, ScanWarning,
    WarningKind, approximate_cost,
};

use crate::filter::EntryFilter;
use crate::limiter::ConcurrencyLimiter;
use crate::progress::{ProgressSnapshot, ProgressTick, ProgressTracker};
use crate::walk::{ListedFile, TreeWalker, WalkContext, WalkItem, WalkSummary};

/// Outcome of one file task.
#[derive(Debug)]
enum FileOutcome {
    Processed(FileRecord),
    Failed { bytes: u64, warning: ScanWarning },
}

impl FileOutcome {
    fn tick(&self) -> ProgressTick {
        match self {
            Self::Processed(record) => ProgressTick::processed(record.bytes),
            Self::Failed { bytes, .. } => ProgressTick::failed(*bytes),
        }
    }
}

/// Processing walker for one scan.
pub struct ProcessingWalker {
    root: PathBuf,
    filter: Arc<EntryFilter>,
    estimator: Arc<dyn CostEstimator>,
    cancel: CancellationToken,
    dir_concurrency: usize,
    io_concurrency: usize,
    large_file_threshold: u64,
}

impl ProcessingWalker {
    /// Create a walker for an already canonical `root`.
    pub fn new(
        root: &Path,
        request: &ScanRequest,
        filter: Arc<EntryFilter>,
        estimator: Arc<dyn CostEstimator>,
    ) -> Self {
        Self {
            root: root.to_path_buf(),
            filter,
            estimator,
            cancel: request.cancel_token(),
            dir_concurrency: request.dir_concurrency,
            io_concurrency: request.io_concurrency,
            large_file_threshold: request.large_file_threshold,
        }
    }

    /// Process every file under the root.
    ///
    /// When `discovery` completed, at most `discovery.total_files` files are
    /// admitted. `on_progress` receives each rendered snapshot and, with
    /// `true`, the final one.
    pub async fn run<F>(
        &self,
        discovery: Option<&DiscoveryResult>,
        tracker: ProgressTracker,
        on_progress: F,
    ) -> ProcessingResult
    where
        F: FnMut(&ProgressSnapshot, bool) + Send + 'static,
    {
        let start = Instant::now();
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let collector = tokio::spawn(collect(outcome_rx, tracker, on_progress));

        let ctx = WalkContext::new(
            self.root.clone(),
            Arc::clone(&self.filter),
            None,
            self.cancel.clone(),
        );
        let (walk, mut items) =
            TreeWalker::new(ctx, ConcurrencyLimiter::new(self.dir_concurrency)).spawn();
        let files = ConcurrencyLimiter::new(self.io_concurrency);

        let budget = discovery
            .filter(|discovery| !discovery.aborted)
            .map(|discovery| discovery.total_files);
        let mut admitted: u64 = 0;
        let mut late_files: u64 = 0;
        let mut dir_warnings = Vec::new();
        let mut aborted = false;

        'walk: while let Some(item) = items.recv().await {
            let listing = match item {
                WalkItem::Listing(listing) => listing,
                WalkItem::Unreadable { dir, error } => {
                    dir_warnings.push(ScanWarning::unreadable_dir(dir, &error));
                    continue;
                }
            };

            for file in listing.files {
                if budget.is_some_and(|budget| admitted >= budget) {
                    debug!(file = %file.relative_path, "File appeared after discovery, skipping");
                    late_files += 1;
                    continue;
                }

                let permit = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => None,
                    permit = files.acquire() => permit.ok(),
                };
                let Some(permit) = permit else {
                    aborted = true;
                    break 'walk;
                };

                admitted += 1;
                let estimator = Arc::clone(&self.estimator);
                let threshold = self.large_file_threshold;
                let outcome_tx = outcome_tx.clone();
                files.spawn_with(permit, async move {
                    let outcome = process_file(file, estimator, threshold).await;
                    // The collector outlives every file task.
                    let _ = outcome_tx.send(outcome);
                });
            }
        }

        // Stops the walk if we bailed out early.
        drop(items);
        let summary = walk.await.unwrap_or_else(|error| {
            warn!(%error, "Processing walk failed");
            WalkSummary {
                aborted: true,
                ..Default::default()
            }
        });

        // Every admitted task has sent its outcome once the limiter drains.
        if let Err(error) = files.drain().await {
            warn!(%error, "File limiter closed before draining");
        }
        drop(outcome_tx);

        let mut result = match collector.await {
            Ok(result) => result,
            Err(error) => {
                warn!(%error, "Result collector failed");
                ProcessingResult::default()
            }
        };

        result.late_files = late_files;
        result.unreadable_dirs = summary.unreadable;
        result.warnings.extend(dir_warnings);
        result.aborted = aborted || summary.aborted;
        result.elapsed = start.elapsed();

        info!(
            processed = result.processed_count,
            errors = result.error_count,
            late = result.late_files,
            total_cost = result.total_cost,
            aborted = result.aborted,
            elapsed_ms = result.elapsed.as_millis() as u64,
            "Processing finished"
        );

        result
    }
}

impl std::fmt::Debug for ProcessingWalker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessingWalker")
            .field("root", &self.root)
            .field("dir_concurrency", &self.dir_concurrency)
            .field("io_concurrency", &self.io_concurrency)
            .field("large_file_threshold", &self.large_file_threshold)
            .finish_non_exhaustive()
    }
}

/// Drain file outcomes into the result, ticking the tracker once per outcome.
async fn collect<F>(
    mut outcomes: mpsc::UnboundedReceiver<FileOutcome>,
    mut tracker: ProgressTracker,
    mut on_progress: F,
) -> ProcessingResult
where
    F: FnMut(&ProgressSnapshot, bool),
{
    let mut result = ProcessingResult::default();

    while let Some(outcome) = outcomes.recv().await {
        if let Some(snapshot) = tracker.tick(outcome.tick()) {
            on_progress(&snapshot, false);
        }
        match outcome {
            FileOutcome::Processed(record) => result.push_record(record),
            FileOutcome::Failed { warning, .. } => {
                debug!(path = %warning.path.display(), kind = %warning.kind, "{}", warning.message);
                result.push_error(warning);
            }
        }
    }

    let summary = tracker.finish();
    on_progress(&summary, true);
    result
}

/// Compute the cost of one file.
///
/// Files above `threshold` bytes get the byte approximation and never reach
/// the estimator.
async fn process_file(
    file: ListedFile,
    estimator: Arc<dyn CostEstimator>,
    threshold: u64,
) -> FileOutcome {
    let ListedFile {
        path,
        relative_path,
    } = file;

    let metadata = match tokio::fs::metadata(&path).await {
        Ok(metadata) if metadata.is_file() => metadata,
        Ok(_) => {
            return FileOutcome::Failed {
                bytes: 0,
                warning: ScanWarning::new(&path, "No longer a regular file", WarningKind::Vanished),
            };
        }
        Err(error) => {
            return FileOutcome::Failed {
                bytes: 0,
                warning: ScanWarning::vanished(&path, &error),
            };
        }
    };
    let bytes = metadata.len();

    if bytes > threshold {
        return FileOutcome::Processed(FileRecord::new(
            relative_path,
            approximate_cost(bytes),
            bytes,
            true,
        ));
    }

    let task_path = path.clone();
    match tokio::task::spawn_blocking(move || estimator.cost_of(&task_path)).await {
        Ok(Ok(cost)) => FileOutcome::Processed(FileRecord::new(relative_path, cost, bytes, false)),
        Ok(Err(error)) => FileOutcome::Failed {
            bytes,
            warning: ScanWarning::cost_failed(&path, &error),
        },
        Err(error) => FileOutcome::Failed {
            bytes,
            warning: ScanWarning::new(
                &path,
                format!("Cost task failed: {error}"),
                WarningKind::TaskFailed,
            ),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tempfile::TempDir;
    use tokenmeter_core::CostError;

    use crate::progress::SilentSink;

    fn walker(root: &Path, request: &ScanRequest, estimator: Arc<dyn CostEstimator>) -> ProcessingWalker {
        let filter = EntryFilter::new(request, None).unwrap();
        ProcessingWalker::new(&root.canonicalize().unwrap(), request, Arc::new(filter), estimator)
    }

    fn tracker() -> ProgressTracker {
        ProgressTracker::new(Box::new(SilentSink))
    }

    fn by_length() -> Arc<dyn CostEstimator> {
        Arc::new(|path: &Path| -> Result<u64, CostError> {
            let len = fs::read(path).map_err(|e| CostError::io(path, e))?.len();
            Ok(len as u64)
        })
    }

    #[tokio::test]
    async fn test_processes_every_file() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("src")).unwrap();
        fs::write(temp.path().join("src/a.rs"), "abc").unwrap();
        fs::write(temp.path().join("b.md"), "abcdefg").unwrap();

        let request = ScanRequest::new(temp.path());
        let result = walker(temp.path(), &request, by_length())
            .run(None, tracker(), |_, _| {})
            .await;

        assert_eq!(result.processed_count, 2);
        assert_eq!(result.error_count, 0);
        assert_eq!(result.total_cost, 10);
        let mut paths: Vec<_> = result.records.iter().map(|r| r.relative_path.as_str()).collect();
        paths.sort();
        assert_eq!(paths, vec!["b.md", "src/a.rs"]);
        assert!(!result.aborted);
    }

    #[tokio::test]
    async fn test_large_files_skip_estimator() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("big.bin"), vec![0u8; 4096]).unwrap();
        fs::write(temp.path().join("small.txt"), "hi").unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let estimator: Arc<dyn CostEstimator> = Arc::new(move |_: &Path| -> Result<u64, CostError> {
            counted.fetch_add(1, Ordering::SeqCst);
            Ok(1)
        });

        let request = ScanRequest::builder()
            .root(temp.path())
            .large_file_threshold(1024u64)
            .build()
            .unwrap();
        let result = walker(temp.path(), &request, estimator)
            .run(None, tracker(), |_, _| {})
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let big = result
            .records
            .iter()
            .find(|r| r.relative_path == "big.bin")
            .unwrap();
        assert!(big.approximate);
        assert_eq!(big.cost, 1024);
        assert_eq!(result.total_cost, 1025);
    }

    #[tokio::test]
    async fn test_failures_are_counted_not_fatal() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("ok.rs"), "fine").unwrap();
        fs::write(temp.path().join("bad.rs"), "nope").unwrap();

        let estimator: Arc<dyn CostEstimator> = Arc::new(|path: &Path| -> Result<u64, CostError> {
            if path.ends_with("bad.rs") {
                Err(CostError::Failed {
                    message: "tokenizer rejected input".to_string(),
                })
            } else {
                Ok(3)
            }
        });

        let request = ScanRequest::new(temp.path());
        let result = walker(temp.path(), &request, estimator)
            .run(None, tracker(), |_, _| {})
            .await;

        assert_eq!(result.processed_count, 1);
        assert_eq!(result.error_count, 1);
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].kind, WarningKind::CostFailed);
    }

    #[tokio::test]
    async fn test_panicking_estimator_is_isolated() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("boom.rs"), "x").unwrap();
        fs::write(temp.path().join("fine.rs"), "x").unwrap();

        let estimator: Arc<dyn CostEstimator> = Arc::new(|path: &Path| -> Result<u64, CostError> {
            assert!(!path.ends_with("boom.rs"), "estimator crashed");
            Ok(2)
        });

        let request = ScanRequest::new(temp.path());
        let result = walker(temp.path(), &request, estimator)
            .run(None, tracker(), |_, _| {})
            .await;

        assert_eq!(result.processed_count, 1);
        assert_eq!(result.error_count, 1);
        assert_eq!(result.warnings[0].kind, WarningKind::TaskFailed);
    }

    #[tokio::test]
    async fn test_budget_caps_admitted_files() {
        let temp = TempDir::new().unwrap();
        for i in 0..5 {
            fs::write(temp.path().join(format!("{i}.txt")), "x").unwrap();
        }
        let discovery = DiscoveryResult {
            total_files: 3,
            ..Default::default()
        };

        let request = ScanRequest::new(temp.path());
        let result = walker(temp.path(), &request, by_length())
            .run(Some(&discovery), tracker(), |_, _| {})
            .await;

        assert_eq!(result.attempted(), 3);
        assert_eq!(result.late_files, 2);
    }

    #[tokio::test]
    async fn test_progress_callback_gets_final_snapshot() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.txt"), "abcd").unwrap();

        let finals = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&finals);
        let request = ScanRequest::new(temp.path());
        walker(temp.path(), &request, by_length())
            .run(None, tracker(), move |snapshot, finished| {
                if finished {
                    assert_eq!(snapshot.files_done, 1);
                    seen.fetch_add(1, Ordering::SeqCst);
                }
            })
            .await;

        assert_eq!(finals.load(Ordering::SeqCst), 1);
    }

    fn listed(root: &Path, name: &str) -> ListedFile {
        ListedFile {
            path: root.join(name),
            relative_path: name.to_string(),
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_vanished() {
        let temp = TempDir::new().unwrap();

        let outcome = process_file(listed(temp.path(), "gone.rs"), by_length(), 10).await;

        match outcome {
            FileOutcome::Failed { bytes, warning } => {
                assert_eq!(bytes, 0);
                assert_eq!(warning.kind, WarningKind::Vanished);
                assert!(warning.path.ends_with("gone.rs"));
            }
            other => panic!("expected a failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_file_replaced_by_directory_is_vanished() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("lib.rs")).unwrap();

        let outcome = process_file(listed(temp.path(), "lib.rs"), by_length(), 10).await;

        match outcome {
            FileOutcome::Failed { warning, .. } => {
                assert_eq!(warning.kind, WarningKind::Vanished);
                assert!(warning.message.contains("regular file"));
            }
            other => panic!("expected a failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_file_outcome_ticks() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.txt"), "abcd").unwrap();

        let outcome = process_file(listed(temp.path(), "a.txt"), by_length(), 10).await;

        assert!(matches!(outcome, FileOutcome::Processed(ref record) if record.bytes == 4));
        assert_eq!(outcome.tick(), ProgressTick::processed(4));
    }
}

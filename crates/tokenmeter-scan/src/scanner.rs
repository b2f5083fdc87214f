//! Two-phase scanner: discovery census, then cost accounting.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info};

use tokenmeter_core::{
    CostEstimator, DiscoveryResult, ProcessingResult, ScanError, ScanRequest, SkipPredicate,
};

use crate::discovery::DiscoveryWalker;
use crate::filter::EntryFilter;
use crate::processing::ProcessingWalker;
use crate::progress::{
    DEFAULT_UPDATE_INTERVAL, DiscoveryProgress, DisplayMode, ProgressSink, ProgressSnapshot,
    ProgressTracker,
};

/// Capacity of the broadcast channel behind [`Scanner::subscribe`].
const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Something that happened during a scan.
#[derive(Debug, Clone)]
pub enum ScanEvent {
    /// Periodic discovery status.
    Discovering(DiscoveryProgress),
    /// Discovery finished (or was cancelled).
    Discovered(DiscoveryResult),
    /// Throttled processing status.
    Progress(ProgressSnapshot),
    /// Processing finished; final counts.
    Finished(ProgressSnapshot),
}

/// Fans events out to broadcast subscribers and an optional stream.
#[derive(Clone)]
struct Emitter {
    broadcast: broadcast::Sender<ScanEvent>,
    stream: Option<mpsc::UnboundedSender<ScanEvent>>,
}

impl Emitter {
    fn emit(&self, event: ScanEvent) {
        if let Some(stream) = &self.stream {
            let _ = stream.send(event.clone());
        }
        // No subscribers is fine.
        let _ = self.broadcast.send(event);
    }
}

/// Scans directory trees and totals the cost of every file.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use tokenmeter_core::{ByteRatioEstimator, ScanRequest};
/// use tokenmeter_scan::Scanner;
///
/// # async fn run() -> Result<(), tokenmeter_core::ScanError> {
/// let scanner = Scanner::new(Arc::new(ByteRatioEstimator));
/// let result = scanner.scan(&ScanRequest::new(".")).await?;
/// println!("{} tokens in {} files", result.total_cost, result.processed_count);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Scanner {
    estimator: Arc<dyn CostEstimator>,
    skip: Option<Arc<dyn SkipPredicate>>,
    display: DisplayMode,
    update_interval: Duration,
    progress_tx: broadcast::Sender<ScanEvent>,
}

impl Scanner {
    /// Create a scanner using `estimator` for per-file costs.
    pub fn new(estimator: Arc<dyn CostEstimator>) -> Self {
        let (progress_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            estimator,
            skip: None,
            display: DisplayMode::default(),
            update_interval: DEFAULT_UPDATE_INTERVAL,
            progress_tx,
        }
    }

    /// Skip entries for which `skip` returns `true`, in both phases.
    pub fn with_skip_predicate(mut self, skip: Arc<dyn SkipPredicate>) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Set how progress is displayed.
    pub fn with_display(mut self, display: DisplayMode) -> Self {
        self.display = display;
        self
    }

    /// Set the minimum time between processing progress renders.
    pub fn with_update_interval(mut self, interval: Duration) -> Self {
        self.update_interval = interval;
        self
    }

    /// Subscribe to scan events.
    ///
    /// Slow subscribers may miss events; see [`broadcast`].
    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.progress_tx.subscribe()
    }

    /// Run a full scan.
    ///
    /// Fails only if the request is invalid or the root cannot be read.
    /// Everything below the root is counted and reported as warnings.
    pub async fn scan(&self, request: &ScanRequest) -> Result<ProcessingResult, ScanError> {
        self.run(request, self.emitter(None)).await
    }

    /// Run the discovery phase only.
    pub async fn discover(&self, request: &ScanRequest) -> Result<DiscoveryResult, ScanError> {
        let (root, filter) = self.prepare(request).await?;
        let emitter = self.emitter(None);
        let mut sink = self.display.sink();
        Ok(self
            .run_discovery(&root, request, filter, sink.as_mut(), &emitter)
            .await)
    }

    /// Run a full scan on the runtime, streaming its events.
    ///
    /// The stream ends once the scan is done; the handle yields the result.
    pub fn scan_stream(
        &self,
        request: ScanRequest,
    ) -> (
        UnboundedReceiverStream<ScanEvent>,
        JoinHandle<Result<ProcessingResult, ScanError>>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let scanner = self.clone();
        let emitter = self.emitter(Some(tx));
        let handle = tokio::spawn(async move { scanner.run(&request, emitter).await });
        (UnboundedReceiverStream::new(rx), handle)
    }

    fn emitter(&self, stream: Option<mpsc::UnboundedSender<ScanEvent>>) -> Emitter {
        Emitter {
            broadcast: self.progress_tx.clone(),
            stream,
        }
    }

    async fn prepare(
        &self,
        request: &ScanRequest,
    ) -> Result<(PathBuf, Arc<EntryFilter>), ScanError> {
        request
            .validate()
            .map_err(|message| ScanError::InvalidConfig { message })?;
        let root = resolve_root(&request.root).await?;
        let filter = EntryFilter::new(request, self.skip.clone())?;
        Ok((root, Arc::new(filter)))
    }

    async fn run(
        &self,
        request: &ScanRequest,
        emitter: Emitter,
    ) -> Result<ProcessingResult, ScanError> {
        let (root, filter) = self.prepare(request).await?;
        info!(root = %root.display(), two_pass = request.discovery, "Starting scan");

        let mut sink = self.display.sink();
        let discovery = if request.discovery {
            let result = self
                .run_discovery(&root, request, Arc::clone(&filter), sink.as_mut(), &emitter)
                .await;
            if result.aborted {
                debug!("Discovery aborted, skipping processing");
                return Ok(ProcessingResult {
                    unreadable_dirs: result.unreadable_dirs,
                    elapsed: result.elapsed,
                    aborted: true,
                    discovery: Some(result),
                    ..Default::default()
                });
            }
            Some(result)
        } else {
            None
        };

        let tracker = ProgressTracker::new(sink)
            .with_update_interval(self.update_interval)
            .with_discovery(discovery.as_ref());
        let events = emitter.clone();
        let mut result = ProcessingWalker::new(&root, request, filter, Arc::clone(&self.estimator))
            .run(discovery.as_ref(), tracker, move |snapshot, finished| {
                let snapshot = snapshot.clone();
                events.emit(if finished {
                    ScanEvent::Finished(snapshot)
                } else {
                    ScanEvent::Progress(snapshot)
                });
            })
            .await;

        result.discovery = discovery;
        Ok(result)
    }

    async fn run_discovery(
        &self,
        root: &Path,
        request: &ScanRequest,
        filter: Arc<EntryFilter>,
        sink: &mut dyn ProgressSink,
        emitter: &Emitter,
    ) -> DiscoveryResult {
        let result = DiscoveryWalker::new(root, request, filter)
            .run(|progress| {
                sink.discovery(progress);
                emitter.emit(ScanEvent::Discovering(*progress));
            })
            .await;
        sink.discovery_finished(&result);
        emitter.emit(ScanEvent::Discovered(result.clone()));
        result
    }
}

impl std::fmt::Debug for Scanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scanner")
            .field("skip", &self.skip.is_some())
            .field("display", &self.display)
            .field("update_interval", &self.update_interval)
            .finish_non_exhaustive()
    }
}

/// Canonicalize the root and make sure it is a listable directory.
async fn resolve_root(root: &Path) -> Result<PathBuf, ScanError> {
    let canonical = tokio::fs::canonicalize(root)
        .await
        .map_err(|e| ScanError::io(root, e))?;
    let metadata = tokio::fs::metadata(&canonical)
        .await
        .map_err(|e| ScanError::io(&canonical, e))?;
    if !metadata.is_dir() {
        return Err(ScanError::NotADirectory { path: canonical });
    }
    let _listing = tokio::fs::read_dir(&canonical)
        .await
        .map_err(|e| ScanError::io(&canonical, e))?;
    Ok(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use tempfile::TempDir;
    use tokenmeter_core::ByteRatioEstimator;

    fn scanner() -> Scanner {
        Scanner::new(Arc::new(ByteRatioEstimator))
    }

    #[tokio::test]
    async fn test_scan_attaches_discovery() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.txt"), "abcdefgh").unwrap();

        let result = scanner().scan(&ScanRequest::new(temp.path())).await.unwrap();

        assert_eq!(result.total_cost, 2);
        let discovery = result.discovery.unwrap();
        assert_eq!(discovery.total_files, 1);
    }

    #[tokio::test]
    async fn test_root_must_be_a_directory() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("file.txt");
        fs::write(&file, "x").unwrap();

        let err = scanner().scan(&ScanRequest::new(&file)).await.unwrap_err();
        assert!(matches!(err, ScanError::NotADirectory { .. }));
    }

    #[tokio::test]
    async fn test_missing_root() {
        let temp = TempDir::new().unwrap();
        let err = scanner()
            .scan(&ScanRequest::new(temp.path().join("missing")))
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_invalid_request() {
        let temp = TempDir::new().unwrap();
        let mut request = ScanRequest::new(temp.path());
        request.io_concurrency = 0;

        let err = scanner().scan(&request).await.unwrap_err();
        assert!(matches!(err, ScanError::InvalidConfig { .. }));
    }

    #[tokio::test]
    async fn test_subscribers_see_discovery_and_finish() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.txt"), "x").unwrap();

        let scanner = scanner();
        let mut events = scanner.subscribe();
        scanner.scan(&ScanRequest::new(temp.path())).await.unwrap();

        let mut discovered = false;
        let mut finished = false;
        while let Ok(event) = events.try_recv() {
            match event {
                ScanEvent::Discovered(result) => {
                    assert_eq!(result.total_files, 1);
                    discovered = true;
                }
                ScanEvent::Finished(snapshot) => {
                    assert_eq!(snapshot.files_done, 1);
                    finished = true;
                }
                _ => {}
            }
        }
        assert!(discovered);
        assert!(finished);
    }
}

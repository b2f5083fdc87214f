//! Breadth-first directory traversal shared by both scan phases.

use std::collections::VecDeque;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::filter::EntryFilter;
use crate::limiter::ConcurrencyLimiter;
use crate::sampler::SharedSampler;
use crate::visited::VisitedSet;

/// Directories listed per batch, as a multiple of the limiter capacity.
const BATCH_FACTOR: usize = 4;

/// A file found while listing a directory.
#[derive(Debug, Clone)]
pub struct ListedFile {
    /// Absolute path.
    pub path: PathBuf,
    /// Path relative to the walk root, `/`-separated.
    pub relative_path: String,
}

/// Contents of one directory after filtering.
#[derive(Debug, Default)]
pub struct Listing {
    /// The listed directory.
    pub dir: PathBuf,
    /// Regular files that passed the filter.
    pub files: Vec<ListedFile>,
    /// Subdirectories queued for listing (first visit only).
    pub subdirs: Vec<PathBuf>,
    /// Listing stopped early because of cancellation.
    pub interrupted: bool,
}

/// Output of a walk, in batch order.
#[derive(Debug)]
pub enum WalkItem {
    /// A directory was listed.
    Listing(Listing),
    /// A directory could not be listed; its subtree is skipped.
    Unreadable { dir: PathBuf, error: std::io::Error },
}

/// Totals of a finished walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkSummary {
    /// Directories listed successfully.
    pub dirs_listed: u64,
    /// Directories that could not be listed.
    pub unreadable: u64,
    /// The walk stopped because of cancellation.
    pub aborted: bool,
}

/// Everything a directory listing task needs.
#[derive(Debug)]
pub(crate) struct WalkContext {
    root: PathBuf,
    filter: Arc<EntryFilter>,
    visited: VisitedSet,
    sampler: Option<SharedSampler>,
    cancel: CancellationToken,
}

impl WalkContext {
    /// `root` must already be canonical.
    pub(crate) fn new(
        root: PathBuf,
        filter: Arc<EntryFilter>,
        sampler: Option<SharedSampler>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            root,
            filter,
            visited: VisitedSet::new(),
            sampler,
            cancel,
        }
    }
}

/// Walks a tree level by level, listing directories through a limiter.
pub(crate) struct TreeWalker {
    ctx: Arc<WalkContext>,
    limiter: ConcurrencyLimiter,
    batch_size: usize,
}

impl TreeWalker {
    pub(crate) fn new(ctx: WalkContext, limiter: ConcurrencyLimiter) -> Self {
        let batch_size = limiter.capacity().saturating_mul(BATCH_FACTOR);
        Self {
            ctx: Arc::new(ctx),
            limiter,
            batch_size,
        }
    }

    /// Start walking. Items arrive on the receiver; dropping it stops the walk.
    pub(crate) fn spawn(self) -> (JoinHandle<WalkSummary>, mpsc::Receiver<WalkItem>) {
        let (tx, rx) = mpsc::channel(self.batch_size.max(16));
        let handle = tokio::spawn(self.run(tx));
        (handle, rx)
    }

    async fn run(self, tx: mpsc::Sender<WalkItem>) -> WalkSummary {
        let mut summary = WalkSummary::default();
        self.ctx.visited.insert(self.ctx.root.clone());
        let mut frontier = VecDeque::from([self.ctx.root.clone()]);

        while !frontier.is_empty() {
            let take = frontier.len().min(self.batch_size);
            let mut listings = JoinSet::new();

            for dir in frontier.drain(..take) {
                if self.ctx.cancel.is_cancelled() {
                    summary.aborted = true;
                    break;
                }
                let permit = tokio::select! {
                    biased;
                    _ = self.ctx.cancel.cancelled() => None,
                    permit = self.limiter.acquire() => permit.ok(),
                };
                let Some(permit) = permit else {
                    summary.aborted = true;
                    break;
                };
                let ctx = Arc::clone(&self.ctx);
                listings.spawn(async move {
                    let listing = list_directory(&ctx, dir).await;
                    drop(permit);
                    listing
                });
            }

            // Listings already started always complete.
            while let Some(joined) = listings.join_next().await {
                let item = match joined {
                    Ok(Ok(mut listing)) => {
                        summary.dirs_listed += 1;
                        summary.aborted |= listing.interrupted;
                        frontier.extend(std::mem::take(&mut listing.subdirs));
                        WalkItem::Listing(listing)
                    }
                    Ok(Err((dir, error))) => {
                        debug!(dir = %dir.display(), %error, "Skipping unreadable directory");
                        summary.unreadable += 1;
                        WalkItem::Unreadable { dir, error }
                    }
                    Err(error) => {
                        warn!(%error, "Directory listing task failed");
                        summary.unreadable += 1;
                        continue;
                    }
                };
                if tx.send(item).await.is_err() {
                    // Consumer is gone, nothing left to do.
                    summary.aborted = true;
                    return summary;
                }
            }

            if summary.aborted {
                break;
            }
        }

        summary
    }
}

/// List one directory, applying the filter, the visited set and the sampler.
async fn list_directory(
    ctx: &WalkContext,
    dir: PathBuf,
) -> Result<Listing, (PathBuf, std::io::Error)> {
    let mut entries = match tokio::fs::read_dir(&dir).await {
        Ok(entries) => entries,
        Err(error) => return Err((dir, error)),
    };

    let mut listing = Listing {
        dir,
        ..Default::default()
    };

    loop {
        if ctx.cancel.is_cancelled() {
            listing.interrupted = true;
            break;
        }

        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(error) => {
                debug!(dir = %listing.dir.display(), %error, "Directory listing cut short");
                break;
            }
        };

        let Ok(file_type) = entry.file_type().await else {
            continue;
        };
        // Symlinks are neither counted nor followed.
        if file_type.is_symlink() {
            continue;
        }

        let file_name = entry.file_name();
        let name = file_name.to_string_lossy();
        let path = entry.path();

        if file_type.is_dir() {
            if ctx.filter.skip_dir(&name) {
                trace!(dir = %path.display(), "Skipping filtered directory");
                continue;
            }
            match ctx.visited.visit(&path).await {
                Ok(true) => listing.subdirs.push(path),
                Ok(false) => trace!(dir = %path.display(), "Directory already visited"),
                Err(error) => debug!(dir = %path.display(), %error, "Cannot resolve directory"),
            }
        } else if file_type.is_file() {
            let relative_path = relative_path(&ctx.root, &path);
            if ctx.filter.skip_file(&name, &relative_path) {
                continue;
            }
            if let Some(sampler) = &ctx.sampler {
                // Only files admitted to the reservoir are stat'ed.
                if let Some(slot) = sampler.admit() {
                    if let Ok(metadata) = entry.metadata().await {
                        sampler.fill(slot, metadata.len());
                    }
                }
            }
            listing.files.push(ListedFile {
                path,
                relative_path,
            });
        }
    }

    Ok(listing)
}

/// `/`-separated path of `path` relative to `root`.
pub(crate) fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

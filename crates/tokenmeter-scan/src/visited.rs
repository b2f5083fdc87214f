//! Canonical directory tracking for cycle detection.

use std::path::{Path, PathBuf};

use dashmap::DashSet;

/// Tracks directories already queued during one walk.
///
/// Directories are keyed by their canonical (symlink-resolved) path, so two
/// routes to the same directory count as one. Check-and-insert is a single
/// atomic operation on the concurrent set.
#[derive(Debug, Default)]
pub struct VisitedSet {
    seen: DashSet<PathBuf>,
}

impl VisitedSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self {
            seen: DashSet::new(),
        }
    }

    /// Mark a canonical directory as visited. Returns `true` the first time.
    pub fn insert(&self, canonical: PathBuf) -> bool {
        self.seen.insert(canonical)
    }

    /// Resolve `dir` and mark it visited. Returns `Ok(true)` the first time.
    pub async fn visit(&self, dir: &Path) -> std::io::Result<bool> {
        let canonical = tokio::fs::canonicalize(dir).await?;
        Ok(self.insert(canonical))
    }

    /// Check if a canonical directory has been seen.
    pub fn contains(&self, canonical: &Path) -> bool {
        self.seen.contains(canonical)
    }

    /// Number of distinct directories visited.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Check if nothing has been visited.
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

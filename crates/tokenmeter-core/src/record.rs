//! Scan results: per-file records and phase summaries.

use std::path::Path;
use std::time::Duration;

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

use crate::error::ScanWarning;

/// Cost of one successfully processed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Path relative to the scan root, `/`-separated.
    pub relative_path: String,
    /// Lower-case extension without the dot, empty when there is none.
    pub extension: CompactString,
    /// Token count, or the byte approximation for large files.
    pub cost: u64,
    /// File size in bytes.
    pub bytes: u64,
    /// Whether `cost` is the byte approximation rather than an exact count.
    pub approximate: bool,
}

impl FileRecord {
    /// Create a record, deriving the extension from the relative path.
    pub fn new(relative_path: impl Into<String>, cost: u64, bytes: u64, approximate: bool) -> Self {
        let relative_path = relative_path.into();
        let extension = extension_of(Path::new(&relative_path));
        Self {
            relative_path,
            extension,
            cost,
            bytes,
            approximate,
        }
    }
}

/// Lower-case extension of a path, empty for none (including dotfiles).
pub fn extension_of(path: &Path) -> CompactString {
    path.extension()
        .map(|ext| CompactString::new(ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

/// Result of the discovery census.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryResult {
    /// Files found (symlinks excluded).
    pub total_files: u64,
    /// Directories listed, root included.
    pub total_dirs: u64,
    /// Directories that could not be listed.
    pub unreadable_dirs: u64,
    /// Mean file size from the reservoir sample, `None` when nothing was sampled.
    pub avg_bytes_per_file: Option<f64>,
    /// Number of sizes in the reservoir at the end of discovery.
    pub sampled_files: u64,
    /// Time spent discovering.
    pub elapsed: Duration,
    /// Discovery stopped early because the scan was cancelled.
    pub aborted: bool,
}

/// Result of the processing phase, the output of a scan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingResult {
    /// One record per successfully processed file, in completion order.
    pub records: Vec<FileRecord>,
    /// Sum of all record costs.
    pub total_cost: u64,
    /// Sum of all record sizes.
    pub total_bytes: u64,
    /// Files that produced a record.
    pub processed_count: u64,
    /// Files that failed (vanished, unreadable, cost error).
    pub error_count: u64,
    /// Files that appeared after discovery and were left out to keep counts consistent.
    pub late_files: u64,
    /// Directories that could not be listed during processing.
    pub unreadable_dirs: u64,
    /// Details for each failure.
    pub warnings: Vec<ScanWarning>,
    /// Time spent processing.
    pub elapsed: Duration,
    /// The scan was cancelled before every file was processed.
    pub aborted: bool,
    /// The discovery census, when it ran.
    pub discovery: Option<DiscoveryResult>,
}

impl ProcessingResult {
    /// Files that were attempted, successful or not.
    pub fn attempted(&self) -> u64 {
        self.processed_count + self.error_count
    }

    /// Check if there were any failures.
    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    /// Add a successful record.
    pub fn push_record(&mut self, record: FileRecord) {
        self.total_cost = self.total_cost.saturating_add(record.cost);
        self.total_bytes = self.total_bytes.saturating_add(record.bytes);
        self.processed_count += 1;
        self.records.push(record);
    }

    /// Add a failure.
    pub fn push_error(&mut self, warning: ScanWarning) {
        self.error_count += 1;
        self.warnings.push(warning);
    }
}

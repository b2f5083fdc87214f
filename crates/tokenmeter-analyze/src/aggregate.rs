//! Cost aggregation by extension, directory and file.

use std::time::Duration;

use chrono::{DateTime, Utc};
use compact_str::CompactString;
use derive_builder::Builder;
use indexmap::IndexMap;
use itertools::Itertools;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use tokenmeter_core::{FileRecord, ProcessingResult, ScanWarning, WarningKind};

/// Label for records directly under the scan root.
pub const ROOT_DIRECTORY: &str = ".";

/// Configuration for cost aggregation.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into))]
pub struct AggregateConfig {
    /// Number of most expensive files to report.
    #[builder(default = "10")]
    pub top_files: usize,

    /// Number of extensions to report (0 = all).
    #[builder(default = "0")]
    pub top_extensions: usize,

    /// Number of top-level directories to report (0 = all).
    #[builder(default = "10")]
    pub top_directories: usize,
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self {
            top_files: 10,
            top_extensions: 0,
            top_directories: 10,
        }
    }
}

impl AggregateConfig {
    /// Create a new config builder.
    pub fn builder() -> AggregateConfigBuilder {
        AggregateConfigBuilder::default()
    }
}

/// Totals for one group of files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupStats {
    /// Extension (lowercase, empty for none) or top-level directory.
    pub name: CompactString,
    /// Number of files in the group.
    pub file_count: u64,
    /// Sum of file costs.
    pub total_cost: u64,
    /// Sum of file sizes.
    pub total_bytes: u64,
    /// Fraction of the overall cost, in `0.0..=1.0`.
    pub share: f64,
}

impl GroupStats {
    fn new(name: CompactString) -> Self {
        Self {
            name,
            file_count: 0,
            total_cost: 0,
            total_bytes: 0,
            share: 0.0,
        }
    }

    fn add(&mut self, record: &FileRecord) {
        self.file_count += 1;
        self.total_cost += record.cost;
        self.total_bytes += record.bytes;
    }

    /// Mean cost per file.
    pub fn average_cost(&self) -> f64 {
        if self.file_count == 0 {
            0.0
        } else {
            self.total_cost as f64 / self.file_count as f64
        }
    }
}

/// Number of warnings of one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarningCount {
    pub kind: WarningKind,
    pub count: u64,
}

/// Summary of a scan, ready for display or serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostReport {
    /// When the report was generated.
    pub generated_at: DateTime<Utc>,
    /// Sum of all file costs.
    pub total_cost: u64,
    /// Files that produced a cost.
    pub total_files: u64,
    /// Sum of all file sizes.
    pub total_bytes: u64,
    /// Files whose cost is a byte approximation.
    pub approximate_files: u64,
    /// Files that failed.
    pub error_count: u64,
    /// Files that appeared after discovery and were not processed.
    pub late_files: u64,
    /// Directories that could not be listed.
    pub unreadable_dirs: u64,
    /// The scan was cancelled before it finished.
    pub aborted: bool,
    /// Time spent processing.
    pub elapsed: Duration,
    /// Per-extension totals, most expensive first.
    pub by_extension: Vec<GroupStats>,
    /// Per top-level directory totals, most expensive first.
    pub by_directory: Vec<GroupStats>,
    /// Most expensive files, most expensive first.
    pub top_files: Vec<FileRecord>,
    /// Warnings grouped by kind, most frequent first.
    pub warnings: Vec<WarningCount>,
}

impl CostReport {
    /// Check if no file produced a cost.
    pub fn is_empty(&self) -> bool {
        self.total_files == 0
    }

    /// Mean cost per file.
    pub fn average_cost(&self) -> f64 {
        if self.total_files == 0 {
            0.0
        } else {
            self.total_cost as f64 / self.total_files as f64
        }
    }

    /// Find an extension group by name.
    pub fn extension(&self, name: &str) -> Option<&GroupStats> {
        self.by_extension.iter().find(|group| group.name == name)
    }
}

/// Builds a [`CostReport`] from a scan result.
#[derive(Debug, Default)]
pub struct Aggregator {
    config: AggregateConfig,
}

impl Aggregator {
    /// Create a new aggregator with default config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new aggregator with custom config.
    pub fn with_config(config: AggregateConfig) -> Self {
        Self { config }
    }

    /// Summarize `result`. Empty input gives an empty report.
    pub fn aggregate(&self, result: &ProcessingResult) -> CostReport {
        let total_cost: u64 = result.records.iter().map(|r| r.cost).sum();
        let total_bytes: u64 = result.records.iter().map(|r| r.bytes).sum();

        let mut by_extension: IndexMap<CompactString, GroupStats> = IndexMap::new();
        let mut by_directory: IndexMap<CompactString, GroupStats> = IndexMap::new();
        for record in &result.records {
            by_extension
                .entry(record.extension.clone())
                .or_insert_with_key(|name| GroupStats::new(name.clone()))
                .add(record);
            by_directory
                .entry(top_level_directory(&record.relative_path))
                .or_insert_with_key(|name| GroupStats::new(name.clone()))
                .add(record);
        }

        let mut top_files = result.records.clone();
        top_files.par_sort_unstable_by(|a, b| {
            b.cost
                .cmp(&a.cost)
                .then_with(|| a.relative_path.cmp(&b.relative_path))
        });
        top_files.truncate(self.config.top_files);

        CostReport {
            generated_at: Utc::now(),
            total_cost,
            total_files: result.records.len() as u64,
            total_bytes,
            approximate_files: result.records.iter().filter(|r| r.approximate).count() as u64,
            error_count: result.error_count,
            late_files: result.late_files,
            unreadable_dirs: result.unreadable_dirs,
            aborted: result.aborted,
            elapsed: result.elapsed,
            by_extension: rank(by_extension, total_cost, self.config.top_extensions),
            by_directory: rank(by_directory, total_cost, self.config.top_directories),
            top_files,
            warnings: count_warnings(&result.warnings),
        }
    }
}

fn count_warnings(warnings: &[ScanWarning]) -> Vec<WarningCount> {
    warnings
        .iter()
        .map(|warning| warning.kind)
        .counts()
        .into_iter()
        .map(|(kind, count)| WarningCount {
            kind,
            count: count as u64,
        })
        .sorted_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.kind.to_string().cmp(&b.kind.to_string()))
        })
        .collect()
}

/// First path component, or [`ROOT_DIRECTORY`] for files at the root.
fn top_level_directory(relative_path: &str) -> CompactString {
    match relative_path.split_once('/') {
        Some((dir, _)) => CompactString::from(dir),
        None => CompactString::new(ROOT_DIRECTORY),
    }
}

/// Fill in shares, sort by cost descending (ties by name) and keep `limit` (0 = all).
fn rank(
    groups: IndexMap<CompactString, GroupStats>,
    total_cost: u64,
    limit: usize,
) -> Vec<GroupStats> {
    let mut groups: Vec<GroupStats> = groups
        .into_values()
        .map(|mut group| {
            group.share = if total_cost == 0 {
                0.0
            } else {
                group.total_cost as f64 / total_cost as f64
            };
            group
        })
        .collect();

    groups.sort_by(|a, b| {
        b.total_cost
            .cmp(&a.total_cost)
            .then_with(|| a.name.cmp(&b.name))
    });
    if limit > 0 {
        groups.truncate(limit);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_level_directory() {
        assert_eq!(top_level_directory("src/lib.rs"), "src");
        assert_eq!(top_level_directory("src/scan/mod.rs"), "src");
        assert_eq!(top_level_directory("README.md"), ROOT_DIRECTORY);
    }

    #[test]
    fn test_rank_breaks_ties_by_name() {
        let mut groups = IndexMap::new();
        for (name, cost) in [("md", 5u64), ("toml", 10), ("rs", 10)] {
            let mut group = GroupStats::new(CompactString::from(name));
            group.total_cost = cost;
            group.file_count = 1;
            groups.insert(CompactString::from(name), group);
        }

        let ranked = rank(groups, 25, 0);
        let names: Vec<_> = ranked.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["rs", "toml", "md"]);
        assert!((ranked[2].share - 0.2).abs() < f64::EPSILON);
    }

    #[test]
    fn test_rank_limit() {
        let mut groups = IndexMap::new();
        for name in ["a", "b", "c"] {
            groups.insert(CompactString::from(name), GroupStats::new(CompactString::from(name)));
        }
        assert_eq!(rank(groups.clone(), 0, 2).len(), 2);
        assert_eq!(rank(groups, 0, 0).len(), 3);
    }
}

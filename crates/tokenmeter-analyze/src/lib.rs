//! Cost aggregation and reporting for tokenmeter.
//!
//! This crate turns a scan result into a [`CostReport`]:
//!
//! - **Per-extension totals** with each extension's share of the overall cost
//! - **Per-directory totals** for the top-level directories of the tree
//! - **Top files** by cost
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tokenmeter_analyze::{AggregateConfig, Aggregator, format_text};
//! use tokenmeter_scan::{ByteRatioEstimator, ScanRequest, Scanner};
//!
//! let request = ScanRequest::new("/path/to/repo");
//! let result = Scanner::new(Arc::new(ByteRatioEstimator)).scan(&request).await?;
//!
//! let config = AggregateConfig::builder().top_files(20usize).build()?;
//! let report = Aggregator::with_config(config).aggregate(&result);
//!
//! print!("{}", format_text(&report, &request.root));
//! ```

mod aggregate;
mod report;

pub use aggregate::{
    AggregateConfig, AggregateConfigBuilder, AggregateConfigBuilderError, Aggregator, CostReport,
    GroupStats, ROOT_DIRECTORY, WarningCount,
};
pub use report::{format_count, format_text};

// Re-export core types
pub use tokenmeter_core::{FileRecord, ProcessingResult};

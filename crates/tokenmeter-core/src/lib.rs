//! Core types and traits for tokenmeter.
//!
//! This crate provides the data model shared by the scanner and the
//! reporting crates: the scan request, per-file records, phase results,
//! error types and the collaborator traits the scanner consumes.

mod config;
mod error;
mod estimator;
mod record;

pub use config::{
    DEFAULT_DENY_LIST, DEFAULT_DIR_CONCURRENCY, DEFAULT_LARGE_FILE_THRESHOLD, DEFAULT_SAMPLE_SIZE,
    ScanRequest, ScanRequestBuilder, ScanRequestBuilderError, default_io_concurrency,
    io_concurrency_for, is_denied_dir,
};
pub use error::{CostError, ScanError, ScanWarning, WarningKind};
pub use estimator::{
    BYTES_PER_TOKEN, ByteRatioEstimator, CostEstimator, SkipPredicate, approximate_cost,
};
pub use record::{DiscoveryResult, FileRecord, ProcessingResult, extension_of};

//! Scan request configuration.

use std::num::NonZeroUsize;
use std::path::PathBuf;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Directory names that are never traversed.
///
/// Version-control metadata, dependency caches and build output. These
/// subtrees are usually the largest by file count and never part of a prompt.
pub const DEFAULT_DENY_LIST: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    ".bzr",
    "node_modules",
    "bower_components",
    ".venv",
    "venv",
    "__pycache__",
    ".mypy_cache",
    ".pytest_cache",
    ".tox",
    ".gradle",
    ".cache",
    "target",
    "build",
    "dist",
    "out",
    ".next",
    ".nuxt",
    ".turbo",
];

/// Default number of concurrent directory listings.
pub const DEFAULT_DIR_CONCURRENCY: usize = 32;

/// Default reservoir size for average file size estimation.
pub const DEFAULT_SAMPLE_SIZE: usize = 2000;

/// Files above this size get a byte-based cost approximation.
pub const DEFAULT_LARGE_FILE_THRESHOLD: u64 = 10 * 1024 * 1024;

/// Check whether a directory name is on the built-in deny-list.
pub fn is_denied_dir(name: &str) -> bool {
    DEFAULT_DENY_LIST.contains(&name)
}

/// File I/O concurrency derived from the host's available parallelism.
pub fn default_io_concurrency() -> usize {
    let cores = std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(4);
    io_concurrency_for(cores)
}

/// File I/O concurrency for a given number of cores.
///
/// File work is I/O bound, so we oversubscribe the cores, bounded to 32..=128.
pub fn io_concurrency_for(cores: usize) -> usize {
    cores.saturating_mul(8).clamp(32, 128)
}

/// A request to scan one directory tree.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct ScanRequest {
    /// Root directory to scan.
    pub root: PathBuf,

    /// Cooperative cancellation signal. Cancelling stops new work; admitted
    /// work finishes and the result is marked aborted.
    #[builder(default)]
    #[serde(skip)]
    pub cancel: Option<CancellationToken>,

    /// Only files whose relative path matches one of these globs are counted.
    /// Empty means every file.
    #[builder(default)]
    #[serde(default)]
    pub include_patterns: Vec<String>,

    /// Entry names (files or directories) to skip, glob syntax.
    #[builder(default)]
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    /// Include hidden entries (starting with `.`).
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub include_hidden: bool,

    /// Concurrent directory listings per walk.
    #[builder(default = "DEFAULT_DIR_CONCURRENCY")]
    #[serde(default = "default_dir_concurrency")]
    pub dir_concurrency: usize,

    /// Concurrent per-file cost computations.
    #[builder(default = "default_io_concurrency()")]
    #[serde(default = "default_io_concurrency")]
    pub io_concurrency: usize,

    /// Maximum number of file sizes kept by the discovery sampler.
    #[builder(default = "DEFAULT_SAMPLE_SIZE")]
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,

    /// Files larger than this many bytes are approximated instead of counted.
    #[builder(default = "DEFAULT_LARGE_FILE_THRESHOLD")]
    #[serde(default = "default_large_file_threshold")]
    pub large_file_threshold: u64,

    /// Run the discovery census before processing.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub discovery: bool,

    /// Seed for the sampler's RNG (random when unset).
    #[builder(default)]
    #[serde(default)]
    pub sample_seed: Option<u64>,
}

fn default_true() -> bool {
    true
}

fn default_dir_concurrency() -> usize {
    DEFAULT_DIR_CONCURRENCY
}

fn default_sample_size() -> usize {
    DEFAULT_SAMPLE_SIZE
}

fn default_large_file_threshold() -> u64 {
    DEFAULT_LARGE_FILE_THRESHOLD
}

impl ScanRequestBuilder {
    fn validate(&self) -> Result<(), String> {
        match self.root {
            Some(ref root) if root.as_os_str().is_empty() => {
                return Err("Root path cannot be empty".to_string());
            }
            None => return Err("Root path is required".to_string()),
            _ => {}
        }
        if self.dir_concurrency == Some(0) {
            return Err("dir_concurrency must be at least 1".to_string());
        }
        if self.io_concurrency == Some(0) {
            return Err("io_concurrency must be at least 1".to_string());
        }
        if self.sample_size == Some(0) {
            return Err("sample_size must be at least 1".to_string());
        }
        Ok(())
    }
}

impl ScanRequest {
    /// Create a new request builder.
    pub fn builder() -> ScanRequestBuilder {
        ScanRequestBuilder::default()
    }

    /// Create a request for a path with default settings.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cancel: None,
            include_patterns: Vec::new(),
            ignore_patterns: Vec::new(),
            include_hidden: true,
            dir_concurrency: DEFAULT_DIR_CONCURRENCY,
            io_concurrency: default_io_concurrency(),
            sample_size: DEFAULT_SAMPLE_SIZE,
            large_file_threshold: DEFAULT_LARGE_FILE_THRESHOLD,
            discovery: true,
            sample_seed: None,
        }
    }

    /// Check the knobs a hand-built request could get wrong.
    pub fn validate(&self) -> Result<(), String> {
        if self.root.as_os_str().is_empty() {
            return Err("Root path cannot be empty".to_string());
        }
        if self.dir_concurrency == 0 || self.io_concurrency == 0 {
            return Err("Concurrency limits must be at least 1".to_string());
        }
        if self.sample_size == 0 {
            return Err("sample_size must be at least 1".to_string());
        }
        Ok(())
    }

    /// The cancellation token, or a fresh one that is never cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone().unwrap_or_default()
    }
}

impl Default for ScanRequest {
    fn default() -> Self {
        Self::new(".")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let request = ScanRequest::builder()
            .root("/repo")
            .dir_concurrency(8usize)
            .io_concurrency(16usize)
            .include_hidden(false)
            .build()
            .unwrap();

        assert_eq!(request.root, PathBuf::from("/repo"));
        assert_eq!(request.dir_concurrency, 8);
        assert_eq!(request.io_concurrency, 16);
        assert!(!request.include_hidden);
        assert_eq!(request.sample_size, DEFAULT_SAMPLE_SIZE);
        assert!(request.discovery);
    }

    #[test]
    fn test_builder_rejects_zero_concurrency() {
        let err = ScanRequest::builder()
            .root("/repo")
            .io_concurrency(0usize)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("io_concurrency"));
    }

    #[test]
    fn test_builder_requires_root() {
        assert!(ScanRequest::builder().build().is_err());
        assert!(ScanRequest::builder().root("").build().is_err());
    }

    #[test]
    fn test_io_concurrency_is_bounded() {
        assert_eq!(io_concurrency_for(1), 32);
        assert_eq!(io_concurrency_for(8), 64);
        assert_eq!(io_concurrency_for(64), 128);
        let auto = default_io_concurrency();
        assert!((32..=128).contains(&auto));
    }

    #[test]
    fn test_deny_list() {
        assert!(is_denied_dir(".git"));
        assert!(is_denied_dir("node_modules"));
        assert!(!is_denied_dir("src"));
    }

    #[test]
    fn test_cancel_token() {
        let token = CancellationToken::new();
        let request = ScanRequest::builder()
            .root("/repo")
            .cancel(token.clone())
            .build()
            .unwrap();

        assert!(!request.cancel_token().is_cancelled());
        token.cancel();
        assert!(request.cancel_token().is_cancelled());
        assert!(!ScanRequest::new("/repo").cancel_token().is_cancelled());
    }

    #[test]
    fn test_deserialize_defaults() {
        let request: ScanRequest = serde_json::from_str(r#"{"root": "/repo"}"#).unwrap();
        assert!(request.include_hidden);
        assert_eq!(request.dir_concurrency, DEFAULT_DIR_CONCURRENCY);
        assert_eq!(request.large_file_threshold, DEFAULT_LARGE_FILE_THRESHOLD);
        assert!(request.cancel.is_none());
    }
}

//! Collaborator traits: the per-file cost function and the skip predicate.

use std::path::Path;

use crate::error::CostError;

/// Bytes per token used by the byte-based approximation.
pub const BYTES_PER_TOKEN: u64 = 4;

/// Computes the cost (token count) of one file.
///
/// Implementations may be slow, may fail, and may cache internally. The
/// scanner calls them from blocking worker threads.
pub trait CostEstimator: Send + Sync {
    /// Cost of the file at `path`.
    fn cost_of(&self, path: &Path) -> Result<u64, CostError>;
}

impl<F> CostEstimator for F
where
    F: Fn(&Path) -> Result<u64, CostError> + Send + Sync,
{
    fn cost_of(&self, path: &Path) -> Result<u64, CostError> {
        self(path)
    }
}

/// Decides whether a directory entry should be skipped, by name.
pub trait SkipPredicate: Send + Sync {
    /// Returns `true` to leave the entry out of the scan.
    fn should_skip(&self, name: &str) -> bool;
}

impl<F> SkipPredicate for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn should_skip(&self, name: &str) -> bool {
        self(name)
    }
}

/// Byte-based cost used for files above the size threshold.
///
/// Deterministic in the byte size: `ceil(bytes / 4)`.
pub fn approximate_cost(bytes: u64) -> u64 {
    bytes.div_ceil(BYTES_PER_TOKEN)
}

/// Reference estimator: reads the file and applies the byte approximation.
///
/// Reading the file makes unreadable files fail the way a real tokenizer
/// would. Plug a real tokenizer in through [`CostEstimator`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ByteRatioEstimator;

impl CostEstimator for ByteRatioEstimator {
    fn cost_of(&self, path: &Path) -> Result<u64, CostError> {
        let content = std::fs::read(path).map_err(|e| CostError::io(path, e))?;
        Ok(approximate_cost(content.len() as u64))
    }
}

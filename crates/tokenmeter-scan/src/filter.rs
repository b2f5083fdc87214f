//! Entry filtering: deny-list, hidden entries, ignore and include patterns.

use std::sync::Arc;

use globset::{Glob, GlobSet, GlobSetBuilder};

use tokenmeter_core::{ScanError, ScanRequest, SkipPredicate, is_denied_dir};

/// [`SkipPredicate`] backed by a compiled set of glob patterns.
#[derive(Debug, Clone)]
pub struct GlobSkip {
    set: GlobSet,
}

impl GlobSkip {
    /// Compile `patterns`. Fails on the first invalid pattern.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, ScanError> {
        Ok(Self {
            set: compile(patterns)?,
        })
    }

    /// Check if any pattern matches `name`.
    pub fn is_match(&self, name: &str) -> bool {
        self.set.is_match(name)
    }
}

impl SkipPredicate for GlobSkip {
    fn should_skip(&self, name: &str) -> bool {
        self.is_match(name)
    }
}

fn compile<S: AsRef<str>>(patterns: &[S]) -> Result<GlobSet, ScanError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let pattern = pattern.as_ref();
        let glob = Glob::new(pattern).map_err(|e| ScanError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| ScanError::InvalidPattern {
        pattern: patterns
            .iter()
            .map(|p| p.as_ref())
            .collect::<Vec<_>>()
            .join(", "),
        message: e.to_string(),
    })
}

/// Decides which entries a walk visits. Shared by both walkers so they
/// see the same tree.
#[derive(Clone)]
pub struct EntryFilter {
    include: Option<GlobSet>,
    ignore: Option<GlobSkip>,
    include_hidden: bool,
    skip: Option<Arc<dyn SkipPredicate>>,
}

impl EntryFilter {
    /// Build the filter for a request plus an optional external predicate.
    pub fn new(
        request: &ScanRequest,
        skip: Option<Arc<dyn SkipPredicate>>,
    ) -> Result<Self, ScanError> {
        let include = if request.include_patterns.is_empty() {
            None
        } else {
            Some(compile(&request.include_patterns)?)
        };
        let ignore = if request.ignore_patterns.is_empty() {
            None
        } else {
            Some(GlobSkip::new(&request.ignore_patterns)?)
        };

        Ok(Self {
            include,
            ignore,
            include_hidden: request.include_hidden,
            skip,
        })
    }

    /// Check if a directory should be left out entirely.
    pub fn skip_dir(&self, name: &str) -> bool {
        is_denied_dir(name) || self.skip_name(name)
    }

    /// Check if a file should be left out.
    pub fn skip_file(&self, name: &str, relative_path: &str) -> bool {
        self.skip_name(name) || !self.includes(relative_path)
    }

    fn skip_name(&self, name: &str) -> bool {
        if !self.include_hidden && name.starts_with('.') {
            return true;
        }
        if self.ignore.as_ref().is_some_and(|ignore| ignore.is_match(name)) {
            return true;
        }
        self.skip.as_ref().is_some_and(|skip| skip.should_skip(name))
    }

    fn includes(&self, relative_path: &str) -> bool {
        self.include
            .as_ref()
            .is_none_or(|include| include.is_match(relative_path))
    }
}

impl std::fmt::Debug for EntryFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryFilter")
            .field("include", &self.include.as_ref().map(GlobSet::len))
            .field("ignore", &self.ignore)
            .field("include_hidden", &self.include_hidden)
            .field("skip", &self.skip.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ScanRequest {
        ScanRequest::new("/repo")
    }

    #[test]
    fn test_deny_list_always_applies() {
        let filter = EntryFilter::new(&request(), None).unwrap();
        assert!(filter.skip_dir(".git"));
        assert!(filter.skip_dir("node_modules"));
        assert!(!filter.skip_dir("src"));
        // Deny-list is for directories only.
        assert!(!filter.skip_file("build", "build"));
    }

    #[test]
    fn test_ignore_patterns() {
        let request = ScanRequest::builder()
            .root("/repo")
            .ignore_patterns(vec!["*.lock".to_string(), "fixtures".to_string()])
            .build()
            .unwrap();
        let filter = EntryFilter::new(&request, None).unwrap();

        assert!(filter.skip_file("Cargo.lock", "Cargo.lock"));
        assert!(filter.skip_dir("fixtures"));
        assert!(!filter.skip_file("Cargo.toml", "Cargo.toml"));
    }

    #[test]
    fn test_include_patterns_match_relative_path() {
        let request = ScanRequest::builder()
            .root("/repo")
            .include_patterns(vec!["src/**/*.rs".to_string()])
            .build()
            .unwrap();
        let filter = EntryFilter::new(&request, None).unwrap();

        assert!(!filter.skip_file("lib.rs", "src/lib.rs"));
        assert!(!filter.skip_file("mod.rs", "src/scan/mod.rs"));
        assert!(filter.skip_file("README.md", "README.md"));
        assert!(filter.skip_file("build.rs", "build.rs"));
    }

    #[test]
    fn test_hidden_entries() {
        let mut request = request();
        request.include_hidden = false;
        let filter = EntryFilter::new(&request, None).unwrap();
        assert!(filter.skip_file(".env", ".env"));
        assert!(filter.skip_dir(".github"));
    }

    #[test]
    fn test_external_predicate() {
        let skip: Arc<dyn SkipPredicate> = Arc::new(|name: &str| name.starts_with("gen_"));
        let filter = EntryFilter::new(&request(), Some(skip)).unwrap();
        assert!(filter.skip_file("gen_types.rs", "gen_types.rs"));
        assert!(filter.skip_dir("gen_out"));
        assert!(!filter.skip_file("types.rs", "types.rs"));
    }

    #[test]
    fn test_invalid_pattern() {
        let err = GlobSkip::new(&["a[".to_string()]).unwrap_err();
        assert!(matches!(err, ScanError::InvalidPattern { .. }));
    }
}

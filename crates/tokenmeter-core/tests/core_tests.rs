use tokenmeter_core::{
    ByteRatioEstimator, CostError, CostEstimator, DiscoveryResult, FileRecord, ProcessingResult,
    ScanError, ScanRequest, ScanWarning, SkipPredicate, WarningKind, approximate_cost,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_file_record_extension() {
    let record = FileRecord::new("src/Main.RS", 10, 40, false);
    assert_eq!(record.extension, "rs");
    assert_eq!(record.relative_path, "src/Main.RS");

    let record = FileRecord::new("Makefile", 1, 4, false);
    assert!(record.extension.is_empty());

    let record = FileRecord::new(".gitignore", 1, 4, false);
    assert!(record.extension.is_empty());

    let record = FileRecord::new("archive.tar.gz", 1, 4, true);
    assert_eq!(record.extension, "gz");
    assert!(record.approximate);
}

#[test]
fn test_processing_result_accounting() {
    let mut result = ProcessingResult::default();
    assert!(!result.has_errors());

    result.push_record(FileRecord::new("a.rs", 10, 40, false));
    result.push_record(FileRecord::new("b.rs", 5, 20, false));
    result.push_error(ScanWarning::new("/repo/c.rs", "gone", WarningKind::Vanished));

    assert_eq!(result.total_cost, 15);
    assert_eq!(result.total_bytes, 60);
    assert_eq!(result.processed_count, 2);
    assert_eq!(result.error_count, 1);
    assert_eq!(result.attempted(), 3);
    assert!(result.has_errors());
}

#[test]
fn test_results_serialize() {
    let discovery = DiscoveryResult {
        total_files: 12,
        total_dirs: 3,
        avg_bytes_per_file: Some(100.0),
        sampled_files: 12,
        elapsed: Duration::from_millis(20),
        ..Default::default()
    };
    let mut result = ProcessingResult {
        discovery: Some(discovery.clone()),
        ..Default::default()
    };
    result.push_record(FileRecord::new("lib.rs", 7, 28, false));

    let json = serde_json::to_string(&result).unwrap();
    let back: ProcessingResult = serde_json::from_str(&json).unwrap();

    assert_eq!(back.records, result.records);
    assert_eq!(back.discovery, Some(discovery));
    assert_eq!(back.total_cost, 7);
}

#[test]
fn test_request_defaults() {
    let request = ScanRequest::new("/repo");

    assert_eq!(request.root, PathBuf::from("/repo"));
    assert!(request.include_hidden);
    assert!(request.discovery);
    assert!(request.cancel.is_none());
    assert!(!request.cancel_token().is_cancelled());
    assert!(request.validate().is_ok());
}

#[test]
fn test_request_validation() {
    let mut request = ScanRequest::new("");
    assert!(request.validate().is_err());

    request.root = PathBuf::from("/repo");
    request.sample_size = 0;
    assert!(request.validate().is_err());

    let err = ScanRequest::builder().root("").build().unwrap_err();
    assert!(err.to_string().contains("empty"));
}

#[test]
fn test_scan_error_messages() {
    let err = ScanError::io(
        "/missing",
        std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
    );
    assert!(matches!(err, ScanError::NotFound { .. }));
    assert!(err.to_string().contains("/missing"));

    let err = ScanError::InvalidPattern {
        pattern: "a[".to_string(),
        message: "unclosed character class".to_string(),
    };
    assert!(err.to_string().contains("a["));
}

#[test]
fn test_byte_ratio_estimator_reads_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("prompt.txt");
    fs::write(&path, "x".repeat(401)).unwrap();

    let cost = ByteRatioEstimator.cost_of(&path).unwrap();
    assert_eq!(cost, approximate_cost(401));
    assert_eq!(cost, 101);

    let err = ByteRatioEstimator
        .cost_of(&temp.path().join("missing.txt"))
        .unwrap_err();
    assert!(matches!(err, CostError::Io { .. }));
}

#[test]
fn test_trait_objects() {
    let estimator: Box<dyn CostEstimator> =
        Box::new(|path: &Path| -> Result<u64, CostError> {
            Err(CostError::Unsupported {
                path: path.to_path_buf(),
                reason: "binary".to_string(),
            })
        });
    let err = estimator.cost_of(Path::new("/repo/logo.png")).unwrap_err();
    let warning = ScanWarning::cost_failed("/repo/logo.png", &err);
    assert_eq!(warning.kind, WarningKind::CostFailed);
    assert!(warning.message.contains("binary"));

    let skip: Box<dyn SkipPredicate> = Box::new(|name: &str| name.ends_with(".min.js"));
    assert!(skip.should_skip("app.min.js"));
    assert!(!skip.should_skip("app.js"));
}

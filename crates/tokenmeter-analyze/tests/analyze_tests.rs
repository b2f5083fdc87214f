use std::path::Path;
use std::time::Duration;

use tokenmeter_analyze::{
    AggregateConfig, Aggregator, FileRecord, ProcessingResult, ROOT_DIRECTORY, format_text,
};
use tokenmeter_core::{ScanWarning, WarningKind};

fn result_with(records: &[(&str, u64)]) -> ProcessingResult {
    let mut result = ProcessingResult::default();
    for (path, cost) in records {
        result.push_record(FileRecord::new(*path, *cost, cost * 4, false));
    }
    result.elapsed = Duration::from_millis(1500);
    result
}

#[test]
fn test_aggregate_config_builder() {
    let config = AggregateConfig::builder()
        .top_files(3usize)
        .top_extensions(5usize)
        .build()
        .unwrap();

    assert_eq!(config.top_files, 3);
    assert_eq!(config.top_extensions, 5);
    assert_eq!(config.top_directories, 10);

    // Test default config
    let default_config = AggregateConfig::default();
    assert_eq!(default_config.top_files, 10);
    assert_eq!(default_config.top_extensions, 0);
}

#[test]
fn test_groups_by_extension() {
    let result = result_with(&[
        ("src/main.rs", 100),
        ("src/lib.rs", 200),
        ("README.md", 50),
        ("docs/guide.MD", 50),
        ("Makefile", 100),
    ]);

    let report = Aggregator::new().aggregate(&result);

    assert_eq!(report.total_cost, 500);
    assert_eq!(report.total_files, 5);
    assert_eq!(report.total_bytes, 2000);

    let names: Vec<_> = report.by_extension.iter().map(|g| g.name.as_str()).collect();
    assert_eq!(names, vec!["rs", "", "md"]);

    let rs = report.extension("rs").unwrap();
    assert_eq!(rs.file_count, 2);
    assert_eq!(rs.total_cost, 300);
    assert!((rs.share - 0.6).abs() < 1e-9);
    assert!((rs.average_cost() - 150.0).abs() < 1e-9);

    let md = report.extension("md").unwrap();
    assert_eq!(md.file_count, 2);

    let share_sum: f64 = report.by_extension.iter().map(|g| g.share).sum();
    assert!((share_sum - 1.0).abs() < 1e-9);
}

#[test]
fn test_groups_by_top_level_directory() {
    let result = result_with(&[
        ("src/a.rs", 10),
        ("src/deep/b.rs", 10),
        ("tests/c.rs", 5),
        ("build.rs", 1),
    ]);

    let report = Aggregator::new().aggregate(&result);

    let dirs: Vec<_> = report
        .by_directory
        .iter()
        .map(|g| (g.name.as_str(), g.total_cost))
        .collect();
    assert_eq!(dirs, vec![("src", 20), ("tests", 5), (ROOT_DIRECTORY, 1)]);
}

#[test]
fn test_top_files() {
    let result = result_with(&[("a.rs", 5), ("b.rs", 50), ("c.rs", 20), ("d.rs", 20)]);
    let config = AggregateConfig::builder().top_files(3usize).build().unwrap();

    let report = Aggregator::with_config(config).aggregate(&result);

    let top: Vec<_> = report
        .top_files
        .iter()
        .map(|r| r.relative_path.as_str())
        .collect();
    assert_eq!(top, vec!["b.rs", "c.rs", "d.rs"]);
}

#[test]
fn test_extension_limit() {
    let result = result_with(&[("a.rs", 3), ("b.md", 2), ("c.toml", 1)]);
    let config = AggregateConfig::builder()
        .top_extensions(2usize)
        .build()
        .unwrap();

    let report = Aggregator::with_config(config).aggregate(&result);
    assert_eq!(report.by_extension.len(), 2);
    assert!(report.extension("toml").is_none());
}

#[test]
fn test_counts_and_warnings_carry_over() {
    let mut result = result_with(&[("a.rs", 1)]);
    result.push_error(ScanWarning::new("/r/x", "gone", WarningKind::Vanished));
    result.push_error(ScanWarning::new("/r/y", "gone", WarningKind::Vanished));
    result.push_error(ScanWarning::new("/r/z", "bad", WarningKind::CostFailed));
    result.late_files = 2;
    result.aborted = true;

    let report = Aggregator::new().aggregate(&result);

    assert_eq!(report.error_count, 3);
    assert_eq!(report.late_files, 2);
    assert!(report.aborted);
    assert_eq!(report.warnings.len(), 2);
    assert_eq!(report.warnings[0].kind, WarningKind::Vanished);
    assert_eq!(report.warnings[0].count, 2);
}

#[test]
fn test_empty_result() {
    let report = Aggregator::new().aggregate(&ProcessingResult::default());

    assert!(report.is_empty());
    assert!(report.by_extension.is_empty());
    assert!(report.top_files.is_empty());
    assert_eq!(report.average_cost(), 0.0);

    let text = format_text(&report, Path::new("/repo"));
    assert!(text.contains("No files found."));
}

#[test]
fn test_format_text() {
    let mut result = result_with(&[("src/main.rs", 1500), ("Makefile", 500)]);
    result.push_record(FileRecord::new("data/dump.sql", 2_000_000, 8_000_000, true));

    let report = Aggregator::new().aggregate(&result);
    let text = format_text(&report, Path::new("/repo"));

    assert!(text.contains("/repo - 2,002,000 tokens"));
    assert!(text.contains("By extension:"));
    assert!(text.contains("(none)"));
    assert!(text.contains("Top files:"));
    assert!(text.contains("data/dump.sql"));
    assert!(text.contains("1 large file(s) estimated from size"));
    assert!(!text.contains("failed file(s)"));
}

#[test]
fn test_report_serializes() {
    let result = result_with(&[("src/main.rs", 10)]);
    let report = Aggregator::new().aggregate(&result);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["total_cost"], 10);
    assert_eq!(json["by_extension"][0]["name"], "rs");
    assert!(json["generated_at"].is_string());
}

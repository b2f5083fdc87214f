//! Human-readable rendering of a [`CostReport`].

use std::fmt::Write;
use std::path::Path;

use humansize::{BINARY, format_size};
use itertools::Itertools;

use crate::aggregate::{CostReport, GroupStats};

/// Width of the horizontal rules around the header.
const RULE_WIDTH: usize = 70;

/// Width of the share bars.
const BAR_WIDTH: usize = 10;

/// Label for files without an extension.
const NO_EXTENSION: &str = "(none)";

/// Render `report` for the terminal.
pub fn format_text(report: &CostReport, root: &Path) -> String {
    let mut out = String::new();
    let rule = "─".repeat(RULE_WIDTH);

    let _ = writeln!(out, "{rule}");
    let _ = writeln!(
        out,
        " {} - {} tokens",
        root.display(),
        format_count(report.total_cost)
    );
    let _ = writeln!(
        out,
        " {} files, {}",
        format_count(report.total_files),
        format_size(report.total_bytes, BINARY)
    );
    let _ = writeln!(out, " Processed in {:.2}s", report.elapsed.as_secs_f64());
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out);

    if report.aborted {
        let _ = writeln!(out, " Scan cancelled, totals are partial.");
        let _ = writeln!(out);
    }

    if report.is_empty() {
        let _ = writeln!(out, " No files found.");
    } else {
        write_groups(&mut out, "By extension", &report.by_extension, |name| {
            if name.is_empty() { NO_EXTENSION } else { name }
        });
        write_groups(&mut out, "By directory", &report.by_directory, |name| name);

        if !report.top_files.is_empty() {
            let _ = writeln!(out, " Top files:");
            for record in &report.top_files {
                let _ = writeln!(
                    out,
                    "   {:<44} {:>12}{}",
                    truncate(&record.relative_path, 44),
                    format_count(record.cost),
                    if record.approximate { " ~" } else { "" }
                );
            }
            let _ = writeln!(out);
        }

        if report.approximate_files > 0 {
            let _ = writeln!(
                out,
                " {} large file(s) estimated from size (~)",
                report.approximate_files
            );
        }
    }

    if report.error_count > 0 || report.unreadable_dirs > 0 {
        let kinds = report
            .warnings
            .iter()
            .map(|w| format!("{} {}", w.count, w.kind))
            .join(", ");
        let _ = writeln!(
            out,
            " {} failed file(s), {} unreadable dir(s): {}",
            report.error_count, report.unreadable_dirs, kinds
        );
    }
    if report.late_files > 0 {
        let _ = writeln!(
            out,
            " {} file(s) appeared during the scan and were skipped",
            report.late_files
        );
    }

    out
}

fn write_groups<'a>(
    out: &mut String,
    title: &str,
    groups: &'a [GroupStats],
    label: impl Fn(&'a str) -> &'a str,
) {
    if groups.is_empty() {
        return;
    }
    let _ = writeln!(out, " {title}:");
    for group in groups {
        let _ = writeln!(
            out,
            "   {:<16} {:>12} {:>5.1}% {} {:>6} files",
            truncate(label(group.name.as_str()), 16),
            format_count(group.total_cost),
            group.share * 100.0,
            make_bar(group.share, BAR_WIDTH),
            group.file_count
        );
    }
    let _ = writeln!(out);
}

/// Format a count with thousands separators.
pub fn format_count(n: u64) -> String {
    let digits = n.to_string();
    let grouped = digits
        .chars()
        .rev()
        .chunks(3)
        .into_iter()
        .map(|chunk| chunk.collect::<String>())
        .join(",");
    grouped.chars().rev().collect()
}

/// Create a simple bar for a ratio in `0.0..=1.0`.
fn make_bar(ratio: f64, width: usize) -> String {
    let filled = ((ratio.clamp(0.0, 1.0)) * width as f64).round() as usize;
    let empty = width.saturating_sub(filled);
    format!("[{}{}]", "█".repeat(filled), "░".repeat(empty))
}

/// Truncate a string to `max_len` characters.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(1)).collect();
        format!("{head}…")
    }
}

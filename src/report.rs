//! Output formatting for coverage diff reports.
//!
//! Rendering is a pure function of the [`DiffReport`]: no I/O, no network.
//! The orchestrator picks a formatter and hands the result to whatever
//! publishes it.

use std::fmt::Write;

use crate::diff::{DiffReport, FilePair};
use crate::profile::ALL_FILES;

/// Trait for formatting diff reports.
pub trait ReportFormatter {
    fn format(&self, report: &DiffReport) -> String;
}

fn pct(p: f64) -> String {
    format!("{p:.1}%")
}

fn side_cell(side: &Option<crate::profile::FileCoverage>) -> String {
    match side {
        Some(f) => pct(f.percentage()),
        None => "N/A".to_string(),
    }
}

fn delta_cell(pair: &FilePair) -> String {
    match pair.delta_percentage() {
        Some(d) => format!("{d:+.1}%"),
        None if pair.is_new() => "new".to_string(),
        None => "removed".to_string(),
    }
}

/// Markdown formatter, suitable for a review comment body.
pub struct MarkdownFormatter;

impl ReportFormatter for MarkdownFormatter {
    fn format(&self, report: &DiffReport) -> String {
        let mut md = String::new();

        let candidate = pct(report.candidate_percentage);
        let delta = report.delta;
        writeln!(md, "### Coverage: {candidate} ({delta:+.1}%)\n").unwrap();

        let base = pct(report.base_percentage);
        let threshold = pct(report.threshold);
        writeln!(
            md,
            "Base **{base}** → candidate **{candidate}** over the changed files (threshold {threshold}).\n"
        )
        .unwrap();

        if report.pairs.is_empty() {
            md.push_str("No changed files carry coverage data.\n");
        } else {
            md.push_str("| File | Base | Candidate | Delta |\n");
            md.push_str("|:-----|-----:|----------:|------:|\n");
            for pair in &report.pairs {
                let name = match &pair.link {
                    Some(link) => format!("[{}]({})", pair.path, link),
                    None => format!("`{}`", pair.path),
                };
                writeln!(
                    md,
                    "| {} | {} | {} | {} |",
                    name,
                    side_cell(&pair.base),
                    side_cell(&pair.candidate),
                    delta_cell(pair)
                )
                .unwrap();
            }
            writeln!(
                md,
                "| **{ALL_FILES}** | {base} | {candidate} | {delta:+.1}% |"
            )
            .unwrap();
        }

        md.push('\n');
        if report.is_below_threshold {
            writeln!(
                md,
                ":no_entry: Coverage {candidate} is below the {threshold} threshold."
            )
            .unwrap();
        } else {
            writeln!(md, ":white_check_mark: Coverage meets the {threshold} threshold.").unwrap();
        }
        md.push_str("<sub>[covgate](https://github.com/covgate/covgate)</sub>\n");

        md
    }
}

/// Plain text formatter for terminal output and logs.
pub struct TextFormatter;

impl ReportFormatter for TextFormatter {
    fn format(&self, report: &DiffReport) -> String {
        let mut out = String::new();

        writeln!(
            out,
            "Coverage over changed files: {} (base {}, delta {:+.1}%)",
            pct(report.candidate_percentage),
            pct(report.base_percentage),
            report.delta
        )
        .unwrap();

        if report.pairs.is_empty() {
            out.push_str("No changed files carry coverage data.\n");
        } else {
            writeln!(out, "{:<50} {:>8} {:>10} {:>9}", "FILE", "BASE", "CANDIDATE", "DELTA")
                .unwrap();
            writeln!(out, "{}", "-".repeat(80)).unwrap();
            for pair in &report.pairs {
                writeln!(
                    out,
                    "{:<50} {:>8} {:>10} {:>9}",
                    pair.path,
                    side_cell(&pair.base),
                    side_cell(&pair.candidate),
                    delta_cell(pair)
                )
                .unwrap();
            }
        }

        if report.is_below_threshold {
            writeln!(
                out,
                "FAIL: coverage {} is below the {} threshold",
                pct(report.candidate_percentage),
                pct(report.threshold)
            )
            .unwrap();
        } else {
            writeln!(out, "PASS: threshold {} met", pct(report.threshold)).unwrap();
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::diff;
    use crate::profile::{CoverageSet, FileCoverage};

    fn set(files: &[(&str, u64, u64)]) -> CoverageSet {
        CoverageSet {
            files: files
                .iter()
                .map(|&(path, total, covered)| FileCoverage {
                    path: path.to_string(),
                    total_statements: total,
                    covered_statements: covered,
                })
                .collect(),
        }
    }

    fn sample_report() -> diff::DiffReport {
        let base = set(&[("a.go", 10, 8), ("gone.go", 5, 5)]);
        let cand = set(&[("a.go", 10, 7), ("b.go", 4, 4)]);
        let concerned: BTreeSet<String> = ["a.go", "b.go", "gone.go"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        diff::diff(&base, &cand, &concerned, 60.0)
    }

    #[test]
    fn test_markdown_rows_and_markers() {
        let body = MarkdownFormatter.format(&sample_report());
        assert!(body.contains("| `a.go` | 80.0% | 70.0% | -10.0% |"));
        assert!(body.contains("| `b.go` | N/A | 100.0% | new |"));
        assert!(body.contains("| `gone.go` | 100.0% | N/A | removed |"));
        assert!(body.contains("**ALL_FILES**"));
    }

    #[test]
    fn test_markdown_verdict_lines() {
        let passing = sample_report();
        assert!(!passing.is_below_threshold);
        let body = MarkdownFormatter.format(&passing);
        assert!(body.contains(":white_check_mark:"));

        let base = set(&[("a.go", 10, 8)]);
        let cand = set(&[("a.go", 10, 2)]);
        let concerned: BTreeSet<String> = std::iter::once("a.go".to_string()).collect();
        let failing = diff::diff(&base, &cand, &concerned, 60.0);
        let body = MarkdownFormatter.format(&failing);
        assert!(body.contains(":no_entry:"));
        assert!(body.contains("20.0%"));
    }

    #[test]
    fn test_markdown_renders_links() {
        let mut report = sample_report();
        let links = std::collections::HashMap::from([(
            "a.go".to_string(),
            "https://cdn.example.com/pr.html#file0".to_string(),
        )]);
        report.attach_links(&links);
        let body = MarkdownFormatter.format(&report);
        assert!(body.contains("[a.go](https://cdn.example.com/pr.html#file0)"));
    }

    #[test]
    fn test_markdown_empty_pairs() {
        let empty = diff::diff(&set(&[]), &set(&[]), &BTreeSet::new(), 50.0);
        let body = MarkdownFormatter.format(&empty);
        assert!(body.contains("No changed files carry coverage data."));
    }

    #[test]
    fn test_text_format() {
        let out = TextFormatter.format(&sample_report());
        assert!(out.contains("a.go"));
        assert!(out.contains("removed"));
        assert!(out.contains("PASS"));
    }
}

//! Go cover profile parsing and per-file statement aggregation.
//!
//! Format:
//!   mode: set|count|atomic
//!   <file>:<startLine>.<startCol>,<endLine>.<endCol> <numStatements> <hitCount>
//!
//! Each data line describes a block of statements and how often it ran. A
//! file's statement total is the sum of `numStatements` over its blocks; a
//! block's statements count as covered iff its hit count is non-zero.
//!
//! Parsing is strict: a malformed data line fails the whole parse. A corrupt
//! profile silently producing wrong percentages would defeat the gate.

use std::collections::{BTreeSet, HashMap};

use crate::error::{CovgateError, Result};

/// Path of the synthesized aggregate row summing every file in a set.
pub const ALL_FILES: &str = "ALL_FILES";

/// Compute a percentage, returning 0.0 when the total is zero.
#[must_use]
pub fn percent(covered: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        covered as f64 / total as f64 * 100.0
    }
}

/// Statement coverage for one source file.
#[derive(Debug, Clone, Default)]
pub struct FileCoverage {
    pub path: String,
    pub total_statements: u64,
    pub covered_statements: u64,
}

impl FileCoverage {
    pub fn new(path: String) -> Self {
        Self {
            path,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn percentage(&self) -> f64 {
        percent(self.covered_statements, self.total_statements)
    }
}

/// Per-file coverage records from one parsed profile, in first-seen order.
/// Paths are unique within a set.
#[derive(Debug, Clone, Default)]
pub struct CoverageSet {
    pub files: Vec<FileCoverage>,
}

impl CoverageSet {
    pub fn get(&self, path: &str) -> Option<&FileCoverage> {
        self.files.iter().find(|f| f.path == path)
    }

    /// Synthesized aggregate summing statements across every member.
    #[must_use]
    pub fn all_files(&self) -> FileCoverage {
        let mut agg = FileCoverage::new(ALL_FILES.to_string());
        for f in &self.files {
            agg.total_statements += f.total_statements;
            agg.covered_statements += f.covered_statements;
        }
        agg
    }

    /// The subset whose paths appear in `concerned`, order preserved.
    #[must_use]
    pub fn restrict(&self, concerned: &BTreeSet<String>) -> CoverageSet {
        CoverageSet {
            files: self
                .files
                .iter()
                .filter(|f| concerned.contains(&f.path))
                .cloned()
                .collect(),
        }
    }
}

/// Parse a coverage profile, aggregating every file it mentions.
pub fn parse(input: &[u8]) -> Result<CoverageSet> {
    parse_filtered(input, None)
}

/// Parse a coverage profile. When `allow` is given, only data lines whose
/// file path is in the allow-list contribute ("key subset" mode); other
/// lines are still validated.
pub fn parse_filtered(input: &[u8], allow: Option<&BTreeSet<String>>) -> Result<CoverageSet> {
    let text = std::str::from_utf8(input)
        .map_err(|e| CovgateError::MalformedProfile(format!("profile is not UTF-8: {e}")))?;

    let mut files: Vec<FileCoverage> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for (lineno, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with("mode:") {
            continue;
        }

        let (path, num_statements, hit_count) = parse_data_line(line).ok_or_else(|| {
            CovgateError::MalformedProfile(format!("line {}: {:?}", lineno + 1, line))
        })?;

        if let Some(allow) = allow {
            if !allow.contains(path) {
                continue;
            }
        }

        let i = *index.entry(path.to_string()).or_insert_with(|| {
            files.push(FileCoverage::new(path.to_string()));
            files.len() - 1
        });
        files[i].total_statements += num_statements;
        if hit_count > 0 {
            files[i].covered_statements += num_statements;
        }
    }

    Ok(CoverageSet { files })
}

/// Produce the "key" subset of a profile as text: the mode header plus only
/// the data lines for `concerned` files. Used when re-rendering a profile
/// scoped to the files under review.
pub fn filter_profile(input: &[u8], concerned: &BTreeSet<String>) -> Result<String> {
    let text = std::str::from_utf8(input)
        .map_err(|e| CovgateError::MalformedProfile(format!("profile is not UTF-8: {e}")))?;

    let mut out = String::new();
    for (lineno, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with("mode:") {
            out.push_str(line);
            out.push('\n');
            continue;
        }
        let (path, _, _) = parse_data_line(line).ok_or_else(|| {
            CovgateError::MalformedProfile(format!("line {}: {:?}", lineno + 1, line))
        })?;
        if concerned.contains(path) {
            out.push_str(line);
            out.push('\n');
        }
    }
    Ok(out)
}

/// Split one data line into `(file_path, num_statements, hit_count)`.
///
/// The block range contains no `:`, so splitting on the last colon isolates
/// the file path even when the path itself contains colons.
fn parse_data_line(line: &str) -> Option<(&str, u64, u64)> {
    let (path, rest) = line.rsplit_once(':')?;
    if path.is_empty() {
        return None;
    }

    let mut parts = rest.split_whitespace();
    let range = parts.next()?;
    let num_statements: u64 = parts.next()?.parse().ok()?;
    let hit_count: u64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }

    // Validate the range shape: startLine.startCol,endLine.endCol
    let (start, end) = range.split_once(',')?;
    start.split_once('.')?.0.parse::<u32>().ok()?;
    end.split_once('.')?.0.parse::<u32>().ok()?;

    Some((path, num_statements, hit_count))
}

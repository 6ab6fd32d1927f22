//! Coverage delta between a base profile and a candidate profile, restricted
//! to the files touched by the change under review.

use std::collections::{BTreeSet, HashMap};

use crate::profile::{CoverageSet, FileCoverage};

/// Base and candidate coverage for one path. A side is `None` when the file
/// does not exist in that profile (newly added or deleted file).
#[derive(Debug, Clone)]
pub struct FilePair {
    pub path: String,
    pub base: Option<FileCoverage>,
    pub candidate: Option<FileCoverage>,
    /// Signed link to the rendered candidate coverage, attached after sorting.
    pub link: Option<String>,
}

impl FilePair {
    /// Candidate minus base percentage; `None` when either side is absent
    /// (rendered as N/A, never as zero).
    #[must_use]
    pub fn delta_percentage(&self) -> Option<f64> {
        match (&self.base, &self.candidate) {
            (Some(b), Some(c)) => Some(c.percentage() - b.percentage()),
            _ => None,
        }
    }

    /// File exists only in the candidate profile.
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.base.is_none() && self.candidate.is_some()
    }

    /// File existed in the base profile but not the candidate.
    #[must_use]
    pub fn is_removed(&self) -> bool {
        self.base.is_some() && self.candidate.is_none()
    }
}

/// The full result of one diff: sorted per-file pairs plus aggregates and
/// the threshold verdict. Built fresh per invocation, never persisted.
#[derive(Debug)]
pub struct DiffReport {
    pub pairs: Vec<FilePair>,
    /// Base `ALL_FILES` percentage over the concerned files.
    pub base_percentage: f64,
    /// Candidate `ALL_FILES` percentage over the concerned files.
    pub candidate_percentage: f64,
    /// Candidate minus base aggregate percentage.
    pub delta: f64,
    /// Inclusive lower bound: exactly at threshold passes.
    pub threshold: f64,
    pub is_below_threshold: bool,
}

impl DiffReport {
    /// Attach display links by path. Kept separate from sorting so link
    /// assignment cannot depend on positional state.
    pub fn attach_links(&mut self, links: &HashMap<String, String>) {
        for pair in &mut self.pairs {
            if let Some(link) = links.get(&pair.path) {
                pair.link = Some(link.clone());
            }
        }
    }
}

/// Compare `base` and `candidate` over the `concerned` paths.
///
/// Output pairs cover exactly the concerned paths present in either profile,
/// sorted descending by delta with N/A deltas (new/removed files) last and
/// ties broken by ascending path, so repeated runs on identical input render
/// identically.
#[must_use]
pub fn diff(
    base: &CoverageSet,
    candidate: &CoverageSet,
    concerned: &BTreeSet<String>,
    threshold: f64,
) -> DiffReport {
    let base = base.restrict(concerned);
    let candidate = candidate.restrict(concerned);

    let mut paths: BTreeSet<&str> = BTreeSet::new();
    paths.extend(base.files.iter().map(|f| f.path.as_str()));
    paths.extend(candidate.files.iter().map(|f| f.path.as_str()));

    let mut pairs: Vec<FilePair> = paths
        .into_iter()
        .map(|path| FilePair {
            path: path.to_string(),
            base: base.get(path).cloned(),
            candidate: candidate.get(path).cloned(),
            link: None,
        })
        .collect();

    pairs.sort_by(|a, b| match (a.delta_percentage(), b.delta_percentage()) {
        (Some(x), Some(y)) => y.total_cmp(&x).then_with(|| a.path.cmp(&b.path)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.path.cmp(&b.path),
    });

    let base_percentage = base.all_files().percentage();
    let candidate_percentage = candidate.all_files().percentage();

    DiffReport {
        pairs,
        base_percentage,
        candidate_percentage,
        delta: candidate_percentage - base_percentage,
        threshold,
        is_below_threshold: candidate_percentage < threshold,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile;

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

    fn concerned(paths: &[&str]) -> BTreeSet<String> {
        paths.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_diff_restricts_to_concerned() {
        let base = set(&[("a.go", 10, 5), ("x.go", 10, 10)]);
        let cand = set(&[("a.go", 10, 6), ("y.go", 10, 10)]);
        let report = diff(&base, &cand, &concerned(&["a.go"]), 0.0);
        let paths: Vec<_> = report.pairs.iter().map(|p| p.path.as_str()).collect();
        assert_eq!(paths, vec!["a.go"]);
    }

    #[test]
    fn test_diff_sorts_descending_by_delta() {
        let base = set(&[("a.go", 10, 8), ("b.go", 10, 5), ("c.go", 10, 5)]);
        let cand = set(&[("a.go", 10, 4), ("b.go", 10, 9), ("c.go", 10, 5)]);
        let report = diff(&base, &cand, &concerned(&["a.go", "b.go", "c.go"]), 0.0);
        let paths: Vec<_> = report.pairs.iter().map(|p| p.path.as_str()).collect();
        // b.go +40, c.go 0, a.go -40
        assert_eq!(paths, vec!["b.go", "c.go", "a.go"]);
    }

    #[test]
    fn test_diff_tie_break_is_lexicographic() {
        let base = set(&[("z.go", 10, 5), ("a.go", 10, 5), ("m.go", 10, 5)]);
        let cand = set(&[("z.go", 10, 5), ("a.go", 10, 5), ("m.go", 10, 5)]);
        let concerned = concerned(&["z.go", "a.go", "m.go"]);
        let first = diff(&base, &cand, &concerned, 0.0);
        let second = diff(&base, &cand, &concerned, 0.0);
        let paths: Vec<_> = first.pairs.iter().map(|p| p.path.as_str()).collect();
        assert_eq!(paths, vec!["a.go", "m.go", "z.go"]);
        let again: Vec<_> = second.pairs.iter().map(|p| p.path.as_str()).collect();
        assert_eq!(paths, again);
    }

    #[test]
    fn test_diff_new_file_ranks_after_defined_deltas() {
        // §8 end-to-end scenario: a.go regresses 80 → 70, b.go is new at 100.
        let base = set(&[("a.go", 10, 8)]);
        let cand = set(&[("a.go", 10, 7), ("b.go", 4, 4)]);
        let report = diff(&base, &cand, &concerned(&["a.go", "b.go"]), 0.0);

        assert_eq!(report.pairs[0].path, "a.go");
        assert_eq!(report.pairs[0].delta_percentage(), Some(-10.0));
        assert_eq!(report.pairs[1].path, "b.go");
        assert!(report.pairs[1].is_new());
        assert_eq!(report.pairs[1].delta_percentage(), None);
    }

    #[test]
    fn test_diff_removed_file_is_retained() {
        let base = set(&[("gone.go", 10, 10)]);
        let cand = set(&[]);
        let report = diff(&base, &cand, &concerned(&["gone.go"]), 0.0);
        assert_eq!(report.pairs.len(), 1);
        assert!(report.pairs[0].is_removed());
        assert_eq!(report.pairs[0].delta_percentage(), None);
    }

    #[test]
    fn test_diff_absent_sides_excluded_from_aggregate() {
        // Only a.go exists on both sides; b.go (new) must not drag the base
        // aggregate, and the base aggregate only counts base files.
        let base = set(&[("a.go", 10, 8)]);
        let cand = set(&[("a.go", 10, 8), ("b.go", 1000, 0)]);
        let report = diff(&base, &cand, &concerned(&["a.go", "b.go"]), 0.0);
        assert_eq!(report.base_percentage, 80.0);
        // Candidate aggregate does include the new file's statements.
        assert!((report.candidate_percentage - 8.0 / 1010.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_threshold_boundary() {
        let base = set(&[("a.go", 10, 5)]);
        let cand = set(&[("a.go", 100, 60)]);
        let concerned = concerned(&["a.go"]);

        let at = diff(&base, &cand, &concerned, 60.0);
        assert_eq!(at.candidate_percentage, 60.0);
        assert!(!at.is_below_threshold);

        let above = diff(&base, &cand, &concerned, 60.01);
        assert!(above.is_below_threshold);
    }

    #[test]
    fn test_attach_links_by_path() {
        let base = set(&[("a.go", 10, 5), ("b.go", 10, 5)]);
        let cand = set(&[("a.go", 10, 9), ("b.go", 10, 1)]);
        let mut report = diff(&base, &cand, &concerned(&["a.go", "b.go"]), 0.0);

        let links = HashMap::from([("b.go".to_string(), "https://example/#file1".to_string())]);
        report.attach_links(&links);

        let b = report.pairs.iter().find(|p| p.path == "b.go").unwrap();
        assert_eq!(b.link.as_deref(), Some("https://example/#file1"));
        let a = report.pairs.iter().find(|p| p.path == "a.go").unwrap();
        assert!(a.link.is_none());
    }

    #[test]
    fn test_diff_from_parsed_profiles() {
        let base = profile::parse(b"mode: count\na.go:1.1,2.2 10 1\n").unwrap();
        let cand = profile::parse(b"mode: count\na.go:1.1,2.2 10 0\n").unwrap();
        let report = diff(&base, &cand, &concerned(&["a.go"]), 50.0);
        assert_eq!(report.base_percentage, 100.0);
        assert_eq!(report.candidate_percentage, 0.0);
        assert_eq!(report.delta, -100.0);
        assert!(report.is_below_threshold);
    }
}

//! Locating the coverage profile of the base build: the newest build of the
//! post-submit job whose status marker says it passed.
//!
//! Build ids are monotonically increasing, so numeric descending order
//! approximates chronological order without parsing timestamps, and the walk
//! stops at the first success. A missing or unreadable marker skips that
//! build; it never aborts the whole walk.

use serde::Deserialize;

use crate::error::{CovgateError, Result};
use crate::store::{ObjectStore, RetryingStore};

/// Per-build status marker written by the producing build.
const STATUS_MARKER: &str = "finished.json";

const ARTIFACTS_DIR: &str = "artifacts";

/// Contents of `finished.json`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct FinishedStatus {
    #[allow(dead_code)]
    timestamp: i64,
    passed: bool,
}

/// What probing one build's status marker established.
#[derive(Debug)]
pub struct BuildRecord {
    pub id: u64,
    /// False when the marker was missing or unreadable.
    pub status_known: bool,
    pub succeeded: bool,
}

/// Parse candidate build ids to integers and sort descending (newest first).
/// Non-numeric entries are warned about and dropped.
fn sort_builds(raw: &[String]) -> Vec<u64> {
    let mut builds: Vec<u64> = Vec::with_capacity(raw.len());
    for entry in raw {
        match entry.parse::<u64>() {
            Ok(n) => builds.push(n),
            Err(_) => eprintln!("Warning: non-int build number found: '{entry}'"),
        }
    }
    builds.sort_unstable_by(|a, b| b.cmp(a));
    builds
}

fn probe_build<S: ObjectStore>(store: &RetryingStore<S>, job_name: &str, id: u64) -> BuildRecord {
    let marker_key = format!("logs/{job_name}/{id}/{STATUS_MARKER}");
    match store.read_object(&marker_key) {
        Ok(bytes) => match serde_json::from_slice::<FinishedStatus>(&bytes) {
            Ok(status) => BuildRecord {
                id,
                status_known: true,
                succeeded: status.passed,
            },
            Err(e) => {
                eprintln!("Warning: malformed status marker {marker_key}: {e}");
                BuildRecord {
                    id,
                    status_known: false,
                    succeeded: false,
                }
            }
        },
        Err(e) => {
            eprintln!("Warning: cannot read {marker_key}: {e}");
            BuildRecord {
                id,
                status_known: false,
                succeeded: false,
            }
        }
    }
}

/// Find and read the base build's coverage profile for `job_name`.
///
/// Walks builds newest to oldest and returns the profile bytes of the first
/// build whose marker reports success. Fails with `NoHealthyBuild` when no
/// candidate qualifies; store errors reading the selected profile propagate
/// as-is.
pub fn find_base_profile<S: ObjectStore>(
    store: &RetryingStore<S>,
    job_name: &str,
    profile_name: &str,
) -> Result<Vec<u8>> {
    let prefix = format!("logs/{job_name}/");
    let entries = store.list_sub_dirs(&prefix)?;
    let builds = sort_builds(&entries);
    println!("Found {} candidate builds for job '{job_name}'", builds.len());

    for &id in &builds {
        let record = probe_build(store, job_name, id);
        if record.status_known && record.succeeded {
            let profile_key = format!("logs/{job_name}/{id}/{ARTIFACTS_DIR}/{profile_name}");
            println!("Base coverage profile: {profile_key}");
            return store.read_object(&profile_key);
        }
    }

    Err(CovgateError::NoHealthyBuild {
        job: job_name.to_string(),
        candidates: builds.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_builds_descending() {
        let raw = vec!["3".to_string(), "11".to_string(), "7".to_string()];
        assert_eq!(sort_builds(&raw), vec![11, 7, 3]);
    }

    #[test]
    fn test_sort_builds_drops_non_numeric() {
        let raw = vec!["42".to_string(), "latest".to_string(), "9".to_string()];
        assert_eq!(sort_builds(&raw), vec![42, 9]);
    }

    #[test]
    fn test_finished_status_parsing() {
        let status: FinishedStatus =
            serde_json::from_slice(br#"{"Timestamp": 1596732481, "Passed": true}"#).unwrap();
        assert!(status.passed);

        assert!(serde_json::from_slice::<FinishedStatus>(b"not json").is_err());
    }
}

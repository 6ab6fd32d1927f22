//! The presubmit workflow: resolve the base build, fetch and parse both
//! profiles, diff over the changed files, annotate display links.
//!
//! The verdict and infrastructure failures are kept apart on purpose: a
//! coverage drop is a legitimate outcome carried in `Ok`, while a store or
//! parse failure is an `Err` and must never silently pass the gate.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use crate::diff::{self, DiffReport};
use crate::error::Result;
use crate::profile;
use crate::resolver;
use crate::store::{ObjectStore, RetryingStore};

/// Display links into the uploaded HTML profile stay valid this long.
const LINK_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Configuration for one presubmit run. All inputs are explicit; nothing is
/// read from ambient state here.
pub struct Presubmit {
    /// Post-submit job whose latest healthy build supplies the base profile.
    pub post_submit_job: String,
    /// Coverage profile file name inside the build's artifacts directory.
    pub remote_profile_name: String,
    /// Inclusive lower bound on candidate coverage, in percent.
    pub threshold: f64,
    /// Key of the uploaded HTML rendering of the candidate profile; per-file
    /// display links anchor into it. `None` disables link annotation.
    pub html_profile_key: Option<String>,
}

/// Result of a completed run.
#[derive(Debug)]
pub struct Outcome {
    pub is_below_threshold: bool,
    /// `None` when the concerned set was empty and there was nothing to do.
    pub report: Option<DiffReport>,
}

impl Presubmit {
    /// Run the workflow against `store`, comparing the locally produced
    /// `local_profile` with the base build's profile over `concerned` files.
    pub fn run<S: ObjectStore>(
        &self,
        store: &RetryingStore<S>,
        local_profile: &[u8],
        concerned: &BTreeSet<String>,
    ) -> Result<Outcome> {
        if concerned.is_empty() {
            println!("List of concerned files is empty, nothing to gate");
            return Ok(Outcome {
                is_below_threshold: false,
                report: None,
            });
        }

        let candidate = profile::parse(local_profile)?;

        let base_bytes =
            resolver::find_base_profile(store, &self.post_submit_job, &self.remote_profile_name)?;
        let base = profile::parse(&base_bytes)?;

        let mut report = diff::diff(&base, &candidate, concerned, self.threshold);

        if let Some(html_key) = &self.html_profile_key {
            let url = store.signed_url(html_key, LINK_TTL);
            // Anchors follow report order, so links are built only after the
            // sort and attached back by path.
            let links: HashMap<String, String> = report
                .pairs
                .iter()
                .enumerate()
                .map(|(i, pair)| (pair.path.clone(), format!("{url}#file{i}")))
                .collect();
            report.attach_links(&links);
        }

        Ok(Outcome {
            is_below_threshold: report.is_below_threshold,
            report: Some(report),
        })
    }
}

//! GitHub helpers: the set of files changed by a pull request (the
//! "concerned" files) and posting the coverage report as a PR comment.

use std::collections::BTreeSet;

use anyhow::{bail, Context as _, Result};
use serde::Deserialize;

const COMMENT_MARKER: &str = "<!-- covgate-comment -->";
const API_ROOT: &str = "https://api.github.com";

/// Resolved pull-request context.
pub struct Context {
    token: String,
    owner: String,
    repo: String,
    pr_number: u64,
}

impl Context {
    pub fn new(token: String, owner: String, repo: String, pr_number: u64) -> Self {
        Self {
            token,
            owner,
            repo,
            pr_number,
        }
    }

    /// Build a context from the CI environment (`REPO_OWNER`, `REPO_NAME`,
    /// `PULL_NUMBER`) and a token file on disk.
    pub fn from_env(token_path: &std::path::Path) -> Result<Self> {
        let token = std::fs::read_to_string(token_path)
            .with_context(|| format!("reading github token from {}", token_path.display()))?
            .trim()
            .to_string();
        let owner = std::env::var("REPO_OWNER").context("REPO_OWNER is required")?;
        let repo = std::env::var("REPO_NAME").context("REPO_NAME is required")?;
        let pr_number = std::env::var("PULL_NUMBER")
            .context("PULL_NUMBER is required")?
            .parse()
            .context("PULL_NUMBER is not a number")?;
        Ok(Self::new(token, owner, repo, pr_number))
    }

    fn get(&self, url: &str) -> ureq::Request {
        ureq::get(url)
            .set("Authorization", &format!("Bearer {}", self.token))
            .set("Accept", "application/vnd.github+json")
            .set("User-Agent", "covgate")
            .set("X-GitHub-Api-Version", "2022-11-28")
    }

    /// List the files touched by the pull request, paging through the API.
    pub fn concerned_files(&self) -> Result<BTreeSet<String>> {
        #[derive(Deserialize)]
        struct PrFile {
            filename: String,
        }

        let mut files = BTreeSet::new();
        let mut page = 1u32;
        loop {
            let url = format!(
                "{API_ROOT}/repos/{}/{}/pulls/{}/files?per_page=100&page={page}",
                self.owner, self.repo, self.pr_number
            );
            let resp = self.get(&url).call().context("Failed to list PR files")?;
            let batch: Vec<PrFile> = resp.into_json().context("Failed to parse PR files JSON")?;
            if batch.is_empty() {
                break;
            }
            files.extend(batch.into_iter().map(|f| f.filename));
            page += 1;
        }
        Ok(files)
    }

    /// Create or update the marker-tagged coverage comment on the PR.
    pub fn post_comment(&self, body: &str) -> Result<()> {
        let body_with_marker = format!("{COMMENT_MARKER}\n{body}");
        let payload = serde_json::json!({ "body": body_with_marker });

        let resp = match self.find_existing_comment()? {
            Some(comment_id) => {
                let url = format!(
                    "{API_ROOT}/repos/{}/{}/issues/comments/{comment_id}",
                    self.owner, self.repo
                );
                ureq::patch(&url)
                    .set("Authorization", &format!("Bearer {}", self.token))
                    .set("Accept", "application/vnd.github+json")
                    .set("User-Agent", "covgate")
                    .set("X-GitHub-Api-Version", "2022-11-28")
                    .send_json(payload)
            }
            None => {
                let url = format!(
                    "{API_ROOT}/repos/{}/{}/issues/{}/comments",
                    self.owner, self.repo, self.pr_number
                );
                ureq::post(&url)
                    .set("Authorization", &format!("Bearer {}", self.token))
                    .set("Accept", "application/vnd.github+json")
                    .set("User-Agent", "covgate")
                    .set("X-GitHub-Api-Version", "2022-11-28")
                    .send_json(payload)
            }
        };

        match resp {
            Ok(_) => {
                eprintln!(
                    "Coverage comment posted to {}/{}#{}",
                    self.owner, self.repo, self.pr_number
                );
                Ok(())
            }
            Err(ureq::Error::Status(code, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                bail!("GitHub API error posting comment (HTTP {code}): {body}");
            }
            Err(e) => bail!("Failed to post comment: {e}"),
        }
    }

    /// Find a previous covgate comment on the PR by its hidden marker.
    fn find_existing_comment(&self) -> Result<Option<u64>> {
        #[derive(Deserialize)]
        struct Comment {
            id: u64,
            body: Option<String>,
        }

        let mut page = 1u32;
        loop {
            let url = format!(
                "{API_ROOT}/repos/{}/{}/issues/{}/comments?per_page=100&page={page}",
                self.owner, self.repo, self.pr_number
            );
            let resp = self.get(&url).call().context("Failed to list PR comments")?;
            let comments: Vec<Comment> =
                resp.into_json().context("Failed to parse comments JSON")?;
            if comments.is_empty() {
                return Ok(None);
            }
            for c in &comments {
                if c.body.as_deref().is_some_and(|b| b.contains(COMMENT_MARKER)) {
                    return Ok(Some(c.id));
                }
            }
            page += 1;
        }
    }
}

use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Parser;

use covgate::github;
use covgate::presubmit::Presubmit;
use covgate::profile;
use covgate::qiniu::{Config, QiniuStore};
use covgate::report::{MarkdownFormatter, ReportFormatter, TextFormatter};
use covgate::store::RetryingStore;

const KEY_PROFILE_FILE: &str = "key-cover-profile.txt";
const BOT_POST_FILE: &str = "bot-post";

/// covgate — gate pull requests on coverage relative to the last healthy build.
#[derive(Parser)]
#[command(name = "covgate", version, about)]
struct Cli {
    /// Name of the post-submit job that produces base coverage profiles.
    #[arg(long)]
    postsubmit_job_name: String,

    /// Local coverage profile to analyze.
    #[arg(long, default_value = "coverage_profile.txt")]
    local_profile: PathBuf,

    /// Coverage profile file name in the cloud bucket.
    #[arg(long, default_value = "filtered.cov")]
    remote_profile_name: String,

    /// Coverage threshold percentage; at or above passes.
    #[arg(long, default_value_t = 50.0)]
    cov_threshold_percentage: f64,

    /// Path to the JSON credential file for the artifact bucket.
    #[arg(long)]
    qiniu_credential: PathBuf,

    /// Path to a file holding the GitHub token.
    #[arg(long)]
    github_token: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let job_type = std::env::var("JOB_TYPE").unwrap_or_default();
    if job_type != "presubmit" {
        println!("job type '{job_type}', nothing to do");
        return Ok(());
    }

    let credential = std::fs::read(&cli.qiniu_credential).with_context(|| {
        format!(
            "reading bucket credential file {}",
            cli.qiniu_credential.display()
        )
    })?;
    let config: Config =
        serde_json::from_slice(&credential).context("parsing bucket credential file")?;
    let store = RetryingStore::new(QiniuStore::new(config));

    let gh = github::Context::from_env(&cli.github_token)?;
    let concerned: BTreeSet<String> = gh
        .concerned_files()
        .context("listing changed files of the pull request")?;

    let local_profile = std::fs::read(&cli.local_profile)
        .with_context(|| format!("reading local profile {}", cli.local_profile.display()))?;

    // Side artifact for HTML re-rendering: the local profile narrowed to the
    // changed files.
    if let Ok(artifacts_dir) = std::env::var("ARTIFACTS") {
        let key_profile = profile::filter_profile(&local_profile, &concerned)?;
        let path = PathBuf::from(&artifacts_dir).join(KEY_PROFILE_FILE);
        std::fs::write(&path, key_profile)
            .with_context(|| format!("writing {}", path.display()))?;
    }

    let workflow = Presubmit {
        post_submit_job: cli.postsubmit_job_name,
        remote_profile_name: cli.remote_profile_name,
        threshold: cli.cov_threshold_percentage,
        html_profile_key: html_profile_key(),
    };

    let outcome = workflow.run(&store, &local_profile, &concerned)?;

    if let Some(report) = &outcome.report {
        print!("{}", TextFormatter.format(report));

        let body = MarkdownFormatter.format(report);
        if let Ok(artifacts_dir) = std::env::var("ARTIFACTS") {
            let path = PathBuf::from(&artifacts_dir).join(BOT_POST_FILE);
            std::fs::write(&path, &body)
                .with_context(|| format!("writing {}", path.display()))?;
        }
        gh.post_comment(&body)?;
    }

    if outcome.is_below_threshold {
        eprintln!(
            "Code coverage is below threshold ({}%), failing presubmit intentionally",
            workflow.threshold
        );
        std::process::exit(1);
    }

    Ok(())
}

/// Bucket key of the HTML profile this PR's job uploads, when the CI
/// environment describes one. Mirrors the upload path convention:
/// `pr-logs/pull/<org>_<repo>/<pr>/<job>/<build>/artifacts/<org>-<repo>-pr<pr>-coverage.html`
fn html_profile_key() -> Option<String> {
    let org = std::env::var("REPO_OWNER").ok()?;
    let repo = std::env::var("REPO_NAME").ok()?;
    let pr = std::env::var("PULL_NUMBER").ok()?;
    let job = std::env::var("JOB_NAME").ok()?;
    let build = std::env::var("BUILD_NUMBER").ok()?;
    Some(format!(
        "pr-logs/pull/{org}_{repo}/{pr}/{job}/{build}/artifacts/{org}-{repo}-pr{pr}-coverage.html"
    ))
}

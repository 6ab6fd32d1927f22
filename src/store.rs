//! Object-store capability and the retrying wrapper around it.
//!
//! The raw transport (auth, paging protocol) lives behind [`ObjectStore`];
//! [`RetryingStore`] layers the backoff policies of [`crate::retry`] on top
//! and exposes the whole-result operations the rest of the crate consumes:
//! read an object, list build sub-directories, list keys under a prefix,
//! mint a signed download URL.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use thiserror::Error;

use crate::error::{CovgateError, Result};
use crate::retry::{RetryError, RetryPolicy, Sleeper, ThreadSleeper};

/// Errors a store transport can report. `NotFound` is never retried;
/// everything else is treated as transient.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("{0}")]
    Other(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, StoreError::NotFound(_))
    }
}

/// One page of a bucket listing. `next_marker` is `Some` while more pages
/// remain; delimited listings report immediate children in `sub_dirs`.
#[derive(Debug, Default)]
pub struct ListPage {
    pub keys: Vec<String>,
    pub sub_dirs: Vec<String>,
    pub next_marker: Option<String>,
}

/// Minimal capability the remote bucket must provide. Implemented by the
/// real transport ([`crate::qiniu::QiniuStore`]) and by in-memory fakes in
/// tests.
pub trait ObjectStore {
    /// Read the full contents of an object.
    fn read(&self, key: &str) -> std::result::Result<Vec<u8>, StoreError>;

    /// Fetch one listing page. A delimiter of `"/"` groups keys into
    /// sub-directories; `None` lists flat.
    fn list_page(
        &self,
        prefix: &str,
        delimiter: Option<&str>,
        marker: Option<&str>,
    ) -> std::result::Result<ListPage, StoreError>;

    /// Build a time-limited download URL. Pure: no I/O, deterministic for a
    /// given key, credentials, and deadline.
    fn signed_url(&self, key: &str, deadline_unix: i64) -> String;
}

// Build directories look like "logs/some-job/1181915661132107776/".
static BUILD_ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"([0-9]+)/$").unwrap());

/// Extract the trailing build id from a directory entry, if it has one.
fn build_id(dir: &str) -> Option<String> {
    BUILD_ID_RE
        .captures(dir)
        .map(|caps| caps[1].to_string())
}

/// An [`ObjectStore`] wrapped with bounded retry. Listing uses the long
/// backoff schedule; single-object reads use the short fixed one.
pub struct RetryingStore<S> {
    inner: S,
    listing: RetryPolicy,
    reads: RetryPolicy,
    sleeper: Box<dyn Sleeper>,
}

impl<S: ObjectStore> RetryingStore<S> {
    pub fn new(inner: S) -> Self {
        Self::with_policies(
            inner,
            RetryPolicy::listing(),
            RetryPolicy::read(),
            Box::new(ThreadSleeper),
        )
    }

    /// Construct with explicit policies and sleeper; tests use this to run
    /// the schedules without real waiting.
    pub fn with_policies(
        inner: S,
        listing: RetryPolicy,
        reads: RetryPolicy,
        sleeper: Box<dyn Sleeper>,
    ) -> Self {
        Self {
            inner,
            listing,
            reads,
            sleeper,
        }
    }

    /// Read an object, retrying transient failures on the read schedule.
    pub fn read_object(&self, key: &str) -> Result<Vec<u8>> {
        let inner = &self.inner;
        self.reads
            .run(&*self.sleeper, StoreError::is_retryable, || inner.read(key))
            .map_err(lift)
    }

    /// List immediate sub-directories under `prefix`, following pagination
    /// to the end. Entries that do not end in a numeric build id are warned
    /// about and skipped, never fatal.
    pub fn list_sub_dirs(&self, prefix: &str) -> Result<Vec<String>> {
        let mut dirs = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let page = self.fetch_page(prefix, Some("/"), marker.as_deref())?;
            for dir in &page.sub_dirs {
                match build_id(dir) {
                    Some(id) => dirs.push(id),
                    None => eprintln!("Warning: invalid dir format: {dir}"),
                }
            }
            match page.next_marker {
                Some(m) => marker = Some(m),
                None => break,
            }
        }
        Ok(dirs)
    }

    /// List every key under `prefix` (flat), following pagination to the end.
    pub fn list_all(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let mut page = self.fetch_page(prefix, None, marker.as_deref())?;
            keys.append(&mut page.keys);
            match page.next_marker {
                Some(m) => marker = Some(m),
                None => break,
            }
        }
        Ok(keys)
    }

    /// Signed download URL valid for `ttl` from now.
    pub fn signed_url(&self, key: &str, ttl: Duration) -> String {
        let deadline = chrono::Utc::now().timestamp() + ttl.as_secs() as i64;
        self.inner.signed_url(key, deadline)
    }

    // Each page fetch gets a fresh run through the listing schedule: a
    // successful page resets the budget for the next one.
    fn fetch_page(
        &self,
        prefix: &str,
        delimiter: Option<&str>,
        marker: Option<&str>,
    ) -> Result<ListPage> {
        let inner = &self.inner;
        self.listing
            .run(&*self.sleeper, StoreError::is_retryable, || {
                inner.list_page(prefix, delimiter, marker)
            })
            .map_err(lift)
    }
}

/// Map a retry failure into the crate error taxonomy.
fn lift(err: RetryError<StoreError>) -> CovgateError {
    match err {
        RetryError::Fatal(StoreError::NotFound(key)) => CovgateError::NotFound(key),
        RetryError::Fatal(other) => CovgateError::Other(other.to_string()),
        RetryError::Exhausted { attempts, last } => CovgateError::Exhausted { attempts, last },
    }
}

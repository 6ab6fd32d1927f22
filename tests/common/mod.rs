#![allow(dead_code)]

use std::cell::Cell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Duration;

use covgate::retry::{RetryPolicy, Sleeper};
use covgate::store::{ListPage, ObjectStore, RetryingStore, StoreError};

/// Sleeper that returns immediately, so retry schedules run instantly.
pub struct NoopSleeper;

impl Sleeper for NoopSleeper {
    fn sleep(&self, _: Duration) {}
}

/// In-memory [`ObjectStore`] fake. Keys live in a sorted map so delimited
/// listings fall out of key order; call counters and injected failures let
/// tests observe retry behavior without a network.
pub struct MemoryStore {
    objects: BTreeMap<String, Vec<u8>>,
    /// Keys passed to `read`, in call order.
    pub reads: Rc<std::cell::RefCell<Vec<String>>>,
    /// Number of `list_page` calls.
    pub list_calls: Rc<Cell<usize>>,
    /// When true, every call fails with `RateLimited`.
    rate_limit_all: bool,
    page_size: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            objects: BTreeMap::new(),
            reads: Rc::new(std::cell::RefCell::new(Vec::new())),
            list_calls: Rc::new(Cell::new(0)),
            rate_limit_all: false,
            page_size: 100,
        }
    }

    /// A store where every operation reports throttling.
    pub fn rate_limited() -> Self {
        Self {
            rate_limit_all: true,
            ..Self::new()
        }
    }

    pub fn with_page_size(mut self, n: usize) -> Self {
        self.page_size = n;
        self
    }

    pub fn insert(&mut self, key: &str, bytes: &[u8]) {
        self.objects.insert(key.to_string(), bytes.to_vec());
    }
}

enum Entry {
    Dir(String),
    Key(String),
}

impl ObjectStore for MemoryStore {
    fn read(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.reads.borrow_mut().push(key.to_string());
        if self.rate_limit_all {
            return Err(StoreError::RateLimited("injected".into()));
        }
        self.objects
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    fn list_page(
        &self,
        prefix: &str,
        delimiter: Option<&str>,
        marker: Option<&str>,
    ) -> Result<ListPage, StoreError> {
        self.list_calls.set(self.list_calls.get() + 1);
        if self.rate_limit_all {
            return Err(StoreError::RateLimited("injected".into()));
        }

        // Full listing first; the marker is an opaque offset into it.
        let mut entries: Vec<Entry> = Vec::new();
        let mut seen_dirs: Vec<String> = Vec::new();
        for key in self.objects.keys() {
            let Some(rest) = key.strip_prefix(prefix) else {
                continue;
            };
            match delimiter {
                Some(d) => match rest.find(d) {
                    Some(pos) => {
                        let dir = format!("{prefix}{}", &rest[..pos + d.len()]);
                        if !seen_dirs.contains(&dir) {
                            seen_dirs.push(dir.clone());
                            entries.push(Entry::Dir(dir));
                        }
                    }
                    None => entries.push(Entry::Key(key.clone())),
                },
                None => entries.push(Entry::Key(key.clone())),
            }
        }

        let start: usize = marker.map(|m| m.parse().unwrap()).unwrap_or(0);
        let end = (start + self.page_size).min(entries.len());

        let mut page = ListPage::default();
        for entry in &entries[start..end] {
            match entry {
                Entry::Dir(d) => page.sub_dirs.push(d.clone()),
                Entry::Key(k) => page.keys.push(k.clone()),
            }
        }
        if end < entries.len() {
            page.next_marker = Some(end.to_string());
        }
        Ok(page)
    }

    fn signed_url(&self, key: &str, deadline_unix: i64) -> String {
        format!("https://fake.example/{key}?e={deadline_unix}")
    }
}

/// Wrap a fake store with the production retry policies and a no-op sleeper.
pub fn retrying(store: MemoryStore) -> RetryingStore<MemoryStore> {
    RetryingStore::with_policies(
        store,
        RetryPolicy::listing(),
        RetryPolicy::read(),
        Box::new(NoopSleeper),
    )
}

//! Qiniu-backed implementation of the [`ObjectStore`](crate::store::ObjectStore)
//! capability.
//!
//! Reads go through time-limited private download URLs on the bucket domain;
//! listings use the rsf v2 API, which streams one JSON object per line. The
//! bucket rejects over-concurrent requests with HTTP 571/573, surfaced here
//! as [`StoreError::RateLimited`] so the retry layer can back off.

use std::io::Read;

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha1::Sha1;

use crate::store::{ListPage, ObjectStore, StoreError};

const RSF_HOST: &str = "https://rsf.qiniu.com";
const PAGE_LIMIT: u32 = 500;

/// Download URLs minted for internal reads stay valid this long.
const READ_URL_TTL_SECS: i64 = 600;

/// Credentials and location of the artifact bucket.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub bucket: String,
    #[serde(rename = "accessKey")]
    pub access_key: String,
    #[serde(rename = "secretKey")]
    pub secret_key: String,
    /// Domain used to download files from the bucket.
    pub domain: String,
}

pub struct QiniuStore {
    cfg: Config,
}

impl QiniuStore {
    pub fn new(cfg: Config) -> Self {
        Self { cfg }
    }

    /// URL-safe base64 of the HMAC-SHA1 of `data` under the secret key.
    fn sign(&self, data: &[u8]) -> String {
        let mut mac = <Hmac<Sha1>>::new_from_slice(self.cfg.secret_key.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(data);
        URL_SAFE.encode(mac.finalize().into_bytes())
    }

    /// QBox authorization header for a management request, signing the
    /// path-and-query with a trailing newline.
    fn authorization(&self, path_and_query: &str) -> String {
        let sig = self.sign(format!("{path_and_query}\n").as_bytes());
        format!("QBox {}:{}", self.cfg.access_key, sig)
    }
}

impl ObjectStore for QiniuStore {
    fn read(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let deadline = chrono::Utc::now().timestamp() + READ_URL_TTL_SECS;
        let url = self.signed_url(key, deadline);

        match ureq::get(&url).call() {
            Ok(resp) => {
                let mut bytes = Vec::new();
                resp.into_reader()
                    .read_to_end(&mut bytes)
                    .map_err(|e| StoreError::Other(format!("reading body of {key}: {e}")))?;
                Ok(bytes)
            }
            Err(ureq::Error::Status(404, _)) => Err(StoreError::NotFound(key.to_string())),
            Err(ureq::Error::Status(code @ (571 | 573), _)) => Err(StoreError::RateLimited(
                format!("HTTP {code} reading {key}"),
            )),
            Err(ureq::Error::Status(code, _)) => {
                Err(StoreError::Other(format!("HTTP {code} reading {key}")))
            }
            Err(e) => Err(StoreError::Other(format!("transport error reading {key}: {e}"))),
        }
    }

    fn list_page(
        &self,
        prefix: &str,
        delimiter: Option<&str>,
        marker: Option<&str>,
    ) -> Result<ListPage, StoreError> {
        let mut path_and_query = format!(
            "/v2/list?bucket={}&prefix={}&limit={}",
            urlencode(&self.cfg.bucket),
            urlencode(prefix),
            PAGE_LIMIT
        );
        if let Some(d) = delimiter {
            path_and_query.push_str(&format!("&delimiter={}", urlencode(d)));
        }
        if let Some(m) = marker {
            path_and_query.push_str(&format!("&marker={}", urlencode(m)));
        }

        let url = format!("{RSF_HOST}{path_and_query}");
        let resp = ureq::post(&url)
            .set("Authorization", &self.authorization(&path_and_query))
            .set("Content-Type", "application/x-www-form-urlencoded")
            .call();

        match resp {
            Ok(resp) => {
                let body = resp
                    .into_string()
                    .map_err(|e| StoreError::Other(format!("reading list response: {e}")))?;
                parse_list_body(&body)
            }
            Err(ureq::Error::Status(code @ (571 | 573), _)) => Err(StoreError::RateLimited(
                format!("HTTP {code} listing {prefix}"),
            )),
            Err(ureq::Error::Status(code, _)) => {
                Err(StoreError::Other(format!("HTTP {code} listing {prefix}")))
            }
            Err(e) => Err(StoreError::Other(format!(
                "transport error listing {prefix}: {e}"
            ))),
        }
    }

    fn signed_url(&self, key: &str, deadline_unix: i64) -> String {
        let domain = self.cfg.domain.trim_end_matches('/');
        let base = if domain.contains("://") {
            domain.to_string()
        } else {
            format!("http://{domain}")
        };
        let url = format!("{base}/{key}?e={deadline_unix}");
        let token = format!("{}:{}", self.cfg.access_key, self.sign(url.as_bytes()));
        format!("{url}&token={token}")
    }
}

/// One line of an rsf v2 listing response. A line carries either a key
/// (`item`) or a common prefix (`dir`), plus the marker to resume from.
#[derive(Deserialize)]
struct ListLine {
    item: Option<ListItem>,
    #[serde(default)]
    dir: String,
    #[serde(default)]
    marker: String,
}

#[derive(Deserialize)]
struct ListItem {
    key: String,
}

/// Parse the line-delimited JSON body of a v2 listing into a [`ListPage`].
fn parse_list_body(body: &str) -> Result<ListPage, StoreError> {
    let mut page = ListPage::default();
    let mut last_marker = String::new();

    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let entry: ListLine = serde_json::from_str(line)
            .map_err(|e| StoreError::Other(format!("malformed list entry: {e}")))?;
        if !entry.dir.is_empty() {
            page.sub_dirs.push(entry.dir);
        }
        if let Some(item) = entry.item {
            page.keys.push(item.key);
        }
        last_marker = entry.marker;
    }

    if !last_marker.is_empty() {
        page.next_marker = Some(last_marker);
    }
    Ok(page)
}

/// Percent-encode everything outside the URL unreserved set.
fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

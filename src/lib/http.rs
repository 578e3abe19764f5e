//! The shared HTTP client of §4.4/§5: a single `reqwest::blocking::Client`
//! (and hence a single connection pool) is reused by every worker thread.
//! `reqwest::blocking::Client` is `Clone + Send + Sync` and shares its
//! connection cache across clones, so no additional locking is needed
//! around the client itself — the "process-wide mutex" spec.md §4.4/§5
//! describes protects the *callers'* shared state (the visited set, the
//! cache), not the client, and is implemented in `resolve`/`cache`.

use crate::util::errors::{ErrorKind, Res};
use failure::ResultExt;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::fs::File;
use std::io::copy;
use std::path::Path;
use std::time::Duration;

/// The result of a GET: status code, body, and a convenience `ok` flag.
/// Mirrors spec.md §6's minimal HTTP contract exactly.
pub struct Response {
    pub status: u16,
    pub body: String,
    pub ok: bool,
}

#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());
        HttpClient { client }
    }

    fn header_map(headers: &[(String, String)]) -> Res<HeaderMap> {
        let mut map = HeaderMap::new();
        for (k, v) in headers {
            let name = HeaderName::from_bytes(k.as_bytes())
                .context(ErrorKind::Http(format!("invalid header name {}", k)))?;
            let value = HeaderValue::from_str(v)
                .context(ErrorKind::Http(format!("invalid header value for {}", k)))?;
            map.insert(name, value);
        }
        Ok(map)
    }

    /// `GET <url>` with an optional header list, returning `(status, body,
    /// ok)`. `ok` is true iff the status is 200 and the transfer completed.
    pub fn get_body(&self, url: &str, headers: &[(String, String)]) -> Res<Response> {
        let resp = self
            .client
            .get(url)
            .headers(Self::header_map(headers)?)
            .send()
            .context(ErrorKind::Http(format!("GET {}", url)))?;

        let status = resp.status().as_u16();
        let ok = resp.status().is_success();
        let body = resp
            .text()
            .context(ErrorKind::Http(format!("reading response body from {}", url)))?;

        Ok(Response { status, body, ok })
    }

    /// `GET <url>` writing the body straight to `dest`. The write is atomic
    /// from the caller's perspective: we write to a sibling temp file and
    /// rename it into place only on success, so a failed or killed transfer
    /// never leaves a half-written file under `dest`'s final name.
    pub fn get_to_file(&self, url: &str, headers: &[(String, String)], dest: &Path) -> Res<()> {
        let mut resp = self
            .client
            .get(url)
            .headers(Self::header_map(headers)?)
            .send()
            .context(ErrorKind::Http(format!("GET {}", url)))?;

        if !resp.status().is_success() {
            return Err(ErrorKind::DownloadFailed(format!(
                "{} ({})",
                url,
                resp.status()
            ))
            .into());
        }

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let tmp_path = dest.with_extension("part");
        {
            let mut tmp = File::create(&tmp_path)?;
            copy(&mut resp, &mut tmp)
                .context(ErrorKind::Http(format!("writing {}", dest.display())))?;
        }
        std::fs::rename(&tmp_path, dest)?;

        Ok(())
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

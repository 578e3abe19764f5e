//! §4.4 Repository backends: given `(package-base-url, version, file-path)`,
//! produce a concrete download URL and an optional authentication header.
//!
//! Dispatch is by host, exactly as `repository/github-repository.c` /
//! `repository/gitlab-repository.c` are selected by
//! `registry/wiki-registry.c`'s `wiki_registry_create` string match on
//! `github.com` / `gitlab`.

pub mod forge;
pub mod wiki;

use crate::http::HttpClient;
use crate::secrets::Secrets;
use crate::util::errors::{ErrorKind, Res};
use std::path::{Path, PathBuf};
use std::thread;

/// The manifest filenames tried in order — §6 "Open question: manifest-file
/// precedence": `clib.json` first, then `package.json`, first success wins.
pub const MANIFEST_NAMES: [&str; 2] = ["clib.json", "package.json"];

/// A per-host file-fetching adapter.
pub trait Repository: Send + Sync {
    /// The concrete URL to GET in order to retrieve `file_path` at `version`.
    fn url_for_file(&self, version: &str, file_path: &str) -> String;

    /// The authentication header to send with every request to this host,
    /// if a secret is configured for it.
    fn auth_header(&self) -> Option<(String, String)>;

    /// The URL of a tarball of the whole repo at `version`, used by the
    /// install-hook subroutine (spec.md §4.6 step 10).
    fn url_for_tarball(&self, version: &str) -> String;
}

/// Picks a `Repository` implementation for `base_url` by host. Unknown
/// hosts are a construction-time error (spec.md §6).
pub fn for_base_url(base_url: &str, secrets: &Secrets) -> Res<Box<dyn Repository>> {
    let url = url::Url::parse(base_url)
        .map_err(|e| ErrorKind::UnknownHost(format!("{}: {}", base_url, e)))?;
    let host = url
        .host_str()
        .ok_or_else(|| ErrorKind::UnknownHost(base_url.to_string()))?;

    if host == "github.com" {
        Ok(Box::new(wiki::WikiRepository::new(base_url, secrets)?))
    } else if host.contains("gitlab") {
        Ok(Box::new(forge::ForgeRepository::new(base_url, secrets)?))
    } else {
        Err(ErrorKind::UnknownHost(host.to_string()).into())
    }
}

fn headers_for(repo: &dyn Repository) -> Vec<(String, String)> {
    repo.auth_header().into_iter().collect()
}

/// Tries each manifest filename in order, returning the first body that
/// fetches successfully. Retries each individual attempt up to 3 times on
/// network/non-2xx failure before giving up on that filename (spec.md §4.6
/// "Retries").
pub fn fetch_manifest(
    http: &HttpClient,
    repo: &dyn Repository,
    version: &str,
) -> Res<(String, &'static str)> {
    let mut last_err = None;
    for name in MANIFEST_NAMES {
        match fetch_with_retries(http, repo, version, name, 3) {
            Ok(body) => return Ok((body, name)),
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap_or_else(|| ErrorKind::ManifestFetchFailed(version.to_string()).into()))
}

fn fetch_with_retries(
    http: &HttpClient,
    repo: &dyn Repository,
    version: &str,
    file_path: &str,
    attempts: u32,
) -> Res<String> {
    let url = repo.url_for_file(version, file_path);
    let headers = headers_for(repo);

    let mut last_err = None;
    for _ in 0..attempts {
        match http.get_body(&url, &headers) {
            Ok(resp) if resp.ok => return Ok(resp.body),
            Ok(resp) => {
                last_err = Some(ErrorKind::ManifestFetchFailed(format!(
                    "{} (status {})",
                    url, resp.status
                )))
            }
            Err(e) => last_err = Some(ErrorKind::ManifestFetchFailed(format!("{}: {}", url, e))),
        }
    }
    Err(last_err
        .unwrap_or_else(|| ErrorKind::ManifestFetchFailed(url.clone()))
        .into())
}

/// A handle to a download running on a worker thread (spec.md §4.4/§5): the
/// transfer starts immediately, and the caller later calls [`join`] to wait
/// for completion.
pub struct DownloadHandle {
    file_path: String,
    handle: thread::JoinHandle<Res<()>>,
}

/// Starts downloading `file_path` from `base_url` at `version` into
/// `<dest_dir>/<basename(file_path)>` on a new thread.
pub fn download_file(
    http: HttpClient,
    repo_base_url: String,
    secrets: Secrets,
    version: String,
    file_path: String,
    dest_dir: PathBuf,
) -> Res<DownloadHandle> {
    let dest = dest_dir.join(crate::util::basename(&file_path));
    let thread_file_path = file_path.clone();
    let handle = thread::spawn(move || -> Res<()> {
        let repo = for_base_url(&repo_base_url, &secrets)?;
        let url = repo.url_for_file(&version, &thread_file_path);
        let headers = headers_for(repo.as_ref());
        http.get_to_file(&url, &headers, &dest)
    });

    Ok(DownloadHandle {
        file_path,
        handle,
    })
}

/// Waits for a download to finish, returning its result. A failure here is
/// fatal to the whole package install (spec.md §4.6 step 7).
pub fn join(handle: DownloadHandle) -> Res<()> {
    let file_path = handle.file_path;
    match handle.handle.join() {
        Ok(result) => result.map_err(|e| {
            ErrorKind::DownloadFailed(format!("{}: {}", file_path, e)).into()
        }),
        Err(_) => Err(ErrorKind::DownloadFailed(format!(
            "{}: worker thread panicked",
            file_path
        ))
        .into()),
    }
}

/// Downloads a single file synchronously, used for the makefile fetch
/// (spec.md §4.6 step 4), which is small enough not to need its own thread.
pub fn download_file_sync(
    http: &HttpClient,
    repo: &dyn Repository,
    version: &str,
    file_path: &str,
    dest_dir: &Path,
) -> Res<()> {
    let url = repo.url_for_file(version, file_path);
    let headers = headers_for(repo);
    let dest = dest_dir.join(crate::util::basename(file_path));
    http.get_to_file(&url, &headers, &dest)
}

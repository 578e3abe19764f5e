//! §4.2 Registry backends: a pluggable lookup from a package id to the base
//! URL its files live under.

pub mod forge;
pub mod manager;
pub mod wiki;

use crate::http::HttpClient;
use crate::secrets::Secrets;
use crate::util::errors::{ErrorKind, Res};

pub use manager::RegistryManager;

/// One entry in a registry's listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRecord {
    /// `"<author>/<name>"`.
    pub id: String,
    pub href: String,
    pub description: String,
    pub category: String,
}

/// A source of package listings. `fetch` is idempotent after success: a
/// second call on an already-fetched registry is a no-op.
pub trait Registry: Send + Sync {
    fn fetch(&mut self, http: &HttpClient) -> Res<()>;
    fn iterate(&self) -> &[PackageRecord];
    fn url(&self) -> &str;

    /// The raw listing body behind the current `iterate()` results, if this
    /// registry has fetched one. Used to populate the cache's singleton
    /// search-listing slot (spec.md §4.1); registries that haven't fetched
    /// yet return `None`.
    fn raw_body(&self) -> Option<&str>;

    /// Re-parses `body` without going over the network, used to serve a
    /// cached listing (spec.md §4.1's search cache).
    fn load_cached(&mut self, body: &str);
}

/// Picks a `Registry` implementation for `url` by host (spec.md §6). An
/// unknown host is a construction-time error; the caller (the registry
/// manager) logs and skips it rather than treating it as fatal.
pub fn for_url(url: &str, secrets: &Secrets) -> Res<Box<dyn Registry>> {
    let parsed =
        url::Url::parse(url).map_err(|e| ErrorKind::UnknownHost(format!("{}: {}", url, e)))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| ErrorKind::UnknownHost(url.to_string()))?;

    if host == "github.com" {
        Ok(Box::new(wiki::WikiRegistry::new(url)))
    } else if host.contains("gitlab") {
        Ok(Box::new(forge::ForgeRegistry::new(url, secrets)))
    } else {
        Err(ErrorKind::UnknownHost(host.to_string()).into())
    }
}

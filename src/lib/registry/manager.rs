//! §4.3 Registry manager: an ordered list of registries, first-hit lookup by
//! package id. Priority is root-manifest registries first, the built-in
//! default last, so a project can override where a package resolves.
//!
//! Grounded on `registry/registry-manager.c`'s `registry_manager_find`, which
//! walks its registry list in order and stops at the first listing that
//! contains the id.

use super::{for_url, PackageRecord, Registry};
use crate::cache::Cache;
use crate::http::HttpClient;
use crate::secrets::Secrets;
use crate::util::errors::Res;
use slog::{debug, warn, Logger};

pub const DEFAULT_REGISTRY_URL: &str = "https://github.com/clibs/clib/wiki";

pub struct RegistryManager {
    registries: Vec<Box<dyn Registry>>,
}

impl RegistryManager {
    /// `extra_urls` are the root manifest's `registries` field, already in
    /// document order; they're tried before the built-in default.
    pub fn new(extra_urls: &[String], secrets: &Secrets, log: &Logger) -> Self {
        let mut registries = Vec::new();

        for url in extra_urls {
            match for_url(url, secrets) {
                Ok(reg) => registries.push(reg),
                Err(e) => warn!(log, "skipping unrecognized registry"; "url" => url, "error" => %e),
            }
        }

        match for_url(DEFAULT_REGISTRY_URL, secrets) {
            Ok(reg) => registries.push(reg),
            Err(e) => warn!(log, "failed to construct default registry"; "error" => %e),
        }

        RegistryManager { registries }
    }

    /// Brings every registry's listing into memory, logging and continuing
    /// past any individual failure (spec.md §7: registry fetch failure is
    /// non-fatal).
    pub fn fetch_all(&mut self, http: &HttpClient, log: &Logger) {
        for reg in self.registries.iter_mut() {
            if let Err(e) = reg.fetch(http) {
                warn!(log, "registry fetch failed"; "url" => reg.url(), "error" => %e);
            }
        }
    }

    /// Like [`fetch_all`](Self::fetch_all), but the built-in default
    /// registry's listing is served from `cache`'s singleton search slot
    /// when fresh, and repopulates it after a real fetch. Every other
    /// configured registry always hits the network: the historical search
    /// cache only ever covered the one default wiki listing (spec.md §4.1).
    pub fn fetch_all_cached(&mut self, http: &HttpClient, cache: &Cache, skip_cache: bool, log: &Logger) {
        for reg in self.registries.iter_mut() {
            let is_default = reg.url() == DEFAULT_REGISTRY_URL;

            if is_default && !skip_cache {
                if let Some(body) = cache.read_search() {
                    debug!(log, "serving default registry listing from cache");
                    reg.load_cached(&body);
                    continue;
                }
            }

            if let Err(e) = reg.fetch(http) {
                warn!(log, "registry fetch failed"; "url" => reg.url(), "error" => %e);
                continue;
            }

            if is_default {
                if let Some(body) = reg.raw_body() {
                    if let Err(e) = cache.save_search(body) {
                        warn!(log, "failed to populate search cache"; "error" => %e);
                    }
                }
            }
        }
    }

    /// First-hit lookup across registries in priority order.
    pub fn find_package(&self, id: &str) -> Option<&PackageRecord> {
        self.registries
            .iter()
            .find_map(|reg| reg.iterate().iter().find(|r| r.id == id))
    }

    pub fn search(&self, query: &str) -> Vec<&PackageRecord> {
        let query = query.to_lowercase();
        self.registries
            .iter()
            .flat_map(|reg| reg.iterate())
            .filter(|r| {
                r.id.to_lowercase().contains(&query) || r.description.to_lowercase().contains(&query)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FakeRegistry {
        url: String,
        records: Vec<PackageRecord>,
        raw_body: Option<String>,
        fetch_count: Arc<AtomicUsize>,
    }

    impl FakeRegistry {
        fn new(url: &str, records: Vec<PackageRecord>, raw_body: &str) -> Self {
            FakeRegistry {
                url: url.to_string(),
                records,
                raw_body: Some(raw_body.to_string()),
                fetch_count: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn with_fetch_counter(mut self, counter: Arc<AtomicUsize>) -> Self {
            self.fetch_count = counter;
            self
        }
    }

    impl Registry for FakeRegistry {
        fn fetch(&mut self, _http: &HttpClient) -> Res<()> {
            self.fetch_count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn iterate(&self) -> &[PackageRecord] {
            &self.records
        }

        fn url(&self) -> &str {
            &self.url
        }

        fn raw_body(&self) -> Option<&str> {
            self.raw_body.as_deref()
        }

        fn load_cached(&mut self, body: &str) {
            self.raw_body = Some(body.to_string());
        }
    }

    fn record(id: &str, href: &str) -> PackageRecord {
        PackageRecord {
            id: id.to_string(),
            href: href.to_string(),
            description: "desc".to_string(),
            category: "cat".to_string(),
        }
    }

    #[test]
    fn first_hit_wins_across_priority_order() {
        let private = FakeRegistry::new(
            "https://private.example/registry",
            vec![record("clibs/list", "https://private.example/clibs/list")],
            "",
        );
        let default_reg = FakeRegistry::new(
            DEFAULT_REGISTRY_URL,
            vec![record("clibs/list", "https://github.com/clibs/list")],
            "",
        );

        let manager = RegistryManager {
            registries: vec![Box::new(private), Box::new(default_reg)],
        };

        let found = manager.find_package("clibs/list").unwrap();
        assert_eq!(found.href, "https://private.example/clibs/list");
    }

    #[test]
    fn unknown_id_yields_none() {
        let manager = RegistryManager {
            registries: vec![Box::new(FakeRegistry::new(
                DEFAULT_REGISTRY_URL,
                vec![record("clibs/list", "https://github.com/clibs/list")],
                "",
            ))],
        };
        assert!(manager.find_package("clibs/nope").is_none());
    }

    fn test_logger() -> Logger {
        Logger::root(slog::Discard, slog::o!())
    }

    #[test]
    fn fetch_all_cached_serves_default_registry_from_cache_when_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::from_disk(dir.path().to_path_buf(), &test_logger());
        cache.save_search("cached body").unwrap();

        let default_reg = FakeRegistry::new(DEFAULT_REGISTRY_URL, vec![], "");
        let mut manager = RegistryManager {
            registries: vec![Box::new(default_reg)],
        };

        manager.fetch_all_cached(&HttpClient::new(), &cache, false, &test_logger());

        let reg = &manager.registries[0];
        assert_eq!(reg.raw_body(), Some("cached body"));
    }

    #[test]
    fn fetch_all_cached_skip_cache_forces_network() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::from_disk(dir.path().to_path_buf(), &test_logger());
        cache.save_search("stale body").unwrap();

        let fetch_count = Arc::new(AtomicUsize::new(0));
        let default_reg =
            FakeRegistry::new(DEFAULT_REGISTRY_URL, vec![], "fresh body").with_fetch_counter(Arc::clone(&fetch_count));
        let mut manager = RegistryManager {
            registries: vec![Box::new(default_reg)],
        };

        manager.fetch_all_cached(&HttpClient::new(), &cache, true, &test_logger());

        let reg = &manager.registries[0];
        assert_eq!(reg.raw_body(), Some("fresh body"));
        assert_eq!(
            fetch_count.load(Ordering::SeqCst),
            1,
            "skip_cache must route through fetch(), not the cached body"
        );
    }
}

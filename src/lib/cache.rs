//! §4.1 Cache: a filesystem-backed cache of manifests, unpacked package
//! trees, and a singleton search-listing body, all keyed by
//! `(author, name, version)` and subject to an age-based TTL.
//!
//! Grounded directly on `clib-cache.c`'s three-directory layout
//! (`json/`, `packages/`, `search.html`) and its miss/expired split,
//! which this crate exposes as [`Fetch`] instead of `clib_cache_load_package`'s
//! `-1`/`-2` return codes.

use crate::util::errors::{ErrorKind, Res};
use failure::ResultExt;
use slog::Logger;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

const MANIFEST_TTL: Duration = Duration::from_secs(30 * 24 * 3600);
const PACKAGE_TTL: Duration = Duration::from_secs(30 * 24 * 3600);
const SEARCH_TTL: Duration = Duration::from_secs(24 * 3600);

/// The outcome of a cache lookup that can be "there but stale" as well as
/// plain present/absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fetch {
    /// Present and not stale; the cache satisfied the request.
    Fresh,
    /// Not present at all; fall through to the network.
    Miss,
    /// Was present but older than the TTL; the stale entry has already
    /// been deleted. Fall through to the network and repopulate.
    Expired,
}

pub struct Cache {
    base: PathBuf,
    manifest_ttl: Duration,
    package_ttl: Duration,
    search_ttl: Duration,
    lock: Mutex<()>,
    logger: Logger,
}

impl Cache {
    /// The default cache root: `$HOME/.cache/clib` on Unix,
    /// `%AppData%/.cache/clib` on Windows (spec.md §6).
    pub fn default_base() -> Res<PathBuf> {
        let dirs = directories::BaseDirs::new()
            .ok_or_else(|| ErrorKind::CacheIo("could not determine home directory".to_string()))?;

        #[cfg(windows)]
        let root = dirs.data_dir().to_path_buf();
        #[cfg(not(windows))]
        let root = dirs.home_dir().to_path_buf();

        Ok(root.join(".cache").join("clib"))
    }

    pub fn from_disk(base: PathBuf, logger: &Logger) -> Self {
        Self::with_ttls(base, MANIFEST_TTL, PACKAGE_TTL, SEARCH_TTL, logger)
    }

    /// Constructs a cache with explicit TTLs, used by tests to simulate
    /// expiry without waiting 30 real days.
    pub fn with_ttls(
        base: PathBuf,
        manifest_ttl: Duration,
        package_ttl: Duration,
        search_ttl: Duration,
        logger: &Logger,
    ) -> Self {
        let logger = logger.new(slog::o!("cache" => base.to_string_lossy().into_owned()));
        Cache {
            base,
            manifest_ttl,
            package_ttl,
            search_ttl,
            lock: Mutex::new(()),
            logger,
        }
    }

    fn ensure_dirs(&self) -> Res<()> {
        fs::create_dir_all(self.base.join("json"))?;
        fs::create_dir_all(self.base.join("packages"))?;
        Ok(())
    }

    fn manifest_path(&self, author: &str, name: &str, version: &str) -> PathBuf {
        self.base
            .join("json")
            .join(format!("{}_{}_{}.json", author, name, version))
    }

    fn package_dir(&self, author: &str, name: &str, version: &str) -> PathBuf {
        self.base
            .join("packages")
            .join(format!("{}_{}_{}", author, name, version))
    }

    fn search_path(&self) -> PathBuf {
        self.base.join("search.html")
    }

    fn is_stale(path: &Path, ttl: Duration) -> bool {
        match fs::metadata(path).and_then(|m| m.modified()) {
            Ok(mtime) => mtime.elapsed().map(|age| age > ttl).unwrap_or(false),
            Err(_) => true,
        }
    }

    // ---- manifest cache ----

    pub fn has_manifest(&self, author: &str, name: &str, version: &str) -> bool {
        let _guard = self.lock.lock().unwrap();
        let path = self.manifest_path(author, name, version);
        path.is_file() && !Self::is_stale(&path, self.manifest_ttl)
    }

    pub fn read_manifest(&self, author: &str, name: &str, version: &str) -> Option<String> {
        let _guard = self.lock.lock().unwrap();
        let path = self.manifest_path(author, name, version);
        if !path.is_file() || Self::is_stale(&path, self.manifest_ttl) {
            return None;
        }
        fs::read_to_string(&path).ok()
    }

    pub fn save_manifest(&self, author: &str, name: &str, version: &str, raw: &str) -> Res<()> {
        let _guard = self.lock.lock().unwrap();
        self.ensure_dirs()?;
        let path = self.manifest_path(author, name, version);
        fs::write(&path, raw)?;
        Ok(())
    }

    pub fn delete_manifest(&self, author: &str, name: &str, version: &str) -> Res<()> {
        let _guard = self.lock.lock().unwrap();
        let path = self.manifest_path(author, name, version);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }

    // ---- package cache ----

    pub fn has_package(&self, author: &str, name: &str, version: &str) -> bool {
        let _guard = self.lock.lock().unwrap();
        let dir = self.package_dir(author, name, version);
        dir.is_dir() && !Self::is_stale(&dir, self.package_ttl)
    }

    /// Loads a cached package tree into `target_dir`. See [`Fetch`] for the
    /// three possible outcomes.
    pub fn load_package(
        &self,
        author: &str,
        name: &str,
        version: &str,
        target_dir: &Path,
    ) -> Res<Fetch> {
        let _guard = self.lock.lock().unwrap();
        let dir = self.package_dir(author, name, version);

        if !dir.is_dir() {
            return Ok(Fetch::Miss);
        }
        if Self::is_stale(&dir, self.package_ttl) {
            fs::remove_dir_all(&dir)?;
            slog::debug!(self.logger, "evicted stale package cache"; "author" => author, "name" => name, "version" => version);
            return Ok(Fetch::Expired);
        }

        fs::create_dir_all(target_dir)?;
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let dest = target_dir.join(entry.file_name());
            if entry.file_type()?.is_dir() {
                copy_dir::copy_dir(entry.path(), dest).context(ErrorKind::CacheIo(format!(
                    "loading cached package into {}",
                    target_dir.display()
                )))?;
            } else {
                fs::copy(entry.path(), dest)?;
            }
        }
        Ok(Fetch::Fresh)
    }

    /// Saves `source_dir`'s contents into the package cache, evicting any
    /// prior entry first (spec.md §4.1).
    pub fn save_package(
        &self,
        author: &str,
        name: &str,
        version: &str,
        source_dir: &Path,
    ) -> Res<()> {
        let _guard = self.lock.lock().unwrap();
        self.ensure_dirs()?;
        let dir = self.package_dir(author, name, version);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        copy_dir::copy_dir(source_dir, &dir)
            .context(ErrorKind::CacheIo(format!("saving package cache at {}", dir.display())))?;
        Ok(())
    }

    pub fn delete_package(&self, author: &str, name: &str, version: &str) -> Res<()> {
        let _guard = self.lock.lock().unwrap();
        let dir = self.package_dir(author, name, version);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        Ok(())
    }

    // ---- search cache ----

    pub fn has_search(&self) -> bool {
        let _guard = self.lock.lock().unwrap();
        let path = self.search_path();
        path.is_file() && !Self::is_stale(&path, self.search_ttl)
    }

    pub fn read_search(&self) -> Option<String> {
        let _guard = self.lock.lock().unwrap();
        let path = self.search_path();
        if !path.is_file() || Self::is_stale(&path, self.search_ttl) {
            return None;
        }
        fs::read_to_string(&path).ok()
    }

    pub fn save_search(&self, body: &str) -> Res<()> {
        let _guard = self.lock.lock().unwrap();
        self.ensure_dirs()?;
        fs::write(self.search_path(), body)?;
        Ok(())
    }

    pub fn delete_search(&self) -> Res<()> {
        let _guard = self.lock.lock().unwrap();
        let path = self.search_path();
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::{set_file_mtime, FileTime};
    use std::fs::File;
    use std::io::Write;
    use std::time::SystemTime;

    fn test_logger() -> Logger {
        Logger::root(slog::Discard, slog::o!())
    }

    fn short_ttl_cache(base: PathBuf) -> Cache {
        Cache::with_ttls(
            base,
            Duration::from_millis(50),
            Duration::from_millis(50),
            Duration::from_millis(50),
            &test_logger(),
        )
    }

    #[test]
    fn manifest_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::from_disk(dir.path().to_path_buf(), &test_logger());

        assert!(!cache.has_manifest("a", "n", "v"));
        cache.save_manifest("a", "n", "v", "{}").unwrap();
        assert!(cache.has_manifest("a", "n", "v"));
        assert_eq!(cache.read_manifest("a", "n", "v").unwrap(), "{}");

        cache.delete_manifest("a", "n", "v").unwrap();
        assert!(!cache.has_manifest("a", "n", "v"));
    }

    #[test]
    fn package_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::from_disk(dir.path().to_path_buf(), &test_logger());

        let src = tempfile::tempdir().unwrap();
        fs::write(src.path().join("case.c"), b"int main(){}").unwrap();
        fs::create_dir(src.path().join("sub")).unwrap();
        fs::write(src.path().join("sub").join("nested.h"), b"// hi").unwrap();

        cache.save_package("a", "n", "v", src.path()).unwrap();
        assert!(cache.has_package("a", "n", "v"));

        let target = tempfile::tempdir().unwrap();
        let outcome = cache.load_package("a", "n", "v", target.path()).unwrap();
        assert_eq!(outcome, Fetch::Fresh);
        assert_eq!(
            fs::read(target.path().join("case.c")).unwrap(),
            b"int main(){}"
        );
        assert_eq!(
            fs::read(target.path().join("sub").join("nested.h")).unwrap(),
            b"// hi"
        );
    }

    #[test]
    fn load_miss_when_never_saved() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::from_disk(dir.path().to_path_buf(), &test_logger());
        let target = tempfile::tempdir().unwrap();
        let outcome = cache.load_package("a", "n", "v", target.path()).unwrap();
        assert_eq!(outcome, Fetch::Miss);
    }

    #[test]
    fn expired_package_is_deleted_and_reported() {
        let dir = tempfile::tempdir().unwrap();
        let cache = short_ttl_cache(dir.path().to_path_buf());

        let src = tempfile::tempdir().unwrap();
        fs::write(src.path().join("f"), b"x").unwrap();
        cache.save_package("a", "n", "v", src.path()).unwrap();

        // Backdate the cached directory past the 50ms TTL.
        let old = FileTime::from_system_time(SystemTime::now() - Duration::from_secs(3600));
        set_file_mtime(dir.path().join("packages").join("a_n_v"), old).unwrap();

        assert!(!cache.has_package("a", "n", "v"));

        let target = tempfile::tempdir().unwrap();
        let outcome = cache.load_package("a", "n", "v", target.path()).unwrap();
        assert_eq!(outcome, Fetch::Expired);
        assert!(!dir.path().join("packages").join("a_n_v").exists());
    }

    #[test]
    fn search_cache_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::from_disk(dir.path().to_path_buf(), &test_logger());

        assert!(!cache.has_search());
        cache.save_search("<html></html>").unwrap();
        assert!(cache.has_search());
        assert_eq!(cache.read_search().unwrap(), "<html></html>");
        cache.delete_search().unwrap();
        assert!(!cache.has_search());
    }

    #[test]
    fn save_package_evicts_prior_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::from_disk(dir.path().to_path_buf(), &test_logger());

        let src1 = tempfile::tempdir().unwrap();
        fs::write(src1.path().join("v1.txt"), b"old").unwrap();
        cache.save_package("a", "n", "v", src1.path()).unwrap();

        let src2 = tempfile::tempdir().unwrap();
        let mut f = File::create(src2.path().join("v2.txt")).unwrap();
        f.write_all(b"new").unwrap();
        cache.save_package("a", "n", "v", src2.path()).unwrap();

        let pkg_dir = dir.path().join("packages").join("a_n_v");
        assert!(!pkg_dir.join("v1.txt").exists());
        assert!(pkg_dir.join("v2.txt").exists());
    }
}

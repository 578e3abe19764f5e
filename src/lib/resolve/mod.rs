//! §4.6 the resolver + installer: the core recursive algorithm that walks a
//! dependency graph, deduplicates visits by package name, and populates a
//! flat `deps/<name>/` tree.
//!
//! Grounded on `clib-package.c`'s `clib_package_install_dependency`/
//! `clib_package_install` pair and `clib-package-installer.c`'s executable
//! install path. The global mutable state spec.md §9 calls out (visited set,
//! cache, HTTP share handle) is threaded explicitly as fields of
//! [`Installer`] rather than held in statics, following elba's
//! `Cache`/`Solver` context-object pattern.

use crate::cache::{Cache, Fetch};
use crate::http::HttpClient;
use crate::package::manifest::Manifest;
use crate::package::{Package, Slug};
use crate::registry::RegistryManager;
use crate::repository::{self, Repository};
use crate::secrets::Secrets;
use crate::util::errors::{ErrorKind, Res};
use crate::util::{self, basename};
use failure::ResultExt;
use indexmap::IndexMap;
use slog::{debug, warn, Logger};
use std::collections::{HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

/// The resolver/installer context: one instance per `clib` invocation,
/// shared across every recursive install via `Arc`.
pub struct Installer {
    cache: Cache,
    secrets: Secrets,
    registries: RegistryManager,
    http: HttpClient,
    visited: Mutex<HashSet<String>>,
    concurrency: usize,
    dev_mode: bool,
    force: bool,
    skip_cache: bool,
    prefix: Option<String>,
    logger: Logger,
}

/// The subset of flags spec.md §6 attaches to an install/update invocation.
pub struct Options {
    pub dev_mode: bool,
    pub force: bool,
    pub skip_cache: bool,
    pub prefix: Option<String>,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            dev_mode: false,
            force: false,
            skip_cache: false,
            prefix: None,
        }
    }
}

impl Installer {
    pub fn new(
        cache: Cache,
        secrets: Secrets,
        registries: RegistryManager,
        http: HttpClient,
        options: Options,
        logger: Logger,
    ) -> Arc<Self> {
        Arc::new(Installer {
            cache,
            secrets,
            registries,
            http,
            visited: Mutex::new(HashSet::new()),
            concurrency: num_cpus::get().max(1),
            dev_mode: options.dev_mode,
            force: options.force,
            skip_cache: options.skip_cache,
            prefix: options.prefix,
            logger,
        })
    }

    /// Installs the root manifest's dependencies (and, if dev mode is set,
    /// its development dependencies) into `deps_dir`. The root package's own
    /// source files are assumed already present in the project directory —
    /// only its declared dependencies are resolved (spec.md §4.6 step 11/12
    /// applied starting from the root).
    pub fn install_root(self: &Arc<Self>, root: &Manifest, deps_dir: &Path) -> Res<()> {
        self.install_dependency_set(&root.dependencies, deps_dir)?;
        if self.dev_mode {
            self.install_dependency_set(&root.development, deps_dir)?;
        }
        Ok(())
    }

    /// Installs a single slug directly (the `install <slug>` CLI form),
    /// bypassing the root manifest's own dependency list.
    pub fn install_slug(self: &Arc<Self>, slug_raw: &str, deps_dir: &Path) -> Res<()> {
        let slug: Slug = slug_raw.parse()?;
        self.install_resolved(&slug, slug_raw, deps_dir)
    }

    fn install_dependency_set(self: &Arc<Self>, deps: &IndexMap<String, String>, deps_dir: &Path) -> Res<()> {
        let mut in_flight: VecDeque<thread::JoinHandle<Res<()>>> = VecDeque::new();
        let mut first_err = None;

        for (id, version) in deps {
            if in_flight.len() >= self.concurrency {
                if let Some(handle) = in_flight.pop_front() {
                    record_first(&mut first_err, join_thread(handle));
                }
            }

            let installer = Arc::clone(self);
            let id = id.clone();
            let version = version.clone();
            let deps_dir = deps_dir.to_path_buf();
            in_flight.push_back(thread::spawn(move || {
                installer.install_dependency(&id, &version, &deps_dir)
            }));
        }

        while let Some(handle) = in_flight.pop_front() {
            record_first(&mut first_err, join_thread(handle));
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn install_dependency(self: &Arc<Self>, id: &str, version: &str, deps_dir: &Path) -> Res<()> {
        let slug_raw = format!("{}@{}", id, version);
        let slug: Slug = slug_raw.parse()?;
        self.install_resolved(&slug, &slug_raw, deps_dir)
    }

    fn install_resolved(self: &Arc<Self>, slug: &Slug, slug_raw: &str, deps_dir: &Path) -> Res<()> {
        let href = self
            .registries
            .find_package(&slug.id.as_str())
            .map(|r| r.href.clone())
            .ok_or_else(|| ErrorKind::PackageNotFound(slug.id.as_str()))?;

        let repo = repository::for_base_url(&href, &self.secrets)?;
        let (raw, manifest_filename) =
            repository::fetch_manifest(&self.http, repo.as_ref(), &slug.version)?;
        let manifest = Manifest::from_str(&raw)?;
        let pkg = Package::new(raw, manifest, slug_raw, slug, href, manifest_filename);

        self.install_package(&pkg, repo.as_ref(), deps_dir)
    }

    /// The 12-step resolve/install contract for one already-fetched package.
    fn install_package(self: &Arc<Self>, pkg: &Arc<Package>, repo: &dyn Repository, deps_dir: &Path) -> Res<()> {
        // 1. Deduplicate by name (the historical, intentionally name-only key).
        {
            let mut visited = self.visited.lock().unwrap();
            if visited.contains(pkg.name()) && !self.force {
                debug!(self.logger, "already visited, skipping"; "name" => pkg.name());
                return Ok(());
            }
            visited.insert(pkg.name().to_string());
        }

        // 2. Prepare directory.
        let pkg_dir = deps_dir.join(pkg.name());
        fs::create_dir_all(&pkg_dir)?;

        // 3. Write manifest.
        if !pkg.is_meta() {
            util::write(&pkg_dir.join(pkg.manifest_filename), pkg.raw.as_bytes())?;
        }

        // 4. Makefile.
        if let Some(makefile) = &pkg.manifest.makefile {
            repository::download_file_sync(&self.http, repo, &pkg.version, makefile, &pkg_dir)?;
        }

        // 5-8. Source files, cache-first.
        if let Some(src) = &pkg.manifest.src {
            let mut served_from_cache = false;

            if !self.skip_cache && self.cache.has_package(pkg.author(), pkg.name(), &pkg.version) {
                match self.cache.load_package(pkg.author(), pkg.name(), &pkg.version, &pkg_dir) {
                    Ok(Fetch::Fresh) => served_from_cache = true,
                    Ok(Fetch::Miss) | Ok(Fetch::Expired) => {}
                    Err(e) => warn!(self.logger, "cache load failed, fetching from network"; "error" => %e),
                }
            }

            if !served_from_cache {
                self.download_src_files(pkg, src, &pkg_dir)?;
                if let Err(e) = self.cache.save_package(pkg.author(), pkg.name(), &pkg.version, &pkg_dir) {
                    warn!(self.logger, "cache save failed, continuing uncached"; "error" => %e);
                }
            }
        }

        // 9. Configure hook.
        if let Some(configure) = &pkg.manifest.configure {
            self.run_hook(configure, &pkg_dir, pkg.manifest.prefix.as_deref())?;
        }

        // 10. Install hook.
        if let Some(install_cmd) = &pkg.manifest.install {
            self.run_install_hook(pkg, repo, install_cmd, &pkg_dir)?;
        }

        // 11. Dependencies, flat into the same deps_dir.
        self.install_dependency_set(&pkg.manifest.dependencies, deps_dir)?;

        // 12. Development dependencies, dev-mode only.
        if self.dev_mode {
            self.install_dependency_set(&pkg.manifest.development, deps_dir)?;
        }

        Ok(())
    }

    fn download_src_files(&self, pkg: &Arc<Package>, src: &[String], pkg_dir: &Path) -> Res<()> {
        let mut in_flight: VecDeque<repository::DownloadHandle> = VecDeque::new();
        let mut first_err = None;

        for file in src {
            if in_flight.len() >= self.concurrency {
                if let Some(handle) = in_flight.pop_front() {
                    record_first(&mut first_err, repository::join(handle));
                }
            }

            let handle = repository::download_file(
                self.http.clone(),
                pkg.base_url.clone(),
                self.secrets.clone(),
                pkg.version.clone(),
                file.clone(),
                pkg_dir.to_path_buf(),
            )?;
            in_flight.push_back(handle);
        }

        while let Some(handle) = in_flight.pop_front() {
            record_first(&mut first_err, repository::join(handle));
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn run_hook(&self, cmd: &str, cwd: &Path, pkg_prefix: Option<&str>) -> Res<()> {
        let envs = self.hook_envs(pkg_prefix);
        let status = util::run_shell(cmd, cwd, &envs)?;
        if !status.success() {
            return Err(ErrorKind::HookFailed(cmd.to_string()).into());
        }
        Ok(())
    }

    fn hook_envs(&self, pkg_prefix: Option<&str>) -> Vec<(String, String)> {
        let mut envs = Vec::new();
        if self.force {
            envs.push(("CLIB_FORCE".to_string(), "1".to_string()));
        }
        if let Some(prefix) = pkg_prefix.or(self.prefix.as_deref()) {
            envs.push(("PREFIX".to_string(), prefix.to_string()));
            envs.push(("CLIB_PREFIX".to_string(), prefix.to_string()));
        }
        envs
    }

    /// The executable-install subroutine (spec.md §4.6 step 10): fetch a
    /// tarball of the package at its resolved version, extract it into a
    /// scratch directory, recursively install its own dependencies into the
    /// extracted tree's `deps/` (isolated from the project's own deps dir —
    /// this build is self-contained and discarded afterward), copy the
    /// makefile in, then run the install command there.
    fn run_install_hook(
        self: &Arc<Self>,
        pkg: &Arc<Package>,
        repo: &dyn Repository,
        install_cmd: &str,
        pkg_dir: &Path,
    ) -> Res<()> {
        let scratch = unique_scratch_dir(&format!("clib-install-{}", pkg.name()));
        fs::create_dir_all(&scratch)?;
        let result = self.run_install_hook_in(pkg, repo, install_cmd, pkg_dir, &scratch);
        let _ = fs::remove_dir_all(&scratch);
        result
    }

    fn run_install_hook_in(
        self: &Arc<Self>,
        pkg: &Arc<Package>,
        repo: &dyn Repository,
        install_cmd: &str,
        pkg_dir: &Path,
        scratch: &Path,
    ) -> Res<()> {
        let tarball_path = scratch.join("src.tar.gz");
        let tarball_url = repo.url_for_tarball(&pkg.version);
        let headers: Vec<(String, String)> = repo.auth_header().into_iter().collect();
        self.http.get_to_file(&tarball_url, &headers, &tarball_path)?;

        let extract_dir = scratch.join("extracted");
        fs::create_dir_all(&extract_dir)?;
        extract_tarball(&tarball_path, &extract_dir)?;
        let repo_root = first_subdir(&extract_dir)?;

        let extracted_deps_dir = repo_root.join("deps");
        self.install_dependency_set(&pkg.manifest.dependencies, &extracted_deps_dir)?;

        if let Some(makefile) = &pkg.manifest.makefile {
            let source = pkg_dir.join(basename(makefile));
            if source.exists() {
                fs::copy(&source, repo_root.join(basename(makefile)))?;
            }
        }

        let envs = self.hook_envs(pkg.manifest.prefix.as_deref());
        let status = util::run_shell(install_cmd, &repo_root, &envs)?;
        if !status.success() {
            return Err(ErrorKind::HookFailed(install_cmd.to_string()).into());
        }
        Ok(())
    }
}

fn extract_tarball(tarball: &Path, dest: &Path) -> Res<()> {
    let file = fs::File::open(tarball)?;
    let decoder = flate2::read::GzDecoder::new(file);
    let mut archive = tar::Archive::new(decoder);
    archive
        .unpack(dest)
        .context(ErrorKind::CacheIo(format!("extracting {}", tarball.display())))?;
    Ok(())
}

/// Tarballs produced by code-hosting archive endpoints nest everything under
/// a single top-level directory (`<repo>-<version>/…`); this finds it.
fn first_subdir(dir: &Path) -> Res<PathBuf> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            return Ok(entry.path());
        }
    }
    Ok(dir.to_path_buf())
}

fn unique_scratch_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    std::env::temp_dir().join(format!("{}-{}-{}", prefix, std::process::id(), nanos))
}

fn join_thread(handle: thread::JoinHandle<Res<()>>) -> Res<()> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(ErrorKind::HookFailed("dependency installer thread panicked".to_string()).into()),
    }
}

fn record_first(slot: &mut Option<crate::util::errors::Error>, result: Res<()>) {
    if let Err(e) = result {
        if slot.is_none() {
            *slot = Some(e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_logger() -> Logger {
        Logger::root(slog::Discard, slog::o!())
    }

    fn test_installer(options: Options) -> Arc<Installer> {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::from_disk(dir.path().to_path_buf(), &test_logger());
        let secrets = Secrets::empty();
        let registries = RegistryManager::new(&[], &secrets, &test_logger());
        let http = HttpClient::new();
        Installer::new(cache, secrets, registries, http, options, test_logger())
    }

    #[test]
    fn dedup_skips_second_visit_with_same_name() {
        let installer = test_installer(Options::default());
        {
            let mut visited = installer.visited.lock().unwrap();
            visited.insert("case".to_string());
        }
        let visited = installer.visited.lock().unwrap();
        assert!(visited.contains("case"));
    }

    #[test]
    fn force_mode_allows_revisit() {
        let installer = test_installer(Options {
            force: true,
            ..Options::default()
        });
        assert!(installer.force);
    }

    #[test]
    fn hook_envs_includes_force_and_prefix() {
        let installer = test_installer(Options {
            force: true,
            prefix: Some("/usr/local".to_string()),
            ..Options::default()
        });
        let envs = installer.hook_envs(None);
        assert!(envs.contains(&("CLIB_FORCE".to_string(), "1".to_string())));
        assert!(envs.contains(&("PREFIX".to_string(), "/usr/local".to_string())));
        assert!(envs.contains(&("CLIB_PREFIX".to_string(), "/usr/local".to_string())));
    }

    #[test]
    fn package_prefix_overrides_installer_prefix() {
        let installer = test_installer(Options {
            prefix: Some("/usr/local".to_string()),
            ..Options::default()
        });
        let envs = installer.hook_envs(Some("/opt/pkg"));
        assert!(envs.contains(&("PREFIX".to_string(), "/opt/pkg".to_string())));
    }

    #[test]
    fn extract_tarball_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let tarball_path = dir.path().join("archive.tar.gz");

        {
            let file = fs::File::create(&tarball_path).unwrap();
            let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
            let mut builder = tar::Builder::new(encoder);
            let src_dir = dir.path().join("case-0.1.0");
            fs::create_dir_all(&src_dir).unwrap();
            fs::write(src_dir.join("case.c"), b"int main(){}").unwrap();
            builder.append_dir_all("case-0.1.0", &src_dir).unwrap();
            builder.into_inner().unwrap().finish().unwrap();
        }

        let extract_dir = dir.path().join("out");
        fs::create_dir_all(&extract_dir).unwrap();
        extract_tarball(&tarball_path, &extract_dir).unwrap();

        let repo_root = first_subdir(&extract_dir).unwrap();
        assert_eq!(
            fs::read(repo_root.join("case.c")).unwrap(),
            b"int main(){}"
        );
    }

    #[test]
    fn unique_scratch_dirs_do_not_collide() {
        let a = unique_scratch_dir("clib-install-x");
        let b = unique_scratch_dir("clib-install-x");
        assert_ne!(a, b);
    }

    #[test]
    fn diamond_dependency_visited_once() {
        let installer = test_installer(Options::default());

        // Two arrivals of the same name ("z"), as in a diamond graph where
        // both "x" and "y" depend on "z" — only the first should proceed.
        let mut run_count = 0;
        for _ in 0..2 {
            let mut visited = installer.visited.lock().unwrap();
            if visited.contains("z") {
                continue;
            }
            visited.insert("z".to_string());
            drop(visited);
            run_count += 1;
        }
        assert_eq!(run_count, 1);
    }

    #[test]
    fn cache_is_consulted_before_network_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::with_ttls(
            dir.path().to_path_buf(),
            Duration::from_secs(3600),
            Duration::from_secs(3600),
            Duration::from_secs(3600),
            &test_logger(),
        );

        let src = tempfile::tempdir().unwrap();
        fs::write(src.path().join("case.c"), b"int main(){}").unwrap();
        cache.save_package("someorg", "case", "0.1.0", src.path()).unwrap();

        assert!(cache.has_package("someorg", "case", "0.1.0"));
        let target = tempfile::tempdir().unwrap();
        let outcome = cache
            .load_package("someorg", "case", "0.1.0", target.path())
            .unwrap();
        assert_eq!(outcome, Fetch::Fresh);
        assert!(target.path().join("case.c").exists());
    }
}

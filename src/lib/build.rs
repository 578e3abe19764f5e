//! §4.7 build driver: independent of the resolver, walks an installed
//! `deps/` tree and drives `make` over every package that declares a
//! `makefile`.
//!
//! Grounded on `clib-build.c`'s dry-run-then-real invocation: a `make -n`
//! probe gates the real `make`, so packages with an up-to-date build (or no
//! buildable target at all) are skipped without side effects.

use crate::package::manifest::Manifest;
use crate::util::errors::{ErrorKind, Res};
use crate::util::{self, basename};
use slog::{debug, warn, Logger};
use std::collections::{HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::{Arc, Mutex};
use std::thread;

#[derive(Clone)]
pub struct BuildOptions {
    pub clean: bool,
    pub force: bool,
    pub prefix: Option<String>,
    pub cflags: Vec<String>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        BuildOptions {
            clean: false,
            force: false,
            prefix: None,
            cflags: Vec::new(),
        }
    }
}

pub struct BuildDriver {
    deps_dir: PathBuf,
    options: BuildOptions,
    concurrency: usize,
    visited: Mutex<HashSet<String>>,
    logger: Logger,
}

impl BuildDriver {
    pub fn new(deps_dir: PathBuf, options: BuildOptions, logger: Logger) -> Arc<Self> {
        Arc::new(BuildDriver {
            deps_dir,
            options,
            concurrency: num_cpus::get().max(1),
            visited: Mutex::new(HashSet::new()),
            logger,
        })
    }

    /// Walks every immediate child of `deps_dir` breadth-first, building
    /// each one whose manifest declares a `makefile`. Dependency recursion
    /// within a single package directory is not needed here: the flat
    /// `deps/<name>/` layout already lists every transitively installed
    /// package as a sibling (spec.md §3 invariant), so one level of listing
    /// covers the whole tree.
    pub fn build_all(self: &Arc<Self>) -> Res<()> {
        let entries = match fs::read_dir(&self.deps_dir) {
            Ok(entries) => entries,
            Err(_) => return Ok(()),
        };

        let names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|e| e.file_name().into_string().ok())
            .collect();

        self.build_named(&names)
    }

    fn build_named(self: &Arc<Self>, names: &[String]) -> Res<()> {
        let mut in_flight: VecDeque<thread::JoinHandle<Res<()>>> = VecDeque::new();
        let mut first_err = None;

        for name in names {
            if in_flight.len() >= self.concurrency {
                if let Some(handle) = in_flight.pop_front() {
                    record_first(&mut first_err, join_thread(handle));
                }
            }

            let driver = Arc::clone(self);
            let name = name.clone();
            in_flight.push_back(thread::spawn(move || driver.build_one(&name)));
        }

        while let Some(handle) = in_flight.pop_front() {
            record_first(&mut first_err, join_thread(handle));
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn build_one(self: &Arc<Self>, name: &str) -> Res<()> {
        {
            let mut visited = self.visited.lock().unwrap();
            if visited.contains(name) {
                return Ok(());
            }
            visited.insert(name.to_string());
        }

        let pkg_dir = self.deps_dir.join(name);
        let manifest_candidates = [pkg_dir.join("clib.json"), pkg_dir.join("package.json")];
        let manifest_path = manifest_candidates
            .into_iter()
            .find(|p| p.is_file());

        let manifest_path = match manifest_path {
            Some(p) => p,
            None => {
                debug!(self.logger, "no manifest, skipping build"; "package" => name);
                return Ok(());
            }
        };

        let raw = fs::read_to_string(&manifest_path)?;
        let manifest: Manifest = raw.parse()?;

        let makefile = match &manifest.makefile {
            Some(m) => m,
            None => return Ok(()),
        };
        let makefile_name = basename(makefile);
        if !pkg_dir.join(makefile_name).is_file() {
            warn!(self.logger, "declares a makefile that was not installed"; "package" => name, "makefile" => makefile_name);
            return Ok(());
        }

        self.make_package(&pkg_dir, makefile_name, manifest.prefix.as_deref())?;

        // Recurse into this package's own dependencies (siblings in the flat
        // deps dir), matching the resolver's breadth-first, name-keyed walk.
        let dep_names: Vec<String> = manifest.dependencies.keys().cloned().collect();
        self.build_named(&dep_names)
    }

    fn make_package(&self, pkg_dir: &Path, makefile: &str, pkg_prefix: Option<&str>) -> Res<()> {
        let envs = self.make_envs(pkg_prefix);

        if self.options.clean {
            self.run_make(pkg_dir, makefile, &["clean"], &envs)?;
        }

        let probe = self.run_make(pkg_dir, makefile, &["-n"], &envs)?;
        if !probe.success() {
            debug!(self.logger, "dry-run probe failed, skipping"; "dir" => pkg_dir.display().to_string());
            return Ok(());
        }

        let mut args: Vec<&str> = Vec::new();
        if self.options.force {
            args.push("-B");
        }
        let status = self.run_make(pkg_dir, makefile, &args, &envs)?;
        if !status.success() {
            return Err(ErrorKind::HookFailed(format!("make -C {}", pkg_dir.display())).into());
        }
        Ok(())
    }

    fn run_make(&self, pkg_dir: &Path, makefile: &str, extra_args: &[&str], envs: &[(String, String)]) -> Res<ExitStatus> {
        let mut cmd = format!("make -C {} -f {}", shell_escape_path(pkg_dir), makefile);
        for arg in extra_args {
            cmd.push(' ');
            cmd.push_str(arg);
        }
        util::run_shell(&cmd, pkg_dir, envs)
    }

    fn make_envs(&self, pkg_prefix: Option<&str>) -> Vec<(String, String)> {
        let mut cflags = self.options.cflags.clone();
        cflags.push(format!("-I{}", self.deps_dir.display()));
        let mut envs = vec![("CFLAGS".to_string(), cflags.join(" "))];

        if self.options.force {
            envs.push(("CLIB_FORCE".to_string(), "1".to_string()));
        }
        if let Some(prefix) = pkg_prefix.or(self.options.prefix.as_deref()) {
            envs.push(("PREFIX".to_string(), prefix.to_string()));
            envs.push(("CLIB_PREFIX".to_string(), prefix.to_string()));
        }
        envs
    }
}

fn shell_escape_path(path: &Path) -> String {
    shell_escape::escape(path.to_string_lossy()).into_owned()
}

fn join_thread(handle: thread::JoinHandle<Res<()>>) -> Res<()> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(ErrorKind::HookFailed("build worker thread panicked".to_string()).into()),
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

    fn test_logger() -> Logger {
        Logger::root(slog::Discard, slog::o!())
    }

    fn write_pkg(deps_dir: &Path, name: &str, manifest: &str, makefile_body: Option<&str>) {
        let dir = deps_dir.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("clib.json"), manifest).unwrap();
        if let Some(body) = makefile_body {
            fs::write(dir.join("Makefile"), body).unwrap();
        }
    }

    #[test]
    fn skips_package_without_makefile_declaration() {
        let dir = tempfile::tempdir().unwrap();
        write_pkg(dir.path(), "case", r#"{"name":"case","version":"1.0.0"}"#, None);

        let driver = BuildDriver::new(dir.path().to_path_buf(), BuildOptions::default(), test_logger());
        driver.build_all().unwrap();
    }

    #[test]
    fn skips_when_declared_makefile_was_not_installed() {
        let dir = tempfile::tempdir().unwrap();
        write_pkg(
            dir.path(),
            "case",
            r#"{"name":"case","version":"1.0.0","makefile":"Makefile"}"#,
            None,
        );

        let driver = BuildDriver::new(dir.path().to_path_buf(), BuildOptions::default(), test_logger());
        driver.build_all().unwrap();
    }

    #[test]
    fn make_envs_appends_deps_include_path() {
        let dir = tempfile::tempdir().unwrap();
        let driver = BuildDriver::new(
            dir.path().to_path_buf(),
            BuildOptions {
                cflags: vec!["-Wall".to_string()],
                ..BuildOptions::default()
            },
            test_logger(),
        );
        let envs = driver.make_envs(None);
        let cflags = envs.iter().find(|(k, _)| k == "CFLAGS").unwrap();
        assert!(cflags.1.contains("-Wall"));
        assert!(cflags.1.contains(&format!("-I{}", dir.path().display())));
    }

    #[test]
    fn force_flag_sets_clib_force_env() {
        let dir = tempfile::tempdir().unwrap();
        let driver = BuildDriver::new(
            dir.path().to_path_buf(),
            BuildOptions {
                force: true,
                ..BuildOptions::default()
            },
            test_logger(),
        );
        let envs = driver.make_envs(None);
        assert!(envs.contains(&("CLIB_FORCE".to_string(), "1".to_string())));
    }

    #[test]
    fn visited_set_prevents_double_build() {
        let dir = tempfile::tempdir().unwrap();
        let driver = BuildDriver::new(dir.path().to_path_buf(), BuildOptions::default(), test_logger());
        {
            let mut visited = driver.visited.lock().unwrap();
            visited.insert("case".to_string());
        }
        // build_one returns immediately once a name is visited; calling it
        // again must not attempt to read a (possibly nonexistent) manifest.
        driver.build_one("case").unwrap();
    }
}

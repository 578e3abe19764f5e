//! Helpers shared across the rest of the crate: the error taxonomy and a
//! couple of filesystem/shell primitives that don't belong to any single
//! component.

pub mod errors;

use self::errors::{ErrorKind, Res};
use failure::ResultExt;
use std::fs;
use std::path::Path;
use std::process::{Command, ExitStatus};

/// Writes `contents` to `path`, creating parent directories as needed.
/// Used by every component that materializes a file on disk (manifests,
/// cache entries, downloaded source files).
pub fn write(path: &Path, contents: &[u8]) -> Res<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)?;
    Ok(())
}

/// Runs `cmd` as a shell command rooted at `cwd`, with `envs` added to (and
/// overriding) the inherited environment. This is the single shell-out point
/// used by both the resolver's `configure`/`install` hooks (spec.md §4.6)
/// and the build driver's `make` invocations (spec.md §4.7) — the contract
/// in both cases is "hand the hook a shell command string and an exit code",
/// never a reimplementation of what the hook does.
pub fn run_shell(cmd: &str, cwd: &Path, envs: &[(String, String)]) -> Res<ExitStatus> {
    let mut command = Command::new("sh");
    command.arg("-c").arg(cmd).current_dir(cwd);
    for (k, v) in envs {
        command.env(k, v);
    }
    Ok(command
        .status()
        .context(ErrorKind::Io(format!("failed to spawn `{}`", cmd)))?)
}

/// The basename of a (possibly nested) relative path, e.g. `src/foo.c` ->
/// `foo.c`. The src list (and the makefile path) is flattened to basenames
/// on disk per spec.md §4.6 / §9 — this loses the source repo's directory
/// structure, intentionally, matching historical behavior.
pub fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

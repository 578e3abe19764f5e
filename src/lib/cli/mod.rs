//! Thin context-struct entry points for the external CLI (spec.md §1, §6),
//! in the idiom of elba's `cli::new::NewCtx`/`new()`: a plain data struct
//! plus a free function that consumes it. Argument parsing itself lives in
//! `src/bin/main.rs` and is deliberately shallow (spec.md §1 non-goal).

pub mod build;
pub mod install;
pub mod search;

use crate::secrets::Secrets;
use crate::util::errors::Res;
use std::path::{Path, PathBuf};

/// Loads the secrets file at `path`, or an empty store if `path` is `None`.
pub fn load_secrets(path: Option<&Path>) -> Res<Secrets> {
    match path {
        Some(p) => Secrets::load(p),
        None => Ok(Secrets::empty()),
    }
}

/// The default deps directory for a CLI invocation rooted at `cwd`.
pub fn default_deps_dir(cwd: &Path) -> PathBuf {
    cwd.join("deps")
}

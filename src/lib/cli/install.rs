//! `install`/`update` (spec.md §6): resolve either the root manifest's
//! dependencies or a list of explicit slugs into a deps directory.

use crate::cache::Cache;
use crate::http::HttpClient;
use crate::package::manifest::Manifest;
use crate::registry::RegistryManager;
use crate::repository::MANIFEST_NAMES;
use crate::resolve::{Installer, Options};
use crate::util::errors::{ErrorKind, Res};
use slog::Logger;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

pub struct InstallCtx {
    pub project_dir: PathBuf,
    pub deps_dir: PathBuf,
    pub secrets_path: Option<PathBuf>,
    pub cache_base: Option<PathBuf>,
    /// Explicit slugs from `install <slug>...`; empty means "install the
    /// root manifest's own dependencies".
    pub slugs: Vec<String>,
    pub options: Options,
    pub log: Logger,
}

/// Reads whichever of `clib.json`/`package.json` is present in `project_dir`.
fn read_root_manifest(project_dir: &std::path::Path) -> Res<Manifest> {
    for name in MANIFEST_NAMES {
        let path = project_dir.join(name);
        if path.is_file() {
            let raw = fs::read_to_string(&path)?;
            return Manifest::from_str(&raw);
        }
    }
    Err(ErrorKind::MissingManifest(project_dir.display().to_string()).into())
}

pub fn install(ctx: InstallCtx) -> Res<()> {
    let secrets = super::load_secrets(ctx.secrets_path.as_deref())?;

    let cache_base = match ctx.cache_base {
        Some(base) => base,
        None => Cache::default_base()?,
    };
    let cache = Cache::from_disk(cache_base, &ctx.log);
    let http = HttpClient::new();

    let root_manifest = read_root_manifest(&ctx.project_dir).ok();
    let extra_registries: Vec<String> = root_manifest
        .as_ref()
        .map(|m| m.registries.clone())
        .unwrap_or_default();

    let mut registries = RegistryManager::new(&extra_registries, &secrets, &ctx.log);
    registries.fetch_all(&http, &ctx.log);

    let project_dir_display = ctx.project_dir.display().to_string();
    let installer = Installer::new(cache, secrets, registries, http, ctx.options, ctx.log.clone());

    fs::create_dir_all(&ctx.deps_dir)?;

    if ctx.slugs.is_empty() {
        let manifest = root_manifest
            .ok_or_else(|| ErrorKind::MissingManifest(project_dir_display))?;
        installer.install_root(&manifest, &ctx.deps_dir)
    } else {
        for slug in &ctx.slugs {
            installer.install_slug(slug, &ctx.deps_dir)?;
        }
        Ok(())
    }
}

/// `update [slug…]`: like `install`, but forces a fresh network fetch and
/// overwrites anything already visited (spec.md §6).
pub fn update(mut ctx: InstallCtx) -> Res<()> {
    ctx.options.force = true;
    ctx.options.skip_cache = true;
    install(ctx)
}

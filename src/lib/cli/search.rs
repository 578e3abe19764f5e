//! `search [query…]` (spec.md §6): list matching packages across every
//! configured registry.

use crate::cache::Cache;
use crate::http::HttpClient;
use crate::registry::{PackageRecord, RegistryManager};
use crate::util::errors::Res;
use slog::Logger;
use std::path::PathBuf;

pub struct SearchCtx {
    pub query: String,
    pub extra_registries: Vec<String>,
    pub secrets_path: Option<PathBuf>,
    pub cache_base: Option<PathBuf>,
    pub skip_cache: bool,
    pub log: Logger,
}

pub fn search(ctx: SearchCtx) -> Res<Vec<PackageRecord>> {
    let secrets = super::load_secrets(ctx.secrets_path.as_deref())?;
    let http = HttpClient::new();

    let cache_base = match ctx.cache_base {
        Some(base) => base,
        None => Cache::default_base()?,
    };
    let cache = Cache::from_disk(cache_base, &ctx.log);

    let mut registries = RegistryManager::new(&ctx.extra_registries, &secrets, &ctx.log);
    registries.fetch_all_cached(&http, &cache, ctx.skip_cache, &ctx.log);

    Ok(registries
        .search(&ctx.query)
        .into_iter()
        .cloned()
        .collect())
}

//! `build`/`configure` (spec.md §6): drive the build driver over one or more
//! package directories, or the default deps directory when none are given.

use crate::build::{BuildDriver, BuildOptions};
use crate::util::errors::Res;
use slog::Logger;
use std::path::PathBuf;

pub struct BuildCtx {
    pub dirs: Vec<PathBuf>,
    pub options: BuildOptions,
    pub log: Logger,
}

pub fn build(ctx: BuildCtx) -> Res<()> {
    for dir in ctx.dirs {
        let driver = BuildDriver::new(dir, ctx.options.clone(), ctx.log.clone());
        driver.build_all()?;
    }
    Ok(())
}

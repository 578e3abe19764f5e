//! `clib`: a source-level package manager. Resolves declared dependencies —
//! each identified by a repository slug and a version — into a local
//! `deps/` tree of fetched source files, and drives recursive
//! configure/build operations over that tree.

pub mod build;
pub mod cache;
pub mod cli;
pub mod http;
pub mod package;
pub mod registry;
pub mod repository;
pub mod resolve;
pub mod secrets;
pub mod util;

use slog::{Drain, Logger};

/// The root logger every long-lived component is threaded from, an async
/// `slog-term` pipeline matching the rest of the pack's structured-logging
/// setup. `verbose` lowers the minimum level from `Info` to `Debug`.
pub fn root_logger(verbose: bool) -> Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    let level = if verbose {
        slog::Level::Debug
    } else {
        slog::Level::Info
    };
    let drain = slog::LevelFilter::new(drain, level).fuse();

    Logger::root(drain, slog::o!())
}

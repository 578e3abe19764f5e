//! The `clib` executable: a thin `clap` dispatcher over `clib::cli::*`
//! (spec.md §6). Argument parsing is deliberately shallow — the real work
//! lives in `Installer`/`BuildDriver`/`RegistryManager`.

use clap::{Parser, Subcommand};
use clib::build::BuildOptions;
use clib::cli::{build::BuildCtx, install::InstallCtx, search::SearchCtx};
use clib::resolve::Options as InstallOptions;
use clib::util::errors::Error;
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "clib", version, about = "A source-level package manager")]
struct Cli {
    /// Use verbose (debug-level) logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to a secrets file (spec.md §4.5); defaults to no secrets.
    #[arg(long, global = true)]
    secrets: Option<PathBuf>,

    /// Overrides the cache root; defaults to the platform cache dir.
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Install one or more packages, or the root manifest's dependencies.
    Install {
        slugs: Vec<String>,
        #[arg(long)]
        dev: bool,
        #[arg(long)]
        force: bool,
        #[arg(long)]
        skip_cache: bool,
        #[arg(long)]
        prefix: Option<String>,
        #[arg(long, default_value = ".")]
        dir: PathBuf,
        #[arg(long)]
        deps_dir: Option<PathBuf>,
    },
    /// Like `install`, with skip-cache forced and force-overwrite set.
    Update {
        slugs: Vec<String>,
        #[arg(long)]
        prefix: Option<String>,
        #[arg(long, default_value = ".")]
        dir: PathBuf,
        #[arg(long)]
        deps_dir: Option<PathBuf>,
    },
    /// Reinstall `clib` itself from a fixed slug.
    Upgrade { tag: Option<String> },
    /// Drive the build driver over one or more package directories.
    #[command(alias = "configure")]
    Build {
        dirs: Vec<PathBuf>,
        #[arg(long)]
        clean: bool,
        #[arg(long)]
        force: bool,
        #[arg(long)]
        prefix: Option<String>,
        #[arg(long)]
        cflag: Vec<String>,
    },
    /// List matching packages across configured registries.
    Search {
        query: Vec<String>,
        #[arg(long)]
        registry: Vec<String>,
        #[arg(long)]
        skip_cache: bool,
    },
    /// Out of scope for the core; reported so the subcommand exists.
    Init,
    /// Out of scope for the core; reported so the subcommand exists.
    Uninstall { _slug: Vec<String> },
}

fn main() {
    let cli = Cli::parse();
    let log = clib::root_logger(cli.verbose);

    let result = match cli.command {
        Command::Install {
            slugs,
            dev,
            force,
            skip_cache,
            prefix,
            dir,
            deps_dir,
        } => clib::cli::install::install(InstallCtx {
            project_dir: dir.clone(),
            deps_dir: deps_dir.unwrap_or_else(|| clib::cli::default_deps_dir(&dir)),
            secrets_path: cli.secrets,
            cache_base: cli.cache_dir,
            slugs,
            options: InstallOptions {
                dev_mode: dev,
                force,
                skip_cache,
                prefix,
            },
            log,
        }),

        Command::Update {
            slugs,
            prefix,
            dir,
            deps_dir,
        } => clib::cli::install::update(InstallCtx {
            project_dir: dir.clone(),
            deps_dir: deps_dir.unwrap_or_else(|| clib::cli::default_deps_dir(&dir)),
            secrets_path: cli.secrets,
            cache_base: cli.cache_dir,
            slugs,
            options: InstallOptions {
                prefix,
                ..InstallOptions::default()
            },
            log,
        }),

        Command::Upgrade { .. } => {
            eprintln!("clib: upgrade is not implemented by this build");
            process::exit(1);
        }

        Command::Build {
            dirs,
            clean,
            force,
            prefix,
            cflag,
        } => {
            let dirs = if dirs.is_empty() {
                vec![PathBuf::from(".")]
            } else {
                dirs
            };
            clib::cli::build::build(BuildCtx {
                dirs,
                options: BuildOptions {
                    clean,
                    force,
                    prefix,
                    cflags: cflag,
                },
                log,
            })
        }

        Command::Search {
            query,
            registry,
            skip_cache,
        } => clib::cli::search::search(SearchCtx {
            query: query.join(" "),
            extra_registries: registry,
            secrets_path: cli.secrets,
            cache_base: cli.cache_dir,
            skip_cache,
            log,
        })
        .map(|records| {
            for r in records {
                println!("{} ({}) - {}", r.id, r.category, r.description);
            }
        }),

        Command::Init => {
            eprintln!("clib: init is out of scope for this core");
            process::exit(1);
        }

        Command::Uninstall { .. } => {
            eprintln!("clib: uninstall is out of scope for this core");
            process::exit(1);
        }
    };

    if let Err(e) = result {
        report(&e);
        process::exit(1);
    }
}

fn report(e: &Error) {
    eprintln!("clib: error: {}", e);
    let mut cause = failure::Fail::cause(e);
    while let Some(c) = cause {
        eprintln!("  caused by: {}", c);
        cause = c.cause();
    }
}

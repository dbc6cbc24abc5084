//! Kiln CLI: resolve, fetch, load and diagnose engine native libraries.

mod commands;
mod settings;

use std::path::PathBuf;
use std::process;

use anyhow::Context;
use clap::{Parser, Subcommand};

use settings::Settings;

#[derive(Parser)]
#[command(name = "kiln", version, about = "Native library manager for Kiln engines")]
struct Cli {
    /// Settings file (default: nearest kiln.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log at debug level
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the version, flavor and cache directory that would be used
    Resolve {
        /// Engine name (pytorch, onnxruntime, mxnet)
        #[arg(long)]
        engine: Option<String>,
    },
    /// Download or copy the engine libraries into the cache
    Fetch {
        #[arg(long)]
        engine: Option<String>,
        /// Artifact repository URL or local directory
        #[arg(long)]
        mirror: Option<String>,
    },
    /// Load the engine libraries into this process
    Load {
        #[arg(long)]
        engine: Option<String>,
    },
    /// Print overrides, GPU and cache status
    Doctor {
        #[arg(long)]
        engine: Option<String>,
    },
    /// Manage the library cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// List cache entries
    List {
        #[arg(long)]
        engine: Option<String>,
    },
    /// Remove cache entries
    Clean {
        #[arg(long)]
        engine: Option<String>,
        /// Entry to remove, e.g. 2.1.1-cpu-linux-x86_64 (all if omitted)
        key: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => {
            let cwd = std::env::current_dir()?;
            Settings::find_and_load(&cwd)?.unwrap_or_default()
        }
    };
    if let Some(path) = &settings.path {
        log::debug!("using settings from {}", path.display());
    }

    match cli.command {
        Commands::Resolve { engine } => {
            commands::resolve::run(&settings.engine_config(engine.as_deref())?)
        }
        Commands::Fetch { engine, mirror } => {
            let mut config = settings.engine_config(engine.as_deref())?;
            if let Some(mirror) = mirror {
                config = config.with_source(kiln_native::fetch::open_mirror(&mirror)?);
            }
            commands::fetch::run(&config)
        }
        Commands::Load { engine } => commands::load::run(&settings.engine_config(engine.as_deref())?),
        Commands::Doctor { engine } => {
            commands::doctor::run(&settings, &settings.engine_config(engine.as_deref())?)
        }
        Commands::Cache { action } => match action {
            CacheAction::List { engine } => {
                let config = settings.engine_config(engine.as_deref())?;
                let cache = config.cache().context("locating cache")?;
                let spec = engine.is_some().then(|| *config.spec());
                commands::cache::list(&cache, spec.as_ref())
            }
            CacheAction::Clean { engine, key } => {
                let config = settings.engine_config(engine.as_deref())?;
                let cache = config.cache().context("locating cache")?;
                commands::cache::clean(&cache, config.spec(), key.as_deref())
            }
        },
    }
}

//! testwalk worker binary
//!
//! Runs the assigned test manifests, prints progress marks, and hands the
//! result payload to the collecting process as one JSON line on stdout.
//!
//! ## Usage
//!
//! ```bash
//! # Run two manifests from ./specs
//! testwalk run --dir specs array.yaml string.yaml
//!
//! # Report only matching tests, stop on first failure
//! testwalk run --grep push --bail array.yaml
//!
//! # Worker mode: exit right after the hand-off
//! testwalk run --id 2 --multi-process --hide-progress a.yaml b.yaml
//!
//! # Show the effective configuration
//! testwalk config --json
//! ```

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::Path;
use tracing::{debug, info};

use testwalk::cli::{self, Args, ConfigArgs, RunArgs};
use testwalk::config::env::{env_help, EnvConfig};
use testwalk::output::StdoutCollector;
use testwalk::utils::logger::{init_logger, LogLevel};
use testwalk::{Engine, ManifestLoader, RunConfig};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    let env = EnvConfig::load();

    let level = args
        .log_level
        .as_deref()
        .or(env.log.as_deref())
        .and_then(LogLevel::from_str)
        .unwrap_or(LogLevel::Warn);
    init_logger(level);

    match args.command {
        cli::Command::Run(run_args) => {
            run_worker(run_args, &env).await?;
        }
        cli::Command::Config(config_args) => {
            show_config(config_args, &env)?;
        }
    }

    Ok(())
}

/// Defaults < config file < environment < flags
fn effective_config(path: Option<&Path>, env: &EnvConfig) -> Result<RunConfig> {
    let mut config = match path {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::load_default()?,
    };
    env.apply(&mut config);
    Ok(config)
}

async fn run_worker(args: RunArgs, env: &EnvConfig) -> Result<()> {
    let mut config = effective_config(args.config.as_deref(), env)?;
    args.apply(&mut config);
    if config.files.is_empty() {
        bail!("No test files given");
    }

    let mut options = config.compile().context("Invalid run options")?;
    if options.reserve_stdout() {
        debug!("Progress moved to stderr, stdout carries the result hand-off");
    }
    let engine = Engine::new(options, ManifestLoader::new()).context("Failed to start engine")?;
    let published = engine.run(&mut StdoutCollector).await;

    if published.exit {
        info!("Worker {} done, exiting", published.payload.id);
        std::process::exit(0);
    }

    let payload = &published.payload;
    if !payload.output.is_empty() {
        eprintln!("{}", payload.output);
    }
    if payload.has_failures() {
        bail!("{} of {} test(s) failed", payload.failed, payload.total());
    }
    Ok(())
}

fn show_config(args: ConfigArgs, env: &EnvConfig) -> Result<()> {
    if args.env_help {
        println!("Environment Variables:\n");
        print!("{}", env_help());
        return Ok(());
    }

    let config = effective_config(args.config.as_deref(), env)?;
    let rendered = if args.json {
        serde_json::to_string_pretty(&config).context("Failed to serialize config")?
    } else {
        serde_yaml::to_string(&config).context("Failed to serialize config")?
    };
    println!("{rendered}");
    Ok(())
}

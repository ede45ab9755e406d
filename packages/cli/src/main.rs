mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use commands::{import, init, inspect, merge, ImportArgs, InitArgs, InspectArgs, MergeArgs};
use sleuth_sync::SyncConfig;
use std::path::{Path, PathBuf};

/// Sleuth CLI - shared investigation documents from the command line
#[derive(Parser, Debug)]
#[command(name = "sleuth")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (defaults to sleuth.config.json in the current directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a default sleuth.config.json
    Init(InitArgs),

    /// Encode a JSON investigation snapshot into a shared document
    Import(ImportArgs),

    /// Decode a shared document and print what it holds
    Inspect(InspectArgs),

    /// Merge two peer states into one document
    Merge(MergeArgs),
}

fn load_config(explicit: Option<&Path>, cwd: &Path) -> anyhow::Result<SyncConfig> {
    let config = match explicit {
        Some(path) => SyncConfig::load_file(path)?,
        None => SyncConfig::load(cwd)?,
    };
    Ok(config)
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = std::env::current_dir()
        .map_err(anyhow::Error::from)
        .and_then(|cwd| {
            match cli.command {
                Command::Init(args) => init(args, &cwd),
                Command::Import(args) => import(args, load_config(cli.config.as_deref(), &cwd)?),
                Command::Inspect(args) => inspect(args),
                Command::Merge(args) => merge(args),
            }
        });

    if let Err(err) = result {
        eprintln!();
        eprintln!("{} {}", "Error:".red().bold(), err);
        eprintln!();
        std::process::exit(1);
    }
}

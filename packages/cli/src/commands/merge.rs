use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use sleuth_sync::SyncContext;
use std::fs;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct MergeArgs {
    /// First peer state
    pub left: PathBuf,

    /// Second peer state
    pub right: PathBuf,

    /// Output file for the merged document
    #[arg(short, long)]
    pub output: PathBuf,
}

pub fn merge(args: MergeArgs) -> Result<()> {
    let left = fs::read(&args.left).with_context(|| format!("Cannot read {}", args.left.display()))?;
    let right = fs::read(&args.right).with_context(|| format!("Cannot read {}", args.right.display()))?;

    let merged = merge_states(&left, &right)?;
    fs::write(&args.output, &merged)?;

    println!(
        "🔀 {} {} + {} → {}",
        "Merged".green().bold(),
        args.left.display(),
        args.right.display(),
        args.output.display()
    );
    Ok(())
}

pub fn merge_states(left: &[u8], right: &[u8]) -> Result<Vec<u8>> {
    let ctx = SyncContext::from_state("", None, left)?;
    ctx.apply_remote_update(right)?;
    Ok(ctx.encode_state())
}

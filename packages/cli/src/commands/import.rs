use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use sleuth_model::InvestigationSnapshot;
use sleuth_sync::{InvestigationStore, Repositories, SyncConfig, TracingNotifier};
use std::fs;
use std::path::PathBuf;
use tracing::info;

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Investigation snapshot (JSON with elements, links and tabs)
    pub input: PathBuf,

    /// Output file for the encoded document
    #[arg(short, long)]
    pub output: PathBuf,
}

pub fn import(args: ImportArgs, config: SyncConfig) -> Result<()> {
    println!("📥 {} investigation", "Importing".green().bold());
    println!("   Input:  {}", args.input.display());
    println!("   Output: {}", args.output.display());
    println!();

    let content = fs::read_to_string(&args.input)
        .with_context(|| format!("Cannot read {}", args.input.display()))?;
    let snapshot: InvestigationSnapshot =
        serde_json::from_str(&content).with_context(|| format!("Invalid snapshot {}", args.input.display()))?;

    let store = open_snapshot(snapshot, config)?;
    let ctx = store.context();
    let state = ctx.encode_state();
    fs::write(&args.output, &state)?;

    info!(bytes = state.len(), "Wrote shared document");
    println!("   {} {} elements", "✓".green(), ctx.elements().len());
    println!("   {} {} links", "✓".green(), ctx.links().len());
    println!("   {} {} tabs", "✓".green(), ctx.tabs().len());
    println!();
    println!("✨ {} {} bytes written", "Done".green().bold(), state.len());

    Ok(())
}

/// Seed a store from a snapshot. Records of other investigations are
/// ignored.
pub fn open_snapshot(snapshot: InvestigationSnapshot, config: SyncConfig) -> Result<InvestigationStore> {
    let mut repos = Repositories::in_memory();
    repos.elements.bulk_upsert(snapshot.elements)?;
    repos.links.bulk_upsert(snapshot.links)?;
    repos.tabs.bulk_upsert(snapshot.tabs)?;
    let store = InvestigationStore::open(&snapshot.investigation_id, repos, Box::new(TracingNotifier), config)?;
    Ok(store)
}

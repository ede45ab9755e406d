use anyhow::{anyhow, Context, Result};
use clap::Args;
use colored::Colorize;
use sleuth_model::InvestigationSnapshot;
use sleuth_sync::{compute_ghosts, SyncContext};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Encoded shared document
    pub input: PathBuf,

    /// Also list the ghosts of this tab
    #[arg(short, long)]
    pub tab: Option<String>,

    /// Print the decoded snapshot as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn inspect(args: InspectArgs) -> Result<()> {
    let snapshot = decode_file(&args.input)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    println!("🔍 {} {}", "Inspecting".green().bold(), args.input.display());
    println!();
    println!("Elements ({})", snapshot.elements.len());
    for element in &snapshot.elements {
        let marker = if element.is_group { "▣" } else { "•" };
        println!("  {} {} {}", marker, element.label.bright_white(), element.id.dimmed());
    }

    let dangling = snapshot.dangling_links();
    println!();
    println!("Links ({})", snapshot.links.len());
    if !dangling.is_empty() {
        println!("  {} {} dangling", "⚠️".yellow(), dangling.len());
        for link in dangling {
            println!("    {} {} → {}", link.id.dimmed(), link.from_id, link.to_id);
        }
    }

    println!();
    println!("Tabs ({})", snapshot.tabs.len());
    for tab in &snapshot.tabs {
        println!(
            "  {} {} members, {} excluded",
            tab.name.bright_white(),
            tab.member_element_ids.len(),
            tab.excluded_element_ids.len()
        );
    }

    if let Some(tab_id) = &args.tab {
        let ghosts = ghosts_of(&snapshot, tab_id)?;
        println!();
        println!("Ghosts of {} ({})", tab_id, ghosts.len());
        for id in ghosts {
            let label = snapshot.element(&id).map(|e| e.label.as_str()).unwrap_or_default();
            println!("  ◌ {} {}", label, id.dimmed());
        }
    }

    Ok(())
}

pub fn decode_file(path: &Path) -> Result<InvestigationSnapshot> {
    let bytes = fs::read(path).with_context(|| format!("Cannot read {}", path.display()))?;
    let ctx = SyncContext::from_state("", None, &bytes)?;
    let mut snapshot = ctx.snapshot();
    snapshot.investigation_id = snapshot
        .elements
        .first()
        .map(|e| e.investigation_id.clone())
        .or_else(|| snapshot.tabs.first().map(|t| t.investigation_id.clone()))
        .unwrap_or_default();
    Ok(snapshot)
}

pub fn ghosts_of(snapshot: &InvestigationSnapshot, tab_id: &str) -> Result<Vec<String>> {
    let tab = snapshot.tab(tab_id).ok_or_else(|| anyhow!("No tab with id {}", tab_id))?;
    let ghosts = compute_ghosts(tab, &snapshot.links, |id| snapshot.element(id).is_some());
    Ok(ghosts.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sleuth_model::{CanvasTab, Element, Link};

    fn snapshot() -> InvestigationSnapshot {
        let now = Utc::now();
        let mut tab = CanvasTab::new("t1", "inv", "Main", 0, now);
        tab.member_element_ids = vec!["a".into()];
        InvestigationSnapshot {
            investigation_id: "inv".into(),
            elements: vec![Element::new("a", "inv", "A", now), Element::new("b", "inv", "B", now)],
            links: vec![Link::new("l1", "inv", "a", "b", now), Link::new("l2", "inv", "a", "gone", now)],
            tabs: vec![tab],
        }
    }

    #[test]
    fn test_ghosts_skip_dangling_endpoints() {
        assert_eq!(ghosts_of(&snapshot(), "t1").unwrap(), vec!["b"]);
    }

    #[test]
    fn test_unknown_tab_is_an_error() {
        assert!(ghosts_of(&snapshot(), "nope").is_err());
    }
}

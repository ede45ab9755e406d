use anyhow::Result;
use clap::Args;
use colored::Colorize;
use sleuth_sync::{SyncConfig, DEFAULT_CONFIG_NAME};
use std::fs;
use std::path::Path;

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Quiet period before free-text edits are committed, in milliseconds
    #[arg(long, default_value_t = 500)]
    pub debounce_ms: u64,

    /// Force overwrite existing config
    #[arg(short, long)]
    pub force: bool,
}

pub fn init(args: InitArgs, cwd: &Path) -> Result<()> {
    let config_path = SyncConfig::config_path(cwd);

    if config_path.exists() && !args.force {
        println!(
            "{} {} already exists",
            "⚠️".yellow(),
            DEFAULT_CONFIG_NAME.bright_white()
        );
        println!("Use --force to overwrite");
        return Ok(());
    }

    let config = SyncConfig {
        debounce_ms: args.debounce_ms,
        ..Default::default()
    };
    fs::write(&config_path, serde_json::to_string_pretty(&config)?)?;

    println!("  {} Created {}", "✓".green(), DEFAULT_CONFIG_NAME);
    println!();
    println!("Next steps:");
    println!("  1. Run: sleuth import investigation.json -o investigation.bin");
    println!("  2. Run: sleuth inspect investigation.bin");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_writes_loadable_config() {
        let dir = TempDir::new().unwrap();
        init(
            InitArgs {
                debounce_ms: 250,
                force: false,
            },
            dir.path(),
        )
        .unwrap();

        let config = SyncConfig::load(dir.path()).unwrap();
        assert_eq!(config.debounce_ms, 250);
        assert_eq!(config.mirror_throttle_ms, 50);
    }

    #[test]
    fn test_init_keeps_existing_config_without_force() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(DEFAULT_CONFIG_NAME), r#"{"debounceMs": 900}"#).unwrap();
        init(
            InitArgs {
                debounce_ms: 100,
                force: false,
            },
            dir.path(),
        )
        .unwrap();

        assert_eq!(SyncConfig::load(dir.path()).unwrap().debounce_ms, 900);
    }
}

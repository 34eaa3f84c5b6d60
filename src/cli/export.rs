use std::path::Path;

use anyhow::{Context, Result};

use crate::config::BankConfig;

/// Export one branch as a JSON snapshot to `out`, or stdout.
pub fn export(config: &BankConfig, repository: &str, branch: Option<&str>, out: Option<&Path>) -> Result<()> {
    let bank = super::open_bank(config)?;
    let scope = super::scope(config, repository, branch)?;
    let snapshot = bank.export(&scope)?;

    let json = serde_json::to_string_pretty(&snapshot)?;
    match out {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("failed to write export file: {}", path.display()))?,
        None => println!("{json}"),
    }

    eprintln!(
        "Exported {} records from {scope} ({} components, {} decisions, {} rules).",
        snapshot.record_count(),
        snapshot.components.len(),
        snapshot.decisions.len(),
        snapshot.rules.len()
    );
    Ok(())
}

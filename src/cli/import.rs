use std::path::Path;

use anyhow::{Context, Result};

use crate::bank::transfer::BankSnapshot;
use crate::config::BankConfig;

/// Import a JSON snapshot into one branch.
///
/// Records are applied one at a time; failures are listed and do not stop the
/// rest of the import.
pub fn import(config: &BankConfig, file: &Path, repository: &str, branch: Option<&str>) -> Result<()> {
    let json = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read import file: {}", file.display()))?;
    let snapshot: BankSnapshot = serde_json::from_str(&json).context("failed to parse snapshot JSON")?;

    let bank = super::open_bank(config)?;
    let scope = super::scope(config, repository, branch)?;
    println!(
        "Importing {} records from {}:{} into {scope}...",
        snapshot.record_count(),
        snapshot.repository,
        snapshot.branch
    );

    let report = bank.import(&scope, &snapshot)?;
    for (kind, count) in &report.imported {
        println!("  {kind:<16} {count}");
    }
    if !report.failed.is_empty() {
        println!();
        println!("Failed ({}):", report.failed.len());
        for failure in &report.failed {
            println!("  {} {}: {}", failure.kind, failure.id, failure.error);
        }
    }
    println!();
    println!("Import complete: {} imported, {} failed.", report.total_imported, report.failed.len());
    Ok(())
}

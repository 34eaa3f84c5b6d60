//! Offline subcommands that work on the database directly, without a server.

pub mod doctor;
pub mod export;
pub mod import;
pub mod stats;

use anyhow::{Context, Result};

use crate::bank::types::BranchScope;
use crate::bank::MemoryService;
use crate::config::BankConfig;

/// Open the configured database.
fn open_bank(config: &BankConfig) -> Result<MemoryService> {
    let db_path = config.resolved_db_path();
    MemoryService::open(&db_path)
        .with_context(|| format!("failed to open memory bank at {}", db_path.display()))
}

fn scope(config: &BankConfig, repository: &str, branch: Option<&str>) -> Result<BranchScope> {
    let branch = branch.unwrap_or(&config.storage.default_branch);
    Ok(BranchScope::new(repository, branch)?)
}

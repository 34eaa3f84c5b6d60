use anyhow::Result;

use crate::config::BankConfig;

/// Display node and edge counts for one branch.
pub fn stats(config: &BankConfig, repository: &str, branch: Option<&str>) -> Result<()> {
    let bank = super::open_bank(config)?;
    let scope = super::scope(config, repository, branch)?;
    let response = bank.stats(&scope)?;

    println!("Memory Bank Statistics: {scope}");
    println!("{}", "=".repeat(40));
    println!(
        "  Initialized:         {}",
        if response.initialized { "yes" } else { "no" }
    );
    println!();

    println!("Nodes ({}):", response.total_nodes);
    for (label, count) in &response.nodes {
        println!("  {label:<12} {count}");
    }
    println!();

    println!("Edges ({}):", response.total_edges);
    for (label, count) in &response.edges {
        println!("  {label:<12} {count}");
    }
    println!();

    println!("Database size:         {} bytes", response.db_size_bytes);
    if let Some(ref latest) = response.latest_context {
        println!("Latest context:        {latest}");
    }
    Ok(())
}

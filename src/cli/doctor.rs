//! `doctor`: open the configured database and report on its health.

use std::path::Path;

use anyhow::{Context, Result};

use crate::config::BankConfig;
use crate::db::{self, migrations, HealthReport};

pub fn doctor(config: &BankConfig) -> Result<()> {
    let db_path = config.resolved_db_path();
    if !db_path.exists() {
        println!("no memory bank at {} (it is created on first `serve`)", db_path.display());
        return Ok(());
    }

    let size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);
    let conn = db::open_database(&db_path)
        .with_context(|| format!("cannot open {}; the file may be corrupt", db_path.display()))?;
    let report = db::check_database_health(&conn).context("health check failed")?;

    for (label, value) in summary(&db_path, size, &report) {
        println!("{label:<16} {value}");
    }

    let problems = problems(&report);
    if problems.is_empty() {
        println!("\nno problems found");
    } else {
        println!();
        for p in &problems {
            println!("problem: {p}");
        }
        println!(
            "\nto recover, export each branch from a good copy with `memory-bank export` \
             and load it into a fresh database with `memory-bank import`"
        );
    }
    Ok(())
}

fn summary(path: &Path, size: u64, report: &HealthReport) -> Vec<(&'static str, String)> {
    vec![
        ("database", path.display().to_string()),
        ("size", human_size(size)),
        ("schema", report.schema_version.to_string()),
        (
            "memory spec",
            report.spec_version.clone().unwrap_or_else(|| "unset".into()),
        ),
        ("nodes", report.node_count.to_string()),
        ("edges", report.edge_count.to_string()),
    ]
}

fn problems(report: &HealthReport) -> Vec<String> {
    let mut found = Vec::new();
    if !report.integrity_ok {
        found.push(format!("integrity check reported: {}", report.integrity_details));
    }
    if report.schema_version != migrations::CURRENT_SCHEMA_VERSION {
        found.push(format!(
            "schema version {} does not match this binary ({})",
            report.schema_version,
            migrations::CURRENT_SCHEMA_VERSION
        ));
    }
    found
}

fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 3] = ["KB", "MB", "GB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

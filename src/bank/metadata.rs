//! Metadata singleton repository.

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};

use super::now;
use super::types::{BranchScope, Metadata, MetadataContent, MetadataUpdate, ProjectInfo};
use crate::db::migrations::MEMORY_SPEC_VERSION;
use crate::error::Result;

pub const METADATA_ID: &str = "meta";

pub fn get(conn: &Connection, scope: &BranchScope) -> Result<Option<Metadata>> {
    let row: Option<(String, String, String, String, String)> = conn
        .query_row(
            "SELECT id, name, content, created_at, updated_at FROM metadata \
             WHERE repository = ?1 AND branch = ?2",
            params![scope.repository, scope.branch],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
        )
        .optional()?;

    let Some((id, name, content, created_at, updated_at)) = row else {
        return Ok(None);
    };
    let content: MetadataContent = serde_json::from_str(&content)?;
    Ok(Some(Metadata {
        id,
        name,
        content,
        created_at,
        updated_at,
    }))
}

/// Default metadata for a freshly initialized branch.
pub fn default_for(scope: &BranchScope, today: NaiveDate) -> Metadata {
    let ts = now();
    Metadata {
        id: METADATA_ID.to_string(),
        name: scope.repository.clone(),
        content: MetadataContent {
            project: ProjectInfo {
                name: scope.repository.clone(),
                created: today.to_string(),
            },
            tech_stack: Default::default(),
            architecture: "unknown".to_string(),
            memory_spec_version: MEMORY_SPEC_VERSION.to_string(),
        },
        created_at: ts.clone(),
        updated_at: ts,
    }
}

/// Insert or replace the singleton.
pub fn save(conn: &Connection, scope: &BranchScope, metadata: &Metadata) -> Result<()> {
    let content = serde_json::to_string(&metadata.content)?;
    conn.execute(
        "INSERT INTO metadata (repository, branch, id, name, content, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
         ON CONFLICT(repository, branch) DO UPDATE SET \
             name = excluded.name, content = excluded.content, updated_at = excluded.updated_at",
        params![
            scope.repository,
            scope.branch,
            METADATA_ID,
            metadata.name,
            content,
            metadata.created_at,
            metadata.updated_at,
        ],
    )?;
    Ok(())
}

/// Apply a partial update in place.
pub fn merge(metadata: &mut Metadata, update: &MetadataUpdate) {
    if let Some(name) = &update.name {
        metadata.name = name.clone();
    }
    if let Some(project_name) = &update.project_name {
        metadata.content.project.name = project_name.clone();
    }
    for (key, value) in &update.tech_stack {
        metadata.content.tech_stack.insert(key.clone(), value.clone());
    }
    if let Some(architecture) = &update.architecture {
        metadata.content.architecture = architecture.clone();
    }
    metadata.updated_at = now();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> BranchScope {
        BranchScope::new("acme", "main").unwrap()
    }

    #[test]
    fn save_and_get_round_trip() {
        let conn = crate::db::open_in_memory().unwrap();
        let today = NaiveDate::from_ymd_opt(2026, 10, 15).unwrap();
        let meta = default_for(&scope(), today);
        save(&conn, &scope(), &meta).unwrap();

        let loaded = get(&conn, &scope()).unwrap().unwrap();
        assert_eq!(loaded.content.project.created, "2026-10-15");
        assert_eq!(loaded.content.memory_spec_version, MEMORY_SPEC_VERSION);
        assert!(get(&conn, &BranchScope::new("acme", "dev").unwrap())
            .unwrap()
            .is_none());
    }

    #[test]
    fn merge_keeps_unset_fields() {
        let today = NaiveDate::from_ymd_opt(2026, 1, 2).unwrap();
        let mut meta = default_for(&scope(), today);
        let mut update = MetadataUpdate {
            architecture: Some("hexagonal".into()),
            ..Default::default()
        };
        update.tech_stack.insert("language".into(), "rust".into());
        merge(&mut meta, &update);

        assert_eq!(meta.name, "acme");
        assert_eq!(meta.content.architecture, "hexagonal");
        assert_eq!(meta.content.tech_stack["language"], "rust");
    }
}

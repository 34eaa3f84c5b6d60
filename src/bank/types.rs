//! Core record and input types for the memory bank.
//!
//! Records ([`Component`], [`Decision`], ...) are what reads return and what
//! exports contain. Inputs ([`ComponentInput`], ...) are the strongly typed
//! shapes writes accept; they are validated before reaching storage.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{BankError, FieldError, Result};

/// The `(repository, branch)` namespace every node and edge lives in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BranchScope {
    pub repository: String,
    pub branch: String,
}

impl BranchScope {
    pub fn new(repository: impl Into<String>, branch: impl Into<String>) -> Result<Self> {
        let repository = repository.into().trim().to_string();
        let branch = branch.into().trim().to_string();
        let mut fields = Vec::new();
        if repository.is_empty() {
            fields.push(FieldError::new("repository", "must not be empty"));
        }
        if branch.is_empty() {
            fields.push(FieldError::new("branch", "must not be empty"));
        }
        if !fields.is_empty() {
            return Err(BankError::Validation(fields));
        }
        Ok(Self { repository, branch })
    }
}

impl std::fmt::Display for BranchScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.repository, self.branch)
    }
}

/// Entity kinds that can be addressed, tagged, listed, and deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Component,
    Decision,
    Rule,
    Context,
    Tag,
    File,
}

impl EntityKind {
    pub const ALL: [EntityKind; 6] = [
        Self::Component,
        Self::Decision,
        Self::Rule,
        Self::Context,
        Self::Tag,
        Self::File,
    ];

    /// SQL-compatible string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Component => "component",
            Self::Decision => "decision",
            Self::Rule => "rule",
            Self::Context => "context",
            Self::Tag => "tag",
            Self::File => "file",
        }
    }

    /// Node label as exposed by introspection and projections.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Component => "Component",
            Self::Decision => "Decision",
            Self::Rule => "Rule",
            Self::Context => "Context",
            Self::Tag => "Tag",
            Self::File => "File",
        }
    }

    /// Backing node table.
    pub fn table(&self) -> &'static str {
        match self {
            Self::Component => "components",
            Self::Decision => "decisions",
            Self::Rule => "rules",
            Self::Context => "contexts",
            Self::Tag => "tags",
            Self::File => "files",
        }
    }

    /// Column holding a human-readable name for projections.
    pub(crate) fn display_column(&self) -> &'static str {
        match self {
            Self::Context => "iso_date",
            _ => "name",
        }
    }

    /// Resolve a node label (`Component`) or kind (`component`).
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.label() == label || k.as_str() == label)
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_label(s).ok_or_else(|| format!("unknown entity kind: {s}"))
    }
}

/// A reference to one entity inside a branch.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemRef {
    pub kind: EntityKind,
    pub id: String,
}

impl ItemRef {
    pub fn new(kind: EntityKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ComponentStatus {
    #[default]
    Active,
    Deprecated,
    Planned,
}

impl ComponentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Deprecated => "deprecated",
            Self::Planned => "planned",
        }
    }
}

impl std::str::FromStr for ComponentStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "deprecated" => Ok(Self::Deprecated),
            "planned" => Ok(Self::Planned),
            _ => Err(format!("unknown component status: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RuleStatus {
    #[default]
    Active,
    Deprecated,
}

impl RuleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Deprecated => "deprecated",
        }
    }
}

impl std::str::FromStr for RuleStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "deprecated" => Ok(Self::Deprecated),
            _ => Err(format!("unknown rule status: {s}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub name: String,
    /// Creation date, `YYYY-MM-DD`.
    pub created: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataContent {
    pub project: ProjectInfo,
    #[serde(default)]
    pub tech_stack: BTreeMap<String, String>,
    #[serde(default)]
    pub architecture: String,
    pub memory_spec_version: String,
}

/// Branch singleton describing the project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub id: String,
    pub name: String,
    pub content: MetadataContent,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

/// One day of activity on a branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Context {
    pub id: String,
    pub iso_date: String,
    pub agent: Option<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub decisions: Vec<String>,
    #[serde(default)]
    pub observations: Vec<String>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub id: String,
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub status: ComponentStatus,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub id: String,
    pub name: String,
    pub context: Option<String>,
    pub date: String,
    #[serde(default)]
    pub governs: Vec<String>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub name: String,
    pub created: String,
    #[serde(default)]
    pub triggers: Vec<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub status: RuleStatus,
    #[serde(default)]
    pub governs: Vec<String>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: String,
    pub name: String,
    pub color: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct File {
    pub id: String,
    pub name: String,
    pub path: String,
    pub language: Option<String>,
    /// Components this file belongs to.
    #[serde(default)]
    pub components: Vec<String>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

// ---------------------------------------------------------------------------
// Write inputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ComponentInput {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub status: ComponentStatus,
    pub depends_on: Vec<String>,
}

impl ComponentInput {
    pub fn validate(&self) -> Result<()> {
        let mut fields = Vec::new();
        require(&mut fields, "id", &self.id);
        require(&mut fields, "name", &self.name);
        require(&mut fields, "kind", &self.kind);
        if self.depends_on.iter().any(|d| d == &self.id) {
            fields.push(FieldError::new("depends_on", "a component cannot depend on itself"));
        }
        finish(fields)
    }
}

impl From<&Component> for ComponentInput {
    fn from(c: &Component) -> Self {
        Self {
            id: c.id.clone(),
            name: c.name.clone(),
            kind: c.kind.clone(),
            status: c.status,
            depends_on: c.depends_on.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecisionInput {
    pub id: String,
    pub name: String,
    pub context: Option<String>,
    pub date: String,
    pub governs: Vec<String>,
}

impl DecisionInput {
    pub fn validate(&self) -> Result<()> {
        let mut fields = Vec::new();
        require(&mut fields, "id", &self.id);
        require(&mut fields, "name", &self.name);
        check_date(&mut fields, "date", &self.date);
        finish(fields)
    }
}

impl From<&Decision> for DecisionInput {
    fn from(d: &Decision) -> Self {
        Self {
            id: d.id.clone(),
            name: d.name.clone(),
            context: d.context.clone(),
            date: d.date.clone(),
            governs: d.governs.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuleInput {
    pub id: String,
    pub name: String,
    pub created: String,
    pub triggers: Vec<String>,
    pub content: String,
    pub status: RuleStatus,
    pub governs: Vec<String>,
}

impl RuleInput {
    pub fn validate(&self) -> Result<()> {
        let mut fields = Vec::new();
        require(&mut fields, "id", &self.id);
        require(&mut fields, "name", &self.name);
        check_date(&mut fields, "created", &self.created);
        finish(fields)
    }
}

impl From<&Rule> for RuleInput {
    fn from(r: &Rule) -> Self {
        Self {
            id: r.id.clone(),
            name: r.name.clone(),
            created: r.created.clone(),
            triggers: r.triggers.clone(),
            content: r.content.clone(),
            status: r.status,
            governs: r.governs.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TagInput {
    pub id: String,
    pub name: String,
    pub color: Option<String>,
    pub description: Option<String>,
}

impl TagInput {
    pub fn validate(&self) -> Result<()> {
        let mut fields = Vec::new();
        require(&mut fields, "id", &self.id);
        require(&mut fields, "name", &self.name);
        finish(fields)
    }
}

impl From<&Tag> for TagInput {
    fn from(t: &Tag) -> Self {
        Self {
            id: t.id.clone(),
            name: t.name.clone(),
            color: t.color.clone(),
            description: t.description.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileInput {
    pub id: String,
    pub name: String,
    pub path: String,
    pub language: Option<String>,
}

impl FileInput {
    pub fn validate(&self) -> Result<()> {
        let mut fields = Vec::new();
        require(&mut fields, "id", &self.id);
        require(&mut fields, "name", &self.name);
        require(&mut fields, "path", &self.path);
        finish(fields)
    }
}

impl From<&File> for FileInput {
    fn from(f: &File) -> Self {
        Self {
            id: f.id.clone(),
            name: f.name.clone(),
            path: f.path.clone(),
            language: f.language.clone(),
        }
    }
}

/// Partial metadata update; `None` leaves the field untouched and
/// `tech_stack` entries are merged key by key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataUpdate {
    pub name: Option<String>,
    pub project_name: Option<String>,
    pub tech_stack: BTreeMap<String, String>,
    pub architecture: Option<String>,
}

/// Partial context update. `summary` and `agent` overwrite; `decisions` and
/// `observations` append.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextUpdate {
    pub agent: Option<String>,
    pub summary: Option<String>,
    pub decisions: Vec<String>,
    pub observations: Vec<String>,
}

pub(crate) fn check_date(fields: &mut Vec<FieldError>, field: &str, value: &str) {
    if NaiveDate::parse_from_str(value, "%Y-%m-%d").is_err() {
        fields.push(FieldError::new(field, "must be a date in YYYY-MM-DD format"));
    }
}

fn require(fields: &mut Vec<FieldError>, field: &str, value: &str) {
    if value.trim().is_empty() {
        fields.push(FieldError::new(field, "must not be empty"));
    }
}

fn finish(fields: Vec<FieldError>) -> Result<()> {
    if fields.is_empty() {
        Ok(())
    } else {
        Err(BankError::Validation(fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_rejects_empty_parts() {
        let err = BranchScope::new(" ", "").unwrap_err();
        match err {
            BankError::Validation(fields) => assert_eq!(fields.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn entity_kind_parses_labels_and_kinds() {
        assert_eq!("Component".parse::<EntityKind>().unwrap(), EntityKind::Component);
        assert_eq!("rule".parse::<EntityKind>().unwrap(), EntityKind::Rule);
        assert!("Widget".parse::<EntityKind>().is_err());
    }

    #[test]
    fn decision_requires_iso_date() {
        let input = DecisionInput {
            id: "dec-1".into(),
            name: "Use SQLite".into(),
            context: None,
            date: "15/10/2026".into(),
            governs: vec![],
        };
        let err = input.validate().unwrap_err();
        assert!(err.to_string().contains("date"));
    }

    #[test]
    fn component_cannot_depend_on_itself() {
        let input = ComponentInput {
            id: "comp-a".into(),
            name: "A".into(),
            kind: "service".into(),
            status: ComponentStatus::Active,
            depends_on: vec!["comp-a".into()],
        };
        assert!(matches!(input.validate(), Err(BankError::Validation(_))));
    }
}

//! Entity write and read tools: components, decisions, rules, tags, files.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::registry::{HandlerFuture, ToolCall};
use crate::bank::types::{
    ComponentInput, ComponentStatus, DecisionInput, EntityKind, FileInput, ItemRef, RuleInput,
    RuleStatus, TagInput,
};

const DEFAULT_LIST_LIMIT: u32 = 50;

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct AddComponentParams {
    #[schemars(description = "Repository name")]
    pub repository: String,

    #[schemars(description = "Branch name (defaults to the configured default branch)")]
    pub branch: Option<String>,

    #[schemars(description = "Component id, unique within the branch (e.g. 'comp-auth')")]
    pub id: String,

    #[schemars(description = "Human-readable component name")]
    pub name: String,

    #[schemars(description = "Component kind, e.g. 'service', 'library', 'ui'")]
    pub kind: String,

    #[schemars(description = "Lifecycle status (default: active)")]
    pub status: Option<ComponentStatus>,

    #[schemars(description = "Ids of components this one depends on; replaces the existing set")]
    pub depends_on: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct AddDecisionParams {
    #[schemars(description = "Repository name")]
    pub repository: String,

    #[schemars(description = "Branch name (defaults to the configured default branch)")]
    pub branch: Option<String>,

    #[schemars(description = "Decision id, unique within the branch (e.g. 'dec-20261015-sqlite')")]
    pub id: String,

    #[schemars(description = "Short title of the decision")]
    pub name: String,

    #[schemars(description = "Decision date in YYYY-MM-DD format")]
    pub date: String,

    #[schemars(description = "Background and rationale")]
    pub context: Option<String>,

    #[schemars(description = "Ids of components this decision governs; replaces the existing set")]
    pub governs: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct AddRuleParams {
    #[schemars(description = "Repository name")]
    pub repository: String,

    #[schemars(description = "Branch name (defaults to the configured default branch)")]
    pub branch: Option<String>,

    #[schemars(description = "Rule id, unique within the branch")]
    pub id: String,

    #[schemars(description = "Short title of the rule")]
    pub name: String,

    #[schemars(description = "Date the rule was created, YYYY-MM-DD")]
    pub created: String,

    #[schemars(description = "Situations that trigger the rule")]
    pub triggers: Option<Vec<String>>,

    #[schemars(description = "Full text of the rule")]
    pub content: Option<String>,

    #[schemars(description = "Rule status (default: active)")]
    pub status: Option<RuleStatus>,

    #[schemars(description = "Ids of components this rule governs; replaces the existing set")]
    pub governs: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct AddTagParams {
    #[schemars(description = "Repository name")]
    pub repository: String,

    #[schemars(description = "Branch name (defaults to the configured default branch)")]
    pub branch: Option<String>,

    #[schemars(description = "Tag id, unique within the branch")]
    pub id: String,

    #[schemars(description = "Display name of the tag")]
    pub name: String,

    #[schemars(description = "Display color, e.g. '#ff0000'")]
    pub color: Option<String>,

    #[schemars(description = "What the tag means")]
    pub description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct TagItemParams {
    #[schemars(description = "Repository name")]
    pub repository: String,

    #[schemars(description = "Branch name (defaults to the configured default branch)")]
    pub branch: Option<String>,

    #[schemars(description = "Id of the item to tag")]
    pub item_id: String,

    #[schemars(description = "Kind of the item to tag")]
    pub item_type: EntityKind,

    #[schemars(description = "Id of an existing tag")]
    pub tag_id: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct TagIdParams {
    #[schemars(description = "Repository name")]
    pub repository: String,

    #[schemars(description = "Branch name (defaults to the configured default branch)")]
    pub branch: Option<String>,

    #[schemars(description = "Tag id")]
    pub tag_id: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct AddFileParams {
    #[schemars(description = "Repository name")]
    pub repository: String,

    #[schemars(description = "Branch name (defaults to the configured default branch)")]
    pub branch: Option<String>,

    #[schemars(description = "File id, unique within the branch")]
    pub id: String,

    #[schemars(description = "File name")]
    pub name: String,

    #[schemars(description = "Path relative to the repository root")]
    pub path: String,

    #[schemars(description = "Programming language")]
    pub language: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct AssociateFileParams {
    #[schemars(description = "Repository name")]
    pub repository: String,

    #[schemars(description = "Branch name (defaults to the configured default branch)")]
    pub branch: Option<String>,

    #[schemars(description = "Id of an existing file")]
    pub file_id: String,

    #[schemars(description = "Id of an existing component")]
    pub component_id: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ComponentFilesParams {
    #[schemars(description = "Repository name")]
    pub repository: String,

    #[schemars(description = "Branch name (defaults to the configured default branch)")]
    pub branch: Option<String>,

    #[schemars(description = "Component id")]
    pub component_id: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct GetEntityParams {
    #[schemars(description = "Repository name")]
    pub repository: String,

    #[schemars(description = "Branch name (defaults to the configured default branch)")]
    pub branch: Option<String>,

    #[schemars(description = "Kind of entity to fetch")]
    pub entity_type: EntityKind,

    #[schemars(description = "Entity id")]
    pub id: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ListEntitiesParams {
    #[schemars(description = "Repository name")]
    pub repository: String,

    #[schemars(description = "Branch name (defaults to the configured default branch)")]
    pub branch: Option<String>,

    #[schemars(description = "Kind of entity to list")]
    pub entity_type: EntityKind,

    #[schemars(description = "Maximum number of results (default: 50)")]
    pub limit: Option<u32>,

    #[schemars(description = "Number of results to skip (default: 0)")]
    pub offset: Option<u32>,
}

pub fn add_component(call: ToolCall) -> HandlerFuture {
    Box::pin(async move {
        let params: AddComponentParams = call.params()?;
        let scope = call.scope(&params.repository, params.branch.as_deref())?;
        tracing::info!(repository = %scope.repository, branch = %scope.branch, id = %params.id, "add_component called");

        let input = ComponentInput {
            id: params.id,
            name: params.name,
            kind: params.kind,
            status: params.status.unwrap_or_default(),
            depends_on: params.depends_on.unwrap_or_default(),
        };
        let component = call.run(move |bank| bank.upsert_component(&scope, &input)).await?;
        Ok(serde_json::to_value(component)?)
    })
}

pub fn add_decision(call: ToolCall) -> HandlerFuture {
    Box::pin(async move {
        let params: AddDecisionParams = call.params()?;
        let scope = call.scope(&params.repository, params.branch.as_deref())?;
        tracing::info!(repository = %scope.repository, branch = %scope.branch, id = %params.id, "add_decision called");

        let input = DecisionInput {
            id: params.id,
            name: params.name,
            context: params.context,
            date: params.date,
            governs: params.governs.unwrap_or_default(),
        };
        let decision = call.run(move |bank| bank.upsert_decision(&scope, &input)).await?;
        Ok(serde_json::to_value(decision)?)
    })
}

pub fn add_rule(call: ToolCall) -> HandlerFuture {
    Box::pin(async move {
        let params: AddRuleParams = call.params()?;
        let scope = call.scope(&params.repository, params.branch.as_deref())?;
        tracing::info!(repository = %scope.repository, branch = %scope.branch, id = %params.id, "add_rule called");

        let input = RuleInput {
            id: params.id,
            name: params.name,
            created: params.created,
            triggers: params.triggers.unwrap_or_default(),
            content: params.content.unwrap_or_default(),
            status: params.status.unwrap_or_default(),
            governs: params.governs.unwrap_or_default(),
        };
        let rule = call.run(move |bank| bank.upsert_rule(&scope, &input)).await?;
        Ok(serde_json::to_value(rule)?)
    })
}

pub fn add_tag(call: ToolCall) -> HandlerFuture {
    Box::pin(async move {
        let params: AddTagParams = call.params()?;
        let scope = call.scope(&params.repository, params.branch.as_deref())?;
        tracing::info!(repository = %scope.repository, branch = %scope.branch, id = %params.id, "add_tag called");

        let input = TagInput {
            id: params.id,
            name: params.name,
            color: params.color,
            description: params.description,
        };
        let tag = call.run(move |bank| bank.upsert_tag(&scope, &input)).await?;
        Ok(serde_json::to_value(tag)?)
    })
}

pub fn tag_item(call: ToolCall) -> HandlerFuture {
    Box::pin(async move {
        let params: TagItemParams = call.params()?;
        let scope = call.scope(&params.repository, params.branch.as_deref())?;
        tracing::info!(
            repository = %scope.repository,
            branch = %scope.branch,
            item = %params.item_id,
            tag = %params.tag_id,
            "tag_item called"
        );

        let item = ItemRef::new(params.item_type, params.item_id);
        let tag_id = params.tag_id;
        let outcome = call.run(move |bank| bank.tag_item(&scope, &item, &tag_id)).await?;
        Ok(serde_json::to_value(outcome)?)
    })
}

pub fn find_items_by_tag(call: ToolCall) -> HandlerFuture {
    Box::pin(async move {
        let params: TagIdParams = call.params()?;
        let scope = call.scope(&params.repository, params.branch.as_deref())?;
        tracing::info!(repository = %scope.repository, branch = %scope.branch, tag = %params.tag_id, "find_items_by_tag called");

        let tag_id = params.tag_id;
        let lookup = tag_id.clone();
        let items = call.run(move |bank| bank.items_by_tag(&scope, &lookup)).await?;
        Ok(json!({ "tagId": tag_id, "count": items.len(), "items": items }))
    })
}

pub fn add_file(call: ToolCall) -> HandlerFuture {
    Box::pin(async move {
        let params: AddFileParams = call.params()?;
        let scope = call.scope(&params.repository, params.branch.as_deref())?;
        tracing::info!(repository = %scope.repository, branch = %scope.branch, id = %params.id, "add_file called");

        let input = FileInput {
            id: params.id,
            name: params.name,
            path: params.path,
            language: params.language,
        };
        let file = call.run(move |bank| bank.upsert_file(&scope, &input)).await?;
        Ok(serde_json::to_value(file)?)
    })
}

pub fn associate_file_with_component(call: ToolCall) -> HandlerFuture {
    Box::pin(async move {
        let params: AssociateFileParams = call.params()?;
        let scope = call.scope(&params.repository, params.branch.as_deref())?;
        tracing::info!(
            repository = %scope.repository,
            branch = %scope.branch,
            file = %params.file_id,
            component = %params.component_id,
            "associate_file_with_component called"
        );

        let (file_id, component_id) = (params.file_id, params.component_id);
        let file = call
            .run(move |bank| bank.associate_file(&scope, &file_id, &component_id))
            .await?;
        Ok(serde_json::to_value(file)?)
    })
}

pub fn get_component_files(call: ToolCall) -> HandlerFuture {
    Box::pin(async move {
        let params: ComponentFilesParams = call.params()?;
        let scope = call.scope(&params.repository, params.branch.as_deref())?;
        tracing::info!(repository = %scope.repository, branch = %scope.branch, component = %params.component_id, "get_component_files called");

        let component_id = params.component_id;
        let lookup = component_id.clone();
        let files = call.run(move |bank| bank.files_for_component(&scope, &lookup)).await?;
        Ok(json!({ "componentId": component_id, "count": files.len(), "files": files }))
    })
}

pub fn get_entity(call: ToolCall) -> HandlerFuture {
    Box::pin(async move {
        let params: GetEntityParams = call.params()?;
        let scope = call.scope(&params.repository, params.branch.as_deref())?;
        tracing::info!(
            repository = %scope.repository,
            branch = %scope.branch,
            kind = %params.entity_type,
            id = %params.id,
            "get_entity called"
        );

        let (kind, id) = (params.entity_type, params.id);
        call.run(move |bank| bank.get_entity(&scope, kind, &id)).await
    })
}

pub fn list_entities(call: ToolCall) -> HandlerFuture {
    Box::pin(async move {
        let params: ListEntitiesParams = call.params()?;
        let scope = call.scope(&params.repository, params.branch.as_deref())?;
        let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT) as usize;
        let offset = params.offset.unwrap_or(0) as usize;
        tracing::info!(
            repository = %scope.repository,
            branch = %scope.branch,
            kind = %params.entity_type,
            limit,
            offset,
            "list_entities called"
        );

        let kind = params.entity_type;
        let items = call
            .run(move |bank| bank.list_entities(&scope, kind, limit, offset))
            .await?;
        Ok(json!({
            "entityType": kind,
            "limit": limit,
            "offset": offset,
            "count": items.len(),
            "items": items,
        }))
    })
}

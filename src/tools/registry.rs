//! Static tool registry: name -> description, input schema, and handler.
//!
//! Input schemas are generated from each tool's params struct with
//! `schemars`. Arguments are checked against the declared schema before the
//! handler runs so every offending field is reported at once.

use std::collections::BTreeMap;

use futures::future::BoxFuture;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};

use super::progress::ProgressEmitter;
use crate::bank::types::BranchScope;
use crate::bank::MemoryService;
use crate::error::{BankError, FieldError, Result};

pub type HandlerFuture = BoxFuture<'static, Result<Value>>;
pub type ToolHandler = fn(ToolCall) -> HandlerFuture;

/// Everything a handler gets for one invocation.
pub struct ToolCall {
    pub bank: MemoryService,
    pub arguments: Value,
    pub progress: ProgressEmitter,
    pub default_branch: String,
}

impl ToolCall {
    /// Deserialize the arguments into the tool's params struct. A rejection
    /// names the offending argument when a single one is to blame.
    pub fn params<P: DeserializeOwned>(&self) -> Result<P> {
        let args = match &self.arguments {
            Value::Null => Value::Object(Map::new()),
            other => other.clone(),
        };
        serde_json::from_value(args.clone()).map_err(|e| {
            let field = args
                .as_object()
                .and_then(offending_field::<P>)
                .unwrap_or_else(|| "arguments".to_string());
            BankError::validation(field, e.to_string())
        })
    }

    /// Resolve the branch scope, falling back to the configured default branch.
    pub fn scope(&self, repository: &str, branch: Option<&str>) -> Result<BranchScope> {
        BranchScope::new(repository, branch.unwrap_or(&self.default_branch))
    }

    /// Run blocking bank work off the async runtime.
    pub async fn run<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(MemoryService) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let bank = self.bank.clone();
        tokio::task::spawn_blocking(move || f(bank))
            .await
            .map_err(|e| BankError::Internal(format!("db task failed: {e}")))?
    }
}

/// The one argument whose removal lets `P` deserialize, or leaves only its own
/// absence to complain about.
fn offending_field<P: DeserializeOwned>(args: &Map<String, Value>) -> Option<String> {
    args.keys()
        .find(|key| {
            let mut rest = args.clone();
            rest.remove(key.as_str());
            match serde_json::from_value::<P>(Value::Object(rest)) {
                Ok(_) => true,
                Err(e) => e.to_string().starts_with(&format!("missing field `{key}`")),
            }
        })
        .cloned()
}

pub struct ToolDef {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
    pub handler: ToolHandler,
}

impl ToolDef {
    /// Check `arguments` against the input schema's top-level properties.
    pub fn validate(&self, arguments: &Value) -> Result<()> {
        let empty = Map::new();
        let args = match arguments {
            Value::Object(map) => map,
            Value::Null => &empty,
            _ => return Err(BankError::validation("arguments", "must be an object")),
        };

        let mut fields = Vec::new();
        if let Some(required) = self.input_schema.get("required").and_then(Value::as_array) {
            for name in required.iter().filter_map(Value::as_str) {
                if absent(args.get(name)) {
                    fields.push(FieldError::new(name, "is required"));
                }
            }
        }
        if let Some(props) = self.input_schema.get("properties").and_then(Value::as_object) {
            for (name, value) in args {
                let Some(schema) = props.get(name) else { continue };
                if let Err(message) = check(&self.input_schema, schema, value) {
                    fields.push(FieldError::new(name.clone(), message));
                }
            }
        }

        if fields.is_empty() {
            Ok(())
        } else {
            Err(BankError::Validation(fields))
        }
    }

    /// The `tools/list` entry for this tool.
    pub fn listing(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": self.input_schema,
        })
    }
}

fn absent(value: Option<&Value>) -> bool {
    matches!(value, None | Some(Value::Null))
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn resolve<'a>(root: &'a Value, schema: &'a Value) -> &'a Value {
    let Some(reference) = schema.get("$ref").and_then(Value::as_str) else {
        return schema;
    };
    reference
        .strip_prefix("#/")
        .map(|path| path.split('/').fold(Some(root), |node, key| node?.get(key)))
        .and_then(|found| found)
        .unwrap_or(schema)
}

/// Whether an integer fits the width named by a schemars `format`.
fn fits_format(format: &str, value: &Value) -> bool {
    let Some(n) = value
        .as_i64()
        .map(i128::from)
        .or_else(|| value.as_u64().map(i128::from))
    else {
        return true;
    };
    let (min, max): (i128, i128) = match format {
        "int8" => (i8::MIN.into(), i8::MAX.into()),
        "int16" => (i16::MIN.into(), i16::MAX.into()),
        "int32" => (i32::MIN.into(), i32::MAX.into()),
        "int64" | "int" => (i64::MIN.into(), i64::MAX.into()),
        "uint8" => (0, u8::MAX.into()),
        "uint16" => (0, u16::MAX.into()),
        "uint32" => (0, u32::MAX.into()),
        "uint64" | "uint" => (0, u64::MAX.into()),
        _ => return true,
    };
    (min..=max).contains(&n)
}

/// `minimum`/`maximum` (inclusive and exclusive) and integer width.
fn check_bounds(schema: &Value, value: &Value) -> std::result::Result<(), String> {
    let Some(n) = value.as_f64() else {
        return Ok(());
    };
    let bound = |key: &str| schema.get(key).and_then(Value::as_f64);
    if let Some(min) = bound("minimum") {
        if n < min {
            return Err(format!("must be at least {min}"));
        }
    }
    if let Some(max) = bound("maximum") {
        if n > max {
            return Err(format!("must be at most {max}"));
        }
    }
    if let Some(min) = bound("exclusiveMinimum") {
        if n <= min {
            return Err(format!("must be greater than {min}"));
        }
    }
    if let Some(max) = bound("exclusiveMaximum") {
        if n >= max {
            return Err(format!("must be less than {max}"));
        }
    }
    if let Some(format) = schema.get("format").and_then(Value::as_str) {
        if !fits_format(format, value) {
            return Err(format!("is out of range for {format}"));
        }
    }
    Ok(())
}

/// Structural check of one value: `type`, `enum`, `anyOf`/`oneOf`, `$ref`,
/// numeric bounds, and array `items`.
fn check(root: &Value, schema: &Value, value: &Value) -> std::result::Result<(), String> {
    let schema = resolve(root, schema);

    for key in ["anyOf", "oneOf"] {
        if let Some(options) = schema.get(key).and_then(Value::as_array) {
            return if options.iter().any(|s| check(root, s, value).is_ok()) {
                Ok(())
            } else {
                Err("does not match any allowed shape".into())
            };
        }
    }

    match schema.get("type") {
        Some(Value::String(t)) if !type_matches(t, value) => {
            return Err(format!("must be of type {t}"));
        }
        Some(Value::Array(types)) => {
            let ok = types
                .iter()
                .filter_map(Value::as_str)
                .any(|t| type_matches(t, value));
            if !ok {
                let names: Vec<&str> = types.iter().filter_map(Value::as_str).collect();
                return Err(format!("must be of type {}", names.join(" or ")));
            }
        }
        _ => {}
    }

    if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            let names: Vec<String> = allowed.iter().map(Value::to_string).collect();
            return Err(format!("must be one of {}", names.join(", ")));
        }
    }

    check_bounds(schema, value)?;

    if let (Some(items), Value::Array(elements)) = (schema.get("items"), value) {
        for (i, element) in elements.iter().enumerate() {
            check(root, items, element).map_err(|e| format!("item {i} {e}"))?;
        }
    }
    Ok(())
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<&'static str, ToolDef>,
}

impl ToolRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Every built-in memory bank tool.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        super::register_builtin(&mut registry);
        tracing::debug!(tools = registry.len(), "tool registry built");
        registry
    }

    pub fn register<P: JsonSchema>(
        &mut self,
        name: &'static str,
        description: &'static str,
        handler: ToolHandler,
    ) {
        let input_schema = schemars::schema_for!(P).to_value();
        self.tools.insert(
            name,
            ToolDef {
                name,
                description,
                input_schema,
                handler,
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&ToolDef> {
        self.tools.get(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolDef> {
        self.tools.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemars::JsonSchema;
    use serde::Deserialize;

    #[derive(Deserialize, JsonSchema)]
    #[allow(dead_code)]
    struct Sample {
        repository: String,
        depth: Option<i64>,
        kind: Option<crate::bank::types::EntityKind>,
        ids: Option<Vec<String>>,
        limit: Option<u32>,
        level: Option<u8>,
    }

    fn noop(_call: ToolCall) -> HandlerFuture {
        Box::pin(async { Ok(Value::Null) })
    }

    fn sample() -> ToolRegistry {
        let mut registry = ToolRegistry::empty();
        registry.register::<Sample>("sample", "test tool", noop);
        registry
    }

    #[test]
    fn missing_required_field_is_reported() {
        let registry = sample();
        let err = registry.get("sample").unwrap().validate(&json!({})).unwrap_err();
        match err {
            BankError::Validation(fields) => assert_eq!(fields[0].field, "repository"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn wrong_types_are_all_reported() {
        let registry = sample();
        let err = registry
            .get("sample")
            .unwrap()
            .validate(&json!({"repository": 3, "depth": "deep", "ids": ["a", 1]}))
            .unwrap_err();
        match err {
            BankError::Validation(fields) => assert_eq!(fields.len(), 3),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn enum_values_are_checked() {
        let registry = sample();
        let tool = registry.get("sample").unwrap();
        assert!(tool.validate(&json!({"repository": "r", "kind": "component"})).is_ok());
        assert!(tool.validate(&json!({"repository": "r", "kind": "widget"})).is_err());
        assert!(tool.validate(&json!({"repository": "r", "depth": null})).is_ok());
    }

    #[test]
    fn numeric_bounds_are_checked() {
        let registry = sample();
        let tool = registry.get("sample").unwrap();
        assert!(tool.validate(&json!({"repository": "r", "limit": 5, "level": 255})).is_ok());

        let err = tool
            .validate(&json!({"repository": "r", "limit": -1, "level": 300}))
            .unwrap_err();
        let BankError::Validation(fields) = err else {
            panic!("expected validation error");
        };
        let mut names: Vec<&str> = fields.iter().map(|f| f.field.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["level", "limit"]);
    }

    #[test]
    fn rejected_arguments_name_the_field() {
        let args = json!({"repository": "r", "limit": -1});
        let args = args.as_object().unwrap();
        assert_eq!(offending_field::<Sample>(args).as_deref(), Some("limit"));

        let missing = json!({"depth": 2});
        assert_eq!(
            offending_field::<Sample>(missing.as_object().unwrap()),
            None
        );
    }
}

//! Error taxonomy shared by the bank, the tool layer, and the transports.
//!
//! Every variant maps to a stable [`BankError::kind`] string so callers can tell
//! "your request was bad" apart from "your session is gone" without parsing
//! messages.

use serde::Serialize;
use serde_json::{json, Value};

/// A single offending argument reported by a validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BankError {
    /// Malformed or missing arguments, caught before any domain logic runs.
    #[error("invalid arguments: {}", describe_fields(.0))]
    Validation(Vec<FieldError>),

    /// The addressed entity does not exist in the caller's branch.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// A write referenced another entity that does not exist.
    #[error("invalid reference: {kind} {id} does not exist")]
    InvalidReference { kind: &'static str, id: String },

    #[error("tool not implemented: {0}")]
    ToolNotFound(String),

    #[error("no valid session")]
    NoValidSession,

    /// The storage engine failed. The source is logged, never shown to callers.
    #[error("{operation} failed")]
    Engine {
        operation: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    /// The connection carrying an invocation went away.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T, E = BankError> = std::result::Result<T, E>;

impl BankError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(vec![FieldError::new(field, message)])
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn invalid_reference(kind: &'static str, id: impl Into<String>) -> Self {
        Self::InvalidReference {
            kind,
            id: id.into(),
        }
    }

    /// Wrap an engine error with the name of the operation that issued it.
    pub fn engine(operation: &'static str, source: rusqlite::Error) -> Self {
        tracing::error!(operation, error = %source, "graph engine error");
        Self::Engine { operation, source }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound { .. } => "not_found",
            Self::InvalidReference { .. } => "invalid_reference",
            Self::ToolNotFound(_) => "tool_not_implemented",
            Self::NoValidSession => "no_valid_session",
            Self::Engine { .. } => "operation_failed",
            Self::Transport(_) => "transport_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// The `{error, kind, fields?}` body placed inside a tool result.
    pub fn to_payload(&self) -> Value {
        let mut payload = json!({
            "error": self.to_string(),
            "kind": self.kind(),
        });
        if let Self::Validation(fields) = self {
            payload["fields"] = json!(fields);
        }
        payload
    }
}

impl From<rusqlite::Error> for BankError {
    fn from(source: rusqlite::Error) -> Self {
        Self::engine("operation", source)
    }
}

impl From<serde_json::Error> for BankError {
    fn from(e: serde_json::Error) -> Self {
        Self::Internal(format!("serialization failed: {e}"))
    }
}

fn describe_fields(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(|f| format!("{} ({})", f.field, f.message))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_payload_lists_fields() {
        let err = BankError::Validation(vec![
            FieldError::new("repository", "required"),
            FieldError::new("depth", "must be a positive integer"),
        ]);
        let payload = err.to_payload();
        assert_eq!(payload["kind"], "validation_error");
        assert_eq!(payload["fields"].as_array().unwrap().len(), 2);
        assert!(payload["error"].as_str().unwrap().contains("depth"));
    }

    #[test]
    fn engine_error_hides_internals() {
        let err = BankError::engine("traversal", rusqlite::Error::InvalidQuery);
        assert_eq!(err.to_string(), "traversal failed");
        assert_eq!(err.kind(), "operation_failed");
    }

    #[test]
    fn not_found_names_the_id() {
        let err = BankError::not_found("component", "comp-x");
        assert_eq!(err.to_string(), "component not found: comp-x");
        assert!(err.to_payload().get("fields").is_none());
    }
}

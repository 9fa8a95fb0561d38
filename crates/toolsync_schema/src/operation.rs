//! Normalized operation definitions.

use crate::schema::SchemaNode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Errors raised while normalizing a raw operation listing
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OperationError {
    /// Listing entry is not a JSON object
    #[error("operation entry at index {index} is not an object")]
    NotAnObject {
        /// Position in the listing
        index: usize,
    },

    /// Listing entry has no usable name
    #[error("operation entry at index {index} has no name")]
    MissingName {
        /// Position in the listing
        index: usize,
    },
}

/// One callable operation exposed by a service.
///
/// Absent description and schemas are kept as explicit `null`s when
/// serialized so persisted snapshots never have ambiguous missing keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationDefinition {
    /// Operation name as reported by the service
    pub name: String,
    /// Human-readable description
    pub description: Option<String>,
    /// Structural input schema (`null` when the service declared none)
    pub input_schema: Value,
    /// Structural output schema
    pub output_schema: Option<Value>,
}

impl OperationDefinition {
    /// Create an operation with an input schema and nothing else
    #[must_use]
    pub fn new(name: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: None,
            input_schema,
            output_schema: None,
        }
    }

    /// Set description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set output schema
    #[must_use]
    pub fn with_output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    /// Normalize one entry of a raw `tools/list` response
    ///
    /// # Errors
    ///
    /// Returns error if the entry is not an object or lacks a non-empty name
    pub fn from_raw(index: usize, raw: &Value) -> Result<Self, OperationError> {
        let map = raw.as_object().ok_or(OperationError::NotAnObject { index })?;
        let name = map
            .get("name")
            .and_then(Value::as_str)
            .filter(|name| !name.trim().is_empty())
            .ok_or(OperationError::MissingName { index })?;

        let description = map
            .get("description")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string);

        let input_schema = map.get("inputSchema").cloned().unwrap_or(Value::Null);
        let output_schema = map
            .get("outputSchema")
            .filter(|schema| !schema.is_null())
            .cloned();

        Ok(Self {
            name: name.to_string(),
            description,
            input_schema,
            output_schema,
        })
    }

    /// Normalize a full raw listing, preserving order
    ///
    /// # Errors
    ///
    /// Returns the first entry that fails to normalize
    pub fn from_raw_list(raw: &[Value]) -> Result<Vec<Self>, OperationError> {
        raw.iter()
            .enumerate()
            .map(|(index, entry)| Self::from_raw(index, entry))
            .collect()
    }

    /// Typed view of the input schema
    #[must_use]
    pub fn input_node(&self) -> SchemaNode {
        SchemaNode::parse(&self.input_schema)
    }

    /// Typed view of the output schema, if declared
    #[must_use]
    pub fn output_node(&self) -> Option<SchemaNode> {
        self.output_schema.as_ref().map(SchemaNode::parse)
    }
}

//! Typed view over JSON-Schema-like input and output descriptions.
//!
//! Remote services describe operation parameters with loosely structured JSON
//! Schema fragments. [`SchemaNode::parse`] turns such a fragment into an
//! exhaustive tagged tree. Anything that cannot be resolved (`$ref`, malformed
//! fragments, unsupported keywords) becomes [`SchemaNode::Unknown`] instead of
//! failing the whole conversion.

use serde_json::{Map, Value};

/// Maximum nesting depth before a fragment is treated as unknown
const MAX_DEPTH: usize = 64;

/// A node in the typed schema tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaNode {
    /// `"type": "string"`
    String,
    /// `"type": "number"`
    Number,
    /// `"type": "integer"`
    Integer,
    /// `"type": "boolean"`
    Boolean,
    /// `"type": "null"`
    Null,
    /// Homogeneous array
    Array {
        /// Element type
        items: Box<SchemaNode>,
    },
    /// Record with named properties
    Object {
        /// Declared properties, sorted by name
        properties: Vec<Property>,
        /// Type of undeclared keys, if any are allowed
        additional: Option<Box<SchemaNode>>,
    },
    /// Closed set of literal values (`enum` / `const`)
    Enum {
        /// Allowed literal values
        values: Vec<Value>,
    },
    /// One of several alternatives (`anyOf` / `oneOf` / `type: [..]`)
    Union {
        /// Alternatives in declaration order
        variants: Vec<SchemaNode>,
    },
    /// Unresolvable or malformed fragment
    Unknown,
}

/// A named property of an object schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    /// Property name as it appears on the wire
    pub name: String,
    /// Property type
    pub schema: SchemaNode,
    /// Whether the property is listed in `required`
    pub required: bool,
    /// Property description, if any
    pub description: Option<String>,
}

impl SchemaNode {
    /// Parse a JSON Schema fragment
    #[must_use]
    pub fn parse(value: &Value) -> Self {
        Self::parse_at(value, 0)
    }

    /// Whether this node is an object with declared properties or an index signature
    #[must_use]
    pub fn is_object(&self) -> bool {
        matches!(self, Self::Object { .. })
    }

    /// Whether the node is unknown
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    fn parse_at(value: &Value, depth: usize) -> Self {
        if depth > MAX_DEPTH {
            return Self::Unknown;
        }
        let Some(map) = value.as_object() else {
            return Self::Unknown;
        };

        if map.contains_key("$ref") {
            return Self::Unknown;
        }
        if let Some(constant) = map.get("const") {
            return Self::Enum {
                values: vec![constant.clone()],
            };
        }
        if let Some(values) = map.get("enum") {
            return match values.as_array() {
                Some(values) if !values.is_empty() => Self::Enum {
                    values: values.clone(),
                },
                _ => Self::Unknown,
            };
        }
        for keyword in ["anyOf", "oneOf"] {
            if let Some(alternatives) = map.get(keyword) {
                return Self::parse_alternatives(alternatives, depth);
            }
        }
        if let Some(all) = map.get("allOf") {
            // Single-element allOf is a common wrapper; real intersections stay unknown.
            return match all.as_array().map(Vec::as_slice) {
                Some([only]) => Self::parse_at(only, depth + 1),
                _ => Self::Unknown,
            };
        }

        match map.get("type") {
            Some(Value::String(kind)) => Self::parse_typed(kind, map, depth),
            Some(Value::Array(kinds)) => {
                let variants: Vec<SchemaNode> = kinds
                    .iter()
                    .map(|kind| match kind.as_str() {
                        Some(kind) => Self::parse_typed(kind, map, depth),
                        None => Self::Unknown,
                    })
                    .collect();
                Self::union_of(variants)
            }
            Some(_) => Self::Unknown,
            None if map.contains_key("properties") => Self::parse_object(map, depth),
            None if map.contains_key("items") => Self::parse_array(map, depth),
            None => Self::Unknown,
        }
    }

    fn parse_typed(kind: &str, map: &Map<String, Value>, depth: usize) -> Self {
        match kind {
            "string" => Self::String,
            "number" => Self::Number,
            "integer" => Self::Integer,
            "boolean" => Self::Boolean,
            "null" => Self::Null,
            "array" => Self::parse_array(map, depth),
            "object" => Self::parse_object(map, depth),
            _ => Self::Unknown,
        }
    }

    fn parse_array(map: &Map<String, Value>, depth: usize) -> Self {
        let items = match map.get("items") {
            Some(items @ Value::Object(_)) => Self::parse_at(items, depth + 1),
            _ => Self::Unknown,
        };
        Self::Array {
            items: Box::new(items),
        }
    }

    fn parse_object(map: &Map<String, Value>, depth: usize) -> Self {
        let required: Vec<&str> = map
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let mut properties: Vec<Property> = map
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| {
                props
                    .iter()
                    .map(|(name, schema)| Property {
                        name: name.clone(),
                        schema: Self::parse_at(schema, depth + 1),
                        required: required.contains(&name.as_str()),
                        description: schema
                            .get("description")
                            .and_then(Value::as_str)
                            .map(str::trim)
                            .filter(|d| !d.is_empty())
                            .map(str::to_string),
                    })
                    .collect()
            })
            .unwrap_or_default();
        properties.sort_by(|a, b| a.name.cmp(&b.name));

        let additional = match map.get("additionalProperties") {
            Some(Value::Bool(false)) => None,
            Some(schema @ Value::Object(_)) => Some(Box::new(Self::parse_at(schema, depth + 1))),
            Some(_) => Some(Box::new(Self::Unknown)),
            // A bare `{"type": "object"}` is an open record.
            None if properties.is_empty() => Some(Box::new(Self::Unknown)),
            None => None,
        };

        Self::Object {
            properties,
            additional,
        }
    }

    fn parse_alternatives(alternatives: &Value, depth: usize) -> Self {
        match alternatives.as_array() {
            Some(items) if !items.is_empty() => Self::union_of(
                items
                    .iter()
                    .map(|item| Self::parse_at(item, depth + 1))
                    .collect(),
            ),
            _ => Self::Unknown,
        }
    }

    fn union_of(mut variants: Vec<SchemaNode>) -> Self {
        if variants.iter().any(Self::is_unknown) {
            return Self::Unknown;
        }
        match variants.len() {
            0 => Self::Unknown,
            1 => variants.remove(0),
            _ => Self::Union { variants },
        }
    }
}

//! Diff engine for comparing two introspection results.
//!
//! Removals and input schema changes are breaking: previously generated
//! calling code may no longer work against the new shape. Additions,
//! description edits and output schema changes are not.

use crate::operation::OperationDefinition;
use crate::snapshot::IntrospectionSnapshot;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use toolsync_core::Canonicalizer;

/// Field name reported when the input schema differs
pub const INPUT_SCHEMA_FIELD: &str = "inputSchema";
/// One classified change between two snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeRecord {
    /// Operation exists only in the new snapshot
    OperationAdded {
        /// Operation name
        name: String,
    },
    /// Operation exists only in the old snapshot
    OperationRemoved {
        /// Operation name
        name: String,
    },
    /// Description text differs
    DescriptionChanged {
        /// Operation name
        name: String,
    },
    /// Structural input schema differs
    SchemaChanged {
        /// Operation name
        name: String,
        /// Which schema fields changed
        #[serde(rename = "changedFields")]
        changed_fields: Vec<String>,
    },
    /// Output schema added, removed or structurally different
    OutputSchemaChanged {
        /// Operation name
        name: String,
    },
}

impl ChangeRecord {
    /// Whether this change can break previously generated code
    #[must_use]
    pub fn is_breaking(&self) -> bool {
        matches!(
            self,
            Self::OperationRemoved { .. } | Self::SchemaChanged { .. }
        )
    }

    /// Name of the affected operation
    #[must_use]
    pub fn operation(&self) -> &str {
        match self {
            Self::OperationAdded { name }
            | Self::OperationRemoved { name }
            | Self::DescriptionChanged { name }
            | Self::SchemaChanged { name, .. }
            | Self::OutputSchemaChanged { name } => name,
        }
    }

    /// One-line human description
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::OperationAdded { name } => format!("added `{}`", name),
            Self::OperationRemoved { name } => format!("removed `{}`", name),
            Self::DescriptionChanged { name } => format!("description of `{}` changed", name),
            Self::SchemaChanged {
                name,
                changed_fields,
            } => format!("`{}` changed {}", name, changed_fields.join(", ")),
            Self::OutputSchemaChanged { name } => format!("output schema of `{}` changed", name),
        }
    }
}

/// Classified change list plus a single verdict
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DiffResult {
    /// True iff at least one removal or input schema change is present
    pub breaking: bool,
    /// Changes in a stable order: per old operation first, then additions
    pub changes: Vec<ChangeRecord>,
}

impl DiffResult {
    fn from_changes(changes: Vec<ChangeRecord>) -> Self {
        Self {
            breaking: changes.iter().any(ChangeRecord::is_breaking),
            changes,
        }
    }

    /// Whether nothing changed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Only the breaking records
    #[must_use]
    pub fn breaking_changes(&self) -> Vec<&ChangeRecord> {
        self.changes.iter().filter(|c| c.is_breaking()).collect()
    }

    /// Count of records of each kind
    #[must_use]
    pub fn counts(&self) -> ChangeCounts {
        let mut counts = ChangeCounts::default();
        for change in &self.changes {
            match change {
                ChangeRecord::OperationAdded { .. } => counts.added += 1,
                ChangeRecord::OperationRemoved { .. } => counts.removed += 1,
                ChangeRecord::DescriptionChanged { .. } => counts.description += 1,
                ChangeRecord::SchemaChanged { .. } => counts.schema += 1,
                ChangeRecord::OutputSchemaChanged { .. } => counts.output += 1,
            }
        }
        counts
    }
}

/// Number of records of each kind in a [`DiffResult`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChangeCounts {
    /// Operations added
    pub added: usize,
    /// Operations removed
    pub removed: usize,
    /// Descriptions changed
    pub description: usize,
    /// Input schemas changed
    pub schema: usize,
    /// Output schemas changed
    pub output: usize,
}

/// Engine for diffing two snapshots
#[derive(Debug, Clone, Default)]
pub struct DiffEngine {
    canonicalizer: Canonicalizer,
}

impl DiffEngine {
    /// Create a new diff engine
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Diff two snapshots
    #[must_use]
    pub fn diff(&self, old: &IntrospectionSnapshot, new: &IntrospectionSnapshot) -> DiffResult {
        self.diff_operations(&old.operations, &new.operations)
    }

    /// Diff two operation lists
    #[must_use]
    pub fn diff_operations(
        &self,
        old: &[OperationDefinition],
        new: &[OperationDefinition],
    ) -> DiffResult {
        let old_index = Self::index(old);
        let new_index = Self::index(new);
        let mut changes = Vec::new();

        for (name, before) in &old_index {
            let Some(after) = new_index.get(name) else {
                changes.push(ChangeRecord::OperationRemoved {
                    name: (*name).to_string(),
                });
                continue;
            };

            if before.description != after.description {
                changes.push(ChangeRecord::DescriptionChanged {
                    name: (*name).to_string(),
                });
            }

            if !self
                .canonicalizer
                .equivalent(&before.input_schema, &after.input_schema)
            {
                changes.push(ChangeRecord::SchemaChanged {
                    name: (*name).to_string(),
                    changed_fields: vec![INPUT_SCHEMA_FIELD.to_string()],
                });
            }

            if self.output_changed(before, after) {
                changes.push(ChangeRecord::OutputSchemaChanged {
                    name: (*name).to_string(),
                });
            }
        }

        for name in new_index.keys() {
            if !old_index.contains_key(name) {
                changes.push(ChangeRecord::OperationAdded {
                    name: (*name).to_string(),
                });
            }
        }

        DiffResult::from_changes(changes)
    }

    fn output_changed(&self, before: &OperationDefinition, after: &OperationDefinition) -> bool {
        match (&before.output_schema, &after.output_schema) {
            (None, None) => false,
            (Some(a), Some(b)) => !self.canonicalizer.equivalent(a, b),
            _ => true,
        }
    }

    /// Index by name, keeping the first definition of a duplicated name
    fn index(operations: &[OperationDefinition]) -> IndexMap<&str, &OperationDefinition> {
        let mut index = IndexMap::with_capacity(operations.len());
        for op in operations {
            index.entry(op.name.as_str()).or_insert(op);
        }
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn op(name: &str) -> OperationDefinition {
        OperationDefinition::new(name, json!({"type": "object", "properties": {}}))
    }

    #[test]
    fn test_identical_lists_produce_empty_diff() {
        let engine = DiffEngine::new();
        let ops = vec![op("a"), op("b")];
        let result = engine.diff_operations(&ops, &ops);
        assert!(result.is_empty());
        assert!(!result.breaking);
    }

    #[test]
    fn test_example_scenario() {
        let engine = DiffEngine::new();
        let old = vec![op("getX"), op("listY")];
        let mut get_x = op("getX");
        get_x.input_schema = json!({
            "type": "object",
            "properties": {"id": {"type": "string"}},
            "required": ["id"]
        });
        let new = vec![get_x, op("listY"), op("createZ")];

        let result = engine.diff_operations(&old, &new);
        assert!(result.breaking);
        assert_eq!(
            result.changes,
            vec![
                ChangeRecord::SchemaChanged {
                    name: "getX".to_string(),
                    changed_fields: vec!["inputSchema".to_string()],
                },
                ChangeRecord::OperationAdded {
                    name: "createZ".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_description_change_is_not_breaking() {
        let engine = DiffEngine::new();
        let old = vec![op("a").with_description("old")];
        let new = vec![op("a").with_description("new")];
        let result = engine.diff_operations(&old, &new);
        assert!(!result.breaking);
        assert_eq!(
            result.changes,
            vec![ChangeRecord::DescriptionChanged {
                name: "a".to_string()
            }]
        );
    }

    #[test]
    fn test_key_reordering_is_not_a_schema_change() {
        let engine = DiffEngine::new();
        let a: serde_json::Value =
            serde_json::from_str(r#"{"type":"object","required":["x","y"]}"#).unwrap();
        let b: serde_json::Value =
            serde_json::from_str(r#"{"required":["y","x"],"type":"object"}"#).unwrap();
        let result = engine.diff_operations(
            &[OperationDefinition::new("a", a)],
            &[OperationDefinition::new("a", b)],
        );
        assert!(result.is_empty());
    }

    #[test]
    fn test_output_schema_change_is_not_breaking() {
        let engine = DiffEngine::new();
        let old = vec![op("a")];
        let new = vec![op("a").with_output_schema(json!({"type": "string"}))];
        let result = engine.diff_operations(&old, &new);
        assert!(!result.breaking);
        assert_eq!(
            result.changes,
            vec![ChangeRecord::OutputSchemaChanged {
                name: "a".to_string()
            }]
        );

        let changed = vec![op("a").with_output_schema(json!({"type": "number"}))];
        let result = engine.diff_operations(&new, &changed);
        assert!(!result.breaking);
        assert!(result.breaking_changes().is_empty());
        assert_eq!(result.counts().output, 1);
    }

    #[test]
    fn test_counts_and_breaking_changes() {
        let engine = DiffEngine::new();
        let result = engine.diff_operations(&[op("a"), op("b")], &[op("b"), op("c")]);
        let counts = result.counts();
        assert_eq!((counts.added, counts.removed, counts.schema), (1, 1, 0));
        assert_eq!(result.breaking_changes().len(), 1);
        assert_eq!(result.breaking_changes()[0].operation(), "a");
    }

    #[test]
    fn test_change_record_serde() {
        let record = ChangeRecord::SchemaChanged {
            name: "a".to_string(),
            changed_fields: vec!["inputSchema".to_string()],
        };
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({"type": "schema_changed", "name": "a", "changedFields": ["inputSchema"]})
        );
    }

    proptest! {
        #[test]
        fn prop_additions_never_break(
            base in prop::collection::btree_set("[a-z]{1,6}", 0..6),
            added in prop::collection::btree_set("[A-Z]{1,6}", 1..4)
        ) {
            let engine = DiffEngine::new();
            let old: Vec<_> = base.iter().map(|n| op(n)).collect();
            let mut new = old.clone();
            new.extend(added.iter().map(|n| op(n)));

            let result = engine.diff_operations(&old, &new);
            prop_assert!(!result.breaking);
            prop_assert_eq!(result.changes.len(), added.len());
            for change in &result.changes {
                let is_added = matches!(change, ChangeRecord::OperationAdded { .. });
                prop_assert!(is_added);
            }
        }

        #[test]
        fn prop_removal_always_breaks(
            base in prop::collection::btree_set("[a-z]{1,6}", 0..6),
            removed in "[A-Z]{1,6}"
        ) {
            let engine = DiffEngine::new();
            let new: Vec<_> = base.iter().map(|n| op(n)).collect();
            let mut old = new.clone();
            old.push(op(&removed));

            let result = engine.diff_operations(&old, &new);
            prop_assert!(result.breaking);
            prop_assert_eq!(
                result.changes,
                vec![ChangeRecord::OperationRemoved { name: removed }]
            );
        }
    }
}

//! Per-service source generation.

use crate::catalog::CatalogEntry;
use crate::ident::{IdentifierAllocator, pascal_case};
use crate::typescript::{doc_comment, is_optional_input, render_declaration};
use std::path::PathBuf;
use toolsync_core::ServiceSlug;
use toolsync_schema::{IntrospectionSnapshot, OperationDefinition, SchemaNode};

/// Module the wrappers import `callTool` from, relative to a service directory
pub const CLIENT_IMPORT: &str = "../client.js";
/// Per-service aggregation file
pub const SERVICE_INDEX_FILE: &str = "index.ts";

/// One generated file, relative to its service directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    /// Relative path
    pub path: PathBuf,
    /// File contents
    pub contents: String,
}

/// Everything generated for one service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceArtifacts {
    /// Output directory name
    pub slug: ServiceSlug,
    /// Operation files followed by the service index
    pub files: Vec<GeneratedFile>,
    /// Catalog entries in listing order
    pub catalog: Vec<CatalogEntry>,
}

fn header(service_name: &str) -> String {
    format!(
        "// Generated by toolsync from service \"{}\". Do not edit by hand.\n",
        service_name.replace(['\n', '\r'], " ")
    )
}

fn string_literal(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

/// Render the source of one operation module
#[must_use]
pub fn render_operation(service_name: &str, op: &OperationDefinition, ident: &str) -> String {
    let type_base = pascal_case(ident);
    let input_type = format!("{}Input", type_base);
    let output_type = format!("{}Output", type_base);

    // An absent or unusable input schema still accepts an arbitrary record.
    let input = match op.input_node() {
        SchemaNode::Unknown => SchemaNode::Object {
            properties: Vec::new(),
            additional: Some(Box::new(SchemaNode::Unknown)),
        },
        node => node,
    };
    let output = op.output_node();

    let mut out = header(service_name);
    out.push_str(&format!("import {{ callTool }} from \"{}\";\n\n", CLIENT_IMPORT));

    out.push_str(&doc_comment(&[format!("Input of `{}`.", op.name)], 0));
    out.push_str(&render_declaration(&input_type, &input));
    out.push('\n');

    let return_type = match &output {
        Some(node) => {
            out.push_str(&doc_comment(&[format!("Result of `{}`.", op.name)], 0));
            out.push_str(&render_declaration(&output_type, node));
            out.push('\n');
            output_type.clone()
        }
        None => "unknown".to_string(),
    };

    let mut doc = Vec::new();
    if let Some(description) = &op.description {
        doc.push(description.clone());
        doc.push(String::new());
    }
    doc.push(format!("@service {}", service_name));
    doc.push(format!("@operation {}", op.name));
    out.push_str(&doc_comment(&doc, 0));

    let param = if is_optional_input(&input) {
        format!("input: {} = {{}}", input_type)
    } else {
        format!("input: {}", input_type)
    };
    out.push_str(&format!(
        "export async function {}({}): Promise<{}> {{\n",
        ident, param, return_type
    ));
    let call = format!(
        "callTool({}, {}, input)",
        string_literal(service_name),
        string_literal(&op.name)
    );
    if output.is_some() {
        out.push_str(&format!("  return (await {}) as {};\n", call, return_type));
    } else {
        out.push_str(&format!("  return {};\n", call));
    }
    out.push_str("}\n");
    out
}

/// Render the per-service aggregation file
#[must_use]
pub fn render_service_index(service_name: &str, identifiers: &[String]) -> String {
    let mut out = header(service_name);
    out.push('\n');
    for ident in identifiers {
        out.push_str(&format!("export * from \"./{}.js\";\n", ident));
    }
    out
}

/// Generate every file for a snapshot.
///
/// Identifiers are allocated in listing order, so the same snapshot always
/// yields the same output.
#[must_use]
pub fn generate_service(snapshot: &IntrospectionSnapshot) -> ServiceArtifacts {
    let service_name = snapshot.service_name.as_str();
    let slug = ServiceSlug::from_name(service_name);
    let mut allocator = IdentifierAllocator::new();
    let mut files = Vec::with_capacity(snapshot.operations.len() + 1);
    let mut identifiers = Vec::with_capacity(snapshot.operations.len());
    let mut catalog = Vec::with_capacity(snapshot.operations.len());

    for op in &snapshot.operations {
        let ident = allocator.allocate(&op.name);
        files.push(GeneratedFile {
            path: PathBuf::from(format!("{}.ts", ident)),
            contents: render_operation(service_name, op, &ident),
        });
        catalog.push(CatalogEntry {
            service_slug: slug.clone(),
            operation_name: op.name.clone(),
            description: op.description.clone(),
        });
        identifiers.push(ident);
    }
    files.push(GeneratedFile {
        path: PathBuf::from(SERVICE_INDEX_FILE),
        contents: render_service_index(service_name, &identifiers),
    });

    tracing::debug!(
        service = %service_name,
        operations = identifiers.len(),
        "generated service sources"
    );
    ServiceArtifacts {
        slug,
        files,
        catalog,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use toolsync_schema::TransportDescriptor;

    fn snapshot(ops: Vec<OperationDefinition>) -> IntrospectionSnapshot {
        IntrospectionSnapshot::new("GitHub", TransportDescriptor::http("https://api.test"), ops)
    }

    #[test]
    fn test_colliding_names_each_exported_once() {
        let artifacts = generate_service(&snapshot(vec![
            OperationDefinition::new("get-user", json!({"type": "object"})),
            OperationDefinition::new("get_user", json!({"type": "object"})),
        ]));
        let paths: Vec<_> = artifacts.files.iter().map(|f| f.path.clone()).collect();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("getUser.ts"),
                PathBuf::from("getUser__2.ts"),
                PathBuf::from("index.ts")
            ]
        );

        let index = &artifacts.files[2].contents;
        assert_eq!(index.matches("export * from \"./getUser.js\";").count(), 1);
        assert_eq!(index.matches("export * from \"./getUser__2.js\";").count(), 1);
        assert!(artifacts.files[1].contents.contains("export async function getUser__2("));
        assert!(artifacts.files[1].contents.contains("callTool(\"GitHub\", \"get_user\", input)"));
    }

    #[test]
    fn test_operation_module() {
        let op = OperationDefinition::new(
            "get-issue",
            json!({
                "type": "object",
                "properties": {"number": {"type": "integer"}},
                "required": ["number"]
            }),
        )
        .with_description("Fetch one issue")
        .with_output_schema(json!({"type": "object", "properties": {"title": {"type": "string"}}}));

        let source = render_operation("github", &op, "getIssue");
        let expected = r#"// Generated by toolsync from service "github". Do not edit by hand.
import { callTool } from "../client.js";

/** Input of `get-issue`. */
export interface GetIssueInput {
  number: number;
}

/** Result of `get-issue`. */
export interface GetIssueOutput {
  title?: string;
}

/**
 * Fetch one issue
 *
 * @service github
 * @operation get-issue
 */
export async function getIssue(input: GetIssueInput): Promise<GetIssueOutput> {
  return (await callTool("github", "get-issue", input)) as GetIssueOutput;
}
"#;
        assert_eq!(source, expected);
    }

    #[test]
    fn test_missing_schema_becomes_open_optional_input() {
        let op = OperationDefinition::new("ping", serde_json::Value::Null);
        let source = render_operation("svc", &op, "ping");
        assert!(source.contains("export type PingInput = Record<string, unknown>;"));
        assert!(source.contains("ping(input: PingInput = {}): Promise<unknown>"));
        assert!(source.contains("  return callTool(\"svc\", \"ping\", input);"));
    }

    #[test]
    fn test_generation_is_deterministic() {
        let ops = vec![
            OperationDefinition::new("a", json!({"type": "object"})).with_description("A"),
            OperationDefinition::new("b", json!({"type": "string"})),
        ];
        let first = generate_service(&snapshot(ops.clone()));
        let second = generate_service(&snapshot(ops));
        assert_eq!(first, second);
        assert_eq!(first.slug.as_str(), "github");
        assert_eq!(first.catalog.len(), 2);
        assert_eq!(first.catalog[0].description.as_deref(), Some("A"));
    }
}

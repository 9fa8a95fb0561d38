//! Rendering the typed schema tree as TypeScript types.

use serde_json::Value;
use toolsync_schema::{Property, SchemaNode};

const INDENT: &str = "  ";

/// Render a JSDoc block at `depth`, or nothing for empty text
#[must_use]
pub fn doc_comment(lines: &[String], depth: usize) -> String {
    let pad = INDENT.repeat(depth);
    let body: Vec<String> = lines
        .iter()
        .flat_map(|line| {
            if line.is_empty() {
                vec![String::new()]
            } else {
                line.lines().map(|l| l.trim_end().to_string()).collect()
            }
        })
        .map(|line| line.replace("*/", "*\\/"))
        .collect();
    match body.as_slice() {
        [] => String::new(),
        [only] if !only.is_empty() => format!("{}/** {} */\n", pad, only),
        _ => {
            let mut out = format!("{}/**\n", pad);
            for line in &body {
                if line.is_empty() {
                    out.push_str(&format!("{} *\n", pad));
                } else {
                    out.push_str(&format!("{} * {}\n", pad, line));
                }
            }
            out.push_str(&format!("{} */\n", pad));
            out
        }
    }
}

/// Whether `name` can be used unquoted as a property key
fn is_plain_key(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        }
        _ => false,
    }
}

fn property_key(name: &str) -> String {
    if is_plain_key(name) {
        name.to_string()
    } else {
        Value::String(name.to_string()).to_string()
    }
}

fn literal(value: &Value) -> String {
    match value {
        Value::String(_) | Value::Number(_) | Value::Bool(_) | Value::Null => value.to_string(),
        Value::Array(_) | Value::Object(_) => "unknown".to_string(),
    }
}

fn join_union(parts: Vec<String>) -> String {
    let mut unique: Vec<String> = Vec::with_capacity(parts.len());
    for part in parts {
        if !unique.contains(&part) {
            unique.push(part);
        }
    }
    if unique.iter().any(|p| p == "unknown") {
        return "unknown".to_string();
    }
    unique.join(" | ")
}

/// Render `node` as a type expression. Nested object literals are indented
/// relative to `depth`.
#[must_use]
pub fn render_type(node: &SchemaNode, depth: usize) -> String {
    match node {
        SchemaNode::String => "string".to_string(),
        SchemaNode::Number | SchemaNode::Integer => "number".to_string(),
        SchemaNode::Boolean => "boolean".to_string(),
        SchemaNode::Null => "null".to_string(),
        SchemaNode::Unknown => "unknown".to_string(),
        SchemaNode::Array { items } => {
            let inner = render_type(items, depth);
            if inner.contains(' ') || inner.contains('\n') {
                format!("Array<{}>", inner)
            } else {
                format!("{}[]", inner)
            }
        }
        SchemaNode::Enum { values } => join_union(values.iter().map(literal).collect()),
        SchemaNode::Union { variants } => {
            join_union(variants.iter().map(|v| render_type(v, depth)).collect())
        }
        SchemaNode::Object {
            properties,
            additional,
        } => {
            if properties.is_empty() {
                return match additional {
                    Some(value) => format!("Record<string, {}>", render_type(value, depth)),
                    None => "Record<string, never>".to_string(),
                };
            }
            let mut out = "{\n".to_string();
            out.push_str(&render_members(properties, additional.is_some(), depth + 1));
            out.push_str(&INDENT.repeat(depth));
            out.push('}');
            out
        }
    }
}

fn render_members(properties: &[Property], open: bool, depth: usize) -> String {
    let pad = INDENT.repeat(depth);
    let mut out = String::new();
    for property in properties {
        if let Some(description) = &property.description {
            out.push_str(&doc_comment(std::slice::from_ref(description), depth));
        }
        out.push_str(&format!(
            "{}{}{}: {};\n",
            pad,
            property_key(&property.name),
            if property.required { "" } else { "?" },
            render_type(&property.schema, depth)
        ));
    }
    if open {
        // Declared members must stay assignable to the index signature.
        out.push_str(&format!("{}[key: string]: unknown;\n", pad));
    }
    out
}

/// Render a named, exported declaration: an interface for objects with
/// declared properties, a type alias for everything else.
#[must_use]
pub fn render_declaration(name: &str, node: &SchemaNode) -> String {
    match node {
        SchemaNode::Object {
            properties,
            additional,
        } if !properties.is_empty() => format!(
            "export interface {} {{\n{}}}\n",
            name,
            render_members(properties, additional.is_some(), 1)
        ),
        _ => format!("export type {} = {};\n", name, render_type(node, 0)),
    }
}

/// Whether an input of this shape may be omitted entirely by callers
#[must_use]
pub fn is_optional_input(node: &SchemaNode) -> bool {
    match node {
        SchemaNode::Object { properties, .. } => properties.iter().all(|p| !p.required),
        _ => false,
    }
}

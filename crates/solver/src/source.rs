//! Reading raw declarations from descriptor files.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;

/// Read every raw declaration stored in `path`.
///
/// `.json` files hold either one declaration object or an array of them. Any
/// other file is read as YAML, where each `---` separated document is one
/// declaration and empty documents are skipped.
pub fn read_declarations(path: &Path) -> Result<Vec<Value>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read descriptor {}", path.display()))?;

    let is_json = path
        .extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| extension.eq_ignore_ascii_case("json"));

    let declarations = if is_json {
        parse_json(&content)
    } else {
        parse_yaml(&content)
    }
    .with_context(|| format!("Failed to parse descriptor {}", path.display()))?;

    tracing::debug!(
        path = %path.display(),
        declarations = declarations.len(),
        "Read descriptor"
    );

    Ok(declarations)
}

/// Parse a JSON descriptor: one declaration or a list of them.
pub fn parse_json(content: &str) -> Result<Vec<Value>> {
    let value: Value = serde_json::from_str(content).context("Invalid JSON descriptor")?;
    Ok(match value {
        Value::Array(declarations) => declarations,
        declaration => vec![declaration],
    })
}

/// Parse a YAML descriptor, one declaration per document.
pub fn parse_yaml(content: &str) -> Result<Vec<Value>> {
    let mut declarations = Vec::new();

    for (index, document) in serde_yaml_ng::Deserializer::from_str(content).enumerate() {
        let value = Value::deserialize(document)
            .with_context(|| format!("Invalid YAML in document #{index}"))?;
        if !value.is_null() {
            declarations.push(value);
        }
    }

    Ok(declarations)
}

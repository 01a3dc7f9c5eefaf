//! Function catalog and the node templates built from it.
//!
//! Catalog JSON (an array of records):
//! [
//!   {
//!     "func": "read_image",
//!     "input": {"data": {"type": "bytes"}},
//!     "output": {"type": "array", "value_type": {"type": "tensor"}},
//!     "description": "...",
//!     "category": "images"
//!   }
//! ]

use crate::compile::MAP_FUNC;
use crate::graph::{FunctionNode, NodeBody};
use crate::types::TypeDescriptor;

use anyhow::{Context, bail};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

const BUILTIN: &str = include_str!("mock.json");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionRecord {
    pub func: String,
    #[serde(default)]
    pub input: BTreeMap<String, TypeDescriptor>,
    pub output: TypeDescriptor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// Something the editor can drop onto the canvas.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeTemplate {
    pub label: String,
    pub func: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub body: NodeBody,
}

impl NodeTemplate {
    /// `func(name: type, ...) -> type`, or just the name for a group.
    pub fn signature(&self) -> String {
        match &self.body {
            NodeBody::Function(f) => {
                let args: Vec<String> = f
                    .input
                    .iter()
                    .map(|(name, ty)| format!("{name}: {ty}"))
                    .collect();
                format!("{}({}) -> {}", f.func, args.join(", "), f.output)
            }
            _ => self.func.clone(),
        }
    }
}

/// Catalog shipped with the binary.
pub fn builtin() -> anyhow::Result<Vec<FunctionRecord>> {
    serde_json::from_str(BUILTIN).context("parsing built-in catalog")
}

pub fn read_catalog(path: &Path) -> anyhow::Result<Vec<FunctionRecord>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading catalog {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing catalog {}", path.display()))
}

/// Read the catalog at `path`, falling back to the built-in one when there is
/// no path or it cannot be read.
pub fn load_catalog(path: Option<&Path>) -> anyhow::Result<Vec<FunctionRecord>> {
    if let Some(path) = path {
        match read_catalog(path) {
            Ok(records) => {
                info!(path = %path.display(), functions = records.len(), "loaded catalog");
                return Ok(records);
            }
            Err(err) => {
                warn!(error = %format!("{err:#}"), "catalog unavailable, using built-in catalog");
            }
        }
    }
    builtin()
}

/// Map template first, then one template per function, in catalog order.
pub fn templates(records: &[FunctionRecord]) -> anyhow::Result<Vec<NodeTemplate>> {
    let ident = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$")?;
    let word = Regex::new(r"_(.)")?;

    let mut out = vec![NodeTemplate {
        label: "Map".to_string(),
        func: MAP_FUNC.to_string(),
        description: None,
        category: None,
        body: NodeBody::Group {},
    }];
    for record in records {
        if !ident.is_match(&record.func) {
            bail!("catalog function name {:?} is not an identifier", record.func);
        }
        let label = title(&word, &record.func);
        out.push(NodeTemplate {
            label: label.clone(),
            func: record.func.clone(),
            description: record.description.clone(),
            category: record.category.clone(),
            body: NodeBody::Function(FunctionNode {
                func: record.func.clone(),
                label,
                input: record.input.clone(),
                output: record.output.clone(),
                extra_outputs: Vec::new(),
                params: BTreeMap::new(),
                description: record.description.clone(),
            }),
        });
    }
    Ok(out)
}

/// `read_image` -> `Read Image`.
fn title(word: &Regex, func: &str) -> String {
    word.replace_all(&format!("_{func}"), |caps: &Captures| {
        format!(" {}", caps[1].to_uppercase())
    })
    .trim()
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ScalarKind;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn builtin_catalog_parses() {
        let records = builtin().unwrap();
        let names: Vec<&str> = records.iter().map(|r| r.func.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "read_image",
                "find_documents",
                "enrich_list",
                "classify_document",
                "find_fields",
                "ocr_many",
                "string_map",
            ]
        );
        // a field literally called "type" is still a field
        let classify = &records[3];
        assert_eq!(
            crate::types::enumerate(&classify.output)["type"],
            TypeDescriptor::scalar(ScalarKind::String)
        );
    }

    #[test]
    fn templates_get_title_case_labels() {
        let records = builtin().unwrap();
        let templates = templates(&records).unwrap();
        assert_eq!(templates[0].body, NodeBody::Group {});
        assert_eq!(templates[1].label, "Read Image");
        assert_eq!(templates[4].label, "Classify Document");
        assert_eq!(
            templates[7].signature(),
            "string_map(value: string) -> string"
        );
    }

    #[test]
    fn non_identifier_names_are_rejected() {
        let record = FunctionRecord {
            func: "rm -rf".into(),
            input: BTreeMap::new(),
            output: TypeDescriptor::any(),
            description: None,
            category: None,
        };
        assert!(templates(&[record]).is_err());
    }

    #[test]
    fn unreadable_catalog_falls_back_to_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.json");
        assert_eq!(load_catalog(Some(missing.as_path())).unwrap().len(), 7);

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"func": "upper", "input": {{"s": "string"}}, "output": "string", "category": "text"}}]"#
        )
        .unwrap();
        let records = load_catalog(Some(file.path())).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].category.as_deref(), Some("text"));
        assert_eq!(records[0].input["s"], TypeDescriptor::scalar(ScalarKind::String));
    }
}

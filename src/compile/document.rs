//! Pipeline document consumed by the execution engine.
//!
//! {
//!   "input": ["image"],
//!   "stages": [
//!     {"func": "find_documents", "name": "f1", "input": {"image": "input.image"}},
//!     {"func": "map", "name": "g1", "input": {"items": "f1"},
//!      "params": {"stages": [...], "output": "f2"}}
//!   ],
//!   "output": {"documents": "g1"}
//! }
//!
//! Nested documents (map params) have no "input" list; inside them "input"
//! refers to the current item.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Vec<String>>,
    #[serde(default)]
    pub stages: Vec<Stage>,
    pub output: OutputSpec,
}

impl PipelineSpec {
    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutputSpec {
    Single(String),
    List(Vec<String>),
    Named(BTreeMap<String, String>),
}

impl OutputSpec {
    pub fn references(&self) -> Vec<&str> {
        match self {
            OutputSpec::Single(r) => vec![r.as_str()],
            OutputSpec::List(refs) => refs.iter().map(String::as_str).collect(),
            OutputSpec::Named(refs) => refs.values().map(String::as_str).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub func: String,
    pub name: String,
    #[serde(default)]
    pub input: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<StageParams>,
}

/// Literal parameters of a function stage, or the nested document of a map
/// stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StageParams {
    Pipeline(Box<PipelineSpec>),
    Literal(BTreeMap<String, Value>),
}

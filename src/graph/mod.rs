//! Editor graph: typed nodes, wires between port handles, and group nesting.
//!
//! JSON shape:
//! {
//!   "nodes": [
//!     {"id": "in",  "kind": "input",  "inputs": [{"name": "image", "handle": "h-image"}]},
//!     {"id": "f1",  "kind": "function", "func": "find_documents",
//!      "input": {"image": {"type": "tensor"}}, "output": {...},
//!      "extra_outputs": [{"path": "[i].image", "handle": "h2", "indexes": [1], "type": {...}}],
//!      "params": {}},
//!     {"id": "g",   "kind": "group"},
//!     {"id": "mi",  "kind": "map_input",  "parent": "g", "item": "?"},
//!     {"id": "mo",  "kind": "map_output", "parent": "g", "outputs": []},
//!     {"id": "out", "kind": "output", "outputs": []}
//!   ],
//!   "edges": [
//!     {"source": "in", "source_handle": "h-image",
//!      "target": "f1", "target_handle": "func-node-f1-input.image"}
//!   ]
//! }

pub mod edit;
pub mod handle;
pub mod link;
pub mod validate;

use crate::types::{INDEX_PLACEHOLDER, TypeDescriptor};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Named port on an input, output or map output node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IoPort {
    pub name: String,
    pub handle: String,
    /// Declared type of a pipeline input; untyped ports carry `any`.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub ty: Option<TypeDescriptor>,
}

impl IoPort {
    pub fn new(name: impl Into<String>, handle: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handle: handle.into(),
            ty: None,
        }
    }

    pub fn typed(mut self, ty: TypeDescriptor) -> Self {
        self.ty = Some(ty);
        self
    }
}

/// Secondary output bound to a sub-path of the primary output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtraOutput {
    pub path: String,
    pub handle: String,
    /// Chosen index per placeholder, in path order. Missing entries read as 0.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<u64>,
    #[serde(rename = "type")]
    pub ty: TypeDescriptor,
}

impl ExtraOutput {
    /// Path with every index placeholder replaced by `.<index>`.
    ///
    /// `x[i].y` with index 3 becomes `x.3.y`; `[i]` becomes `.0`.
    pub fn concrete_path(&self) -> String {
        let mut out = String::new();
        for (ordinal, piece) in self.path.split(INDEX_PLACEHOLDER).enumerate() {
            if ordinal > 0 {
                let index = self.indexes.get(ordinal - 1).copied().unwrap_or(0);
                out.push('.');
                out.push_str(&index.to_string());
            }
            out.push_str(piece);
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionNode {
    pub func: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub input: BTreeMap<String, TypeDescriptor>,
    pub output: TypeDescriptor,
    #[serde(default)]
    pub extra_outputs: Vec<ExtraOutput>,
    /// Inputs pinned to literal values instead of wires.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapInputNode {
    /// Item type of the array feeding the group; "?" until wired.
    #[serde(default = "TypeDescriptor::unbound")]
    pub item: TypeDescriptor,
    #[serde(default)]
    pub extra_outputs: Vec<ExtraOutput>,
}

impl Default for MapInputNode {
    fn default() -> Self {
        Self {
            item: TypeDescriptor::unbound(),
            extra_outputs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeBody {
    Input {
        #[serde(default)]
        inputs: Vec<IoPort>,
    },
    Output {
        #[serde(default)]
        outputs: Vec<IoPort>,
    },
    Function(FunctionNode),
    Group {},
    MapInput(MapInputNode),
    MapOutput {
        #[serde(default)]
        outputs: Vec<IoPort>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Input,
    Output,
    Function,
    Group,
    MapInput,
    MapOutput,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Input => "input",
            NodeKind::Output => "output",
            NodeKind::Function => "function",
            NodeKind::Group => "group",
            NodeKind::MapInput => "map_input",
            NodeKind::MapOutput => "map_output",
        }
    }

    /// Core kinds are created with the graph or with their group and cannot
    /// be deleted on their own.
    pub fn is_core(&self) -> bool {
        matches!(
            self,
            NodeKind::Input | NodeKind::Output | NodeKind::MapInput | NodeKind::MapOutput
        )
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    /// Enclosing group, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(flatten)]
    pub body: NodeBody,
}

impl Node {
    pub fn new(id: impl Into<String>, parent: Option<&str>, body: NodeBody) -> Self {
        Self {
            id: id.into(),
            parent: parent.map(str::to_string),
            body,
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self.body {
            NodeBody::Input { .. } => NodeKind::Input,
            NodeBody::Output { .. } => NodeKind::Output,
            NodeBody::Function(_) => NodeKind::Function,
            NodeBody::Group {} => NodeKind::Group,
            NodeBody::MapInput(_) => NodeKind::MapInput,
            NodeBody::MapOutput { .. } => NodeKind::MapOutput,
        }
    }

    /// Declared input ports: name -> type. Only functions and map inputs have them.
    pub fn input_ports(&self) -> BTreeMap<String, TypeDescriptor> {
        match &self.body {
            NodeBody::Function(f) => f.input.clone(),
            NodeBody::MapInput(m) => {
                BTreeMap::from([(handle::MAP_ITEM.to_string(), m.item.clone())])
            }
            _ => BTreeMap::new(),
        }
    }

    /// Type of the primary output of a function or map input.
    pub fn primary_output_type(&self) -> Option<&TypeDescriptor> {
        match &self.body {
            NodeBody::Function(f) => Some(&f.output),
            NodeBody::MapInput(m) => Some(&m.item),
            _ => None,
        }
    }

    pub fn extra_outputs(&self) -> &[ExtraOutput] {
        match &self.body {
            NodeBody::Function(f) => &f.extra_outputs,
            NodeBody::MapInput(m) => &m.extra_outputs,
            _ => &[],
        }
    }

    pub fn extra_outputs_mut(&mut self) -> Option<&mut Vec<ExtraOutput>> {
        match &mut self.body {
            NodeBody::Function(f) => Some(&mut f.extra_outputs),
            NodeBody::MapInput(m) => Some(&mut m.extra_outputs),
            _ => None,
        }
    }

    pub fn extra_output(&self, handle: &str) -> Option<&ExtraOutput> {
        self.extra_outputs().iter().find(|o| o.handle == handle)
    }

    /// Named ports of input, output and map output nodes.
    pub fn io_ports(&self) -> &[IoPort] {
        match &self.body {
            NodeBody::Input { inputs } => inputs,
            NodeBody::Output { outputs } | NodeBody::MapOutput { outputs } => outputs,
            _ => &[],
        }
    }

    pub fn io_ports_mut(&mut self) -> Option<&mut Vec<IoPort>> {
        match &mut self.body {
            NodeBody::Input { inputs } => Some(inputs),
            NodeBody::Output { outputs } | NodeBody::MapOutput { outputs } => Some(outputs),
            _ => None,
        }
    }

    /// Literal parameters pinned on a function node.
    pub fn params(&self) -> Option<&BTreeMap<String, Value>> {
        match &self.body {
            NodeBody::Function(f) => Some(&f.params),
            _ => None,
        }
    }

    /// Every handle wires may leave this node from, primary output first.
    pub fn output_handles(&self) -> Vec<String> {
        match &self.body {
            NodeBody::Function(_) | NodeBody::MapInput(_) => {
                std::iter::once(handle::primary_output(&self.id))
                    .chain(self.extra_outputs().iter().map(|o| o.handle.clone()))
                    .collect()
            }
            NodeBody::Input { inputs } => inputs.iter().map(|p| p.handle.clone()).collect(),
            NodeBody::MapOutput { .. } => vec![handle::map_forward(&self.id)],
            NodeBody::Output { .. } | NodeBody::Group {} => Vec::new(),
        }
    }

    /// Every handle wires may arrive at.
    pub fn input_handles(&self) -> Vec<String> {
        match &self.body {
            NodeBody::Function(_) | NodeBody::MapInput(_) => self
                .input_ports()
                .keys()
                .map(|name| handle::function_input(&self.id, name))
                .collect(),
            NodeBody::Output { outputs } | NodeBody::MapOutput { outputs } => {
                if outputs.is_empty() {
                    vec![handle::sink_input(&self.id)]
                } else {
                    outputs.iter().map(|p| p.handle.clone()).collect()
                }
            }
            NodeBody::Input { .. } | NodeBody::Group {} => Vec::new(),
        }
    }
}

/// Wire from one source handle to one target handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub source_handle: String,
    pub target: String,
    pub target_handle: String,
}

impl Edge {
    pub fn new(
        source: impl Into<String>,
        source_handle: impl Into<String>,
        target: impl Into<String>,
        target_handle: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            source_handle: source_handle.into(),
            target: target.into(),
            target_handle: target_handle.into(),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum GraphError {
    #[error("unknown node {0}")]
    UnknownNode(String),

    #[error("duplicate node id {0}")]
    DuplicateNode(String),

    #[error("node {node} has no port {handle}")]
    UnknownHandle { node: String, handle: String },

    #[error("no wire from {source_handle} to {target_handle}")]
    UnknownEdge {
        source_handle: String,
        target_handle: String,
    },

    #[error("{kind} node {id} cannot be removed")]
    NotRemovable { id: String, kind: NodeKind },

    #[error("{kind} nodes are created with their graph or group, not on their own")]
    NotCreatable { kind: NodeKind },

    #[error("node {node} is a {kind} node, expected {expected}")]
    WrongKind {
        node: String,
        kind: NodeKind,
        expected: &'static str,
    },

    #[error("parent {parent} of node {node} is not a group")]
    ParentNotGroup { node: String, parent: String },

    #[error("group {group} must contain exactly one {kind}, found {found}")]
    Boundary {
        group: String,
        kind: NodeKind,
        found: usize,
    },

    #[error("{kind} node {node} must live inside a group")]
    Orphan { node: String, kind: NodeKind },

    #[error("graph must contain exactly one top-level {kind} node, found {found}")]
    TopLevel { kind: NodeKind, found: usize },

    #[error("target port {0} is already wired")]
    TargetTaken(String),

    #[error("wire {source_handle} -> {target_handle} rejected: incompatible types")]
    Rejected {
        source_handle: String,
        target_handle: String,
    },

    #[error("wire from {from} to {to} would close a cycle")]
    Cycle { from: String, to: String },

    #[error("wire from {from} to {to} leaves its group without passing the map output")]
    CrossScope { from: String, to: String },

    #[error("{path} is not an addressable path of node {node}")]
    UnknownPath { node: String, path: String },

    #[error("path {path} has {count} index placeholder(s), ordinal {ordinal} is out of range")]
    IndexOutOfRange {
        path: String,
        ordinal: usize,
        count: usize,
    },

    #[error("invalid port name {0:?}")]
    InvalidName(String),

    #[error(transparent)]
    Pattern(#[from] regex::Error),
}

pub type GraphResult<T> = std::result::Result<T, GraphError>;

/// Snapshot of the editor graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl Graph {
    /// Fresh graph holding the pipeline input and output nodes.
    pub fn with_endpoints() -> Self {
        Self {
            nodes: vec![
                Node::new(
                    handle::new_node_id(),
                    None,
                    NodeBody::Input { inputs: Vec::new() },
                ),
                Node::new(
                    handle::new_node_id(),
                    None,
                    NodeBody::Output {
                        outputs: Vec::new(),
                    },
                ),
            ],
            edges: Vec::new(),
        }
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn require(&self, id: &str) -> GraphResult<&Node> {
        self.node(id)
            .ok_or_else(|| GraphError::UnknownNode(id.to_string()))
    }

    pub(crate) fn require_mut(&mut self, id: &str) -> GraphResult<&mut Node> {
        self.nodes
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| GraphError::UnknownNode(id.to_string()))
    }

    /// Top-level node of `kind` (no parent).
    pub fn top_level(&self, kind: NodeKind) -> Option<&Node> {
        self.nodes
            .iter()
            .find(|n| n.parent.is_none() && n.kind() == kind)
    }

    /// Direct children of `group`.
    pub fn children<'a>(&'a self, group: &str) -> impl Iterator<Item = &'a Node> {
        self.nodes
            .iter()
            .filter(move |n| n.parent.as_deref() == Some(group))
    }

    /// Boundary node (`map_input` or `map_output`) of `group`.
    pub fn boundary(&self, group: &str, kind: NodeKind) -> Option<&Node> {
        self.children(group).find(|n| n.kind() == kind)
    }

    /// All nodes nested below `id`, depth first.
    pub fn descendants(&self, id: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut stack = vec![id.to_string()];
        while let Some(current) = stack.pop() {
            for child in self.children(&current) {
                out.push(child.id.clone());
                stack.push(child.id.clone());
            }
        }
        out
    }

    /// Scope a node is compiled in: its parent group, except for a map input,
    /// which becomes the map stage of the scope around its group.
    pub fn scope_of(&self, node: &Node) -> Option<String> {
        match node.kind() {
            NodeKind::MapInput => node
                .parent
                .as_deref()
                .and_then(|group| self.node(group))
                .and_then(|group| group.parent.clone()),
            _ => node.parent.clone(),
        }
    }

    /// Scope a node's output wires are read in. A map output hands its
    /// result to the scope around its group.
    pub fn emitting_scope(&self, node: &Node) -> Option<String> {
        match node.kind() {
            NodeKind::MapOutput => node
                .parent
                .as_deref()
                .and_then(|group| self.node(group))
                .and_then(|group| group.parent.clone()),
            _ => node.parent.clone(),
        }
    }

    /// True when `outer` encloses `inner` (or they are the same scope).
    pub fn scope_encloses(&self, outer: Option<&str>, inner: Option<&str>) -> bool {
        let mut current = inner.map(str::to_string);
        loop {
            if current.as_deref() == outer {
                return true;
            }
            match current.as_deref().and_then(|id| self.node(id)) {
                Some(node) => current = node.parent.clone(),
                None => return false,
            }
        }
    }

    /// The wire arriving at `target_handle`, if any.
    pub fn edge_into(&self, target_handle: &str) -> Option<&Edge> {
        self.edges.iter().find(|e| e.target_handle == target_handle)
    }

    /// Wires leaving `source_handle`, in wire order.
    pub fn edges_from<'a>(&'a self, source_handle: &str) -> impl Iterator<Item = &'a Edge> {
        self.edges
            .iter()
            .filter(move |e| e.source_handle == source_handle)
    }

    /// True when `to` can be reached from `from` by following wires. A map
    /// input leads to the map output of its group.
    pub fn reaches(&self, from: &str, to: &str) -> bool {
        let mut seen = std::collections::BTreeSet::new();
        let mut stack = vec![from];
        while let Some(current) = stack.pop() {
            if current == to {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            stack.extend(self.successors(current));
        }
        false
    }
}

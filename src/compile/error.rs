use crate::graph::{GraphError, NodeKind};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum CompileError {
    #[error("graph has no top-level {0} node")]
    MissingEndpoint(NodeKind),

    #[error("input port {handle} is neither wired nor pinned")]
    UnconnectedInput { handle: String },

    #[error("port {handle} is fed by a {kind} node, which produces no value")]
    UnresolvableSource { handle: String, kind: NodeKind },

    #[error("group {group} has no map output")]
    MissingMapOutput { group: String },

    #[error("output node {node} has no incoming wire")]
    MissingOutputWire { node: String },

    #[error("{kind} node {node} cannot receive wires")]
    UnexpectedTarget { node: String, kind: NodeKind },

    #[error(transparent)]
    Graph(#[from] GraphError),
}

pub type CompileResult<T> = std::result::Result<T, CompileError>;

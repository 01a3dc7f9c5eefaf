//! Reference expressions: how a stage names the value feeding one of its
//! ports.
//!
//!   input.<port>        a pipeline input
//!   input[.path]        the current item, inside a map
//!   <stage>[.path]      a function's output, or a sub-path of it
//!   <group>             the collected result of a map

use super::error::{CompileError, CompileResult};
use crate::graph::{Graph, GraphError, NodeKind};

/// Head of every reference to pipeline input or the current map item.
pub const INPUT: &str = "input";

pub fn resolve_reference(graph: &Graph, target_handle: &str) -> CompileResult<String> {
    let edge = graph
        .edge_into(target_handle)
        .ok_or_else(|| CompileError::UnconnectedInput {
            handle: target_handle.to_string(),
        })?;
    let source = graph.require(&edge.source)?;

    let base = match source.kind() {
        NodeKind::MapOutput => {
            return source.parent.clone().ok_or_else(|| {
                GraphError::Orphan {
                    node: source.id.clone(),
                    kind: NodeKind::MapOutput,
                }
                .into()
            });
        }
        NodeKind::Input => {
            let port = source
                .io_ports()
                .iter()
                .find(|p| p.handle == edge.source_handle)
                .ok_or_else(|| GraphError::UnknownHandle {
                    node: source.id.clone(),
                    handle: edge.source_handle.clone(),
                })?;
            format!("{INPUT}.{}", port.name)
        }
        NodeKind::MapInput => INPUT.to_string(),
        NodeKind::Function => source.id.clone(),
        kind => {
            return Err(CompileError::UnresolvableSource {
                handle: target_handle.to_string(),
                kind,
            });
        }
    };

    Ok(match source.extra_output(&edge.source_handle) {
        Some(extra) => join(&base, &extra.concrete_path()),
        None => base,
    })
}

fn join(base: &str, path: &str) -> String {
    if path.starts_with('.') {
        format!("{base}{path}")
    } else {
        format!("{base}.{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Edge, ExtraOutput, FunctionNode, IoPort, MapInputNode, Node, NodeBody};
    use crate::types::{ScalarKind, TypeDescriptor};
    use std::collections::BTreeMap;

    fn finder(extra: Vec<ExtraOutput>) -> Node {
        Node::new(
            "f1",
            None,
            NodeBody::Function(FunctionNode {
                func: "find_documents".into(),
                label: "Find Documents".into(),
                input: BTreeMap::new(),
                output: TypeDescriptor::any(),
                extra_outputs: extra,
                params: BTreeMap::new(),
                description: None,
            }),
        )
    }

    fn extra(path: &str, handle: &str, indexes: &[u64]) -> ExtraOutput {
        ExtraOutput {
            path: path.into(),
            handle: handle.into(),
            indexes: indexes.to_vec(),
            ty: TypeDescriptor::scalar(ScalarKind::Tensor),
        }
    }

    fn graph() -> Graph {
        Graph {
            nodes: vec![
                Node::new(
                    "in",
                    None,
                    NodeBody::Input {
                        inputs: vec![IoPort::new("scan", "h-scan")],
                    },
                ),
                finder(vec![
                    extra("[i].image", "x1", &[2]),
                    extra("pages[i]", "x2", &[]),
                ]),
                Node::new("g", None, NodeBody::Group {}),
                Node::new("mi", Some("g"), NodeBody::MapInput(MapInputNode::default())),
                Node::new("mo", Some("g"), NodeBody::MapOutput { outputs: vec![] }),
                Node::new("out", None, NodeBody::Output { outputs: vec![] }),
            ],
            edges: vec![
                Edge::new("in", "h-scan", "t", "t-scan"),
                Edge::new("f1", "func-node-f1-output", "t", "t-primary"),
                Edge::new("f1", "x1", "t", "t-x1"),
                Edge::new("f1", "x2", "t", "t-x2"),
                Edge::new("mi", "func-node-mi-output", "t", "t-item"),
                Edge::new("mo", "mo-map-output", "t", "t-map"),
                Edge::new("out", "bogus", "t", "t-bad"),
            ],
        }
    }

    #[test]
    fn references_by_source_kind() {
        let g = graph();
        let r = |h: &str| resolve_reference(&g, h);
        assert_eq!(r("t-scan"), Ok("input.scan".to_string()));
        assert_eq!(r("t-primary"), Ok("f1".to_string()));
        assert_eq!(r("t-x1"), Ok("f1.2.image".to_string()));
        assert_eq!(r("t-x2"), Ok("f1.pages.0".to_string()));
        assert_eq!(r("t-item"), Ok("input".to_string()));
        assert_eq!(r("t-map"), Ok("g".to_string()));
    }

    #[test]
    fn malformed_sources_are_errors() {
        let g = graph();
        assert_eq!(
            resolve_reference(&g, "t-bad"),
            Err(CompileError::UnresolvableSource {
                handle: "t-bad".into(),
                kind: NodeKind::Output,
            })
        );
        assert_eq!(
            resolve_reference(&g, "t-none"),
            Err(CompileError::UnconnectedInput {
                handle: "t-none".into()
            })
        );
    }
}

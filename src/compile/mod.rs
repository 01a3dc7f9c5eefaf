//! Graph -> pipeline document.
//!
//! Each pipeline (the top level, and the interior of every group) is compiled
//! by its own walk with its own visited set:
//! - start from the entry (the input node's ports, or the map input's outputs)
//!   and follow every wire, in wire order
//! - before a node's stage is emitted, the nodes feeding it in the same
//!   pipeline are emitted, so a stage never precedes what it reads
//! - a node reached twice (diamond) is emitted once
//! - a map input is the map stage of the pipeline around its group; its
//!   params are the group's interior, compiled recursively
//! - nodes feeding the sink are pulled in last, so every output reference
//!   names an emitted stage
//!
//! Nodes of other pipelines are never emitted by a walk, only referenced.

pub mod document;
pub mod error;
pub mod reference;
pub mod verify;

pub use document::{OutputSpec, PipelineSpec, Stage, StageParams};
pub use error::{CompileError, CompileResult};
pub use reference::resolve_reference;

use crate::graph::{Graph, GraphError, Node, NodeBody, NodeKind, handle};

use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Function name of a map stage.
pub const MAP_FUNC: &str = "map";
/// Input port of a map stage.
pub const MAP_ITEMS: &str = "items";

pub fn compile(graph: &Graph) -> CompileResult<PipelineSpec> {
    Compiler::new(graph).compile()
}

pub struct Compiler<'g> {
    graph: &'g Graph,
}

/// State of one pipeline's walk.
struct Walk {
    scope: Option<String>,
    visited: BTreeSet<String>,
    stages: Vec<Stage>,
}

impl Walk {
    fn new(scope: Option<&str>) -> Self {
        Self {
            scope: scope.map(str::to_string),
            visited: BTreeSet::new(),
            stages: Vec::new(),
        }
    }
}

impl<'g> Compiler<'g> {
    pub fn new(graph: &'g Graph) -> Self {
        Self { graph }
    }

    /// Compile the top-level pipeline.
    pub fn compile(&self) -> CompileResult<PipelineSpec> {
        let input = self
            .graph
            .top_level(NodeKind::Input)
            .ok_or(CompileError::MissingEndpoint(NodeKind::Input))?;
        let output = self
            .graph
            .top_level(NodeKind::Output)
            .ok_or(CompileError::MissingEndpoint(NodeKind::Output))?;

        let mut walk = Walk::new(None);
        for port in input.io_ports() {
            self.follow(&mut walk, &port.handle)?;
        }
        let output = self.finish(&mut walk, output)?;
        debug!(stages = walk.stages.len(), "compiled pipeline");

        Ok(PipelineSpec {
            input: Some(input.io_ports().iter().map(|p| p.name.clone()).collect()),
            stages: walk.stages,
            output,
        })
    }

    /// Compile the interior of `group`, entered through its map input.
    fn compile_group(&self, group: &str, entry: &Node) -> CompileResult<PipelineSpec> {
        let sink = self
            .graph
            .boundary(group, NodeKind::MapOutput)
            .ok_or_else(|| CompileError::MissingMapOutput {
                group: group.to_string(),
            })?;

        let mut walk = Walk::new(Some(group));
        for handle in entry.output_handles() {
            self.follow(&mut walk, &handle)?;
        }
        let output = self.finish(&mut walk, sink)?;
        debug!(%group, stages = walk.stages.len(), "compiled map");

        Ok(PipelineSpec {
            input: None,
            stages: walk.stages,
            output,
        })
    }

    /// Visit every node wired to `source_handle`.
    fn follow(&self, walk: &mut Walk, source_handle: &str) -> CompileResult<()> {
        let targets: Vec<&str> = self
            .graph
            .edges_from(source_handle)
            .map(|e| e.target.as_str())
            .collect();
        for target in targets {
            let node = self.graph.require(target)?;
            self.visit(walk, node)?;
        }
        Ok(())
    }

    fn visit(&self, walk: &mut Walk, node: &Node) -> CompileResult<()> {
        match node.kind() {
            NodeKind::Output | NodeKind::MapOutput => return Ok(()),
            NodeKind::Input | NodeKind::Group => {
                return Err(CompileError::UnexpectedTarget {
                    node: node.id.clone(),
                    kind: node.kind(),
                });
            }
            NodeKind::Function | NodeKind::MapInput => {}
        }
        if self.graph.scope_of(node) != walk.scope || !walk.visited.insert(node.id.clone()) {
            return Ok(());
        }

        for dependency in self.dependencies(node)? {
            self.visit(walk, dependency)?;
        }

        let stage = self.stage(node)?;
        debug!(node = %node.id, func = %stage.func, name = %stage.name, "emitted stage");
        walk.stages.push(stage);

        for handle in self.downstream(node)? {
            self.follow(walk, &handle)?;
        }
        Ok(())
    }

    /// Stage-producing nodes whose values `node` reads. For a map input this
    /// includes everything read from inside its group.
    fn dependencies(&self, node: &Node) -> CompileResult<Vec<&'g Node>> {
        let graph = self.graph;
        let sources: Vec<&str> = match node.kind() {
            NodeKind::MapInput => {
                let group = parent_of(node)?;
                let interior: BTreeSet<String> = graph.descendants(group).into_iter().collect();
                graph
                    .edges
                    .iter()
                    .filter(|e| interior.contains(&e.target) && !interior.contains(&e.source))
                    .map(|e| e.source.as_str())
                    .collect()
            }
            _ => graph
                .edges
                .iter()
                .filter(|e| e.target == node.id)
                .map(|e| e.source.as_str())
                .collect(),
        };

        let mut out = Vec::new();
        for id in sources {
            if let Some(stage) = self.stage_node(graph.require(id)?) {
                out.push(stage);
            }
        }
        Ok(out)
    }

    /// Node whose stage holds the value a wire from `source` carries: a map
    /// output stands for the map stage of its group. Pipeline inputs have no
    /// stage.
    fn stage_node(&self, source: &'g Node) -> Option<&'g Node> {
        match source.kind() {
            NodeKind::MapOutput => source
                .parent
                .as_deref()
                .and_then(|group| self.graph.boundary(group, NodeKind::MapInput)),
            NodeKind::Function | NodeKind::MapInput => Some(source),
            _ => None,
        }
    }

    /// Handles to continue from once `node` is emitted. A map stage continues
    /// from its group's result.
    fn downstream(&self, node: &Node) -> CompileResult<Vec<String>> {
        match node.kind() {
            NodeKind::MapInput => {
                let group = parent_of(node)?;
                let sink = self
                    .graph
                    .boundary(group, NodeKind::MapOutput)
                    .ok_or_else(|| CompileError::MissingMapOutput {
                        group: group.to_string(),
                    })?;
                Ok(sink.output_handles())
            }
            _ => Ok(node.output_handles()),
        }
    }

    fn stage(&self, node: &Node) -> CompileResult<Stage> {
        match &node.body {
            NodeBody::Function(f) => {
                let mut input = BTreeMap::new();
                for name in f.input.keys() {
                    if f.params.contains_key(name) {
                        continue;
                    }
                    let port = handle::function_input(&node.id, name);
                    input.insert(name.clone(), self.reference(&port)?);
                }
                Ok(Stage {
                    func: f.func.clone(),
                    name: node.id.clone(),
                    input,
                    params: (!f.params.is_empty()).then(|| StageParams::Literal(f.params.clone())),
                })
            }
            NodeBody::MapInput(_) => {
                let group = parent_of(node)?;
                let port = handle::function_input(&node.id, handle::MAP_ITEM);
                let items = self.reference(&port)?;
                let nested = self.compile_group(group, node)?;
                Ok(Stage {
                    func: MAP_FUNC.to_string(),
                    name: group.to_string(),
                    input: BTreeMap::from([(MAP_ITEMS.to_string(), items)]),
                    params: Some(StageParams::Pipeline(Box::new(nested))),
                })
            }
            _ => Err(CompileError::UnexpectedTarget {
                node: node.id.clone(),
                kind: node.kind(),
            }),
        }
    }

    /// Emit whatever still feeds `sink`, then resolve its references.
    fn finish(&self, walk: &mut Walk, sink: &Node) -> CompileResult<OutputSpec> {
        for port in sink.input_handles() {
            if let Some(edge) = self.graph.edge_into(&port) {
                if let Some(stage) = self.stage_node(self.graph.require(&edge.source)?) {
                    self.visit(walk, stage)?;
                }
            }
        }

        if sink.io_ports().is_empty() {
            let port = handle::sink_input(&sink.id);
            if self.graph.edge_into(&port).is_none() {
                return Err(CompileError::MissingOutputWire {
                    node: sink.id.clone(),
                });
            }
            return Ok(OutputSpec::Single(self.reference(&port)?));
        }

        let mut named = BTreeMap::new();
        for port in sink.io_ports() {
            named.insert(port.name.clone(), self.reference(&port.handle)?);
        }
        Ok(OutputSpec::Named(named))
    }

    /// Reference for the wire into `target_handle`. A wire the pipeline it
    /// lands in could not read (an `input` from another pipeline) is an error.
    fn reference(&self, target_handle: &str) -> CompileResult<String> {
        if let Some(edge) = self.graph.edge_into(target_handle) {
            if !self.graph.in_scope(edge) {
                return Err(GraphError::CrossScope {
                    from: edge.source.clone(),
                    to: edge.target.clone(),
                }
                .into());
            }
        }
        resolve_reference(self.graph, target_handle)
    }
}

fn parent_of(node: &Node) -> CompileResult<&str> {
    node.parent.as_deref().ok_or_else(|| {
        GraphError::Orphan {
            node: node.id.clone(),
            kind: node.kind(),
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Edge, ExtraOutput, FunctionNode, IoPort, MapInputNode};
    use crate::types::{ScalarKind, TypeDescriptor};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn int() -> TypeDescriptor {
        TypeDescriptor::scalar(ScalarKind::Integer)
    }

    fn function(id: &str, parent: Option<&str>, func: &str, inputs: &[&str]) -> Node {
        Node::new(
            id,
            parent,
            NodeBody::Function(FunctionNode {
                func: func.into(),
                label: String::new(),
                input: inputs.iter().map(|n| (n.to_string(), int())).collect(),
                output: int(),
                extra_outputs: Vec::new(),
                params: BTreeMap::new(),
                description: None,
            }),
        )
    }

    fn input(ports: &[&str]) -> Node {
        Node::new(
            "in",
            None,
            NodeBody::Input {
                inputs: ports
                    .iter()
                    .map(|p| IoPort::new(*p, format!("h-{p}")))
                    .collect(),
            },
        )
    }

    fn output() -> Node {
        Node::new("out", None, NodeBody::Output { outputs: vec![] })
    }

    fn out_of(id: &str) -> String {
        handle::primary_output(id)
    }

    fn into(id: &str, port: &str) -> String {
        handle::function_input(id, port)
    }

    fn linear() -> Graph {
        Graph {
            nodes: vec![input(&["a"]), function("f1", None, "inc", &["x"]), output()],
            edges: vec![
                Edge::new("in", "h-a", "f1", into("f1", "x")),
                Edge::new("f1", out_of("f1"), "out", "out-output"),
            ],
        }
    }

    #[test]
    fn linear_pipeline() {
        let spec = compile(&linear()).unwrap();
        assert_eq!(
            serde_json::to_value(&spec).unwrap(),
            json!({
                "input": ["a"],
                "stages": [{"func": "inc", "name": "f1", "input": {"x": "input.a"}}],
                "output": "f1"
            })
        );
    }

    #[test]
    fn map_group_compiles_to_a_nested_document() {
        let graph = Graph {
            nodes: vec![
                Node::new(
                    "in",
                    None,
                    NodeBody::Input {
                        inputs: vec![
                            IoPort::new("items", "h-items").typed(TypeDescriptor::array(int())),
                        ],
                    },
                ),
                Node::new("g", None, NodeBody::Group {}),
                Node::new(
                    "mi",
                    Some("g"),
                    NodeBody::MapInput(MapInputNode {
                        item: int(),
                        extra_outputs: Vec::new(),
                    }),
                ),
                function("sq", Some("g"), "square", &["x"]),
                Node::new("mo", Some("g"), NodeBody::MapOutput { outputs: vec![] }),
                output(),
            ],
            edges: vec![
                Edge::new("in", "h-items", "mi", into("mi", "item")),
                Edge::new("mi", out_of("mi"), "sq", into("sq", "x")),
                Edge::new("sq", out_of("sq"), "mo", "mo-output"),
                Edge::new("mo", "mo-map-output", "out", "out-output"),
            ],
        };
        assert_eq!(graph.validate(), Ok(()));

        let spec = compile(&graph).unwrap();
        assert_eq!(
            serde_json::to_value(&spec).unwrap(),
            json!({
                "input": ["items"],
                "stages": [{
                    "func": "map",
                    "name": "g",
                    "input": {"items": "input.items"},
                    "params": {
                        "stages": [{"func": "square", "name": "sq", "input": {"x": "input"}}],
                        "output": "sq"
                    }
                }],
                "output": "g"
            })
        );
    }

    #[test]
    fn diamond_is_emitted_once_and_after_both_branches() {
        // a -> left, a -> right, (left, right) -> join -> out
        let graph = Graph {
            nodes: vec![
                input(&["a"]),
                function("left", None, "inc", &["x"]),
                function("right", None, "dec", &["x"]),
                function("join", None, "add", &["lhs", "rhs"]),
                output(),
            ],
            edges: vec![
                Edge::new("in", "h-a", "left", into("left", "x")),
                Edge::new("in", "h-a", "right", into("right", "x")),
                Edge::new("left", out_of("left"), "join", into("join", "lhs")),
                Edge::new("right", out_of("right"), "join", into("join", "rhs")),
                Edge::new("join", out_of("join"), "out", "out-output"),
            ],
        };
        let spec = compile(&graph).unwrap();
        let names: Vec<&str> = spec.stages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["left", "right", "join"]);
        assert_eq!(
            spec.stage("join").unwrap().input,
            BTreeMap::from([
                ("lhs".to_string(), "left".to_string()),
                ("rhs".to_string(), "right".to_string()),
            ])
        );
    }

    #[test]
    fn compiling_twice_is_byte_identical() {
        let graph = linear();
        let first = serde_json::to_string(&compile(&graph).unwrap()).unwrap();
        let second = serde_json::to_string(&compile(&graph).unwrap()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn pinned_inputs_become_params() {
        let mut graph = linear();
        graph.nodes[1] = function("f1", None, "crop", &["x", "margin"]);
        if let NodeBody::Function(f) = &mut graph.nodes[1].body {
            f.params.insert("margin".into(), json!(4));
        }
        let spec = compile(&graph).unwrap();
        let stage = spec.stage("f1").unwrap();
        assert_eq!(stage.input.len(), 1);
        assert_eq!(
            stage.params,
            Some(StageParams::Literal(BTreeMap::from([(
                "margin".to_string(),
                json!(4)
            )])))
        );
    }

    #[test]
    fn extra_outputs_and_named_outputs() {
        let mut graph = linear();
        if let NodeBody::Function(f) = &mut graph.nodes[1].body {
            f.extra_outputs.push(ExtraOutput {
                path: "pages[i].text".into(),
                handle: "x-text".into(),
                indexes: vec![3],
                ty: TypeDescriptor::scalar(ScalarKind::String),
            });
        }
        graph.nodes[2] = Node::new(
            "out",
            None,
            NodeBody::Output {
                outputs: vec![IoPort::new("whole", "o-whole"), IoPort::new("text", "o-text")],
            },
        );
        graph.edges = vec![
            Edge::new("in", "h-a", "f1", into("f1", "x")),
            Edge::new("f1", out_of("f1"), "out", "o-whole"),
            Edge::new("f1", "x-text", "out", "o-text"),
        ];
        let spec = compile(&graph).unwrap();
        assert_eq!(
            spec.output,
            OutputSpec::Named(BTreeMap::from([
                ("text".to_string(), "f1.pages.3.text".to_string()),
                ("whole".to_string(), "f1".to_string()),
            ]))
        );
    }

    /// f1 feeds both the map and a node inside it.
    fn map_reading_outer_stage() -> Graph {
        Graph {
            nodes: vec![
                input(&["a"]),
                function("f1", None, "range", &["n"]),
                Node::new("g", None, NodeBody::Group {}),
                Node::new(
                    "mi",
                    Some("g"),
                    NodeBody::MapInput(MapInputNode {
                        item: int(),
                        extra_outputs: Vec::new(),
                    }),
                ),
                function("mul", Some("g"), "mul", &["x", "y"]),
                Node::new("mo", Some("g"), NodeBody::MapOutput { outputs: vec![] }),
                output(),
            ],
            edges: vec![
                Edge::new("in", "h-a", "f1", into("f1", "n")),
                Edge::new("f1", out_of("f1"), "mi", into("mi", "item")),
                Edge::new("mi", out_of("mi"), "mul", into("mul", "x")),
                Edge::new("f1", out_of("f1"), "mul", into("mul", "y")),
                Edge::new("mul", out_of("mul"), "mo", "mo-output"),
                Edge::new("mo", "mo-map-output", "out", "out-output"),
            ],
        }
    }

    #[test]
    fn interior_may_read_outer_stages() {
        let spec = compile(&map_reading_outer_stage()).unwrap();
        let names: Vec<&str> = spec.stages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["f1", "g"]);
        let Some(StageParams::Pipeline(inner)) = &spec.stage("g").unwrap().params else {
            panic!("map stage without nested document");
        };
        assert_eq!(
            inner.stage("mul").unwrap().input,
            BTreeMap::from([
                ("x".to_string(), "input".to_string()),
                ("y".to_string(), "f1".to_string()),
            ])
        );
    }

    #[test]
    fn pipeline_input_read_inside_a_map_is_an_error() {
        // inside the map, "input" is the item, not the pipeline input
        let mut graph = map_reading_outer_stage();
        graph.edges.retain(|e| e.target_handle != into("mul", "y"));
        graph.edges.push(Edge::new("in", "h-a", "mul", into("mul", "y")));
        let cross = || GraphError::CrossScope {
            from: "in".into(),
            to: "mul".into(),
        };
        assert_eq!(graph.validate(), Err(cross()));
        assert_eq!(compile(&graph), Err(CompileError::Graph(cross())));
    }

    #[test]
    fn nested_groups_compile_to_nested_documents() {
        // in.rows -> g1[ g2[ sq ] ] -> out
        let map_input = |id: &str, group: &str, item: TypeDescriptor| {
            Node::new(
                id,
                Some(group),
                NodeBody::MapInput(MapInputNode {
                    item,
                    extra_outputs: Vec::new(),
                }),
            )
        };
        let rows = TypeDescriptor::array(TypeDescriptor::array(int()));
        let graph = Graph {
            nodes: vec![
                Node::new(
                    "in",
                    None,
                    NodeBody::Input {
                        inputs: vec![IoPort::new("rows", "h-rows").typed(rows)],
                    },
                ),
                Node::new("g1", None, NodeBody::Group {}),
                map_input("mi1", "g1", TypeDescriptor::array(int())),
                Node::new("g2", Some("g1"), NodeBody::Group {}),
                map_input("mi2", "g2", int()),
                function("sq", Some("g2"), "square", &["x"]),
                Node::new("mo2", Some("g2"), NodeBody::MapOutput { outputs: vec![] }),
                Node::new("mo1", Some("g1"), NodeBody::MapOutput { outputs: vec![] }),
                output(),
            ],
            edges: vec![
                Edge::new("in", "h-rows", "mi1", into("mi1", "item")),
                Edge::new("mi1", out_of("mi1"), "mi2", into("mi2", "item")),
                Edge::new("mi2", out_of("mi2"), "sq", into("sq", "x")),
                Edge::new("sq", out_of("sq"), "mo2", "mo2-output"),
                Edge::new("mo2", "mo2-map-output", "mo1", "mo1-output"),
                Edge::new("mo1", "mo1-map-output", "out", "out-output"),
            ],
        };
        assert_eq!(graph.validate(), Ok(()));

        let spec = compile(&graph).unwrap();
        assert_eq!(
            serde_json::to_value(&spec).unwrap(),
            json!({
                "input": ["rows"],
                "stages": [{
                    "func": "map",
                    "name": "g1",
                    "input": {"items": "input.rows"},
                    "params": {
                        "stages": [{
                            "func": "map",
                            "name": "g2",
                            "input": {"items": "input"},
                            "params": {
                                "stages": [
                                    {"func": "square", "name": "sq", "input": {"x": "input"}}
                                ],
                                "output": "sq"
                            }
                        }],
                        "output": "g2"
                    }
                }],
                "output": "g1"
            })
        );
    }

    #[test]
    fn malformed_graphs_fail_without_output() {
        let mut graph = linear();
        graph.edges.remove(0);
        assert_eq!(
            compile(&graph),
            Err(CompileError::UnconnectedInput {
                handle: into("f1", "x")
            })
        );

        let mut graph = linear();
        graph.edges.pop();
        assert_eq!(
            compile(&graph),
            Err(CompileError::MissingOutputWire { node: "out".into() })
        );

        let mut graph = linear();
        graph.nodes.retain(|n| n.kind() != NodeKind::Output);
        assert_eq!(
            compile(&graph),
            Err(CompileError::MissingEndpoint(NodeKind::Output))
        );
    }
}

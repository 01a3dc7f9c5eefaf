//! Structural validation of an editor graph.
//!
//! Checked, in order:
//! - node ids are unique
//! - parents exist and are groups; map boundaries always have a parent
//! - exactly one input and one output node, both at top level
//! - every group holds exactly one map_input and one map_output
//! - wires join existing ports, no target port is fed twice, and wires never
//!   leave a group except through its map_output
//! - pipeline inputs are only read inside their own pipeline
//! - the wire graph is acyclic

use super::{Edge, Graph, GraphError, GraphResult, Node, NodeKind};
use std::collections::{BTreeMap, BTreeSet};

impl Graph {
    pub fn validate(&self) -> GraphResult<()> {
        // 1) Unique ids.
        let mut ids = BTreeSet::new();
        for node in &self.nodes {
            if !ids.insert(node.id.as_str()) {
                return Err(GraphError::DuplicateNode(node.id.clone()));
            }
        }

        // 2) Ownership.
        for node in &self.nodes {
            match node.parent.as_deref() {
                Some(parent) => {
                    let owner = self.require(parent)?;
                    if owner.kind() != NodeKind::Group {
                        return Err(GraphError::ParentNotGroup {
                            node: node.id.clone(),
                            parent: parent.to_string(),
                        });
                    }
                }
                None if matches!(node.kind(), NodeKind::MapInput | NodeKind::MapOutput) => {
                    return Err(GraphError::Orphan {
                        node: node.id.clone(),
                        kind: node.kind(),
                    });
                }
                None => {}
            }
        }

        // 3) Pipeline endpoints.
        for kind in [NodeKind::Input, NodeKind::Output] {
            let all = self.nodes.iter().filter(|n| n.kind() == kind).count();
            let top = self
                .nodes
                .iter()
                .filter(|n| n.kind() == kind && n.parent.is_none())
                .count();
            if all != 1 || top != 1 {
                return Err(GraphError::TopLevel { kind, found: all });
            }
        }

        // 4) Group boundaries.
        for group in self.nodes.iter().filter(|n| n.kind() == NodeKind::Group) {
            for kind in [NodeKind::MapInput, NodeKind::MapOutput] {
                let found = self.children(&group.id).filter(|n| n.kind() == kind).count();
                if found != 1 {
                    return Err(GraphError::Boundary {
                        group: group.id.clone(),
                        kind,
                        found,
                    });
                }
            }
        }

        // 5) Wires.
        let mut fed = BTreeSet::new();
        for edge in &self.edges {
            let source = self.require(&edge.source)?;
            let target = self.require(&edge.target)?;
            if !source.output_handles().contains(&edge.source_handle) {
                return Err(unknown_handle(source, &edge.source_handle));
            }
            if !target.input_handles().contains(&edge.target_handle) {
                return Err(unknown_handle(target, &edge.target_handle));
            }
            if !fed.insert(edge.target_handle.as_str()) {
                return Err(GraphError::TargetTaken(edge.target_handle.clone()));
            }
            if !self.in_scope(edge) {
                return Err(GraphError::CrossScope {
                    from: edge.source.clone(),
                    to: edge.target.clone(),
                });
            }
        }

        // 6) Cycle detection (DFS coloring).
        #[derive(Copy, Clone, PartialEq, Eq)]
        enum Mark {
            Temp,
            Perm,
        }

        fn dfs<'a>(
            graph: &'a Graph,
            v: &'a str,
            marks: &mut BTreeMap<&'a str, Mark>,
        ) -> GraphResult<()> {
            marks.insert(v, Mark::Temp);
            for next in graph.successors(v) {
                match marks.get(next) {
                    Some(Mark::Perm) => {}
                    Some(Mark::Temp) => {
                        return Err(GraphError::Cycle {
                            from: v.to_string(),
                            to: next.to_string(),
                        });
                    }
                    None => dfs(graph, next, marks)?,
                }
            }
            marks.insert(v, Mark::Perm);
            Ok(())
        }

        let mut marks = BTreeMap::new();
        for node in &self.nodes {
            if !marks.contains_key(node.id.as_str()) {
                dfs(self, &node.id, &mut marks)?;
            }
        }

        Ok(())
    }

    /// Nodes one wire away from `id`. A map input also leads to the map
    /// output of its group, since the group's result depends on its input.
    pub(crate) fn successors<'a>(&'a self, id: &str) -> Vec<&'a str> {
        let mut out: Vec<&str> = self
            .edges
            .iter()
            .filter(|e| e.source == id)
            .map(|e| e.target.as_str())
            .collect();
        let sink = self
            .node(id)
            .filter(|n| n.kind() == NodeKind::MapInput)
            .and_then(|n| n.parent.as_deref())
            .and_then(|group| self.boundary(group, NodeKind::MapOutput));
        if let Some(sink) = sink {
            out.push(sink.id.as_str());
        }
        out
    }

    /// A wire may only flow from a scope into itself or into a scope nested
    /// inside it. Pipeline inputs (the input node, a map input's item) are
    /// read as `input`, which only means something in their own pipeline.
    pub(crate) fn in_scope(&self, edge: &Edge) -> bool {
        let (Some(source), Some(target)) = (self.node(&edge.source), self.node(&edge.target))
        else {
            return false;
        };
        let from = self.emitting_scope(source);
        let to = self.scope_of(target);
        match source.kind() {
            NodeKind::Input | NodeKind::MapInput => from == to,
            _ => self.scope_encloses(from.as_deref(), to.as_deref()),
        }
    }
}

fn unknown_handle(node: &Node, handle: &str) -> GraphError {
    GraphError::UnknownHandle {
        node: node.id.clone(),
        handle: handle.to_string(),
    }
}

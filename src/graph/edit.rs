//! Edit transitions.
//!
//! Each transition reads the current snapshot and returns the next one. A
//! rejected edit returns an error and leaves the caller's graph untouched.
//!
//! Wiring a map input rebinds its item type to the item type of the array
//! feeding it. Removing that wire, by any route, unbinds it again: the item
//! goes back to "?", its extra outputs are dropped, and so are the wires
//! leaving it.

use super::handle;
use super::{
    Edge, ExtraOutput, FunctionNode, Graph, GraphError, GraphResult, IoPort, MapInputNode, Node,
    NodeBody, NodeKind,
};
use crate::types::{TypeDescriptor, enumerate, placeholder_count};

use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

impl Graph {
    /// Add a node under `parent` (or at top level). A group comes with its
    /// map input and map output. Returns the new node's id.
    pub fn add_node(&self, body: NodeBody, parent: Option<&str>) -> GraphResult<(Graph, String)> {
        let id = handle::new_node_id();
        let node = Node::new(id.clone(), parent, body);
        let kind = node.kind();
        if kind.is_core() {
            return Err(GraphError::NotCreatable { kind });
        }
        if let Some(parent) = parent {
            if self.require(parent)?.kind() != NodeKind::Group {
                return Err(GraphError::ParentNotGroup {
                    node: id,
                    parent: parent.to_string(),
                });
            }
        }

        let mut next = self.clone();
        next.nodes.push(node);
        if kind == NodeKind::Group {
            next.nodes.push(Node::new(
                handle::new_node_id(),
                Some(id.as_str()),
                NodeBody::MapInput(MapInputNode::default()),
            ));
            next.nodes.push(Node::new(
                handle::new_node_id(),
                Some(id.as_str()),
                NodeBody::MapOutput {
                    outputs: Vec::new(),
                },
            ));
        }
        debug!(node = %id, %kind, "added node");
        Ok((next, id))
    }

    /// Remove nodes together with everything nested inside them and every
    /// wire touching them.
    pub fn remove_nodes(&self, ids: &[&str]) -> GraphResult<Graph> {
        let mut doomed = BTreeSet::new();
        for id in ids {
            let node = self.require(id)?;
            if node.kind().is_core() {
                return Err(GraphError::NotRemovable {
                    id: node.id.clone(),
                    kind: node.kind(),
                });
            }
            doomed.insert(node.id.clone());
            doomed.extend(self.descendants(id));
        }

        let mut next = self.clone();
        next.nodes.retain(|n| !doomed.contains(&n.id));
        next.remove_edges_where(|e| doomed.contains(&e.source) || doomed.contains(&e.target));
        debug!(removed = doomed.len(), "removed nodes");
        Ok(next)
    }

    /// Add a wire. Rejected when the types do not fit, the target is already
    /// fed, the wire would leave a group sideways, or it would close a cycle.
    pub fn connect(&self, edge: Edge) -> GraphResult<Graph> {
        let source = self.require(&edge.source)?;
        let target = self.require(&edge.target)?;
        if !source.output_handles().contains(&edge.source_handle) {
            return Err(GraphError::UnknownHandle {
                node: source.id.clone(),
                handle: edge.source_handle,
            });
        }
        if !target.input_handles().contains(&edge.target_handle) {
            return Err(GraphError::UnknownHandle {
                node: target.id.clone(),
                handle: edge.target_handle,
            });
        }
        if !self.is_valid_connection(&edge) {
            return Err(GraphError::Rejected {
                source_handle: edge.source_handle,
                target_handle: edge.target_handle,
            });
        }
        if self.edge_into(&edge.target_handle).is_some() {
            return Err(GraphError::TargetTaken(edge.target_handle));
        }
        if !self.in_scope(&edge) {
            return Err(GraphError::CrossScope {
                from: edge.source,
                to: edge.target,
            });
        }
        if self.reaches(&edge.target, &edge.source) {
            return Err(GraphError::Cycle {
                from: edge.source,
                to: edge.target,
            });
        }

        let rebind = match target.kind() {
            NodeKind::MapInput => self
                .source_type(source, &edge.source_handle)
                .and_then(|ty| ty.item().cloned()),
            _ => None,
        };

        let mut next = self.clone();
        if let Some(name) = handle::input_port_name(&edge.target, &edge.target_handle) {
            // a wire replaces a pinned literal
            if let NodeBody::Function(f) = &mut next.require_mut(&edge.target)?.body {
                f.params.remove(name);
            }
        }
        debug!(
            source = %edge.source_handle,
            target = %edge.target_handle,
            "connected"
        );
        let target_id = edge.target.clone();
        next.edges.push(edge);
        if let Some(item) = rebind {
            next.rebind_map_input(&target_id, item)?;
        }
        Ok(next)
    }

    pub fn disconnect(&self, source_handle: &str, target_handle: &str) -> GraphResult<Graph> {
        let is_wire =
            |e: &Edge| e.source_handle == source_handle && e.target_handle == target_handle;
        if !self.edges.iter().any(is_wire) {
            return Err(GraphError::UnknownEdge {
                source_handle: source_handle.to_string(),
                target_handle: target_handle.to_string(),
            });
        }
        let mut next = self.clone();
        next.remove_edges_where(is_wire);
        Ok(next)
    }

    /// Expose `path` of the node's primary output as a new port. Returns the
    /// new handle.
    pub fn add_extra_output(&self, node_id: &str, path: &str) -> GraphResult<(Graph, String)> {
        let ty = self.path_type(node_id, path)?;
        let handle = handle::new_handle();
        let mut next = self.clone();
        let node = next.require_mut(node_id)?;
        let kind = node.kind();
        let extras = node.extra_outputs_mut().ok_or_else(|| GraphError::WrongKind {
            node: node_id.to_string(),
            kind,
            expected: "function or map_input",
        })?;
        extras.push(ExtraOutput {
            path: path.to_string(),
            handle: handle.clone(),
            indexes: Vec::new(),
            ty,
        });
        Ok((next, handle))
    }

    /// Point an extra output at another path. Chosen indexes reset, and wires
    /// that no longer fit the new type are dropped.
    pub fn select_extra_output_path(
        &self,
        node_id: &str,
        handle: &str,
        path: &str,
    ) -> GraphResult<Graph> {
        let ty = self.path_type(node_id, path)?;
        let mut next = self.clone();
        let extra = next.extra_output_mut(node_id, handle)?;
        extra.path = path.to_string();
        extra.indexes.clear();
        extra.ty = ty;
        next.prune_rejected_from(node_id);
        Ok(next)
    }

    /// Choose the concrete index for the `ordinal`-th `[i]` of an extra
    /// output's path.
    pub fn set_extra_output_index(
        &self,
        node_id: &str,
        handle: &str,
        ordinal: usize,
        index: u64,
    ) -> GraphResult<Graph> {
        let mut next = self.clone();
        let extra = next.extra_output_mut(node_id, handle)?;
        let count = placeholder_count(&extra.path);
        if ordinal >= count {
            return Err(GraphError::IndexOutOfRange {
                path: extra.path.clone(),
                ordinal,
                count,
            });
        }
        if extra.indexes.len() <= ordinal {
            extra.indexes.resize(ordinal + 1, 0);
        }
        extra.indexes[ordinal] = index;
        Ok(next)
    }

    pub fn remove_extra_output(&self, node_id: &str, handle: &str) -> GraphResult<Graph> {
        self.extra_output_ref(node_id, handle)?;
        let mut next = self.clone();
        if let Some(extras) = next.require_mut(node_id)?.extra_outputs_mut() {
            extras.retain(|o| o.handle != handle);
        }
        next.remove_edges_where(|e| e.source == node_id && e.source_handle == handle);
        Ok(next)
    }

    /// Add a named port to an input, output or map output node. Input port
    /// names are reduced to identifier characters. The first named port of an
    /// output replaces its single unnamed input, so the wire into that is
    /// dropped. Returns the new handle.
    pub fn add_io_port(
        &self,
        node_id: &str,
        name: &str,
        ty: Option<TypeDescriptor>,
    ) -> GraphResult<(Graph, String)> {
        let node = self.require(node_id)?;
        let name = port_name(node, name, None)?;
        let handle = handle::new_handle();
        let sink = handle::sink_input(node_id);

        let mut next = self.clone();
        let ports = io_ports_mut(next.require_mut(node_id)?)?;
        let was_unnamed = ports.is_empty();
        ports.push(IoPort {
            name,
            handle: handle.clone(),
            ty,
        });
        if was_unnamed && node.kind() != NodeKind::Input {
            next.remove_edges_where(|e| e.target == node_id && e.target_handle == sink);
        }
        Ok((next, handle))
    }

    pub fn rename_io_port(&self, node_id: &str, handle: &str, name: &str) -> GraphResult<Graph> {
        let node = self.require(node_id)?;
        let name = port_name(node, name, Some(handle))?;
        let mut next = self.clone();
        let port = io_ports_mut(next.require_mut(node_id)?)?
            .iter_mut()
            .find(|p| p.handle == handle)
            .ok_or_else(|| GraphError::UnknownHandle {
                node: node_id.to_string(),
                handle: handle.to_string(),
            })?;
        port.name = name;
        Ok(next)
    }

    pub fn remove_io_port(&self, node_id: &str, handle: &str) -> GraphResult<Graph> {
        let mut next = self.clone();
        let ports = io_ports_mut(next.require_mut(node_id)?)?;
        let before = ports.len();
        ports.retain(|p| p.handle != handle);
        if ports.len() == before {
            return Err(GraphError::UnknownHandle {
                node: node_id.to_string(),
                handle: handle.to_string(),
            });
        }
        next.remove_edges_where(|e| {
            (e.source == node_id && e.source_handle == handle)
                || (e.target == node_id && e.target_handle == handle)
        });
        Ok(next)
    }

    /// Pin a function input to a literal value. The wire feeding that input,
    /// if any, is removed.
    pub fn pin_param(&self, node_id: &str, name: &str, value: Value) -> GraphResult<Graph> {
        let port = handle::function_input(node_id, name);
        let mut next = self.clone();
        let f = function_mut(next.require_mut(node_id)?)?;
        if !f.input.contains_key(name) {
            return Err(GraphError::UnknownHandle {
                node: node_id.to_string(),
                handle: port,
            });
        }
        f.params.insert(name.to_string(), value);
        next.remove_edges_where(|e| e.target_handle == port);
        Ok(next)
    }

    pub fn unpin_param(&self, node_id: &str, name: &str) -> GraphResult<Graph> {
        let mut next = self.clone();
        function_mut(next.require_mut(node_id)?)?.params.remove(name);
        Ok(next)
    }

    fn path_type(&self, node_id: &str, path: &str) -> GraphResult<TypeDescriptor> {
        let node = self.require(node_id)?;
        let primary = node
            .primary_output_type()
            .ok_or_else(|| GraphError::WrongKind {
                node: node_id.to_string(),
                kind: node.kind(),
                expected: "function or map_input",
            })?;
        enumerate(primary)
            .remove(path)
            .ok_or_else(|| GraphError::UnknownPath {
                node: node_id.to_string(),
                path: path.to_string(),
            })
    }

    fn extra_output_ref(&self, node_id: &str, handle: &str) -> GraphResult<&ExtraOutput> {
        self.require(node_id)?
            .extra_output(handle)
            .ok_or_else(|| GraphError::UnknownHandle {
                node: node_id.to_string(),
                handle: handle.to_string(),
            })
    }

    fn extra_output_mut(&mut self, node_id: &str, handle: &str) -> GraphResult<&mut ExtraOutput> {
        self.require_mut(node_id)?
            .extra_outputs_mut()
            .and_then(|extras| extras.iter_mut().find(|o| o.handle == handle))
            .ok_or_else(|| GraphError::UnknownHandle {
                node: node_id.to_string(),
                handle: handle.to_string(),
            })
    }

    /// Bind a map input to `item`, re-deriving its extra outputs. Extra
    /// outputs whose path no longer exists go away with their wires.
    fn rebind_map_input(&mut self, id: &str, item: TypeDescriptor) -> GraphResult<()> {
        let paths = enumerate(&item);
        let NodeBody::MapInput(map) = &mut self.require_mut(id)?.body else {
            return Ok(());
        };
        debug!(node = %id, item = %item, "bound map input");
        map.item = item;
        let mut dropped = BTreeSet::new();
        map.extra_outputs.retain_mut(|extra| match paths.get(&extra.path) {
            Some(ty) => {
                extra.ty = ty.clone();
                true
            }
            None => {
                dropped.insert(extra.handle.clone());
                false
            }
        });
        self.remove_edges_where(|e| e.source == id && dropped.contains(&e.source_handle));
        self.prune_rejected_from(id);
        Ok(())
    }

    /// Drop wires leaving `id` that the compatibility check now rejects.
    fn prune_rejected_from(&mut self, id: &str) {
        let rejected: Vec<Edge> = self
            .edges
            .iter()
            .filter(|e| e.source == id && !self.is_valid_connection(e))
            .cloned()
            .collect();
        if !rejected.is_empty() {
            self.remove_edges_where(|e| rejected.contains(e));
        }
    }

    /// Remove matching wires, unbinding every map input that loses its feed.
    fn remove_edges_where(&mut self, doomed: impl Fn(&Edge) -> bool) {
        let (removed, kept): (Vec<Edge>, Vec<Edge>) =
            std::mem::take(&mut self.edges).into_iter().partition(|e| doomed(e));
        self.edges = kept;

        let mut pending: Vec<String> = removed
            .iter()
            .filter_map(|e| self.fed_map_input(e))
            .collect();
        while let Some(id) = pending.pop() {
            if let Ok(node) = self.require_mut(&id) {
                if let NodeBody::MapInput(map) = &mut node.body {
                    *map = MapInputNode::default();
                }
            }
            debug!(node = %id, "unbound map input");
            let (leaving, kept): (Vec<Edge>, Vec<Edge>) = std::mem::take(&mut self.edges)
                .into_iter()
                .partition(|e| e.source == id);
            self.edges = kept;
            pending.extend(leaving.iter().filter_map(|e| self.fed_map_input(e)));
        }
    }

    /// Id of the map input whose item port `edge` feeds.
    fn fed_map_input(&self, edge: &Edge) -> Option<String> {
        let target = self.node(&edge.target)?;
        let feeds = target.kind() == NodeKind::MapInput
            && edge.target_handle == handle::function_input(&target.id, handle::MAP_ITEM);
        feeds.then(|| target.id.clone())
    }
}

fn io_ports_mut(node: &mut Node) -> GraphResult<&mut Vec<IoPort>> {
    let id = node.id.clone();
    let kind = node.kind();
    node.io_ports_mut().ok_or(GraphError::WrongKind {
        node: id,
        kind,
        expected: "input, output or map_output",
    })
}

fn function_mut(node: &mut Node) -> GraphResult<&mut FunctionNode> {
    let kind = node.kind();
    match &mut node.body {
        NodeBody::Function(f) => Ok(f),
        _ => Err(GraphError::WrongKind {
            node: node.id.clone(),
            kind,
            expected: "function",
        }),
    }
}

/// Normalized, unique port name. `renaming` is the handle of the port being
/// renamed, which may keep its own name.
fn port_name(node: &Node, name: &str, renaming: Option<&str>) -> GraphResult<String> {
    let name = match node.kind() {
        NodeKind::Input => Regex::new(r"[^A-Za-z0-9_]")?
            .replace_all(name.trim(), "_")
            .into_owned(),
        _ => name.trim().to_string(),
    };
    let taken = node
        .io_ports()
        .iter()
        .any(|p| p.name == name && Some(p.handle.as_str()) != renaming);
    if name.is_empty() || taken {
        return Err(GraphError::InvalidName(name));
    }
    Ok(name)
}

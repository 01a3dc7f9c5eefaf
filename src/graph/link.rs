//! Connection checks: may a wire run from one handle to another?

use super::handle;
use super::{Edge, Graph, Node, NodeBody};
use crate::types::{TypeDescriptor, is_compatible, is_map_source};

impl Graph {
    /// Type emitted at `handle` of `node`. An extra output reports its recorded
    /// sub-path type; undeclared pipeline inputs and map results are `any`.
    pub fn source_type(&self, node: &Node, handle: &str) -> Option<TypeDescriptor> {
        if let Some(extra) = node.extra_output(handle) {
            return Some(extra.ty.clone());
        }
        match &node.body {
            NodeBody::Function(_) | NodeBody::MapInput(_) => {
                if handle == handle::primary_output(&node.id) {
                    node.primary_output_type().cloned()
                } else {
                    None
                }
            }
            NodeBody::Input { inputs } => inputs
                .iter()
                .find(|p| p.handle == handle)
                .map(|p| p.ty.clone().unwrap_or_else(TypeDescriptor::any)),
            NodeBody::MapOutput { .. } => {
                (handle == handle::map_forward(&node.id)).then(TypeDescriptor::any)
            }
            NodeBody::Output { .. } | NodeBody::Group {} => None,
        }
    }

    /// Type accepted at `handle` of `node`. Output ports accept anything.
    pub fn target_type(&self, node: &Node, handle: &str) -> Option<TypeDescriptor> {
        match &node.body {
            NodeBody::Function(_) | NodeBody::MapInput(_) => {
                let name = handle::input_port_name(&node.id, handle)?;
                node.input_ports().remove(name)
            }
            NodeBody::Output { .. } | NodeBody::MapOutput { .. } => node
                .input_handles()
                .iter()
                .any(|h| h == handle)
                .then(TypeDescriptor::any),
            NodeBody::Input { .. } | NodeBody::Group {} => None,
        }
    }

    /// Compatibility check for a prospective wire. Never errors: an unknown
    /// node or handle simply rejects the wire.
    pub fn is_valid_connection(&self, edge: &Edge) -> bool {
        if edge.source == edge.target {
            return false;
        }
        let (Some(source), Some(target)) = (self.node(&edge.source), self.node(&edge.target))
        else {
            return false;
        };
        let Some(source_ty) = self.source_type(source, &edge.source_handle) else {
            return false;
        };

        if let NodeBody::MapInput(_) = target.body {
            return edge.target_handle == handle::function_input(&target.id, handle::MAP_ITEM)
                && is_map_source(&source_ty);
        }

        match self.target_type(target, &edge.target_handle) {
            Some(target_ty) => is_compatible(&source_ty, &target_ty),
            None => false,
        }
    }
}

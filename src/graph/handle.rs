//! Port handle naming.
//!
//! Fixed handles are derived from the node id:
//!   func-node-<id>-input.<name>   input port of a function or map input
//!   func-node-<id>-output         primary output of a function or map input
//!   <id>-output                   single input of an output node without named ports
//!   <id>-map-output               result of a group, emitted by its map output
//!
//! Ports the user adds (pipeline inputs, named outputs, extra outputs) get
//! generated handles.

use uuid::Uuid;

/// Name of the single input port of a map input node.
pub const MAP_ITEM: &str = "item";

pub fn function_input(node_id: &str, name: &str) -> String {
    format!("func-node-{node_id}-input.{name}")
}

pub fn primary_output(node_id: &str) -> String {
    format!("func-node-{node_id}-output")
}

pub fn sink_input(node_id: &str) -> String {
    format!("{node_id}-output")
}

pub fn map_forward(node_id: &str) -> String {
    format!("{node_id}-map-output")
}

/// Input port name encoded in a function input handle of `node_id`.
pub fn input_port_name<'a>(node_id: &str, handle: &'a str) -> Option<&'a str> {
    handle
        .strip_prefix("func-node-")?
        .strip_prefix(node_id)?
        .strip_prefix("-input.")
}

pub fn new_handle() -> String {
    Uuid::new_v4().to_string()
}

pub fn new_node_id() -> String {
    format!("dndnode_{}", Uuid::new_v4())
}

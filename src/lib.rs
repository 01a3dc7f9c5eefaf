//! Compiler from pipeline editor graphs to pipeline documents.
//!
//! - `types`: port type descriptors, compatibility, path enumeration
//! - `graph`: nodes, wires, groups and the edit transitions over them
//! - `compile`: graph -> nested pipeline document, plus document checks
//! - `catalog`: function records and the node templates built from them
//! - `store`: named graph snapshots on disk

pub mod catalog;
pub mod compile;
pub mod graph;
pub mod store;
pub mod types;

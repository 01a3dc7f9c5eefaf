//! Named graph snapshots kept in a directory.
//!
//! Layout:
//!   <dir>/pipelines.json   ordered list of slot names
//!   <dir>/<name>.json      {"nodes": [...], "edges": [...],
//!                           "viewport": {"x": 0, "y": 0, "zoom": 1}}

use crate::graph::{Edge, Graph, Node};

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

const INDEX_FILE: &str = "pipelines.json";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default = "default_zoom")]
    pub zoom: f64,
}

fn default_zoom() -> f64 {
    1.0
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            zoom: default_zoom(),
        }
    }
}

/// Everything needed to put the editor back where it was.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub viewport: Viewport,
}

impl Snapshot {
    pub fn new(graph: Graph, viewport: Viewport) -> Self {
        Self {
            nodes: graph.nodes,
            edges: graph.edges,
            viewport,
        }
    }

    pub fn graph(&self) -> Graph {
        Graph {
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SlotStore {
    dir: PathBuf,
}

impl SlotStore {
    /// Open (creating if needed) the store in `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating slot directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Slot names, oldest first.
    pub fn list(&self) -> anyhow::Result<Vec<String>> {
        let path = self.dir.join(INDEX_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let text = fs::read_to_string(&path)
            .with_context(|| format!("reading slot index {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("parsing slot index {}", path.display()))
    }

    /// Save under `name`, replacing an existing slot of that name.
    pub fn save(&self, name: &str, snapshot: &Snapshot) -> anyhow::Result<()> {
        let name = name.trim();
        let path = self.slot_path(name)?;
        let text = serde_json::to_string_pretty(snapshot)?;
        fs::write(&path, text).with_context(|| format!("writing slot {}", path.display()))?;

        let mut names = self.list()?;
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
        self.write_index(&names)?;
        info!(slot = name, "saved pipeline");
        Ok(())
    }

    pub fn restore(&self, name: &str) -> anyhow::Result<Snapshot> {
        let name = name.trim();
        let path = self.slot_path(name)?;
        if !path.exists() {
            bail!("no saved pipeline named {name:?}");
        }
        let text = fs::read_to_string(&path)
            .with_context(|| format!("reading slot {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing slot {}", path.display()))
    }

    pub fn delete(&self, name: &str) -> anyhow::Result<()> {
        let name = name.trim();
        let path = self.slot_path(name)?;
        let mut names = self.list()?;
        if !path.exists() && !names.iter().any(|n| n == name) {
            bail!("no saved pipeline named {name:?}");
        }
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("removing slot {}", path.display()))?;
        }
        names.retain(|n| n != name);
        self.write_index(&names)?;
        info!(slot = name, "deleted pipeline");
        Ok(())
    }

    fn write_index(&self, names: &[String]) -> anyhow::Result<()> {
        let path = self.dir.join(INDEX_FILE);
        fs::write(&path, serde_json::to_string(names)?)
            .with_context(|| format!("writing slot index {}", path.display()))
    }

    fn slot_path(&self, name: &str) -> anyhow::Result<PathBuf> {
        if name.is_empty() {
            bail!("pipeline name is required");
        }
        if name.contains(['/', '\\']) || name.starts_with('.') {
            bail!("invalid pipeline name {name:?}");
        }
        Ok(self.dir.join(format!("{name}.json")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeKind;
    use pretty_assertions::assert_eq;

    #[test]
    fn save_restore_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = SlotStore::open(dir.path()).unwrap();
        assert!(store.list().unwrap().is_empty());

        let graph = Graph::with_endpoints();
        let snapshot = Snapshot::new(
            graph.clone(),
            Viewport {
                x: 10.0,
                y: -4.5,
                zoom: 2.0,
            },
        );
        store.save("invoices", &snapshot).unwrap();
        store.save("receipts", &Snapshot::default()).unwrap();
        store.save("invoices", &snapshot).unwrap();
        assert_eq!(store.list().unwrap(), vec!["invoices", "receipts"]);

        let restored = store.restore("invoices").unwrap();
        assert_eq!(restored, snapshot);
        assert_eq!(restored.graph(), graph);
        assert!(restored.graph().top_level(NodeKind::Input).is_some());

        store.delete("invoices").unwrap();
        assert_eq!(store.list().unwrap(), vec!["receipts"]);
        assert!(store.restore("invoices").is_err());
        assert!(store.delete("invoices").is_err());
    }

    #[test]
    fn names_are_required() {
        let dir = tempfile::tempdir().unwrap();
        let store = SlotStore::open(dir.path()).unwrap();
        let err = store.save("  ", &Snapshot::default()).unwrap_err();
        assert_eq!(err.to_string(), "pipeline name is required");
        assert!(store.save("../escape", &Snapshot::default()).is_err());
    }

    #[test]
    fn missing_viewport_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SlotStore::open(dir.path()).unwrap();
        fs::write(dir.path().join("bare.json"), r#"{"nodes": [], "edges": []}"#).unwrap();
        let restored = store.restore("bare").unwrap();
        assert_eq!(restored.viewport, Viewport::default());
        assert_eq!(restored.viewport.zoom, 1.0);
    }
}

//! Memory-class configuration: which NUMA node is backed by which memory.
//!
//! The map is loaded once from a JSON document listing nodes and their memory
//! type. Two documents ship with the crate, one for the testing half and one
//! for the benchmarking half of the reference host; the `benchmark-host`
//! feature selects between them at compile time.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

use serde::Deserialize;

/// NUMA node identifier.
pub type NodeId = u32;

/// Memory class backing a NUMA node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum MemClass {
    #[serde(rename = "DRAM")]
    Dram,
    #[serde(rename = "HBM")]
    Hbm,
}

impl std::fmt::Display for MemClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemClass::Dram => write!(f, "DRAM"),
            MemClass::Hbm => write!(f, "HBM"),
        }
    }
}

/// Errors from loading or querying the memory-class map.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// No nodes in the map at all.
    #[error("memory configuration lists no NUMA nodes")]
    Empty,

    /// No node of the requested memory class.
    #[error("no NUMA node of memory class {0}")]
    NoSuchClass(MemClass),

    #[error("could not read memory configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not parse memory configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Deserialize)]
struct NodeEntry {
    node: NodeId,
    mem_type: MemClass,
}

#[derive(Deserialize)]
struct ConfigDoc {
    nodes: Vec<NodeEntry>,
}

/// Mapping from NUMA node id to the memory class backing it.
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    nodes: BTreeMap<NodeId, MemClass>,
}

static GLOBAL: OnceLock<MemoryConfig> = OnceLock::new();

#[cfg(not(feature = "benchmark-host"))]
const EMBEDDED_DOC: &str = include_str!("../configs/testing.json");
#[cfg(feature = "benchmark-host")]
const EMBEDDED_DOC: &str = include_str!("../configs/benchmarking.json");

impl MemoryConfig {
    /// Parse a document of the form
    /// `{ "nodes": [ { "node": 0, "mem_type": "DRAM" }, ... ] }`.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let doc: ConfigDoc = serde_json::from_str(json)?;
        let nodes = doc
            .nodes
            .into_iter()
            .map(|entry| (entry.node, entry.mem_type))
            .collect();
        Ok(Self { nodes })
    }

    /// Load a configuration document from a file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Build a map directly from `(node, class)` pairs.
    pub fn from_entries(entries: impl IntoIterator<Item = (NodeId, MemClass)>) -> Self {
        Self {
            nodes: entries.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Memory class of a node, if the node is listed.
    pub fn class_of(&self, node: NodeId) -> Option<MemClass> {
        self.nodes.get(&node).copied()
    }

    /// Smallest node id of the given memory class.
    pub fn first_node_of(&self, class: MemClass) -> Option<NodeId> {
        self.nodes
            .iter()
            .find(|(_, c)| **c == class)
            .map(|(node, _)| *node)
    }

    /// Smallest node id of any class. Fails when the map is empty.
    pub fn first_node(&self) -> Result<NodeId, ConfigError> {
        self.nodes
            .keys()
            .next()
            .copied()
            .ok_or(ConfigError::Empty)
    }

    /// Install `config` as the process-wide map. Returns `false` when a map
    /// was already installed (the existing one stays).
    pub fn install(config: MemoryConfig) -> bool {
        GLOBAL.set(config).is_ok()
    }

    /// The process-wide map. Falls back to the embedded document for the
    /// compiled host profile when nothing was installed.
    pub fn global() -> &'static MemoryConfig {
        GLOBAL.get_or_init(|| {
            MemoryConfig::from_json(EMBEDDED_DOC)
                .expect("embedded memory configuration is well-formed")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_minimal_doc() {
        let cfg = MemoryConfig::from_json(
            r#"{ "nodes": [ { "node": 0, "mem_type": "DRAM" }, { "node": 8, "mem_type": "HBM" } ] }"#,
        )
        .unwrap();
        assert_eq!(cfg.node_count(), 2);
        assert_eq!(cfg.class_of(0), Some(MemClass::Dram));
        assert_eq!(cfg.class_of(8), Some(MemClass::Hbm));
        assert_eq!(cfg.class_of(1), None);
    }

    #[test]
    fn test_first_node_is_smallest_of_class() {
        let cfg = MemoryConfig::from_entries([
            (9, MemClass::Hbm),
            (3, MemClass::Dram),
            (8, MemClass::Hbm),
            (1, MemClass::Dram),
        ]);
        assert_eq!(cfg.first_node_of(MemClass::Dram), Some(1));
        assert_eq!(cfg.first_node_of(MemClass::Hbm), Some(8));
        assert_eq!(cfg.first_node().unwrap(), 1);
    }

    #[test]
    fn test_empty_map_reports_empty() {
        let cfg = MemoryConfig::from_entries([]);
        assert!(cfg.is_empty());
        assert!(matches!(cfg.first_node(), Err(ConfigError::Empty)));
    }

    #[test]
    fn test_bad_mem_type_is_a_parse_error() {
        let err =
            MemoryConfig::from_json(r#"{ "nodes": [ { "node": 0, "mem_type": "MRAM" } ] }"#)
                .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "nodes": [ {{ "node": 2, "mem_type": "HBM" }} ] }}"#
        )
        .unwrap();
        let cfg = MemoryConfig::load(file.path()).unwrap();
        assert_eq!(cfg.first_node_of(MemClass::Hbm), Some(2));
    }

    #[test]
    fn test_embedded_doc_parses() {
        let cfg = MemoryConfig::from_json(EMBEDDED_DOC).unwrap();
        assert!(!cfg.is_empty());
        assert!(cfg.first_node_of(MemClass::Hbm).is_some());
    }
}

//! Access-pattern-driven NUMA placement.
//!
//! Linear scans want the bandwidth of HBM; random access wants the latency
//! of DRAM. The oracle only decides the node an allocation starts on, nothing
//! migrates afterwards.

use crate::mem_config::{ConfigError, MemClass, MemoryConfig, NodeId};

/// How the allocation will mostly be accessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessPattern {
    Linear,
    Random,
}

/// Predict the NUMA node to place an allocation on.
///
/// `Linear` prefers the first HBM node and silently falls back to the first
/// node of any class when the host has no HBM. `Random` (and no hint) wants
/// the first DRAM node and fails with [`ConfigError::NoSuchClass`] when there
/// is none. An empty map always fails with [`ConfigError::Empty`].
pub fn predict(
    pattern: Option<AccessPattern>,
    config: &MemoryConfig,
) -> Result<NodeId, ConfigError> {
    if config.is_empty() {
        return Err(ConfigError::Empty);
    }
    match pattern {
        Some(AccessPattern::Linear) => match config.first_node_of(MemClass::Hbm) {
            Some(node) => Ok(node),
            None => config.first_node(),
        },
        Some(AccessPattern::Random) | None => config
            .first_node_of(MemClass::Dram)
            .ok_or(ConfigError::NoSuchClass(MemClass::Dram)),
    }
}

//! CPU pinning ranges for the Xeon Max reference host.
//!
//! Eight sockets, 12 physical CPUs per node, hyperthread siblings at
//! `cpus_per_node * (8 * h + node)` for `h` in 0..=1. The testing half of
//! the machine is nodes 0..=3, the benchmarking half nodes 4..=7; each node
//! contributes two sub-ranges (physical CPUs, then hyperthreads). This id
//! layout is not observed on all architectures.

use memforge_primitives::cpu_range::{CpuRange, SubRange};

pub const CPUS_PER_NODE: usize = 12;
pub const EXEC_NODES: usize = 8;

/// The two CPU-id sub-ranges (physical + hyperthread) of one node.
pub fn node_ranges(node: usize) -> CpuRange {
    (0..=1)
        .map(|hyperthread| {
            let numbered = hyperthread * EXEC_NODES + node;
            SubRange::new(CPUS_PER_NODE * numbered, CPUS_PER_NODE * (numbered + 1))
        })
        .collect()
}

/// Pinning ranges of the testing half (nodes 0..=3).
pub fn testing_ranges() -> CpuRange {
    (0..=3).flat_map(node_ranges).collect()
}

/// Pinning ranges of the benchmarking half (nodes 4..=7).
pub fn benchmarking_ranges() -> CpuRange {
    (4..=7).flat_map(node_ranges).collect()
}

/// The ranges for the compiled host profile.
pub fn active_ranges() -> CpuRange {
    if cfg!(feature = "benchmark-host") {
        benchmarking_ranges()
    } else {
        testing_ranges()
    }
}

/// Whether this host exposes every CPU id the range wants to pin to.
pub fn host_covers(range: &[SubRange]) -> bool {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    range.iter().all(|sub| sub.hi <= cpus)
}

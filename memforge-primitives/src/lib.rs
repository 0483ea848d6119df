//! memforge-primitives: the low-level fabric of the query runtime.
//!
//! Provides the memory-class map and placement oracle that decide which NUMA
//! node an allocation lands on, the segment-tiled shared buffer [`SegPtr`]
//! that every column lives in, CPU-id range utilities for thread pinning,
//! and the stopwatches the runtime brackets its workers with.

pub mod alloc;
pub mod cpu_range;
pub mod mem_config;
pub mod placement;
pub mod seg_ptr;
pub mod timing;

pub use alloc::AllocError;
pub use cpu_range::{CpuRange, PinError, SubRange};
pub use mem_config::{ConfigError, MemClass, MemoryConfig, NodeId};
pub use placement::AccessPattern;
pub use seg_ptr::{vmalloc, vmalloc_with_pattern, MemError, SegElem, SegPtr};
pub use timing::{DoubleCallPolicy, SharedStopWatch, StopWatch, TimeUnit};

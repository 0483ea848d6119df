//! memforge-runtime: fan a function out over a group of pinned workers.
//!
//! A [`ThreadGroup`] runs one function on N OS threads. Arguments marked
//! [`Split`] are cut into per-worker slivers along segment boundaries;
//! everything else is [`Replicate`]d by value. Workers block on a one-shot
//! start signal, bracket the call with group/worker stopwatches, and the last
//! worker joins its siblings so a caller only ever joins one handle per
//! group. The [`ThreadManager`] names groups, pins them to CPU ranges, and
//! runs subsets.

pub mod group;
pub mod manager;

pub use group::{
    FanOut, GroupJoin, Replicate, RuntimeError, Split, Splittable, ThreadGroup, Timing,
};
pub use manager::{PinPolicy, ThreadManager};

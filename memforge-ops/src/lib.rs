//! memforge-ops: the per-segment column operators the query pipeline is
//! assembled from.
//!
//! Every operator touches exactly one segment's worth of elements per call;
//! pairing of operand segments is positional, which is what makes the
//! operators safe to run on disjoint slivers without synchronization.

pub mod arithmetic;
pub mod filter;
pub mod materialize;
pub mod semi_join;

pub use arithmetic::{multiply_segment, reduce_add_segment};
pub use filter::filter_lt_segment;
pub use materialize::materialize_segment;
pub use semi_join::{SemiJoinBuilder, SemiJoinProber};

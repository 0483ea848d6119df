//! memforge-query: the fixed analytical pipeline over columnar tables.
//!
//! Joins table R (two value columns and a foreign key) against table S (one
//! primary key column) as a hash semi-join, materializes the surviving rows,
//! multiplies the value columns element-wise, and reduces the products to a
//! single sum. Every parallel stage is a thread group over segment-aligned
//! slivers; the scalar glue (offset prefix sum, size reconciliation, final
//! sum) runs on the driver thread in between.

pub mod checksum;
pub mod datagen;
pub mod pinning;
pub mod pipeline;
pub mod stages;
pub mod tables;

pub use checksum::checksum;
pub use datagen::DataGenerator;
pub use pipeline::{run_query, QueryError, QueryOutcome};
pub use tables::{TableR, TableS};

//! The pipeline stage functions: segment loops over the operators.
//!
//! Each function works on whatever window it is handed. The driver calls
//! [`build`] on full columns; the thread groups call the others on slivers,
//! where positionally paired slivers describe the same rows.

use memforge_ops::{
    materialize_segment, multiply_segment, reduce_add_segment, SemiJoinBuilder, SemiJoinProber,
};

use crate::tables::{DataColumn, KeyColumn, LengthColumn, PartialColumn, PositionColumn, SlotColumn};

/// Populate the semi-join table from the primary key column. Sequential:
/// the open-addressing build is single-writer.
pub fn build(keys: &mut KeyColumn, used: &mut SlotColumn, pk: &KeyColumn) {
    let mut builder = SemiJoinBuilder::new(keys.as_mut_slice(), used.as_mut_slice());
    for seg in 0..pk.segment_count() {
        builder.build_segment(pk.segment(seg));
    }
}

/// Probe every foreign-key segment against the table, recording matched
/// row indices and the per-segment match count.
pub fn probe(
    keys: KeyColumn,
    used: SlotColumn,
    fk: KeyColumn,
    mut positions: PositionColumn,
    mut lengths: LengthColumn,
) {
    let prober = SemiJoinProber::new(keys.as_slice(), used.as_slice());
    for seg in 0..fk.segment_count() {
        let matched = prober.probe_segment(positions.segment_mut(seg), fk.segment(seg));
        lengths.segment_mut(seg)[0] = matched;
    }
}

/// Gather each segment's matched values into the dense output column,
/// starting at that segment's global write offset.
pub fn materialize(
    mut result: DataColumn,
    data: DataColumn,
    positions: PositionColumn,
    offsets: LengthColumn,
    lengths: LengthColumn,
) {
    for seg in 0..positions.segment_count() {
        let count = lengths.segment(seg)[0];
        if count == 0 {
            continue;
        }
        let offset = offsets.segment(seg)[0];
        let out = result.range_mut(offset, count);
        materialize_segment(out, data.segment(seg), positions.segment(seg), count);
    }
}

/// Element-wise product of two value columns.
pub fn multiply(mut out: DataColumn, a: DataColumn, b: DataColumn) {
    for seg in 0..a.segment_count() {
        multiply_segment(out.segment_mut(seg), a.segment(seg), b.segment(seg));
    }
}

/// One partial sum per segment of the product column.
pub fn reduce_add(mut out: PartialColumn, data: DataColumn) {
    for seg in 0..data.segment_count() {
        out.segment_mut(seg)[0] = reduce_add_segment(data.segment(seg));
    }
}

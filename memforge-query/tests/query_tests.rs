//! End-to-end pipeline tests at reduced scale, plus sequential stage-level
//! checks of the probe/offset/materialize contract.

use memforge_primitives::placement::AccessPattern;
use memforge_primitives::seg_ptr::vmalloc_with_pattern;
use memforge_query::checksum::checksum;
use memforge_query::datagen::DataGenerator;
use memforge_query::pipeline::run_query;
use memforge_query::stages;
use memforge_query::tables::{
    DataColumn, KeyColumn, LengthColumn, PositionColumn, SlotColumn, TableR, TableS, COL_SEG,
};
use memforge_runtime::PinPolicy;

/// Rows per segment shared by all column kinds.
const ROWS_PER_SEG: usize = COL_SEG / std::mem::size_of::<i64>();

fn make_tables(rows: usize, keys: usize, fk_span: u32, seed: u64) -> (TableR, TableS) {
    let mut r = TableR::allocate(rows).unwrap();
    let mut s = TableS::allocate(keys).unwrap();
    let mut datagen = DataGenerator::new(seed);
    datagen.basic_uniform_i64(r.a.as_mut_slice(), 1, 10_000);
    datagen.basic_uniform_i64(r.b.as_mut_slice(), 1, 10_000);
    datagen.basic_uniform_u32(r.fk.as_mut_slice(), 0, fk_span);
    if keys > 0 {
        datagen.id_u32(s.pk.as_mut_slice());
    }
    (r, s)
}

#[test]
fn test_full_query_matches_reference_checksum() {
    let (r, s) = make_tables(64 * 1024, 256, 768, 42);
    let outcome = run_query(&r, &s, 4, PinPolicy::Manual, vec![]).unwrap();
    assert_eq!(outcome.final_sum, checksum(&r, &s));

    // Roughly a third of the foreign keys fall into the identity key range.
    let expected_rows = r
        .fk
        .as_slice()
        .iter()
        .filter(|&&fk| (fk as usize) < s.rows)
        .count();
    assert_eq!(outcome.matched_rows, expected_rows);
}

#[test]
fn test_full_query_with_ragged_tail_segment() {
    // 1000 rows: one full segment and a short one.
    let (r, s) = make_tables(1000, 64, 192, 7);
    let outcome = run_query(&r, &s, 3, PinPolicy::Manual, vec![]).unwrap();
    assert_eq!(outcome.final_sum, checksum(&r, &s));
}

#[test]
fn test_full_query_every_row_matches() {
    // All foreign keys inside the identity key range.
    let (r, s) = make_tables(8 * 1024, 512, 512, 3);
    let outcome = run_query(&r, &s, 4, PinPolicy::Manual, vec![]).unwrap();
    assert_eq!(outcome.matched_rows, r.rows);
    assert_eq!(outcome.final_sum, checksum(&r, &s));
}

#[test]
fn test_probe_into_empty_table() {
    let (r, s) = make_tables(4 * 1024, 0, 1024, 11);
    let outcome = run_query(&r, &s, 2, PinPolicy::Manual, vec![]).unwrap();
    assert_eq!(outcome.matched_rows, 0);
    assert_eq!(outcome.final_sum, 0);
    assert_eq!(checksum(&r, &s), 0);
}

#[test]
fn test_single_worker_pipeline() {
    let (r, s) = make_tables(4 * 1024, 128, 384, 5);
    let outcome = run_query(&r, &s, 1, PinPolicy::Manual, vec![]).unwrap();
    assert_eq!(outcome.final_sum, checksum(&r, &s));
}

#[test]
fn test_probe_emits_positions_and_lengths() {
    // pk = {0,1,2,3}, fk = {0,5,2,9,1}: rows 0, 2, 4 match.
    let mut r = TableR::allocate(5).unwrap();
    let mut s = TableS::allocate(4).unwrap();
    for (i, v) in [0u32, 5, 2, 9, 1].into_iter().enumerate() {
        r.fk[i] = v;
    }
    for i in 0..4 {
        s.pk[i] = i as u32;
    }

    let mut keys: KeyColumn = vmalloc_with_pattern(8, AccessPattern::Linear).unwrap();
    let mut used: SlotColumn = vmalloc_with_pattern(8, AccessPattern::Linear).unwrap();
    stages::build(&mut keys, &mut used, &s.pk);

    let positions: PositionColumn = vmalloc_with_pattern(5, AccessPattern::Linear).unwrap();
    let lengths: LengthColumn = vmalloc_with_pattern(1, AccessPattern::Linear).unwrap();
    stages::probe(
        keys,
        used,
        r.fk.clone(),
        positions.clone(),
        lengths.clone(),
    );

    assert_eq!(lengths[0], 3);
    assert_eq!(&positions.as_slice()[..3], &[0, 2, 4]);
}

#[test]
fn test_materialized_columns_gather_the_matched_rows() {
    let (r, s) = make_tables(4 * 1024, 128, 384, 13);

    let table_slots = 2 * s.rows;
    let mut keys: KeyColumn = vmalloc_with_pattern(table_slots, AccessPattern::Linear).unwrap();
    let mut used: SlotColumn = vmalloc_with_pattern(table_slots, AccessPattern::Linear).unwrap();
    stages::build(&mut keys, &mut used, &s.pk);

    let positions: PositionColumn =
        vmalloc_with_pattern(r.fk.len(), AccessPattern::Linear).unwrap();
    let lengths: LengthColumn =
        vmalloc_with_pattern(r.fk.segment_count(), AccessPattern::Linear).unwrap();
    stages::probe(
        keys,
        used,
        r.fk.clone(),
        positions.clone(),
        lengths.clone(),
    );

    let mut mat_offset: LengthColumn =
        vmalloc_with_pattern(r.fk.segment_count(), AccessPattern::Linear).unwrap();
    let mut total = 0usize;
    for seg in 0..lengths.segment_count() {
        mat_offset[seg] = total;
        total += lengths[seg];
    }

    let joint_a: DataColumn = vmalloc_with_pattern(r.rows, AccessPattern::Linear).unwrap();
    stages::materialize(
        joint_a.clone(),
        r.a.clone(),
        positions.clone(),
        mat_offset.clone(),
        lengths.clone(),
    );

    // Every dense slot holds the R value the position list named.
    let mut k = 0;
    for seg in 0..r.fk.segment_count() {
        let seg_base = seg * ROWS_PER_SEG;
        for j in 0..lengths[seg] {
            let row = seg_base + positions[seg_base + j];
            assert_eq!(joint_a[k], r.a[row], "dense slot {k}");
            k += 1;
        }
    }
    assert_eq!(k, total);
}

//! The fixed five-stage query plan.
//!
//! All five thread groups are created (and under automatic policy pinned)
//! up front, so every group's slivers are cut over the full column extents
//! and positionally paired slivers stay aligned across stages. The columns
//! materialization only partially fills are zero-initialized by allocation,
//! so the tail beyond the matched row count contributes nothing to the
//! multiply and reduce stages.

use memforge_primitives::cpu_range::CpuRange;
use memforge_primitives::placement::AccessPattern;
use memforge_primitives::seg_ptr::{vmalloc_with_pattern, MemError};
use memforge_primitives::timing::{StopWatch, TimeUnit};
use memforge_runtime::{PinPolicy, Replicate, RuntimeError, Split, ThreadManager, Timing};

use crate::stages;
use crate::tables::{
    DataColumn, KeyColumn, LengthColumn, PartialColumn, PositionColumn, SlotColumn, TableR, TableS,
};

/// Result of one pipeline execution.
#[derive(Debug, Clone, Copy)]
pub struct QueryOutcome {
    /// Sum produced by the parallel pipeline.
    pub final_sum: i64,
    /// Number of R rows that survived the semi-join.
    pub matched_rows: usize,
    /// Wall-clock seconds spent in the measured sections.
    pub seconds: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error(transparent)]
    Mem(#[from] MemError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

struct Section {
    name: &'static str,
    bytes: usize,
    secs: f64,
}

/// Stopwatch plus the per-section byte counts for the throughput table.
struct SectionTimes {
    watch: StopWatch,
    sections: Vec<Section>,
}

impl SectionTimes {
    fn new() -> Self {
        Self {
            watch: StopWatch::new(),
            sections: Vec::new(),
        }
    }

    fn measure<R>(&mut self, name: &'static str, bytes: usize, f: impl FnOnce() -> R) -> R {
        self.watch.start();
        let result = f();
        self.watch.stop();
        let secs = self.watch.durations(TimeUnit::Secs).pop().unwrap_or(0.0);
        self.sections.push(Section { name, bytes, secs });
        result
    }

    fn print(&self) {
        println!("Sections:");
        for section in &self.sections {
            let throughput = section.bytes as f64 / (1u64 << 30) as f64 / section.secs;
            println!(
                "section {:>30}: {:12.8} s -> {:8.3} GiB/s",
                section.name, section.secs, throughput
            );
        }
    }

    fn total_secs(&self) -> f64 {
        self.watch.duration_sum(TimeUnit::Secs)
    }
}

const WORD: usize = std::mem::size_of::<usize>();

/// Execute the pipeline with `workers` threads per group.
///
/// Build -> probe -> offset prefix sum -> materialize A/B (concurrent) ->
/// size reconciliation -> multiply -> reduce -> final sum. Prints the
/// section throughput table and the manager's timing report.
pub fn run_query(
    r: &TableR,
    s: &TableS,
    workers: usize,
    pin_policy: PinPolicy,
    pin_range: CpuRange,
) -> Result<QueryOutcome, QueryError> {
    // Intermediates, all placed for linear access. The semi-join table gets
    // twice the key count (never less than one slot) so linear probing
    // always terminates.
    let table_slots = (2 * s.rows).max(1);
    let mut keys: KeyColumn = vmalloc_with_pattern(table_slots, AccessPattern::Linear)?;
    let mut used: SlotColumn = vmalloc_with_pattern(table_slots, AccessPattern::Linear)?;

    let positions: PositionColumn = vmalloc_with_pattern(r.fk.len(), AccessPattern::Linear)?;
    let lengths: LengthColumn =
        vmalloc_with_pattern(r.fk.segment_count(), AccessPattern::Linear)?;
    let mut mat_offset: LengthColumn =
        vmalloc_with_pattern(r.fk.segment_count(), AccessPattern::Linear)?;

    let mut joint_a: DataColumn = vmalloc_with_pattern(r.rows, AccessPattern::Linear)?;
    let mut joint_b: DataColumn = vmalloc_with_pattern(r.rows, AccessPattern::Linear)?;
    let mut column_a_times_b: DataColumn = vmalloc_with_pattern(r.rows, AccessPattern::Linear)?;
    let reduced_ab: PartialColumn =
        vmalloc_with_pattern(r.a.segment_count(), AccessPattern::Linear)?;

    let mut tm = ThreadManager::new(pin_policy, pin_range);

    tm.create_group(
        "prober_group",
        workers,
        Timing::GROUP,
        (
            Replicate(keys.clone()),
            Replicate(used.clone()),
            Split(r.fk.clone()),
            Split(positions.clone()),
            Split(lengths.clone()),
        ),
        |(keys, used, fk, positions, lengths)| stages::probe(keys, used, fk, positions, lengths),
    )?;

    tm.create_group(
        "materialize_a",
        workers,
        Timing::GROUP,
        (
            Replicate(joint_a.clone()),
            Split(r.a.clone()),
            Split(positions.clone()),
            Split(mat_offset.clone()),
            Split(lengths.clone()),
        ),
        |(result, data, positions, offsets, lengths)| {
            stages::materialize(result, data, positions, offsets, lengths)
        },
    )?;

    tm.create_group(
        "materialize_b",
        workers,
        Timing::GROUP,
        (
            Replicate(joint_b.clone()),
            Split(r.b.clone()),
            Split(positions.clone()),
            Split(mat_offset.clone()),
            Split(lengths.clone()),
        ),
        |(result, data, positions, offsets, lengths)| {
            stages::materialize(result, data, positions, offsets, lengths)
        },
    )?;

    tm.create_group(
        "multiply",
        workers,
        Timing::GROUP,
        (
            Split(column_a_times_b.clone()),
            Split(joint_a.clone()),
            Split(joint_b.clone()),
        ),
        |(out, a, b)| stages::multiply(out, a, b),
    )?;

    tm.create_group(
        "reduce_add",
        workers,
        Timing::GROUP,
        (Split(reduced_ab.clone()), Split(column_a_times_b.clone())),
        |(out, data)| stages::reduce_add(out, data),
    )?;

    let mut sections = SectionTimes::new();

    sections.measure(
        "build_intermediate_join_buffer",
        3 * s.rows * std::mem::size_of::<u64>(),
        || stages::build(&mut keys, &mut used, &s.pk),
    );

    sections.measure(
        "prober_group",
        r.rows * std::mem::size_of::<u32>() + 3 * s.rows * std::mem::size_of::<u64>(),
        || tm.run(&["prober_group"]),
    )?;

    // Per-segment match counts become per-segment write offsets. Sequential:
    // the running sum orders the segments, and it gates materialization.
    let mut total = 0usize;
    sections.measure("mat_offset", lengths.segment_count() * WORD, || {
        for seg in 0..lengths.segment_count() {
            mat_offset[seg] = total;
            total += lengths.segment(seg)[0];
        }
    });

    sections.measure(
        "materialize_a_and_b",
        2 * (r.rows * std::mem::size_of::<i64>()
            + (lengths.len() + positions.len() + lengths.segment_count()) * WORD),
        || tm.run(&["materialize_a", "materialize_b"]),
    )?;

    // The dense columns now have a known row count.
    sections.measure("manipulate_size", 3 * WORD, || {
        joint_a.resize_view(total);
        joint_b.resize_view(total);
        column_a_times_b.resize_view(total);
    });

    sections.measure("multiply", 2 * r.rows * std::mem::size_of::<i64>(), || {
        tm.run(&["multiply"])
    })?;

    sections.measure("reduce_add", r.rows * std::mem::size_of::<i64>(), || {
        tm.run(&["reduce_add"])
    })?;

    let mut final_sum = 0i64;
    sections.measure(
        "final_sum",
        reduced_ab.segment_count() * std::mem::size_of::<i64>(),
        || {
            for seg in 0..reduced_ab.segment_count() {
                final_sum = final_sum.wrapping_add(reduced_ab.segment(seg)[0]);
            }
        },
    );

    sections.print();
    tm.report();

    Ok(QueryOutcome {
        final_sum,
        matched_rows: total,
        seconds: sections.total_secs(),
    })
}

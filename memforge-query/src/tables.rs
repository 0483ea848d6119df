//! Column layouts of the two relations.
//!
//! Segment sizes are chosen so every column kind carries the same number of
//! rows per segment (512): positionally paired segments of different columns
//! then describe the same rows, which is what the per-segment operators
//! assume.

use memforge_primitives::placement::AccessPattern;
use memforge_primitives::seg_ptr::{vmalloc_with_pattern, MemError, SegPtr};

/// Segment size of 8-byte data columns (512 rows per segment).
pub const COL_SEG: usize = 4096;
/// Segment size of 4-byte key columns (512 rows per segment).
pub const KEY_SEG: usize = 2048;
/// Segment size of per-segment scalar columns (one value per segment).
pub const SCALAR_SEG: usize = 8;

const _: () = assert!(
    COL_SEG / std::mem::size_of::<i64>() == KEY_SEG / std::mem::size_of::<u32>(),
    "data and key columns must agree on rows per segment"
);
const _: () = assert!(
    std::mem::size_of::<usize>() == 8,
    "per-segment scalar columns assume a 64-bit target"
);

/// 8-byte value column.
pub type DataColumn = SegPtr<i64, COL_SEG>;
/// 4-byte key column.
pub type KeyColumn = SegPtr<u32, KEY_SEG>;
/// Occupancy words of the semi-join table.
pub type SlotColumn = SegPtr<u64, COL_SEG>;
/// Segment-local row indices of matched rows.
pub type PositionColumn = SegPtr<usize, COL_SEG>;
/// One per-segment count or offset per segment of the probed column.
pub type LengthColumn = SegPtr<usize, SCALAR_SEG>;
/// One per-segment partial sum per segment of the reduced column.
pub type PartialColumn = SegPtr<i64, SCALAR_SEG>;

/// The fact-side relation: two value columns and a foreign key into S.
pub struct TableR {
    pub a: DataColumn,
    pub b: DataColumn,
    pub fk: KeyColumn,
    pub rows: usize,
}

impl TableR {
    /// Allocate all three columns, placed for linear scans.
    pub fn allocate(rows: usize) -> Result<Self, MemError> {
        Ok(Self {
            a: vmalloc_with_pattern(rows, AccessPattern::Linear)?,
            b: vmalloc_with_pattern(rows, AccessPattern::Linear)?,
            fk: vmalloc_with_pattern(rows, AccessPattern::Linear)?,
            rows,
        })
    }
}

/// The key-side relation: one primary key column.
pub struct TableS {
    pub pk: KeyColumn,
    pub rows: usize,
}

impl TableS {
    /// Allocate the key column, placed for linear scans. An empty relation
    /// keeps a one-element backing buffer with a zero-length view.
    pub fn allocate(rows: usize) -> Result<Self, MemError> {
        let mut pk: KeyColumn = vmalloc_with_pattern(rows.max(1), AccessPattern::Linear)?;
        if rows == 0 {
            pk.resize_view(0);
        }
        Ok(Self { pk, rows })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_counts_per_segment_line_up() {
        let r = TableR::allocate(4096).unwrap();
        assert_eq!(r.a.segment_count(), r.fk.segment_count());
        assert_eq!(r.a.segment(0).len(), r.fk.segment(0).len());
    }

    #[test]
    fn test_empty_table_s_has_no_segments() {
        let s = TableS::allocate(0).unwrap();
        assert_eq!(s.pk.len(), 0);
        assert_eq!(s.pk.segment_count(), 0);
    }
}

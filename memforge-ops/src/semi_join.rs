//! Hash semi-join: open-addressing build over the right side's keys,
//! per-segment probes over the left side's foreign keys.
//!
//! The table is two parallel arrays: `keys[slot]` and a one-word occupancy
//! flag `used[slot]`. Insertion probes linearly from `hash(key) % capacity`;
//! there are no deletions, and the build contract (capacity at least twice
//! the number of distinct keys) guarantees both insertion and probing
//! terminate.

/// Murmur3 32-bit finalizer. Full avalanche, no lookup tables.
#[inline]
fn hash_key(key: u32) -> u32 {
    let mut h = key;
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h
}

/// Single-writer build phase of the semi-join table.
pub struct SemiJoinBuilder<'a> {
    keys: &'a mut [u32],
    used: &'a mut [u64],
}

impl<'a> SemiJoinBuilder<'a> {
    /// Wrap the (zeroed) table arrays. `keys` and `used` have one slot each
    /// per table slot.
    pub fn new(keys: &'a mut [u32], used: &'a mut [u64]) -> Self {
        assert_eq!(keys.len(), used.len(), "table arrays differ in slot count");
        assert!(!keys.is_empty(), "semi-join table needs at least one slot");
        Self { keys, used }
    }

    /// Insert one key. Duplicates collapse onto the existing slot.
    pub fn insert(&mut self, key: u32) {
        let capacity = self.keys.len();
        let mut slot = hash_key(key) as usize % capacity;
        loop {
            if self.used[slot] == 0 {
                self.keys[slot] = key;
                self.used[slot] = 1;
                return;
            }
            if self.keys[slot] == key {
                return;
            }
            slot = (slot + 1) % capacity;
        }
    }

    /// Insert one segment of build-side keys.
    pub fn build_segment(&mut self, keys: &[u32]) {
        for &key in keys {
            self.insert(key);
        }
    }
}

/// Read-only probe phase over a built table.
pub struct SemiJoinProber<'a> {
    keys: &'a [u32],
    used: &'a [u64],
}

impl<'a> SemiJoinProber<'a> {
    pub fn new(keys: &'a [u32], used: &'a [u64]) -> Self {
        assert_eq!(keys.len(), used.len(), "table arrays differ in slot count");
        assert!(!keys.is_empty(), "semi-join table needs at least one slot");
        Self { keys, used }
    }

    /// Whether `key` was inserted during build.
    pub fn contains(&self, key: u32) -> bool {
        let capacity = self.keys.len();
        let mut slot = hash_key(key) as usize % capacity;
        loop {
            if self.used[slot] == 0 {
                return false;
            }
            if self.keys[slot] == key {
                return true;
            }
            slot = (slot + 1) % capacity;
        }
    }

    /// Probe one segment of foreign keys. Writes the segment-local row index
    /// of every matching row into `positions`, in row order, and returns the
    /// match count. Semi-join semantics: absent keys emit nothing.
    pub fn probe_segment(&self, positions: &mut [usize], fk: &[u32]) -> usize {
        let mut matched = 0;
        for (row, &key) in fk.iter().enumerate() {
            if self.contains(key) {
                positions[matched] = row;
                matched += 1;
            }
        }
        matched
    }
}

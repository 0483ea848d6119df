//! CPU-id ranges and thread pinning.
//!
//! A range is an ordered list of `[lo, hi)` sub-ranges, each optionally
//! reversed. Worker indices map onto the range in order, wrapping modulo its
//! total length, so a range can carry fewer CPUs than there are workers.

use std::fmt;

/// One `[lo, hi)` span of CPU ids, handed out forward or back-to-front.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubRange {
    pub lo: usize,
    pub hi: usize,
    pub reversed: bool,
}

impl SubRange {
    /// Forward sub-range `[lo, hi)`.
    pub fn new(lo: usize, hi: usize) -> Self {
        assert!(lo < hi, "empty CPU sub-range [{lo}, {hi})");
        Self { lo, hi, reversed: false }
    }

    /// Reversed sub-range: indices map from `hi - 1` down to `lo`.
    pub fn reversed(lo: usize, hi: usize) -> Self {
        assert!(lo < hi, "empty CPU sub-range [{lo}, {hi})");
        Self { lo, hi, reversed: true }
    }

    pub fn len(&self) -> usize {
        self.hi - self.lo
    }
}

impl fmt::Display for SubRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reversed {
            write!(f, "({}..{}]", self.hi, self.lo)
        } else {
            write!(f, "[{}..{})", self.lo, self.hi)
        }
    }
}

/// An ordered list of sub-ranges.
pub type CpuRange = Vec<SubRange>;

/// Total number of CPU ids covered by `range`.
pub fn total_cpus(range: &[SubRange]) -> usize {
    range.iter().map(|r| r.len()).sum()
}

/// The CPU id the `index`-th worker lands on.
///
/// Walks sub-ranges in order, consuming their lengths from `index`; indices
/// beyond the total wrap around modulo the total. Within a reversed
/// sub-range the offset is mirrored.
pub fn cpu_id_at(index: usize, range: &[SubRange]) -> usize {
    assert!(!range.is_empty(), "empty CPU range");
    let mut remaining = index;
    let mut i = 0;
    let mut sub_len = range[0].len();
    while sub_len <= remaining {
        remaining -= sub_len;
        i = (i + 1) % range.len();
        sub_len = range[i].len();
    }
    let offset = if range[i].reversed {
        sub_len - 1 - remaining
    } else {
        remaining
    };
    range[i].lo + offset
}

/// Errors from the affinity syscall.
#[derive(Debug, thiserror::Error)]
#[error("failed to pin thread to cpu {cpu} (errno {errno})")]
pub struct PinError {
    pub cpu: usize,
    pub errno: i32,
}

/// Pin the thread behind `handle` to a single CPU.
#[cfg(target_os = "linux")]
pub fn pin_thread(handle: libc::pthread_t, cpu: usize) -> Result<(), PinError> {
    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        libc::CPU_SET(cpu, &mut set);
        let rc = libc::pthread_setaffinity_np(handle, std::mem::size_of::<libc::cpu_set_t>(), &set);
        if rc != 0 {
            return Err(PinError { cpu, errno: rc });
        }
    }
    tracing::trace!(cpu, "pinned thread");
    Ok(())
}

/// Affinity is unavailable off Linux; the id assignment is still computed
/// and reported so group placement stays observable.
#[cfg(not(target_os = "linux"))]
pub fn pin_thread(_handle: libc::pthread_t, cpu: usize) -> Result<(), PinError> {
    tracing::debug!(cpu, "thread pinning unsupported on this platform");
    Ok(())
}

/// Pin the thread to the `index`-th CPU of `range`; returns the CPU id used.
pub fn pin_thread_in_range(
    handle: libc::pthread_t,
    index: usize,
    range: &[SubRange],
) -> Result<usize, PinError> {
    let cpu = cpu_id_at(index, range);
    pin_thread(handle, cpu)?;
    Ok(cpu)
}

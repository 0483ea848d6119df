//! Segment-tiled shared buffers placed on a predicted NUMA node.
//!
//! A [`SegPtr<T, S>`] is a window over a shared allocation, tiled into
//! segments of `S` bytes. Segments are the unit of vectorized work: operators
//! own one segment at a time, and [`SegPtr::split`] hands disjoint
//! segment-aligned sub-windows (slivers) to workers without copying or
//! transferring ownership of the backing memory. The allocation is released
//! when the last window over it goes away.

use std::ops::{Index, IndexMut};
use std::sync::Arc;

use crate::alloc::{AllocError, RawRegion};
use crate::mem_config::{ConfigError, MemoryConfig, NodeId};
use crate::placement::{self, AccessPattern};

mod private {
    pub trait Sealed {}
    impl Sealed for u8 {}
    impl Sealed for i8 {}
    impl Sealed for u16 {}
    impl Sealed for i16 {}
    impl Sealed for u32 {}
    impl Sealed for i32 {}
    impl Sealed for u64 {}
    impl Sealed for i64 {}
    impl Sealed for usize {}
    impl Sealed for isize {}
}

/// Element types a segmented pointer may carry.
/// Sealed: the integral types of 8/16/32/64 bits (plus the pointer-sized
/// pair), which keeps reinterpretation casts byte-exact.
pub trait SegElem: private::Sealed + Copy + Send + Sync + 'static {}

impl SegElem for u8 {}
impl SegElem for i8 {}
impl SegElem for u16 {}
impl SegElem for i16 {}
impl SegElem for u32 {}
impl SegElem for i32 {}
impl SegElem for u64 {}
impl SegElem for i64 {}
impl SegElem for usize {}
impl SegElem for isize {}

/// Errors from allocating a segmented pointer.
#[derive(Debug, thiserror::Error)]
pub enum MemError {
    #[error(transparent)]
    Placement(#[from] ConfigError),

    #[error(transparent)]
    Alloc(#[from] AllocError),
}

/// A shared window over a segment-tiled allocation.
///
/// Cloning, splitting, and casting all produce further windows over the same
/// allocation; the backing memory is released exactly once, when the last
/// window is dropped. A window is `Send` so slivers can move into worker
/// threads; disjointness of concurrently written slivers is the split
/// contract, not something the type enforces.
pub struct SegPtr<T: SegElem, const S: usize> {
    region: Arc<RawRegion>,
    start: *mut T,
    size_bytes: usize,
}

unsafe impl<T: SegElem, const S: usize> Send for SegPtr<T, S> {}

impl<T: SegElem, const S: usize> Clone for SegPtr<T, S> {
    fn clone(&self) -> Self {
        Self {
            region: Arc::clone(&self.region),
            start: self.start,
            size_bytes: self.size_bytes,
        }
    }
}

impl<T: SegElem, const S: usize> SegPtr<T, S> {
    const ELEM_SIZE: usize = std::mem::size_of::<T>();

    fn from_region(region: RawRegion, len: usize) -> Self {
        let start = region.as_ptr() as *mut T;
        Self {
            region: Arc::new(region),
            start,
            size_bytes: len * Self::ELEM_SIZE,
        }
    }

    /// Elements per full segment.
    pub const fn elems_per_segment() -> usize {
        assert!(S >= std::mem::size_of::<T>(), "segment smaller than one element");
        assert!(S % std::mem::size_of::<T>() == 0, "segment size not a multiple of the element size");
        S / std::mem::size_of::<T>()
    }

    /// Number of elements in this window.
    pub fn len(&self) -> usize {
        self.size_bytes / Self::ELEM_SIZE
    }

    pub fn is_empty(&self) -> bool {
        self.size_bytes == 0
    }

    /// Number of segments, counting a short tail as one.
    pub fn segment_count(&self) -> usize {
        (self.size_bytes + S - 1) / S
    }

    /// The node the backing allocation is bound to, if binding succeeded.
    pub fn node(&self) -> Option<NodeId> {
        self.region.node()
    }

    /// Number of live windows (clones, slivers, casts) over the allocation.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.region)
    }

    /// Raw pointer to element `index`.
    pub fn data(&self, index: usize) -> *mut T {
        assert!(
            index < self.len(),
            "index {index} out of bounds (len {})",
            self.len()
        );
        unsafe { self.start.add(index) }
    }

    /// The whole window as a slice.
    pub fn as_slice(&self) -> &[T] {
        unsafe { std::slice::from_raw_parts(self.start, self.len()) }
    }

    /// The whole window as a mutable slice.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        unsafe { std::slice::from_raw_parts_mut(self.start, self.len()) }
    }

    /// Segment `index` as a slice. Every segment holds
    /// [`elems_per_segment`](Self::elems_per_segment) elements except
    /// possibly the last.
    pub fn segment(&self, index: usize) -> &[T] {
        let (offset, count) = self.segment_bounds(index);
        unsafe { std::slice::from_raw_parts(self.start.add(offset), count) }
    }

    /// Segment `index` as a mutable slice.
    pub fn segment_mut(&mut self, index: usize) -> &mut [T] {
        let (offset, count) = self.segment_bounds(index);
        unsafe { std::slice::from_raw_parts_mut(self.start.add(offset), count) }
    }

    /// A mutable sub-slice `[offset, offset + len)` of the window.
    pub fn range_mut(&mut self, offset: usize, len: usize) -> &mut [T] {
        assert!(
            offset + len <= self.len(),
            "range {offset}..{} out of bounds (len {})",
            offset + len,
            self.len()
        );
        unsafe { std::slice::from_raw_parts_mut(self.start.add(offset), len) }
    }

    fn segment_bounds(&self, index: usize) -> (usize, usize) {
        assert!(
            index < self.segment_count(),
            "segment index {index} out of bounds (segments {})",
            self.segment_count()
        );
        let per_segment = Self::elems_per_segment();
        let offset = index * per_segment;
        (offset, per_segment.min(self.len() - offset))
    }

    /// Split the window into `slivers` segment-aligned sub-windows of
    /// near-equal size.
    ///
    /// Whole segments are distributed as evenly as possible: the first
    /// `segment_count() % slivers` slivers carry one extra segment. Every
    /// sliver shares the backing allocation; their lengths concatenate to
    /// `len()`.
    pub fn split(&self, slivers: usize) -> Vec<Self> {
        assert!(slivers > 0, "cannot split into zero slivers");
        let per_sliver = self.segment_count() / slivers;
        let remainder = self.segment_count() % slivers;
        let per_segment = Self::elems_per_segment();

        let mut result = Vec::with_capacity(slivers);
        let mut offset_segments = 0;
        for i in 0..slivers {
            let segment_count = per_sliver + usize::from(i < remainder);
            let offset_bytes = offset_segments * S;
            let size_bytes = (segment_count * S).min(self.size_bytes.saturating_sub(offset_bytes));
            let start = if size_bytes == 0 {
                self.start
            } else {
                unsafe { self.start.add(offset_segments * per_segment) }
            };
            tracing::trace!(
                sliver = i,
                offset_segments,
                size_bytes,
                "split sliver"
            );
            result.push(Self {
                region: Arc::clone(&self.region),
                start,
                size_bytes,
            });
            offset_segments += segment_count;
        }
        result
    }

    /// Reinterpret the same bytes as elements of `U`. The byte extent is
    /// unchanged; only the element view differs.
    pub fn cast<U: SegElem>(&self) -> SegPtr<U, S> {
        SegPtr {
            region: Arc::clone(&self.region),
            start: self.start as *mut U,
            size_bytes: self.size_bytes,
        }
    }

    /// Shrink (or re-expand within the backing allocation) the logical
    /// element count of this window. No memory moves; other windows keep
    /// their own extents.
    pub fn resize_view(&mut self, new_len: usize) {
        let offset_bytes = self.start as usize - self.region.as_ptr() as usize;
        let new_bytes = new_len * Self::ELEM_SIZE;
        assert!(
            offset_bytes + new_bytes <= self.region.size_bytes(),
            "resize to {new_len} elements exceeds the backing allocation"
        );
        self.size_bytes = new_bytes;
    }
}

impl<T: SegElem, const S: usize> Index<usize> for SegPtr<T, S> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        assert!(
            index < self.len(),
            "index {index} out of bounds (len {})",
            self.len()
        );
        unsafe { &*self.start.add(index) }
    }
}

impl<T: SegElem, const S: usize> IndexMut<usize> for SegPtr<T, S> {
    fn index_mut(&mut self, index: usize) -> &mut T {
        assert!(
            index < self.len(),
            "index {index} out of bounds (len {})",
            self.len()
        );
        unsafe { &mut *self.start.add(index) }
    }
}

/// Allocate `len` elements on the node predicted for `pattern` by the
/// process-wide memory map.
pub fn vmalloc_with_pattern<T: SegElem, const S: usize>(
    len: usize,
    pattern: AccessPattern,
) -> Result<SegPtr<T, S>, MemError> {
    vmalloc_in(len, Some(pattern), MemoryConfig::global())
}

/// Allocate `len` elements with no access hint (placed like `Random`).
pub fn vmalloc<T: SegElem, const S: usize>(len: usize) -> Result<SegPtr<T, S>, MemError> {
    vmalloc_in(len, None, MemoryConfig::global())
}

/// Allocate against an explicit memory map.
pub fn vmalloc_in<T: SegElem, const S: usize>(
    len: usize,
    pattern: Option<AccessPattern>,
    config: &MemoryConfig,
) -> Result<SegPtr<T, S>, MemError> {
    let _ = SegPtr::<T, S>::elems_per_segment();
    assert!(len > 0, "zero-length allocation");
    let node = placement::predict(pattern, config)?;
    let size_bytes = len * std::mem::size_of::<T>();
    let align = S.max(4096);
    let region = RawRegion::allocate(size_bytes, align, Some(node))?;
    tracing::debug!(
        len,
        size_bytes,
        node,
        bound = ?region.node(),
        "allocated column buffer"
    );
    Ok(SegPtr::from_region(region, len))
}

//! Node-bound raw memory: anonymous mappings bound with `mbind`, with an
//! aligned zeroed host allocation as fallback.
//!
//! Anonymous mappings come back zero-filled and the host path uses
//! `alloc_zeroed`, so every region is zero-initialized regardless of how it
//! was obtained. Callers rely on this.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ptr::NonNull;

use crate::mem_config::NodeId;

/// Errors from the raw allocator.
#[derive(Debug, thiserror::Error)]
pub enum AllocError {
    #[error("allocation of {0} bytes failed")]
    HostAlloc(usize),

    #[error("invalid allocation layout: {size} bytes aligned to {align}")]
    Layout { size: usize, align: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backing {
    /// Anonymous mapping, released with `munmap`.
    Mapped,
    /// Global-allocator memory, released with the recorded layout.
    Host { align: usize },
}

/// A raw zero-initialized region, released on drop through the route it was
/// obtained from.
pub(crate) struct RawRegion {
    ptr: NonNull<u8>,
    size_bytes: usize,
    node: Option<NodeId>,
    backing: Backing,
}

// The region is plain memory; views built on top of it coordinate access.
unsafe impl Send for RawRegion {}
unsafe impl Sync for RawRegion {}

impl RawRegion {
    /// Allocate `size_bytes` aligned to `align`, preferring residency on
    /// `node`. Falls back to aligned host memory when the mapping route is
    /// unavailable (non-Linux, oversized alignment, or a failed `mmap`).
    pub(crate) fn allocate(
        size_bytes: usize,
        align: usize,
        node: Option<NodeId>,
    ) -> Result<Self, AllocError> {
        assert!(size_bytes > 0, "zero-sized region");
        assert!(align.is_power_of_two(), "alignment must be a power of two");

        if let Some(node) = node {
            // mmap hands back page-aligned memory; anything stricter goes
            // through the host path.
            if align <= PAGE_SIZE {
                if let Some(region) = Self::map_on_node(size_bytes, node) {
                    return Ok(region);
                }
                tracing::debug!(size_bytes, node, "node-bound mapping unavailable, using host memory");
            }
        }
        Self::host(size_bytes, align)
    }

    #[cfg(target_os = "linux")]
    fn map_on_node(size_bytes: usize, node: NodeId) -> Option<Self> {
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                size_bytes,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return None;
        }
        let base = NonNull::new(ptr as *mut u8)?;

        // Bind the pages to the chosen node. A host that does not expose the
        // node leaves the mapping unbound (first-touch) rather than failing
        // the allocation.
        let mut bound = Some(node);
        if node as usize >= 8 * std::mem::size_of::<libc::c_ulong>() {
            bound = None;
        } else {
            let mask: libc::c_ulong = 1 << node;
            let rc = unsafe {
                libc::syscall(
                    libc::SYS_mbind,
                    ptr,
                    size_bytes as libc::c_ulong,
                    libc::MPOL_BIND,
                    &mask,
                    8 * std::mem::size_of::<libc::c_ulong>() as libc::c_ulong,
                    0,
                )
            };
            if rc != 0 {
                tracing::debug!(
                    node,
                    errno = std::io::Error::last_os_error().raw_os_error(),
                    "mbind failed, mapping stays unbound"
                );
                bound = None;
            }
        }

        tracing::trace!(size_bytes, ?bound, ptr = ?base, "mapped node-bound region");
        Some(Self {
            ptr: base,
            size_bytes,
            node: bound,
            backing: Backing::Mapped,
        })
    }

    #[cfg(not(target_os = "linux"))]
    fn map_on_node(_size_bytes: usize, _node: NodeId) -> Option<Self> {
        None
    }

    fn host(size_bytes: usize, align: usize) -> Result<Self, AllocError> {
        let layout = Layout::from_size_align(size_bytes, align)
            .map_err(|_| AllocError::Layout { size: size_bytes, align })?;
        let ptr = unsafe { alloc_zeroed(layout) };
        let base = NonNull::new(ptr).ok_or(AllocError::HostAlloc(size_bytes))?;
        tracing::trace!(size_bytes, align, ptr = ?base, "allocated host region");
        Ok(Self {
            ptr: base,
            size_bytes,
            node: None,
            backing: Backing::Host { align },
        })
    }

    pub(crate) fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    pub(crate) fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    /// The node the region is bound to, if binding succeeded.
    pub(crate) fn node(&self) -> Option<NodeId> {
        self.node
    }
}

impl Drop for RawRegion {
    fn drop(&mut self) {
        tracing::trace!(size_bytes = self.size_bytes, node = ?self.node, "releasing region");
        match self.backing {
            Backing::Mapped => {
                #[cfg(target_os = "linux")]
                unsafe {
                    libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.size_bytes);
                }
            }
            Backing::Host { align } => {
                let layout = Layout::from_size_align(self.size_bytes, align)
                    .expect("layout validated at allocation time");
                unsafe { dealloc(self.ptr.as_ptr(), layout) };
            }
        }
    }
}

/// Smallest page size the mapping route guarantees alignment to.
const PAGE_SIZE: usize = 4096;

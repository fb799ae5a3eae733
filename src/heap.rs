//! Provided [`Heap`] implementations

use std::alloc::{self, Layout};
use std::marker::PhantomData;
use std::ptr::NonNull;

use crate::error::AllocError;
use crate::param::Heap;

/// The typical size, in bytes, of a CPU cache line
///
/// This is relevant as a micro-optimization because the CPU will generally load entire cache lines
/// at a time into the L1/L2 cache, so starting a node on a line boundary means the control fields
/// and the first elements are fetched together.
pub const CACHE_LINE_SIZE: usize = 64;

/// [`Heap`] backed by the global allocator
pub struct GlobalHeap(PhantomData<()>);

impl Heap for GlobalHeap {
    fn allocate(layout: Layout) -> Result<NonNull<u8>, AllocError> {
        if layout.size() == 0 {
            return Ok(dangling(layout));
        }

        // SAFETY: `alloc` may produce UB if `layout` has a size of zero, which we just checked.
        let maybe_null_ptr = unsafe { alloc::alloc(layout) };

        NonNull::new(maybe_null_ptr).ok_or(AllocError::Exhausted {
            size: layout.size(),
            align: layout.align(),
        })
    }

    unsafe fn deallocate(ptr: NonNull<u8>, layout: Layout) {
        if layout.size() == 0 {
            return;
        }

        // SAFETY: `dealloc` requires that the pointer refer to a current allocation with the same
        // layout, which is guaranteed by the caller. Zero-sized "allocations" never reached the
        // global allocator, so they're excluded above.
        unsafe { alloc::dealloc(ptr.as_ptr(), layout) };
    }
}

/// [`Heap`] adaptor that aligns every allocation from `H` to the start of a cache line
pub struct CacheAligned<H>(PhantomData<H>);

impl<H: Heap> Heap for CacheAligned<H> {
    fn allocate(layout: Layout) -> Result<NonNull<u8>, AllocError> {
        let aligned = layout
            .align_to(CACHE_LINE_SIZE)
            .map_err(|_| AllocError::Exhausted {
                size: layout.size(),
                align: CACHE_LINE_SIZE,
            })?;

        H::allocate(aligned)
    }

    unsafe fn deallocate(ptr: NonNull<u8>, layout: Layout) {
        let aligned = layout
            .align_to(CACHE_LINE_SIZE)
            // SAFETY: the layout was successfully created in the corresponding call to
            // `allocate`, so we *should* be able to recreate it here.
            .unwrap_or_else(|_| unsafe { weak_unreachable!() });

        // SAFETY: guaranteed by caller, with the same layout transformation as in `allocate`.
        unsafe { H::deallocate(ptr, aligned) }
    }
}

/// Produces a well-aligned, non-null pointer for a zero-sized allocation
fn dangling(layout: Layout) -> NonNull<u8> {
    // SAFETY: alignments are always non-zero.
    unsafe { NonNull::new_unchecked(layout.align() as *mut u8) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_round_trip() {
        let layout = Layout::from_size_align(24, 8).unwrap();
        let ptr = GlobalHeap::allocate(layout).unwrap();
        assert_eq!(ptr.as_ptr() as usize % 8, 0);
        unsafe { GlobalHeap::deallocate(ptr, layout) };
    }

    #[test]
    fn global_zero_sized() {
        let layout = Layout::from_size_align(0, 16).unwrap();
        let ptr = GlobalHeap::allocate(layout).unwrap();
        assert_eq!(ptr.as_ptr() as usize % 16, 0);
        unsafe { GlobalHeap::deallocate(ptr, layout) };
    }

    #[test]
    fn cache_aligned() {
        let layout = Layout::from_size_align(10, 2).unwrap();
        let ptr = <CacheAligned<GlobalHeap>>::allocate(layout).unwrap();
        assert_eq!(ptr.as_ptr() as usize % CACHE_LINE_SIZE, 0);
        unsafe { <CacheAligned<GlobalHeap>>::deallocate(ptr, layout) };
    }
}

//! Composition of a node's control fields with its trailing element buffer
//!
//! A node is a single allocation: the refcount and ownee first, then a run of element slots whose
//! length is only known at allocation time. We express that as a `#[repr(C)]` struct with a
//! zero-length array as its last field. `repr(C)` fixes the field order and places `data` at the
//! first offset after the control fields that's suitably aligned for `T`; the zero-length array
//! contributes `T`'s alignment to the struct without contributing any size.
//!
//! ## Safety
//!
//! An allocation for `n` elements is exactly `DATA_OFFSET + n * size_of::<T>()` bytes, which may
//! be *smaller* than `size_of::<Composed<R, O, T>>()` (the struct's size is rounded up to its
//! alignment, the allocation is not). So a `&Composed` must never be created. Fields are only
//! reached through raw place projections (`addr_of!((*ptr).refs)` and friends), which stay
//! within the allocation.

use std::mem::{self, MaybeUninit};

#[repr(C)]
pub(crate) struct Composed<R, O, T> {
    pub(crate) refs: R,
    pub(crate) ownee: O,
    /// Start of the element buffer; the allocation continues past the end of the struct
    pub(crate) data: [MaybeUninit<T>; 0],
}

impl<R, O, T> Composed<R, O, T> {
    /// Byte offset of the first element slot from the start of the node
    pub(crate) const DATA_OFFSET: usize = mem::offset_of!(Composed<R, O, T>, data);

    /// Alignment of every node allocation: the strictest of the control fields and `T`
    pub(crate) const ALIGN: usize = mem::align_of::<Composed<R, O, T>>();
}

#[cfg(test)]
mod tests {
    use super::Composed;
    use std::alloc::Layout;
    use std::cell::Cell;
    use std::mem::{align_of, size_of};
    use std::sync::atomic::AtomicUsize;

    // The composed layout must agree with building the same layout by hand, field by field.
    fn check<R, O, T>() {
        let (control, ownee_offset) = Layout::new::<R>().extend(Layout::new::<O>()).unwrap();
        let (_, data_offset) = control.extend(Layout::new::<[T; 0]>()).unwrap();

        assert_eq!(ownee_offset, size_of::<R>().next_multiple_of(align_of::<O>()));
        assert_eq!(Composed::<R, O, T>::DATA_OFFSET, data_offset);
        assert_eq!(Composed::<R, O, T>::DATA_OFFSET % align_of::<T>(), 0);
        assert!(Composed::<R, O, T>::ALIGN >= align_of::<T>());
        assert!(Composed::<R, O, T>::ALIGN >= align_of::<R>());
    }

    #[test]
    fn offsets_match_manual_layout() {
        check::<AtomicUsize, Option<std::num::NonZeroUsize>, u8>();
        check::<AtomicUsize, (), u64>();
        check::<Cell<usize>, u8, u8>();
        check::<Cell<usize>, u8, u128>();
        check::<(), (), String>();
        check::<(), (), ()>();
        check::<u16, u8, [u8; 3]>();
    }

    #[test]
    fn zero_sized_control() {
        assert_eq!(Composed::<(), (), u32>::DATA_OFFSET, 0);
        assert_eq!(Composed::<(), (), u32>::ALIGN, align_of::<u32>());
    }

    #[test]
    fn data_offset_can_undercut_struct_size() {
        // 8-byte refcount, 1-byte ownee, 1-byte elements: the buffer starts at 9, but the struct
        // itself is padded out to a multiple of the refcount's alignment.
        assert_eq!(Composed::<u64, u8, u8>::DATA_OFFSET, 9);
        assert!(size_of::<Composed<u64, u8, u8>>() > 9);
    }
}

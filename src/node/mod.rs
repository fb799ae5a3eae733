//! Leaf storage nodes
//!
//! A [`Node`] is one allocation holding a reference count, an ownee tag, and a buffer of element
//! slots. Nodes never appear by value or by reference: they're created by the lifecycle functions
//! on `Node` (like [`Node::make_n`]) and handled exclusively through [`NodePtr`]s.
//!
//! A node doesn't know its own size or capacity. Whoever holds a `NodePtr` also tracks how many
//! slots were allocated (the *capacity*) and how many of the leading slots hold live elements (the
//! *size*), and must pass those back faithfully -- in particular to [`Node::delete_n`].
//!
//! ## Mutation rights
//!
//! Nodes are shared between persistent values, so in general they must be treated as immutable.
//! There are exactly two ways to earn the right to write to a node in place, both checked by
//! [`NodePtr::can_mutate`]:
//!
//! 1. The refcount says the node is uniquely owned, or
//! 2. the node's ownee records the edit being presented -- i.e. the node was created (or
//!    claimed) by the same transient edit session that now wants to modify it.
//!
//! If neither holds, the caller must copy the node (see [`Node::ensure_mutable`]) and modify the
//! copy instead.

use std::alloc::Layout;
use std::fmt::{self, Debug, Formatter};
use std::mem;
use std::ptr::{addr_of, addr_of_mut, NonNull};
use std::slice;

use crate::error::AllocError;
use crate::param::{MemoryPolicy, Ownee, RefCount};

mod layout;
mod lifecycle;
#[cfg(test)]
mod tests;

use layout::Composed;

/// Helper alias for the composed layout of a node's allocation
type ComposedOf<T, P> = Composed<resolve![P::RefCount], resolve![P::Ownee], T>;

/// A leaf storage node: control fields followed by a run of `T` slots
///
/// `Node` is never constructed directly; see the lifecycle functions ([`make_n`], [`copy_n`], and
/// friends) and [`NodePtr`].
///
/// [`make_n`]: Node::make_n
/// [`copy_n`]: Node::copy_n
#[repr(transparent)]
pub struct Node<T, P: MemoryPolicy> {
    inner: ComposedOf<T, P>,
}

/// Handle on a [`Node`]
///
/// `NodePtr`s are `Copy`, and copying one does *not* touch the refcount -- the handle is just a
/// pointer. Accordingly, it doesn't track whether the node it points to is still alive, so every
/// accessor that reads the node is `unsafe`: the caller must guarantee that the node hasn't been
/// passed to [`Node::delete_n`] yet.
pub struct NodePtr<T, P: MemoryPolicy> {
    ptr: NonNull<Node<T, P>>,
}

/// The sharing state of a node, as observed through its refcount and ownee
///
/// This is the state machine that [`NodePtr::can_mutate`] implicitly consults, exposed for
/// debugging and testing.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum NodeState {
    /// More than one reference to the node, and no edit has claimed it
    Shared,
    /// A single reference to the node, and no edit has claimed it
    UniqueUnowned,
    /// Some edit has claimed the node, regardless of its refcount
    Owned,
}

// Nodes behave like `Arc<[T]>` with respect to threads: sending a handle to another thread shares
// the elements, and either thread may end up dropping them.
#[rustfmt::skip]
unsafe impl<T, P> Send for NodePtr<T, P>
where
    T: Send + Sync,
    P: MemoryPolicy,
    resolve![P::RefCount]: Send + Sync,
    resolve![P::Ownee]: Send + Sync {}

#[rustfmt::skip]
unsafe impl<T, P> Sync for NodePtr<T, P>
where
    T: Send + Sync,
    P: MemoryPolicy,
    resolve![P::RefCount]: Send + Sync,
    resolve![P::Ownee]: Send + Sync {}

#[rustfmt::skip]
impl<T, P: MemoryPolicy> Copy for NodePtr<T, P> {}

#[rustfmt::skip]
impl<T, P: MemoryPolicy> Clone for NodePtr<T, P> {
    fn clone(&self) -> Self { *self }
}

impl<T, P: MemoryPolicy> PartialEq for NodePtr<T, P> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr
    }
}

#[rustfmt::skip]
impl<T, P: MemoryPolicy> Eq for NodePtr<T, P> {}

impl<T, P: MemoryPolicy> Debug for NodePtr<T, P> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_fmt(format_args!("NodePtr({:p})", self.ptr))
    }
}

impl<T, P: MemoryPolicy> Node<T, P> {
    /// Byte offset of the element buffer from the start of the node
    ///
    /// This is also the size of a node with zero capacity.
    pub const DATA_OFFSET: usize = ComposedOf::<T, P>::DATA_OFFSET;

    /// Returns the total size, in bytes, of a node able to hold `count` elements
    ///
    /// This does not check for overflow; [`layout_n`](Self::layout_n) does.
    pub const fn sizeof_n(count: usize) -> usize {
        Self::DATA_OFFSET + count * mem::size_of::<T>()
    }

    /// Returns the layout of a node able to hold `count` elements, as passed to the heap
    ///
    /// The size of the layout is always [`sizeof_n(count)`](Self::sizeof_n).
    pub fn layout_n(count: usize) -> Result<Layout, AllocError> {
        let overflow = AllocError::CapacityOverflow { count };

        let size = mem::size_of::<T>()
            .checked_mul(count)
            .and_then(|elems| elems.checked_add(Self::DATA_OFFSET))
            .ok_or(overflow)?;

        Layout::from_size_align(size, ComposedOf::<T, P>::ALIGN).map_err(|_| overflow)
    }
}

// NodePtr accessors
//  * refs
//  * ownee
//  * ownee_mut
//  * data
//  * as_slice
//  * as_mut_slice
//  * can_mutate
//  * state
impl<T, P: MemoryPolicy> NodePtr<T, P> {
    /// Returns the node's refcount
    ///
    /// Anyone holding the node may adjust the count; it's the sole arbiter of unique ownership.
    ///
    /// ## Safety
    ///
    /// The node must be alive for all of `'a`.
    pub unsafe fn refs<'a>(self) -> &'a resolve![P::RefCount] {
        // SAFETY: the node is alive (guaranteed by caller) and `refs` lies within the allocation
        // no matter its capacity.
        unsafe { &*addr_of!((*self.ptr.as_ptr()).inner.refs) }
    }

    /// Returns the node's ownee, recording which edit (if any) may mutate it
    ///
    /// ## Safety
    ///
    /// The node must be alive for all of `'a`, and the ownee must not be modified during that
    /// time.
    pub unsafe fn ownee<'a>(self) -> &'a resolve![P::Ownee] {
        // SAFETY: see `refs`
        unsafe { &*addr_of!((*self.ptr.as_ptr()).inner.ownee) }
    }

    /// Returns mutable access to the node's ownee
    ///
    /// ## Safety
    ///
    /// The node must be alive for all of `'a`, and the caller must have exclusive access to the
    /// ownee during that time.
    pub unsafe fn ownee_mut<'a>(self) -> &'a mut resolve![P::Ownee] {
        // SAFETY: see `refs`; exclusivity is guaranteed by the caller.
        unsafe { &mut *addr_of_mut!((*self.ptr.as_ptr()).inner.ownee) }
    }

    /// Returns a pointer to the first element slot
    ///
    /// The pointer is valid for reads and writes of `capacity` slots (of which only the first
    /// `size` are initialized), for as long as the node is alive. Writes are only permitted while
    /// [`can_mutate`](Self::can_mutate) holds for the writer's edit.
    pub fn data(self) -> *mut T {
        // `data` sits at `DATA_OFFSET`, within (or exactly at the end of) every allocation for
        // this node type. `wrapping_add` keeps this sound even for a handle whose node is gone.
        self.ptr
            .as_ptr()
            .cast::<u8>()
            .wrapping_add(Node::<T, P>::DATA_OFFSET)
            .cast::<T>()
    }

    /// Borrows the first `len` elements
    ///
    /// ## Safety
    ///
    /// The node must be alive for all of `'a`, the first `len` slots must be initialized, and
    /// they must not be modified during `'a`.
    pub unsafe fn as_slice<'a>(self, len: usize) -> &'a [T] {
        // SAFETY: guaranteed by caller
        unsafe { slice::from_raw_parts(self.data(), len) }
    }

    /// Mutably borrows the first `len` elements
    ///
    /// ## Safety
    ///
    /// The node must be alive for all of `'a`, the first `len` slots must be initialized, and the
    /// caller must have exclusive access to them during `'a` -- typically by having checked
    /// [`can_mutate`](Self::can_mutate).
    pub unsafe fn as_mut_slice<'a>(self, len: usize) -> &'a mut [T] {
        // SAFETY: guaranteed by caller
        unsafe { slice::from_raw_parts_mut(self.data(), len) }
    }

    /// Returns whether the holder of `edit` may mutate the node in place
    ///
    /// This is true if the node is uniquely referenced, or if `edit` is the edit recorded in the
    /// node's ownee. When it's false, the caller must copy the node before modifying it.
    ///
    /// ## Safety
    ///
    /// The node must be alive.
    pub unsafe fn can_mutate(self, edit: resolve![P::Edit]) -> bool {
        // SAFETY: guaranteed by caller
        unsafe { self.refs().is_unique() || self.ownee().can_mutate(edit) }
    }

    /// Returns the current [`NodeState`]
    ///
    /// ## Safety
    ///
    /// The node must be alive.
    pub unsafe fn state(self) -> NodeState {
        // SAFETY: guaranteed by caller
        let (refs, ownee) = unsafe { (self.refs(), self.ownee()) };

        if ownee.is_owned() {
            NodeState::Owned
        } else if refs.is_unique() {
            NodeState::UniqueUnowned
        } else {
            NodeState::Shared
        }
    }
}

//! Allocation, copying, and destruction of nodes
//!
//! These are the *only* ways node memory is obtained or released. Each function sizes its
//! allocation with [`Node::layout_n`], so that [`Node::delete_n`] -- given the same capacity --
//! releases exactly what was allocated.

use std::mem;
use std::ptr::{self, addr_of_mut};

use super::{Node, NodePtr};
use crate::error::AllocError;
use crate::param::{Heap, MemoryPolicy, Ownee, RefCount};

// Node lifecycle
//  * make_n
//  * make_e
//  * copy_n
//  * copy_n_from (unsafe)
//  * copy_e
//  * copy_e_from (unsafe)
//  * delete_n (unsafe)
impl<T, P: MemoryPolicy> Node<T, P> {
    /// Allocates a node with room for `n` elements
    ///
    /// The refcount starts at one and the ownee records no edit. None of the element slots are
    /// initialized; the caller is responsible for writing the live prefix.
    pub fn make_n(n: usize) -> Result<NodePtr<T, P>, AllocError> {
        let layout = Self::layout_n(n)?;
        let raw = <resolve![P::Heap]>::allocate(layout)?;

        let node = NodePtr { ptr: raw.cast::<Node<T, P>>() };
        let ptr = node.ptr.as_ptr();

        // SAFETY: the allocation is at least `DATA_OFFSET` bytes and aligned for the composed
        // layout, so both control fields are in bounds and aligned. Neither is initialized yet, so
        // we `write` instead of assigning.
        unsafe {
            addr_of_mut!((*ptr).inner.refs).write(<resolve![P::RefCount]>::one());
            addr_of_mut!((*ptr).inner.ownee).write(<resolve![P::Ownee]>::default());
        }

        debug_println!("make_n: {node:?} with capacity {n} ({} bytes)", layout.size());
        Ok(node)
    }

    /// Allocates a node with room for `n` elements, already claimed by `edit`
    ///
    /// Like [`make_n`](Self::make_n), except that [`can_mutate(edit)`] holds for the new node even
    /// after it's been shared.
    ///
    /// [`can_mutate(edit)`]: NodePtr::can_mutate
    pub fn make_e(edit: resolve![P::Edit], n: usize) -> Result<NodePtr<T, P>, AllocError> {
        let node = Self::make_n(n)?;
        // SAFETY: we just created the node, so nobody else can be looking at it.
        unsafe { node.ownee_mut().set(edit) };
        Ok(node)
    }

    /// Allocates a node with room for `n` elements, and clones `items` into its leading slots
    ///
    /// The node's size (for later calls to [`delete_n`]) is the number of items yielded.
    ///
    /// If cloning an element panics, the elements cloned so far are dropped and the node is
    /// released before the panic continues.
    ///
    /// ## Panics
    ///
    /// This function panics if `items` yields more than `n` elements. Nothing is written past the
    /// node's capacity.
    ///
    /// [`delete_n`]: Self::delete_n
    pub fn copy_n<'a, I>(n: usize, items: I) -> Result<NodePtr<T, P>, AllocError>
    where
        T: 'a + Clone,
        I: IntoIterator<Item = &'a T>,
    {
        let mut partial = PartialNode {
            node: Self::make_n(n)?,
            len: 0,
            capacity: n,
        };

        for item in items {
            if partial.len == n {
                panic!("copied more than the node's capacity of {n} elements");
            }

            // SAFETY: `len < capacity`, so the slot is within the allocation, and it's
            // uninitialized. If `clone` panics, `partial` cleans up the first `len` slots.
            unsafe { partial.node.data().add(partial.len).write(item.clone()) };
            partial.len += 1;
        }

        debug_println!("copy_n: filled {} of {n} slots", partial.len);
        Ok(partial.finish())
    }

    /// Allocates a node with room for `n` elements, and clones the first `count` elements of
    /// `src` into it
    ///
    /// ## Safety
    ///
    /// `src` must be alive, with at least `count` initialized elements.
    ///
    /// ## Panics
    ///
    /// This function panics if `count > n`.
    pub unsafe fn copy_n_from(
        n: usize,
        src: NodePtr<T, P>,
        count: usize,
    ) -> Result<NodePtr<T, P>, AllocError>
    where
        T: Clone,
    {
        // SAFETY: guaranteed by caller
        let items = unsafe { src.as_slice(count) };
        Self::copy_n(n, items)
    }

    /// Like [`copy_n`](Self::copy_n), but the new node is claimed by `edit`
    pub fn copy_e<'a, I>(
        edit: resolve![P::Edit],
        n: usize,
        items: I,
    ) -> Result<NodePtr<T, P>, AllocError>
    where
        T: 'a + Clone,
        I: IntoIterator<Item = &'a T>,
    {
        let node = Self::copy_n(n, items)?;
        // SAFETY: we just created the node, so nobody else can be looking at it.
        unsafe { node.ownee_mut().set(edit) };
        Ok(node)
    }

    /// Like [`copy_n_from`](Self::copy_n_from), but the new node is claimed by `edit`
    ///
    /// ## Safety
    ///
    /// `src` must be alive, with at least `count` initialized elements.
    pub unsafe fn copy_e_from(
        edit: resolve![P::Edit],
        n: usize,
        src: NodePtr<T, P>,
        count: usize,
    ) -> Result<NodePtr<T, P>, AllocError>
    where
        T: Clone,
    {
        // SAFETY: guaranteed by caller
        let items = unsafe { src.as_slice(count) };
        Self::copy_e(edit, n, items)
    }

    /// Drops the first `size` elements of the node, then releases its memory
    ///
    /// This does *not* consult the refcount; see [`release`](Self::release) for that.
    ///
    /// ## Safety
    ///
    /// The node must be alive, and `capacity` must be exactly the capacity it was created with.
    /// Exactly the first `size` slots must be initialized. No handle to the node may be used
    /// afterwards.
    pub unsafe fn delete_n(node: NodePtr<T, P>, size: usize, capacity: usize) {
        // SAFETY: guaranteed by caller
        unsafe { weak_assert!(size <= capacity) };

        let layout = Self::layout_n(capacity)
            // SAFETY: the same layout was successfully created when the node was allocated, so we
            // *should* be able to recreate it here.
            .unwrap_or_else(|_| unsafe { weak_unreachable!() });

        debug_println!("delete_n: {node:?} with size {size}, capacity {capacity}");

        let ptr = node.ptr.as_ptr();
        // SAFETY: the first `size` elements are initialized (guaranteed by caller), and the
        // control fields were initialized in `make_n`. Nothing reads them after this.
        unsafe {
            ptr::drop_in_place(ptr::slice_from_raw_parts_mut(node.data(), size));
            ptr::drop_in_place(addr_of_mut!((*ptr).inner.refs));
            ptr::drop_in_place(addr_of_mut!((*ptr).inner.ownee));
        }

        // SAFETY: the node was allocated by this heap with this layout (guaranteed by caller).
        unsafe { <resolve![P::Heap]>::deallocate(node.ptr.cast(), layout) };
    }
}

// Refcount and edit glue
//  * share (unsafe)
//  * release (unsafe)
//  * ensure_mutable (unsafe)
impl<T, P: MemoryPolicy> Node<T, P> {
    /// Records a new reference to the node, returning the handle for the new holder
    ///
    /// ## Safety
    ///
    /// The node must be alive.
    pub unsafe fn share(node: NodePtr<T, P>) -> NodePtr<T, P> {
        // SAFETY: guaranteed by caller
        unsafe { node.refs().increment() };
        node
    }

    /// Gives up a reference to the node, deleting it if that was the last one
    ///
    /// Returns `true` if the node was deleted.
    ///
    /// ## Safety
    ///
    /// The caller must own one of the node's references, and `size` and `capacity` must satisfy
    /// the requirements of [`delete_n`](Self::delete_n). The caller may not use its handle
    /// afterwards.
    pub unsafe fn release(node: NodePtr<T, P>, size: usize, capacity: usize) -> bool {
        // SAFETY: the caller owns a reference, so the node is alive until we decrement.
        if unsafe { node.refs().decrement() } {
            // SAFETY: that was the last reference; guaranteed by caller otherwise.
            unsafe { Self::delete_n(node, size, capacity) };
            true
        } else {
            false
        }
    }

    /// Ensures that the holder of `edit` may mutate `*node` in place, copying it if necessary
    ///
    /// If [`can_mutate(edit)`] already holds, this does nothing. Otherwise, `*node` is replaced by
    /// a copy with the same capacity that's claimed by `edit`, and the caller's reference to the
    /// original is released.
    ///
    /// On error, `*node` is left untouched and the caller keeps its reference.
    ///
    /// ## Safety
    ///
    /// The caller must own one of the node's references, with `size` and `capacity` as for
    /// [`release`](Self::release).
    ///
    /// [`can_mutate(edit)`]: NodePtr::can_mutate
    pub unsafe fn ensure_mutable(
        edit: resolve![P::Edit],
        node: &mut NodePtr<T, P>,
        size: usize,
        capacity: usize,
    ) -> Result<(), AllocError>
    where
        T: Clone,
    {
        // SAFETY: the caller owns a reference, so the node is alive.
        if unsafe { node.can_mutate(edit) } {
            return Ok(());
        }

        // SAFETY: guaranteed by caller
        let copy = unsafe { Self::copy_e_from(edit, capacity, *node, size)? };

        // After copying, it's possible that every other holder has since released the original,
        // leaving ours as the last reference. `release` handles that by deleting it.
        //
        // SAFETY: guaranteed by caller
        unsafe { Self::release(*node, size, capacity) };
        *node = copy;
        Ok(())
    }
}

/// A node that's in the process of being filled
///
/// If dropped (i.e. if filling panics), the `len` elements written so far are dropped and the node
/// is deleted.
struct PartialNode<T, P: MemoryPolicy> {
    node: NodePtr<T, P>,
    len: usize,
    capacity: usize,
}

impl<T, P: MemoryPolicy> PartialNode<T, P> {
    /// Hands over the filled node, disarming the cleanup
    fn finish(self) -> NodePtr<T, P> {
        let node = self.node;
        mem::forget(self);
        node
    }
}

impl<T, P: MemoryPolicy> Drop for PartialNode<T, P> {
    fn drop(&mut self) {
        debug_println!("copy aborted after {} elements", self.len);
        // SAFETY: exactly the first `len` slots were written, and nothing else has seen the node.
        unsafe { Node::delete_n(self.node, self.len, self.capacity) };
    }
}

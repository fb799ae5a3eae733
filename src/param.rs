//! Parameterization for [`Node`]s
//!
//! Every node is parameterized by a single [`MemoryPolicy`], which bundles together the three
//! choices that decide how a node is stored and shared:
//!
//! * a [`Heap`], supplying raw memory,
//! * a [`RefCount`], tracking how many persistent values point to the node, and
//! * a [`Transience`] scheme, deciding which edit (if any) may mutate a shared node in place.
//!
//! All three are resolved at compile time; nothing here is dispatched dynamically. The
//! [`Memory`] type assembles any three policies into a `MemoryPolicy`, and a few common
//! combinations are provided as aliases:
//!
//! ```
//! use cambium::heap::{CacheAligned, GlobalHeap};
//! use cambium::param::Memory;
//! use cambium::transience::TokenTransience;
//! use cambium::Node;
//! use std::cell::Cell;
//!
//! type MyMemory = Memory<CacheAligned<GlobalHeap>, Cell<usize>, TokenTransience>;
//!
//! let node = Node::<u8, MyMemory>::copy_n(4, b"abc").unwrap();
//! unsafe {
//!     assert_eq!(node.as_slice(3), b"abc");
//!     Node::delete_n(node, 3, 4);
//! }
//! ```
//!
//! The traits are public so that callers can supply their own heaps or refcounts.
//!
//! [`Node`]: crate::Node

use std::alloc::Layout;
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::atomic::AtomicUsize;

use crate::error::AllocError;
use crate::heap::GlobalHeap;
use crate::transience::{NoTransience, TokenTransience};

/// Bundle of the policies used by a [`Node`](crate::Node)
pub trait MemoryPolicy: Sized {
    /// Where the node's memory comes from
    type Heap: Heap;

    /// The counter stored in each node, tracking the number of persistent values sharing it
    type RefCount: RefCount;

    /// The scheme for granting in-place mutation rights to a single edit session
    type Transience: Transience;
}

/// Source of raw memory for nodes
///
/// Heaps are "static" -- there's no heap value stored anywhere, so the functions here take no
/// `self`. Implementations that need state (counters, free lists, ...) keep it in statics or
/// thread-locals.
pub trait Heap {
    /// Allocates a block of memory fitting `layout`
    ///
    /// Implementations must return memory that's valid for reads and writes of `layout.size()`
    /// bytes and aligned to at least `layout.align()`, or an error. Unlike
    /// [`std::alloc::GlobalAlloc`], zero-sized layouts *may* be requested.
    fn allocate(layout: Layout) -> Result<NonNull<u8>, AllocError>;

    /// Releases a block of memory previously returned by [`allocate`](Self::allocate)
    ///
    /// ## Safety
    ///
    /// `ptr` must have been returned by a call to `Self::allocate` with the same `layout`, and
    /// must not have been deallocated since.
    unsafe fn deallocate(ptr: NonNull<u8>, layout: Layout);
}

/// Abstraction over the reference count stored in each node
///
/// This plays the same role as the strong count in [`Rc`]/[`Arc`], except that it's managed
/// manually: the caller increments it when a new persistent value starts pointing at the node,
/// and decrements it when one goes away.
///
/// Implementations are provided for `AtomicUsize` (thread-safe), `Cell<usize>` (single-threaded),
/// and `()` (no counting at all, for heaps that manage lifetimes on their own).
///
/// [`Rc`]: std::rc::Rc
/// [`Arc`]: std::sync::Arc
pub trait RefCount {
    /// Creates a new value with a count of one
    fn one() -> Self;

    /// Returns the current count
    fn count(&self) -> usize;

    /// Returns whether the owner of the count is a unique owner
    ///
    /// For thread-safe counts, this method can only ever say "yes" or "probably not" -- another
    /// thread might decrement the count between the result being calculated and returned.
    /// However, if the count *is* unique, it's guaranteed to stay that way until the owner
    /// itself shares it.
    fn is_unique(&self) -> bool;

    /// Increments the count
    fn increment(&self);

    /// Decrements the count, returning `true` if the value it guards should be dropped
    fn decrement(&self) -> bool;
}

/// A transience scheme: the type of edit tokens, and the type that records them inside a node
pub trait Transience {
    /// A capability identifying one in-progress batch of mutations
    type Edit: Copy + Eq;

    /// The per-node field recording which edit, if any, may mutate the node in place
    type Ownee: Ownee<Self::Edit>;
}

/// The per-node record of which edit currently has mutation rights
///
/// The `Default` value records no edit at all.
pub trait Ownee<E>: Default {
    /// Returns whether `edit` is the edit recorded here
    fn can_mutate(&self, edit: E) -> bool;

    /// Records `edit` as the edit with mutation rights
    fn set(&mut self, edit: E);

    /// Forgets any recorded edit
    fn clear(&mut self);

    /// Returns whether *any* edit is recorded
    fn is_owned(&self) -> bool;
}

/// Generic [`MemoryPolicy`] built from a [`Heap`] `H`, a [`RefCount`] `R`, and a [`Transience`]
/// `X`
pub struct Memory<H, R, X>(PhantomData<(H, R, X)>);

impl<H: Heap, R: RefCount, X: Transience> MemoryPolicy for Memory<H, R, X> {
    type Heap = H;
    type RefCount = R;
    type Transience = X;
}

/// Thread-safe refcounting without transient edits (*default*)
pub type DefaultMemory = Memory<GlobalHeap, AtomicUsize, NoTransience>;

/// Thread-safe refcounting with token-based transient edits
pub type TransientMemory = Memory<GlobalHeap, AtomicUsize, TokenTransience>;

/// Single-threaded refcounting with token-based transient edits
pub type LocalMemory = Memory<GlobalHeap, std::cell::Cell<usize>, TokenTransience>;

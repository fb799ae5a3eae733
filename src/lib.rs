//! # Cambium -- leaf storage for persistent arrays
//!
//! Persistent (immutable, structurally-shared) vectors are built out of small blocks of
//! elements that many versions of the vector point to at once. This crate provides those blocks:
//! the [`Node`], and nothing above it. The tree that arranges nodes, iteration, and the public
//! collection API all live a layer up, in whatever builds on this crate.
//!
//! A node is a single allocation holding
//!
//! * a reference count, so that any number of persistent values can share it,
//! * an "ownee" tag, recording which transient edit session (if any) may mutate it in place, and
//! * a run of element slots, whose number (the *capacity*) is chosen when the node is allocated.
//!
//! Nodes don't record their own size or capacity; the layer above tracks those next to each
//! [`NodePtr`] and hands them back when needed.
//!
//! ### Sharing and transience
//!
//! Anything that's shared must be treated as immutable -- except that an edit session that
//! created a node (or claimed it) may keep writing to it in place, even after the node has been
//! shared, until the session ends. [`NodePtr::can_mutate`] is the single check that decides
//! between writing in place and copying first; [`Node::ensure_mutable`] wraps up the
//! copy-if-needed step.
//!
//! ### Parameterization
//!
//! Every node is parameterized by a [`MemoryPolicy`](param::MemoryPolicy), choosing the heap
//! that supplies memory, the kind of reference count (atomic, single-threaded, or none), and the
//! transience scheme. See the [`param`] module for the details, and [`heap`], [`transience`] for
//! the provided implementations.
//!
//! ```
//! use cambium::param::TransientMemory;
//! use cambium::transience::Owner;
//! use cambium::Node;
//!
//! let owner = Owner::new();
//! let node = Node::<u32, TransientMemory>::copy_e(owner.edit(), 8, &[1, 2, 3]).unwrap();
//!
//! unsafe {
//!     assert!(node.can_mutate(owner.edit()));
//!     node.data().add(3).write(4);
//!     assert_eq!(node.as_slice(4), &[1, 2, 3, 4]);
//!     Node::delete_n(node, 4, 8);
//! }
//! ```
//!
//! ### Feature flags
//!
//! There is currently just one feature flag -- `fuzz`. It exposes the [`mock`] module (a
//! `Vec`-backed model of nodes and the runner that checks real nodes against it) and derives
//! `Arbitrary` for its commands.
//!
//! ### Naming
//!
//! The cambium is the thin layer of a tree where new growth happens, just under the bark.

#![deny(unsafe_op_in_unsafe_fn)]

#[macro_use]
mod macros;

pub mod error;
pub mod heap;
pub mod param;
pub mod transience;

#[cfg(any(test, feature = "fuzz"))]
pub mod mock;

mod node;
mod refcount;

pub use error::AllocError;
pub use node::{Node, NodePtr, NodeState};

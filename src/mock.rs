//! Mock model of a set of node holders, and a runner that checks real nodes against it
//!
//! A "holder" here stands in for one persistent or transient value from the array layer above
//! this crate: it keeps a [`NodePtr`] together with the size and capacity of that node, and
//! (if it's transient) the [`Owner`] of its edit session. The [`Mock`] tracks the same holders
//! with plain `Vec`s and counters, and the [`Runner`] applies every [`Command`] to both,
//! checking after each one that contents, refcounts, and [`NodeState`]s agree.
//!
//! The heap used by the runner is up to the caller; [`CountingHeap`] records live allocations so
//! that leaks (or double frees) show up once the runner is dropped.

use std::alloc::Layout;
use std::cell::Cell;
use std::ptr::NonNull;

#[cfg(feature = "fuzz")]
use arbitrary::Arbitrary;

use crate::error::AllocError;
use crate::heap::GlobalHeap;
use crate::param::{Heap, MemoryPolicy, Ownee, RefCount};
use crate::transience::{Owner, TokenTransience};
use crate::{Node, NodePtr, NodeState};

/// Index of a holder, taken modulo the number of live holders
pub type HolderId = u8;

/// A single operation on the set of holders
#[cfg_attr(feature = "fuzz", derive(Arbitrary))]
#[derive(Debug, Clone)]
pub enum Command<T> {
    /// Add a new, empty, persistent holder with the given capacity
    Make { capacity: u8 },
    /// Start a new edit session for the holder
    Transient { id: HolderId },
    /// Append a value to the holder
    Push { id: HolderId, value: T },
    /// Overwrite an existing element (if there are any)
    Set { id: HolderId, index: u8, value: T },
    /// Add a new persistent holder sharing the same node
    Share { id: HolderId },
    /// Add a new persistent holder with a copy of the node, with `extra` spare capacity
    Copy { id: HolderId, extra: u8 },
    /// End the holder's edit session, if it has one
    Commit { id: HolderId },
    /// Remove the holder
    Drop { id: HolderId },
}

/// `Vec`-backed model of a set of holders
#[derive(Debug, Clone, Default)]
pub struct Mock<T> {
    holders: Vec<MockHolder<T>>,
    // Nodes are never removed, so that indexes stay stable
    nodes: Vec<MockNode>,
    next_edit: usize,
}

#[derive(Debug, Clone)]
struct MockHolder<T> {
    node: usize,
    items: Vec<T>,
    capacity: usize,
    edit: Option<usize>,
}

#[derive(Debug, Clone)]
struct MockNode {
    refs: usize,
    ownee: Option<usize>,
}

/// Growth policy for transient pushes into a full node
fn grow(capacity: usize) -> usize {
    capacity + capacity / 2 + 1
}

impl<T: Clone> Mock<T> {
    pub fn new() -> Self {
        Mock {
            holders: Vec::new(),
            nodes: Vec::new(),
            next_edit: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.holders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.holders.is_empty()
    }

    /// Returns the contents of the holder at `idx`
    pub fn items(&self, idx: usize) -> &[T] {
        &self.holders[idx].items
    }

    /// Returns the expected refcount of the node behind the holder at `idx`
    pub fn refs(&self, idx: usize) -> usize {
        self.nodes[self.holders[idx].node].refs
    }

    /// Returns the expected state of the node behind the holder at `idx`
    pub fn state(&self, idx: usize) -> NodeState {
        let node = &self.nodes[self.holders[idx].node];
        if node.ownee.is_some() {
            NodeState::Owned
        } else if node.refs == 1 {
            NodeState::UniqueUnowned
        } else {
            NodeState::Shared
        }
    }

    /// Returns whether the holder at `idx` may write to its node in place
    pub fn can_mutate(&self, idx: usize) -> bool {
        let h = &self.holders[idx];
        let node = &self.nodes[h.node];
        match h.edit {
            Some(e) => node.refs == 1 || node.ownee == Some(e),
            None => false,
        }
    }

    fn fresh_edit(&mut self) -> usize {
        self.next_edit += 1;
        self.next_edit
    }

    fn new_node(&mut self, ownee: Option<usize>) -> usize {
        self.nodes.push(MockNode { refs: 1, ownee });
        self.nodes.len() - 1
    }

    /// Moves the holder at `idx` onto a fresh node, owned by its edit (if any)
    fn detach(&mut self, idx: usize, capacity: usize) {
        let ownee = self.holders[idx].edit;
        let new = self.new_node(ownee);
        let old = std::mem::replace(&mut self.holders[idx].node, new);
        self.nodes[old].refs -= 1;
        self.holders[idx].capacity = capacity;
    }

    pub fn apply(&mut self, cmd: &Command<T>) {
        if let Command::Make { capacity } = cmd {
            let node = self.new_node(None);
            self.holders.push(MockHolder {
                node,
                items: Vec::new(),
                capacity: *capacity as usize,
                edit: None,
            });
            return;
        }

        let Some(idx) = resolve_id(cmd, self.holders.len()) else {
            return;
        };

        match cmd {
            Command::Make { .. } => unreachable!("handled above"),
            Command::Transient { .. } => {
                let edit = self.fresh_edit();
                self.holders[idx].edit = Some(edit);
            }
            Command::Push { value, .. } => {
                let h = &self.holders[idx];
                let (size, capacity) = (h.items.len(), h.capacity);
                if h.edit.is_none() {
                    self.detach(idx, size + 1);
                } else if size == capacity {
                    self.detach(idx, grow(capacity));
                } else if !self.can_mutate(idx) {
                    self.detach(idx, capacity);
                }
                self.holders[idx].items.push(value.clone());
            }
            Command::Set { index, value, .. } => {
                let h = &self.holders[idx];
                if h.items.is_empty() {
                    return;
                }
                let i = *index as usize % h.items.len();
                if !self.can_mutate(idx) {
                    let capacity = h.capacity;
                    self.detach(idx, capacity);
                }
                self.holders[idx].items[i] = value.clone();
            }
            Command::Share { .. } => {
                let h = &self.holders[idx];
                let new = MockHolder {
                    node: h.node,
                    items: h.items.clone(),
                    capacity: h.capacity,
                    edit: None,
                };
                self.nodes[h.node].refs += 1;
                if h.edit.is_some() {
                    let edit = self.fresh_edit();
                    self.holders[idx].edit = Some(edit);
                }
                self.holders.push(new);
            }
            Command::Copy { extra, .. } => {
                let items = self.holders[idx].items.clone();
                let node = self.new_node(None);
                self.holders.push(MockHolder {
                    node,
                    capacity: items.len() + *extra as usize,
                    items,
                    edit: None,
                });
            }
            Command::Commit { .. } => {
                if self.holders[idx].edit.is_some() {
                    if self.can_mutate(idx) {
                        let node = self.holders[idx].node;
                        self.nodes[node].ownee = None;
                    }
                    self.holders[idx].edit = None;
                }
            }
            Command::Drop { .. } => {
                let h = self.holders.remove(idx);
                self.nodes[h.node].refs -= 1;
            }
        }
    }
}

/// Returns the index of the holder targeted by `cmd`, or `None` if there are no holders
fn resolve_id<T>(cmd: &Command<T>, len: usize) -> Option<usize> {
    let id = match cmd {
        Command::Make { .. } => return None,
        Command::Transient { id }
        | Command::Push { id, .. }
        | Command::Set { id, .. }
        | Command::Share { id }
        | Command::Copy { id, .. }
        | Command::Commit { id }
        | Command::Drop { id } => *id,
    };

    match len {
        0 => None,
        _ => Some(id as usize % len),
    }
}

/// One real holder: a node, with the size & capacity that go with it
struct Holder<T, P: MemoryPolicy> {
    node: NodePtr<T, P>,
    size: usize,
    capacity: usize,
    owner: Option<Owner>,
}

/// Applies [`Command`]s to real nodes and to a [`Mock`], checking that the two agree
///
/// The runner requires a counting [`RefCount`] (not `()`), because it checks exact counts.
pub struct Runner<T, P: MemoryPolicy<Transience = TokenTransience>> {
    holders: Vec<Holder<T, P>>,
    mock: Mock<T>,
}

impl<T, P> Runner<T, P>
where
    T: Clone + PartialEq + std::fmt::Debug,
    P: MemoryPolicy<Transience = TokenTransience>,
{
    pub fn new() -> Self {
        Runner {
            holders: Vec::new(),
            mock: Mock::new(),
        }
    }

    pub fn mock(&self) -> &Mock<T> {
        &self.mock
    }

    /// Applies the command, then checks every holder against the mock
    pub fn run(&mut self, cmd: &Command<T>) {
        debug_println!("run: {cmd:?}");
        self.apply(cmd);
        self.mock.apply(cmd);
        self.check();
    }

    /// Panics if any holder disagrees with the mock
    pub fn check(&self) {
        assert_eq!(self.holders.len(), self.mock.len());

        for (idx, h) in self.holders.iter().enumerate() {
            // SAFETY: every holder owns a reference to its node, and `size` elements are live.
            let (items, refs, state) = unsafe {
                (
                    h.node.as_slice(h.size),
                    h.node.refs().count(),
                    h.node.state(),
                )
            };

            assert_eq!(items, self.mock.items(idx), "contents of holder {idx}");
            assert_eq!(refs, self.mock.refs(idx), "refcount of holder {idx}");
            assert_eq!(state, self.mock.state(idx), "state of holder {idx}");
            assert!(h.size <= h.capacity);
        }
    }

    fn apply(&mut self, cmd: &Command<T>) {
        if let Command::Make { capacity } = cmd {
            let capacity = *capacity as usize;
            let node = Node::make_n(capacity).expect("allocation failed");
            self.holders.push(Holder { node, size: 0, capacity, owner: None });
            return;
        }

        let Some(idx) = resolve_id(cmd, self.holders.len()) else {
            return;
        };

        // SAFETY: every holder owns one reference to its node, with `size` live elements and the
        // capacity it was created with. Holders only write in place after `can_mutate` (directly
        // or through `ensure_mutable`), and the nodes claimed by a holder's current edit are never
        // referenced by anyone else, because sharing a transient renews its edit first.
        unsafe {
            match cmd {
                Command::Make { .. } => unreachable!("handled above"),
                Command::Transient { .. } => {
                    self.holders[idx].owner = Some(Owner::new());
                }
                Command::Push { value, .. } => {
                    let h = &mut self.holders[idx];
                    match &h.owner {
                        None => {
                            let new_cap = h.size + 1;
                            let copy = Node::copy_n_from(new_cap, h.node, h.size)
                                .expect("allocation failed");
                            Node::release(h.node, h.size, h.capacity);
                            h.node = copy;
                            h.capacity = new_cap;
                        }
                        Some(owner) if h.size == h.capacity => {
                            let new_cap = grow(h.capacity);
                            let copy = Node::copy_e_from(owner.edit(), new_cap, h.node, h.size)
                                .expect("allocation failed");
                            Node::release(h.node, h.size, h.capacity);
                            h.node = copy;
                            h.capacity = new_cap;
                        }
                        Some(owner) => {
                            let can_mutate = h.node.can_mutate(owner.edit());
                            assert_eq!(can_mutate, self.mock.can_mutate(idx));
                            Node::ensure_mutable(owner.edit(), &mut h.node, h.size, h.capacity)
                                .expect("allocation failed");
                        }
                    }

                    h.node.data().add(h.size).write(value.clone());
                    h.size += 1;
                }
                Command::Set { index, value, .. } => {
                    let h = &mut self.holders[idx];
                    if h.size == 0 {
                        return;
                    }
                    let i = *index as usize % h.size;

                    match &h.owner {
                        Some(owner) => {
                            let can_mutate = h.node.can_mutate(owner.edit());
                            assert_eq!(can_mutate, self.mock.can_mutate(idx));
                            Node::ensure_mutable(owner.edit(), &mut h.node, h.size, h.capacity)
                                .expect("allocation failed");
                        }
                        None => {
                            let copy = Node::copy_n_from(h.capacity, h.node, h.size)
                                .expect("allocation failed");
                            Node::release(h.node, h.size, h.capacity);
                            h.node = copy;
                        }
                    }

                    h.node.as_mut_slice(h.size)[i] = value.clone();
                }
                Command::Share { .. } => {
                    let h = &mut self.holders[idx];
                    let new = Holder {
                        node: Node::share(h.node),
                        size: h.size,
                        capacity: h.capacity,
                        owner: None,
                    };
                    if let Some(owner) = h.owner.as_mut() {
                        owner.renew();
                    }
                    self.holders.push(new);
                }
                Command::Copy { extra, .. } => {
                    let h = &self.holders[idx];
                    let capacity = h.size + *extra as usize;
                    let node =
                        Node::copy_n_from(capacity, h.node, h.size).expect("allocation failed");
                    let size = h.size;
                    self.holders.push(Holder { node, size, capacity, owner: None });
                }
                Command::Commit { .. } => {
                    let h = &mut self.holders[idx];
                    if let Some(owner) = h.owner.take() {
                        if h.node.can_mutate(owner.edit()) {
                            h.node.ownee_mut().clear();
                        }
                    }
                }
                Command::Drop { .. } => {
                    let h = self.holders.remove(idx);
                    Node::release(h.node, h.size, h.capacity);
                }
            }
        }
    }
}

impl<T, P> Default for Runner<T, P>
where
    T: Clone + PartialEq + std::fmt::Debug,
    P: MemoryPolicy<Transience = TokenTransience>,
{
    fn default() -> Self {
        Runner::new()
    }
}

impl<T, P: MemoryPolicy<Transience = TokenTransience>> Drop for Runner<T, P> {
    fn drop(&mut self) {
        for h in self.holders.drain(..) {
            // SAFETY: each holder owns one reference, as in `Runner::apply`
            unsafe { Node::release(h.node, h.size, h.capacity) };
        }
    }
}

thread_local! {
    static HEAP_STATS: Cell<HeapStats> = const { Cell::new(HeapStats::EMPTY) };
    static FAIL_AFTER: Cell<Option<usize>> = const { Cell::new(None) };
}

/// Counters kept by [`CountingHeap`], per thread
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct HeapStats {
    pub allocations: usize,
    pub deallocations: usize,
    pub bytes_allocated: usize,
    pub bytes_deallocated: usize,
}

impl HeapStats {
    const EMPTY: Self = HeapStats {
        allocations: 0,
        deallocations: 0,
        bytes_allocated: 0,
        bytes_deallocated: 0,
    };

    /// Returns the number of bytes currently allocated
    pub fn live_bytes(&self) -> usize {
        self.bytes_allocated - self.bytes_deallocated
    }

    /// Returns the number of allocations not yet released
    pub fn live_allocations(&self) -> usize {
        self.allocations - self.deallocations
    }
}

/// [`Heap`] wrapping [`GlobalHeap`] that counts allocations on the current thread
///
/// It can also be told to start failing after a number of successful allocations, with
/// [`CountingHeap::fail_after`].
pub struct CountingHeap;

impl CountingHeap {
    /// Returns the counters for the current thread
    pub fn stats() -> HeapStats {
        HEAP_STATS.with(|s| s.get())
    }

    /// Resets the counters for the current thread, and clears any pending failure
    pub fn reset() {
        HEAP_STATS.with(|s| s.set(HeapStats::EMPTY));
        FAIL_AFTER.with(|f| f.set(None));
    }

    /// Makes every allocation after the next `n` fail, on the current thread
    pub fn fail_after(n: usize) {
        FAIL_AFTER.with(|f| f.set(Some(n)));
    }
}

impl Heap for CountingHeap {
    fn allocate(layout: Layout) -> Result<NonNull<u8>, AllocError> {
        let fail = FAIL_AFTER.with(|f| match f.get() {
            Some(0) => true,
            Some(n) => {
                f.set(Some(n - 1));
                false
            }
            None => false,
        });

        if fail {
            return Err(AllocError::Exhausted {
                size: layout.size(),
                align: layout.align(),
            });
        }

        let ptr = GlobalHeap::allocate(layout)?;
        HEAP_STATS.with(|s| {
            let mut stats = s.get();
            stats.allocations += 1;
            stats.bytes_allocated += layout.size();
            s.set(stats);
        });
        Ok(ptr)
    }

    unsafe fn deallocate(ptr: NonNull<u8>, layout: Layout) {
        HEAP_STATS.with(|s| {
            let mut stats = s.get();
            stats.deallocations += 1;
            stats.bytes_deallocated += layout.size();
            s.set(stats);
        });
        // SAFETY: guaranteed by caller
        unsafe { GlobalHeap::deallocate(ptr, layout) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_tracks_sharing() {
        let mut mock: Mock<u8> = Mock::new();
        mock.apply(&Command::Make { capacity: 2 });
        mock.apply(&Command::Push { id: 0, value: 1 });
        mock.apply(&Command::Share { id: 0 });

        assert_eq!(mock.len(), 2);
        assert_eq!(mock.refs(0), 2);
        assert_eq!(mock.state(1), NodeState::Shared);
        assert_eq!(mock.items(1), &[1]);

        mock.apply(&Command::Drop { id: 1 });
        assert_eq!(mock.refs(0), 1);
        assert_eq!(mock.state(0), NodeState::UniqueUnowned);
    }
}

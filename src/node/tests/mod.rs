//! Unit tests for nodes
//!
//! Most of these run on top of [`CountingHeap`], so that every allocation and release can be
//! checked byte-for-byte. Counters are thread-local, so tests don't interfere with each other.

use std::cell::Cell;
use std::sync::atomic::AtomicUsize;

use crate::mock::CountingHeap;
use crate::param::Memory;
use crate::transience::{NoTransience, TokenTransience};

/// Mutation rights: `can_mutate`, node states, and `ensure_mutable`
mod transient;

/// Thread-safe refcount with edit tokens, on the counting heap
type Counted = Memory<CountingHeap, AtomicUsize, TokenTransience>;
/// Single-threaded refcount with edit tokens, on the counting heap
type CountedLocal = Memory<CountingHeap, Cell<usize>, TokenTransience>;
/// Thread-safe refcount without transience, on the counting heap
type CountedPlain = Memory<CountingHeap, AtomicUsize, NoTransience>;

thread_local! {
    static CLONES: Cell<usize> = const { Cell::new(0) };
    static DROPS: Cell<usize> = const { Cell::new(0) };
}

/// Element type that counts its clones and drops, and can be set to panic when cloned
#[derive(Debug, PartialEq)]
struct Tracked {
    value: u32,
    panic_on_clone: bool,
}

impl Tracked {
    fn new(value: u32) -> Self {
        Tracked { value, panic_on_clone: false }
    }

    fn bomb(value: u32) -> Self {
        Tracked { value, panic_on_clone: true }
    }

    fn clones() -> usize {
        CLONES.with(|c| c.get())
    }

    fn drops() -> usize {
        DROPS.with(|c| c.get())
    }

    fn reset() {
        CLONES.with(|c| c.set(0));
        DROPS.with(|c| c.set(0));
    }
}

impl Clone for Tracked {
    fn clone(&self) -> Self {
        if self.panic_on_clone {
            panic!("refusing to clone {}", self.value);
        }
        CLONES.with(|c| c.set(c.get() + 1));
        Tracked::new(self.value)
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        DROPS.with(|c| c.set(c.get() + 1));
    }
}

/// Resets the heap and element counters for the current test
fn reset() {
    CountingHeap::reset();
    Tracked::reset();
}

/// Asserts that everything allocated on this thread has been released
fn assert_no_leaks() {
    let stats = CountingHeap::stats();
    assert_eq!(stats.live_allocations(), 0, "{stats:?}");
    assert_eq!(stats.live_bytes(), 0, "{stats:?}");
}

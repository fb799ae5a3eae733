//! Implementations of [`RefCount`] for the counters we provide

use crate::param::RefCount;
use std::cell::Cell;
use std::sync::atomic::{AtomicUsize, Ordering};

// No counting at all: nodes are never reported unique, and never reported as dead. This is only
// useful with a heap that reclaims memory on its own.
#[rustfmt::skip]
impl RefCount for () {
    fn one() -> Self {}
    fn count(&self) -> usize { 0 }
    fn is_unique(&self) -> bool { false }
    fn increment(&self) {}
    fn decrement(&self) -> bool { false }
}

impl RefCount for Cell<usize> {
    fn one() -> Self {
        Cell::new(1)
    }

    fn count(&self) -> usize {
        self.get()
    }

    fn is_unique(&self) -> bool {
        self.get() == 1
    }

    fn increment(&self) {
        let old = self.get();
        if old > isize::MAX as usize {
            panic!("more than isize::MAX references to the same node");
        }
        self.set(old + 1);
    }

    fn decrement(&self) -> bool {
        let new = self.get() - 1;
        self.set(new);
        new == 0
    }
}

impl RefCount for AtomicUsize {
    fn one() -> Self {
        AtomicUsize::new(1)
    }

    fn count(&self) -> usize {
        self.load(Ordering::Acquire)
    }

    fn is_unique(&self) -> bool {
        // the `Acquire` here matches with the `Release` in `decrement` so that a decrement
        // operation from another thread cannot occur after we read is_unique() as `true`.
        self.load(Ordering::Acquire) == 1
    }

    fn increment(&self) {
        // A relaxed ordering is ok here because we really *only* care about whether the count is
        // at least 1, and the caller already holds a reference keeping it there.
        let old = self.fetch_add(1, Ordering::Relaxed);
        if old > isize::MAX as usize {
            panic!("more than isize::MAX references to the same node");
        }
    }

    fn decrement(&self) -> bool {
        let is_now_zero = self.fetch_sub(1, Ordering::Release) == 1;
        if is_now_zero {
            // This additional load is required so that writes made in another thread are visible
            // when the node's elements are dropped. The `Acquire` here matches the `Release` of
            // every prior decrement(), which is what `Arc` does as well.
            self.load(Ordering::Acquire);
        }

        is_now_zero
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise<R: RefCount>() {
        let r = R::one();
        assert!(r.is_unique());
        assert_eq!(r.count(), 1);

        r.increment();
        assert!(!r.is_unique());
        assert_eq!(r.count(), 2);

        assert!(!r.decrement());
        assert!(r.is_unique());
        assert!(r.decrement());
    }

    #[test]
    fn atomic_counts() {
        exercise::<AtomicUsize>();
    }

    #[test]
    fn cell_counts() {
        exercise::<Cell<usize>>();
    }

    #[test]
    fn unit_never_unique_never_dead() {
        let r = <()>::one();
        assert!(!r.is_unique());
        r.increment();
        assert!(!r.decrement());
        assert!(!r.decrement());
    }
}

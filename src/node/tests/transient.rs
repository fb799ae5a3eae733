use std::sync::{Arc, Barrier};
use std::thread;

use super::{assert_no_leaks, reset, Counted, CountedLocal, CountedPlain};
use crate::mock::CountingHeap;
use crate::param::{Ownee, RefCount, TransientMemory};
use crate::transience::{NoEdit, Owner};
use crate::{Node, NodeState};

#[test]
fn fresh_edit_node_is_mutable_by_its_edit() {
    reset();
    let a = Owner::new();
    let b = Owner::new();

    let node = Node::<u32, Counted>::make_e(a.edit(), 4).unwrap();
    unsafe {
        assert_eq!(node.state(), NodeState::Owned);
        assert!(node.ownee().can_mutate(a.edit()));
        assert!(node.can_mutate(a.edit()));
        // any other edit may only mutate while the node is unique
        assert_eq!(node.can_mutate(b.edit()), node.refs().is_unique());
        assert!(node.can_mutate(b.edit()));

        let shared = Node::share(node);
        assert!(node.can_mutate(a.edit()));
        assert!(!node.can_mutate(b.edit()));
        assert_eq!(node.can_mutate(b.edit()), node.refs().is_unique());

        Node::release(shared, 0, 4);
        Node::release(node, 0, 4);
    }
    assert_no_leaks();
}

#[test]
fn shared_node_refuses_other_edits() {
    reset();

    let node = Node::<u32, CountedLocal>::copy_n(4, &[1, 2, 3]).unwrap();
    unsafe {
        let shared = Node::share(node);
        assert_eq!(node.state(), NodeState::Shared);

        for _ in 0..3 {
            assert!(!node.can_mutate(Owner::new().edit()));
        }

        Node::release(shared, 3, 4);
        Node::release(node, 3, 4);
    }
    assert_no_leaks();
}

#[test]
fn copy_e_claims_the_copy() {
    reset();
    let owner = Owner::new();

    let src = Node::<u32, Counted>::copy_n(3, &[1, 2, 3]).unwrap();
    unsafe {
        let shared = Node::share(src);
        let copy = Node::copy_e_from(owner.edit(), 6, src, 3).unwrap();
        Node::share(copy);

        // Both are shared, but only the copy was claimed
        assert!(!src.can_mutate(owner.edit()));
        assert!(copy.can_mutate(owner.edit()));
        assert_eq!(copy.state(), NodeState::Owned);
        assert_eq!(copy.as_slice(3), &[1, 2, 3]);

        Node::release(copy, 3, 6);
        Node::release(copy, 3, 6);
        Node::release(shared, 3, 3);
        Node::release(src, 3, 3);
    }
    assert_no_leaks();
}

#[test]
fn commit_clears_the_claim() {
    reset();
    let owner = Owner::new();

    let node = Node::<u32, Counted>::make_e(owner.edit(), 2).unwrap();
    unsafe {
        let shared = Node::share(node);
        assert_eq!(node.state(), NodeState::Owned);
        assert!(node.can_mutate(owner.edit()));

        node.ownee_mut().clear();
        assert_eq!(node.state(), NodeState::Shared);
        assert!(!node.can_mutate(owner.edit()));

        Node::release(shared, 0, 2);
        assert_eq!(node.state(), NodeState::UniqueUnowned);
        // unique again, so any edit may mutate it
        assert!(node.can_mutate(owner.edit()));
        Node::release(node, 0, 2);
    }
    assert_no_leaks();
}

#[test]
fn renewed_owner_loses_its_claim() {
    reset();
    let mut owner = Owner::new();

    let node = Node::<u32, Counted>::make_e(owner.edit(), 2).unwrap();
    unsafe {
        let shared = Node::share(node);
        owner.renew();
        assert!(!node.can_mutate(owner.edit()));

        // a cloned owner is a different session altogether
        let other = owner.clone();
        assert!(!node.can_mutate(other.edit()));

        Node::release(shared, 0, 2);
        Node::release(node, 0, 2);
    }
    assert_no_leaks();
}

#[test]
fn ensure_mutable_is_free_when_unique() {
    reset();
    let owner = Owner::new();

    let mut node = Node::<u32, Counted>::copy_n(4, &[1, 2]).unwrap();
    let original = node;
    unsafe {
        Node::ensure_mutable(owner.edit(), &mut node, 2, 4).unwrap();
        assert_eq!(node, original);
        // in-place mutation of a unique node doesn't claim it
        assert_eq!(node.state(), NodeState::UniqueUnowned);

        node.as_mut_slice(2)[0] = 5;
        node.data().add(2).write(6);
        assert_eq!(node.as_slice(3), &[5, 2, 6]);
        Node::delete_n(node, 3, 4);
    }

    assert_eq!(CountingHeap::stats().allocations, 1);
    assert_no_leaks();
}

#[test]
fn ensure_mutable_copies_shared_nodes() {
    reset();
    let owner = Owner::new();

    let mut node = Node::<u32, Counted>::copy_n(4, &[1, 2]).unwrap();
    let original = unsafe { Node::share(node) };
    unsafe {
        Node::ensure_mutable(owner.edit(), &mut node, 2, 4).unwrap();
        assert_ne!(node, original);
        assert_eq!(node.state(), NodeState::Owned);
        assert!(node.can_mutate(owner.edit()));

        // the caller's reference to the original was given up
        assert_eq!(original.state(), NodeState::UniqueUnowned);

        node.as_mut_slice(2)[1] = 9;
        assert_eq!(node.as_slice(2), &[1, 9]);
        assert_eq!(original.as_slice(2), &[1, 2]);

        // claimed now, so asking again doesn't copy
        let claimed = node;
        Node::ensure_mutable(owner.edit(), &mut node, 2, 4).unwrap();
        assert_eq!(node, claimed);

        Node::release(node, 2, 4);
        Node::release(original, 2, 4);
    }

    assert_eq!(CountingHeap::stats().allocations, 2);
    assert_no_leaks();
}

#[test]
fn ensure_mutable_failure_keeps_the_node() {
    reset();
    let owner = Owner::new();

    let mut node = Node::<u32, Counted>::copy_n(2, &[1, 2]).unwrap();
    let original = node;
    unsafe {
        let shared = Node::share(node);

        CountingHeap::fail_after(0);
        assert!(Node::ensure_mutable(owner.edit(), &mut node, 2, 2).is_err());
        assert_eq!(node, original);
        assert_eq!(node.refs().count(), 2);

        Node::release(shared, 2, 2);
        Node::release(node, 2, 2);
    }
    assert_no_leaks();
}

#[test]
fn without_transience_only_uniqueness_counts() {
    reset();

    let node = Node::<u32, CountedPlain>::make_n(1).unwrap();
    unsafe {
        assert!(node.can_mutate(NoEdit));

        // claiming is a no-op without transience
        node.ownee_mut().set(NoEdit);
        assert_eq!(node.state(), NodeState::UniqueUnowned);

        let shared = Node::share(node);
        assert!(!node.can_mutate(NoEdit));
        assert_eq!(node.state(), NodeState::Shared);

        Node::release(shared, 0, 1);
        assert!(node.can_mutate(NoEdit));
        Node::release(node, 0, 1);
    }
    assert_no_leaks();
}

#[test]
fn concurrent_release_frees_once() {
    const THREADS: usize = 8;

    let items: Vec<String> = (0..5).map(|i| i.to_string()).collect();
    let node = Node::<String, TransientMemory>::copy_n(8, &items).unwrap();
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let shared = unsafe { Node::share(node) };
            let barrier = barrier.clone();
            let expected = items.clone();
            thread::spawn(move || {
                barrier.wait();
                unsafe {
                    assert_eq!(shared.as_slice(5), expected.as_slice());
                    Node::release(shared, 5, 8)
                }
            })
        })
        .collect();

    let mut freed = usize::from(unsafe { Node::release(node, 5, 8) });
    for h in handles {
        freed += usize::from(h.join().unwrap());
    }

    assert_eq!(freed, 1);
}

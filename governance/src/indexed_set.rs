//! A dense set with O(1) insert, lookup and removal.
//!
//! Items live in a `Vec`; a `HashMap` maps each item to its position.
//! Removal overwrites the slot with the last item, shrinks the vector and
//! updates the moved item's position, so iteration order is not stable.

use std::collections::HashMap;
use std::hash::Hash;

#[derive(Clone, Debug)]
pub struct IndexedSet<T> {
    items: Vec<T>,
    positions: HashMap<T, usize>,
}

impl<T: Copy + Eq + Hash> IndexedSet<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            positions: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, item: &T) -> bool {
        self.positions.contains_key(item)
    }

    /// Zero-based slot of `item`, if present.
    pub fn position(&self, item: &T) -> Option<usize> {
        self.positions.get(item).copied()
    }

    /// Append `item`. Returns `false` if it was already present.
    pub fn insert(&mut self, item: T) -> bool {
        if self.positions.contains_key(&item) {
            return false;
        }
        self.positions.insert(item, self.items.len());
        self.items.push(item);
        true
    }

    /// Swap-remove `item`. Returns `false` if it was absent.
    pub fn remove(&mut self, item: &T) -> bool {
        let Some(slot) = self.positions.remove(item) else {
            return false;
        };
        self.items.swap_remove(slot);
        if let Some(moved) = self.items.get(slot) {
            self.positions.insert(*moved, slot);
        }
        true
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }
}

impl<T: Copy + Eq + Hash> Default for IndexedSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy + Eq + Hash> PartialEq for IndexedSet<T> {
    /// Set equality; slot order is ignored.
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|item| other.contains(item))
    }
}

impl<T: Copy + Eq + Hash> Eq for IndexedSet<T> {}

impl<T: Copy + Eq + Hash> FromIterator<T> for IndexedSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut set = Self::new();
        for item in iter {
            set.insert(item);
        }
        set
    }
}

impl<'a, T: Copy + Eq + Hash> IntoIterator for &'a IndexedSet<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_positions_consistent(set: &IndexedSet<u32>) {
        for (slot, item) in set.iter().enumerate() {
            assert_eq!(set.position(item), Some(slot));
        }
        assert_eq!(set.positions.len(), set.len());
    }

    #[test]
    fn insert_is_idempotent() {
        let mut set = IndexedSet::new();
        assert!(set.insert(1u32));
        assert!(!set.insert(1));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn remove_moves_last_into_hole() {
        let mut set: IndexedSet<u32> = [10, 20, 30, 40].into_iter().collect();
        assert!(set.remove(&20));
        assert_eq!(set.as_slice(), &[10, 40, 30]);
        assert_eq!(set.position(&40), Some(1));
        assert_eq!(set.position(&20), None);
        assert_positions_consistent(&set);
    }

    #[test]
    fn remove_last_and_only() {
        let mut set: IndexedSet<u32> = [1, 2].into_iter().collect();
        assert!(set.remove(&2));
        assert_eq!(set.as_slice(), &[1]);
        assert!(set.remove(&1));
        assert!(set.is_empty());
        assert!(!set.remove(&1));
    }

    #[test]
    fn equality_ignores_order() {
        let a: IndexedSet<u32> = [1, 2, 3].into_iter().collect();
        let b: IndexedSet<u32> = [3, 1, 2].into_iter().collect();
        let c: IndexedSet<u32> = [1, 2].into_iter().collect();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn churn_keeps_positions_consistent() {
        let mut set = IndexedSet::new();
        for i in 0..50u32 {
            set.insert(i);
        }
        for i in (0..50u32).step_by(3) {
            set.remove(&i);
            assert_positions_consistent(&set);
        }
        assert_eq!(set.len(), 50 - 17);
    }
}

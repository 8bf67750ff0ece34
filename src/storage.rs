//! Interning of explored states.
//!
//! [`StateStorage`] hands out dense indices for state keys, in insertion order.
//! Keys live in one arena; the hash buckets hold the index of the first key of
//! their chain, and every entry links to the next key of its bucket.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::error::ModelError;
use crate::transition::StateKey;

const NONE: usize = usize::MAX;

/// Average chain length when the storage is full.
const LOAD_FACTOR: usize = 2;
const MAX_BUCKET_BITS: u32 = 20;

#[derive(Debug, Clone)]
struct Entry<K> {
    key: K,
    next: usize,
}

#[derive(Debug, Clone)]
pub struct StateStorage<K> {
    entries: Vec<Entry<K>>,
    buckets: Vec<usize>,
    bitmask: u64,
    capacity: usize,
}

impl<K: StateKey> StateStorage<K> {
    /// Creates a storage for at most `capacity` keys.
    pub fn with_capacity(capacity: usize) -> Self {
        let wanted = (capacity / LOAD_FACTOR).max(1).next_power_of_two();
        let buckets = wanted.min(1 << MAX_BUCKET_BITS);
        Self {
            entries: Vec::new(),
            buckets: vec![NONE; buckets],
            bitmask: (buckets - 1) as u64,
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn key(&self, index: usize) -> &K {
        assert!(index < self.entries.len(), "Index {} is not occupied", index);
        &self.entries[index].key
    }

    fn bucket(&self, key: &K) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() & self.bitmask) as usize
    }

    pub fn find(&self, key: &K) -> Option<usize> {
        let mut index = self.buckets[self.bucket(key)];
        while index != NONE {
            let entry = &self.entries[index];
            if entry.key == *key {
                return Some(index);
            }
            index = entry.next;
        }
        None
    }

    /// Returns the index of `key`, adding it if it is new.
    ///
    /// The flag is `true` if the key was added by this call.
    pub fn put(&mut self, key: K) -> Result<(usize, bool), ModelError> {
        let bucket = self.bucket(&key);
        let mut index = self.buckets[bucket];
        let mut last = NONE;
        while index != NONE {
            if self.entries[index].key == key {
                return Ok((index, false));
            }
            last = index;
            index = self.entries[index].next;
        }

        if self.entries.len() >= self.capacity {
            return Err(ModelError::CapacityExceeded {
                resource: "states",
                capacity: self.capacity,
            });
        }
        let added = self.entries.len();
        self.entries.push(Entry { key, next: NONE });
        if last == NONE {
            self.buckets[bucket] = added;
        } else {
            self.entries[last].next = added;
        }
        Ok((added, true))
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &K)> {
        self.entries.iter().enumerate().map(|(i, e)| (i, &e.key))
    }

    /// All keys, indexed by their state index.
    pub fn into_keys(self) -> Vec<K> {
        self.entries.into_iter().map(|e| e.key).collect()
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_put() {
        let mut storage = StateStorage::with_capacity(4);
        assert_eq!(storage.put("a").unwrap(), (0, true));
        assert_eq!(storage.put("b").unwrap(), (1, true));
        assert_eq!(storage.put("a").unwrap(), (0, false));
        assert_eq!(storage.len(), 2);
        assert_eq!(*storage.key(1), "b");
    }

    #[test]
    fn test_chains() {
        // Two buckets for four keys: some keys share a bucket.
        let mut storage = StateStorage::with_capacity(4);
        for i in 0..4u32 {
            assert_eq!(storage.put(i).unwrap(), (i as usize, true));
        }
        for i in 0..4u32 {
            assert_eq!(storage.find(&i), Some(i as usize));
            assert_eq!(storage.put(i).unwrap(), (i as usize, false));
        }
        assert_eq!(storage.find(&7), None);
        let keys: Vec<u32> = storage.iter().map(|(_, &k)| k).collect();
        assert_eq!(keys, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_full() {
        let mut storage = StateStorage::with_capacity(2);
        storage.put((1, 'x')).unwrap();
        storage.put((2, 'y')).unwrap();
        assert_eq!(storage.put((1, 'x')).unwrap(), (0, false));
        assert_eq!(
            storage.put((3, 'z')),
            Err(ModelError::CapacityExceeded {
                resource: "states",
                capacity: 2
            })
        );
    }

    #[test]
    #[should_panic(expected = "is not occupied")]
    fn test_missing_index() {
        let storage = StateStorage::<u8>::with_capacity(2);
        storage.key(0);
    }
}

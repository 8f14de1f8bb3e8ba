//! EntryTable: the hash table behind every store.
//!
//! Entries live in a generational `SlotMap`; a hashbrown `HashTable` indexes
//! slot ids by the key's hash. Each entry caches its hash so that
//! rehashing and removal never call `K: Hash` again. Every entry point is
//! wrapped in a debug reentrancy guard.

use crate::reentrancy::DebugReentrancy;
use core::borrow::Borrow;
use core::hash::{BuildHasher, Hash};
use hashbrown::HashTable;
use slotmap::{DefaultKey, SlotMap};
use std::collections::hash_map::RandomState;

#[derive(Debug)]
struct Entry<K, V> {
    key: K,
    value: V,
    hash: u64,
}

pub struct EntryTable<K, V, S = RandomState> {
    hasher: S,
    index: HashTable<DefaultKey>,
    slots: SlotMap<DefaultKey, Entry<K, V>>,
    reentrancy: DebugReentrancy,
}

#[derive(Debug, Eq, PartialEq)]
pub enum InsertError {
    DuplicateKey,
}

impl<K, V> EntryTable<K, V>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self::with_hasher(Default::default())
    }
}

impl<K, V> Default for EntryTable<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over entries, in slot order (unspecified).
pub struct Iter<'a, K, V> {
    it: slotmap::basic::Iter<'a, DefaultKey, Entry<K, V>>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);
    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.it.next().map(|(_, e)| (&e.key, &e.value))
    }
}

impl<K, V, S> EntryTable<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    pub fn with_hasher(hasher: S) -> Self {
        Self {
            index: HashTable::new(),
            hasher,
            slots: SlotMap::with_key(),
            reentrancy: DebugReentrancy::new(),
        }
    }

    fn make_hash<Q>(&self, q: &Q) -> u64
    where
        Q: ?Sized + Hash,
    {
        self.hasher.hash_one(q)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn find_slot<Q>(&self, q: &Q) -> Option<DefaultKey>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let hash = self.make_hash(q);
        self.index
            .find(hash, |&k| {
                self.slots
                    .get(k)
                    .map(|e| e.key.borrow() == q)
                    .unwrap_or(false)
            })
            .copied()
    }

    pub fn contains_key<Q>(&self, q: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let _g = self.reentrancy.enter("contains_key");
        self.find_slot(q).is_some()
    }

    pub fn get<Q>(&self, q: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let _g = self.reentrancy.enter("get");
        let k = self.find_slot(q)?;
        self.slots.get(k).map(|e| &e.value)
    }

    pub fn get_mut<Q>(&mut self, q: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let k = {
            let _g = self.reentrancy.enter("get_mut");
            self.find_slot(q)?
        };
        self.slots.get_mut(k).map(|e| &mut e.value)
    }

    /// Inserts a new entry. An existing entry for `key` is left untouched.
    pub fn insert(&mut self, key: K, value: V) -> Result<(), InsertError> {
        let _g = self.reentrancy.enter("insert");
        let hash = self.make_hash(&key);
        let entry = Entry { key, value, hash };
        match self.index.entry(
            hash,
            |&kk| {
                self.slots
                    .get(kk)
                    .map(|e| e.key == entry.key)
                    .unwrap_or(false)
            },
            |&kk| self.slots.get(kk).map(|e| e.hash).unwrap_or(0),
        ) {
            hashbrown::hash_table::Entry::Occupied(_) => Err(InsertError::DuplicateKey),
            hashbrown::hash_table::Entry::Vacant(v) => {
                let k = self.slots.insert(entry);
                let _ = v.insert(k);
                Ok(())
            }
        }
    }

    /// Replaces the value of an existing entry, returning the old one.
    /// Returns `Err(value)` when `key` is absent.
    pub fn replace<Q>(&mut self, q: &Q, value: V) -> Result<V, V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        match self.get_mut(q) {
            Some(slot) => Ok(core::mem::replace(slot, value)),
            None => Err(value),
        }
    }

    pub fn remove<Q>(&mut self, q: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let _g = self.reentrancy.enter("remove");
        let hash = self.make_hash(q);
        let slots = &self.slots;
        let slot = match self.index.find_entry(hash, |&k| {
            slots
                .get(k)
                .map(|e| e.key.borrow() == q)
                .unwrap_or(false)
        }) {
            Ok(occupied) => occupied.remove().0,
            Err(_) => return None,
        };
        self.slots.remove(slot).map(|e| (e.key, e.value))
    }

    /// Drops every entry for which `keep` returns false. Returns how many
    /// were dropped.
    pub fn retain<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&K, &V) -> bool,
    {
        let _g = self.reentrancy.enter("retain");
        let doomed: Vec<(DefaultKey, u64)> = self
            .slots
            .iter()
            .filter(|(_, e)| !keep(&e.key, &e.value))
            .map(|(k, e)| (k, e.hash))
            .collect();
        for &(slot, hash) in &doomed {
            if let Ok(occupied) = self.index.find_entry(hash, |&k| k == slot) {
                occupied.remove();
            }
            self.slots.remove(slot);
        }
        doomed.len()
    }

    pub fn clear(&mut self) {
        let _g = self.reentrancy.enter("clear");
        self.index.clear();
        self.slots.clear();
    }

    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            it: self.slots.iter(),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.iter().map(|(k, _)| k)
    }
}

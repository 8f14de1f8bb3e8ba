//! Ordered, invalidation-aware key iteration for strong stores.
//!
//! `CurrentKeys` wraps a store's entry checks. Every successful addition
//! bumps a generation counter and drops the memoized sorted key list.
//! Iterators capture the generation when created and fail with
//! `StaleIterator` on the first step after an addition. Deletion does not
//! bump the generation: a deleted key is simply skipped when the iterator
//! reaches it, so deleting while iterating is safe.

use core::cell::{Cell, RefCell};
use core::cmp::Ordering;
use std::rc::Rc;

use log::{trace, warn};

use crate::error::{Result, StoreError};
use crate::methods::EntryChecks;
use crate::passable::Passable;
use crate::pattern::Pattern;

/// What an iterator needs from the store it walks.
pub(crate) trait KeySource {
    fn tag(&self) -> &Rc<str>;
    fn generation(&self) -> u64;
    /// Keys present now, in iteration order. May be a memoized list that
    /// still holds keys deleted since.
    fn sorted_keys(&self) -> Rc<[Passable]>;
    fn has_key(&self, key: &Passable) -> bool;
    /// The entry value for `key`: the stored value for maps, the key
    /// itself for sets.
    fn current_value(&self, key: &Passable) -> Option<Passable>;
}

/// Key and value patterns restricting an iteration.
#[derive(Clone, Debug)]
pub(crate) struct Selection {
    pub key: Pattern,
    pub value: Pattern,
}

impl Selection {
    pub(crate) fn is_everything(&self) -> bool {
        self.key.is_any() && self.value.is_any()
    }
}

pub(crate) struct CurrentKeys<C> {
    tag: Rc<str>,
    checks: C,
    compare: fn(&Passable, &Passable) -> Ordering,
    generation: Cell<u64>,
    sorted: RefCell<Option<Rc<[Passable]>>>,
}

impl<C> CurrentKeys<C> {
    pub(crate) fn new(tag: Rc<str>, checks: C, compare: fn(&Passable, &Passable) -> Ordering) -> Self {
        Self {
            tag,
            checks,
            compare,
            generation: Cell::new(0),
            sorted: RefCell::new(None),
        }
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation.get()
    }

    /// The memoized sorted key list, rebuilt from `raw` when missing.
    pub(crate) fn sorted_keys<F>(&self, raw: F) -> Rc<[Passable]>
    where
        F: FnOnce() -> Vec<Passable>,
    {
        if let Some(keys) = &*self.sorted.borrow() {
            return keys.clone();
        }
        let mut keys = raw();
        keys.sort_by(self.compare);
        let keys: Rc<[Passable]> = keys.into();
        trace!("store {:?} sorted {} keys", self.tag, keys.len());
        *self.sorted.borrow_mut() = Some(keys.clone());
        keys
    }

    /// Drops the memo without touching the generation; live iterators keep
    /// working and see no keys.
    pub(crate) fn forget_sorted(&self) {
        self.sorted.borrow_mut().take();
    }

    fn note_addition(&self) {
        let next = self.generation.get() + 1;
        self.generation.set(next);
        self.sorted.borrow_mut().take();
        trace!("store {:?} advanced to generation {next}", self.tag);
    }
}

impl<C: EntryChecks> EntryChecks for CurrentKeys<C> {
    fn key_fits(&self, key: &Passable) -> Result<()> {
        self.checks.key_fits(key)
    }

    fn ok_to_add(&self, key: &Passable, value: Option<&Passable>) -> Result<()> {
        self.checks.ok_to_add(key, value)?;
        self.note_addition();
        Ok(())
    }

    fn ok_to_set(&self, key: &Passable, value: Option<&Passable>) -> Result<()> {
        self.checks.ok_to_set(key, value)
    }

    fn ok_to_delete(&self, key: &Passable) -> Result<()> {
        self.checks.ok_to_delete(key)
    }
}

/// Iterator over the keys of a strong store, in rank order.
///
/// Yields `Err(StaleIterator)` once if a key was added after the iterator
/// was created, then stops.
pub struct Keys {
    source: Rc<dyn KeySource>,
    generation: u64,
    snapshot: Option<Rc<[Passable]>>,
    pos: usize,
    selection: Option<Selection>,
    done: bool,
}

impl Keys {
    pub(crate) fn new(source: Rc<dyn KeySource>, selection: Option<Selection>) -> Self {
        let selection = selection.filter(|s| !s.is_everything());
        Self {
            generation: source.generation(),
            source,
            snapshot: None,
            pos: 0,
            selection,
            done: false,
        }
    }

    fn selected(&self, key: &Passable) -> bool {
        let Some(sel) = &self.selection else {
            return true;
        };
        if !sel.key.matches(key) {
            return false;
        }
        if sel.value.is_any() {
            return true;
        }
        self.source
            .current_value(key)
            .is_some_and(|v| sel.value.matches(&v))
    }
}

impl Iterator for Keys {
    type Item = Result<Passable>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.source.generation() != self.generation {
            self.done = true;
            warn!(
                "iterator over store {:?} invalidated by an addition",
                self.source.tag()
            );
            return Some(Err(StoreError::StaleIterator {
                tag: self.source.tag().clone(),
            }));
        }
        let snapshot = match &self.snapshot {
            Some(s) => s.clone(),
            None => {
                let s = self.source.sorted_keys();
                self.snapshot = Some(s.clone());
                s
            }
        };
        while let Some(key) = snapshot.get(self.pos) {
            self.pos += 1;
            if self.source.has_key(key) && self.selected(key) {
                return Some(Ok(key.clone()));
            }
        }
        self.done = true;
        None
    }
}

/// Iterator over entry values, in key order.
pub struct Values {
    keys: Keys,
}

impl Values {
    pub(crate) fn new(keys: Keys) -> Self {
        Self { keys }
    }
}

impl Iterator for Values {
    type Item = Result<Passable>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.keys.next()? {
                Err(e) => return Some(Err(e)),
                Ok(key) => {
                    if let Some(v) = self.keys.source.current_value(&key) {
                        return Some(Ok(v));
                    }
                }
            }
        }
    }
}

/// Iterator over `(key, value)` pairs, in key order.
pub struct Entries {
    keys: Keys,
}

impl Entries {
    pub(crate) fn new(keys: Keys) -> Self {
        Self { keys }
    }
}

impl Iterator for Entries {
    type Item = Result<(Passable, Passable)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.keys.next()? {
                Err(e) => return Some(Err(e)),
                Ok(key) => {
                    if let Some(v) = self.keys.source.current_value(&key) {
                        return Some(Ok((key, v)));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rank::compare_rank;
    use std::collections::BTreeMap;

    struct AcceptAll;

    impl EntryChecks for AcceptAll {
        fn key_fits(&self, _key: &Passable) -> Result<()> {
            Ok(())
        }
        fn ok_to_add(&self, _key: &Passable, _value: Option<&Passable>) -> Result<()> {
            Ok(())
        }
        fn ok_to_set(&self, _key: &Passable, _value: Option<&Passable>) -> Result<()> {
            Ok(())
        }
        fn ok_to_delete(&self, _key: &Passable) -> Result<()> {
            Ok(())
        }
    }

    /// Minimal store: a BTreeMap guarded by a kit, counting raw-key fetches.
    struct Toy {
        kit: CurrentKeys<AcceptAll>,
        entries: RefCell<BTreeMap<String, Passable>>,
        fetches: Cell<usize>,
    }

    impl Toy {
        fn new() -> Rc<Self> {
            Rc::new(Self {
                kit: CurrentKeys::new(Rc::from("toy"), AcceptAll, compare_rank),
                entries: RefCell::new(BTreeMap::new()),
                fetches: Cell::new(0),
            })
        }

        fn add(&self, k: &str) {
            let key = Passable::from(k);
            self.kit.ok_to_add(&key, None).unwrap();
            self.entries.borrow_mut().insert(k.to_string(), key);
        }

        fn remove(&self, k: &str) {
            self.kit.ok_to_delete(&Passable::from(k)).unwrap();
            self.entries.borrow_mut().remove(k);
        }

        fn keys(self: &Rc<Self>) -> Keys {
            Keys::new(self.clone(), None)
        }
    }

    impl KeySource for Toy {
        fn tag(&self) -> &Rc<str> {
            &self.kit.tag
        }
        fn generation(&self) -> u64 {
            self.kit.generation()
        }
        fn sorted_keys(&self) -> Rc<[Passable]> {
            self.kit.sorted_keys(|| {
                self.fetches.set(self.fetches.get() + 1);
                self.entries.borrow().values().rev().cloned().collect()
            })
        }
        fn has_key(&self, key: &Passable) -> bool {
            key.as_str()
                .is_some_and(|k| self.entries.borrow().contains_key(k))
        }
        fn current_value(&self, key: &Passable) -> Option<Passable> {
            self.has_key(key).then(|| key.clone())
        }
    }

    fn collect(keys: Keys) -> Result<Vec<Passable>> {
        keys.collect()
    }

    #[test]
    fn keys_come_back_sorted() {
        let toy = Toy::new();
        for k in ["c", "a", "b"] {
            toy.add(k);
        }
        let keys = collect(toy.keys()).unwrap();
        assert_eq!(keys, ["a", "b", "c"].map(Passable::from));
    }

    #[test]
    fn sorted_keys_are_memoized_until_an_addition() {
        let toy = Toy::new();
        toy.add("a");
        collect(toy.keys()).unwrap();
        collect(toy.keys()).unwrap();
        assert_eq!(toy.fetches.get(), 1);

        toy.remove("a");
        collect(toy.keys()).unwrap();
        assert_eq!(toy.fetches.get(), 1, "deletion keeps the memo");

        toy.add("b");
        collect(toy.keys()).unwrap();
        assert_eq!(toy.fetches.get(), 2);
    }

    #[test]
    fn addition_invalidates_live_iterators() {
        let toy = Toy::new();
        toy.add("a");
        toy.add("b");
        let mut it = toy.keys();
        assert_eq!(it.next().unwrap().unwrap(), Passable::from("a"));
        toy.add("c");
        assert!(matches!(it.next(), Some(Err(StoreError::StaleIterator { .. }))));
        assert!(it.next().is_none(), "iterator stops after reporting");
    }

    #[test]
    fn deletion_during_iteration_skips_removed_keys() {
        let toy = Toy::new();
        for k in ["a", "b", "c"] {
            toy.add(k);
        }
        let mut it = toy.keys();
        assert_eq!(it.next().unwrap().unwrap(), Passable::from("a"));
        toy.remove("b");
        assert_eq!(it.next().unwrap().unwrap(), Passable::from("c"));
        assert!(it.next().is_none());
    }

    #[test]
    fn rejected_addition_leaves_generation_alone() {
        struct RejectAll;
        impl EntryChecks for RejectAll {
            fn key_fits(&self, _key: &Passable) -> Result<()> {
                Ok(())
            }
            fn ok_to_add(&self, _key: &Passable, _value: Option<&Passable>) -> Result<()> {
                Err(StoreError::NotPassable {
                    reason: "no".to_string(),
                })
            }
            fn ok_to_set(&self, _key: &Passable, _value: Option<&Passable>) -> Result<()> {
                Ok(())
            }
            fn ok_to_delete(&self, _key: &Passable) -> Result<()> {
                Ok(())
            }
        }
        let kit = CurrentKeys::new(Rc::from("r"), RejectAll, compare_rank);
        assert!(kit.ok_to_add(&Passable::Null, None).is_err());
        assert_eq!(kit.generation(), 0);
    }
}

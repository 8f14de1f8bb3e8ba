//! Container methods shared by every store flavor.
//!
//! `Container` pairs a backing table with the checks that guard it. The
//! weak methods (has/get/init/set/delete/add_all) work over any
//! `RawTable`; strong stores add ordered iteration, snapshots, size and
//! clear on top of an `EntryTable` guarded by `CurrentKeys`.

use core::cell::RefCell;
use core::marker::PhantomData;
use std::rc::Rc;

use crate::current_keys::{CurrentKeys, Entries, KeySource, Keys, Selection, Values};
use crate::entry_table::{EntryTable, InsertError};
use crate::error::{Result, Role, StoreError};
use crate::passable::{assert_passable_value, assert_scalar_key, CopyMap, CopySet, Passable};
use crate::pattern::{assert_pattern, must_match, Pattern};
use crate::weak_table::{RawTable, WeakBacking};

/// Validation hooks run before a table is mutated.
pub(crate) trait EntryChecks {
    /// Whether `key` could be in the store at all.
    fn key_fits(&self, key: &Passable) -> Result<()>;
    fn ok_to_add(&self, key: &Passable, value: Option<&Passable>) -> Result<()>;
    fn ok_to_set(&self, key: &Passable, value: Option<&Passable>) -> Result<()>;
    fn ok_to_delete(&self, key: &Passable) -> Result<()>;
}

/// Scalar-key and shape checks configured at store creation.
pub(crate) struct ShapeChecks {
    tag: Rc<str>,
    key_shape: Pattern,
    value_shape: Pattern,
}

impl ShapeChecks {
    pub(crate) fn new(tag: Rc<str>, key_shape: Pattern, value_shape: Pattern) -> Self {
        Self {
            tag,
            key_shape,
            value_shape,
        }
    }

    fn check_value(&self, value: Option<&Passable>) -> Result<()> {
        let Some(value) = value else {
            return Ok(());
        };
        assert_passable_value(value)?;
        must_match(value, &self.value_shape, &self.tag, Role::Value)
    }
}

impl EntryChecks for ShapeChecks {
    fn key_fits(&self, key: &Passable) -> Result<()> {
        assert_scalar_key(&self.tag, key)?;
        must_match(key, &self.key_shape, &self.tag, Role::Key)
    }

    fn ok_to_add(&self, key: &Passable, value: Option<&Passable>) -> Result<()> {
        self.key_fits(key)?;
        self.check_value(value)
    }

    fn ok_to_set(&self, _key: &Passable, value: Option<&Passable>) -> Result<()> {
        self.check_value(value)
    }

    fn ok_to_delete(&self, _key: &Passable) -> Result<()> {
        Ok(())
    }
}

/// What a store keeps per key: a passable for maps, nothing for sets.
pub(crate) trait StoredValue: Clone + 'static {
    fn as_passable(&self) -> Option<&Passable>;
    /// Value half of an entry; sets report the key.
    fn entry_value(&self, key: &Passable) -> Passable;
}

impl StoredValue for Passable {
    fn as_passable(&self) -> Option<&Passable> {
        Some(self)
    }

    fn entry_value(&self, _key: &Passable) -> Passable {
        self.clone()
    }
}

impl StoredValue for () {
    fn as_passable(&self) -> Option<&Passable> {
        None
    }

    fn entry_value(&self, key: &Passable) -> Passable {
        key.clone()
    }
}

pub(crate) struct Container<V, T, C> {
    tag: Rc<str>,
    table: RefCell<T>,
    checks: C,
    _value: PhantomData<V>,
}

pub(crate) type StrongCore<V> = Container<V, EntryTable<Passable, V>, CurrentKeys<ShapeChecks>>;
pub(crate) type WeakCore<V> = Container<V, WeakBacking<V>, ShapeChecks>;

impl<V, T, C> Container<V, T, C>
where
    V: StoredValue,
    T: RawTable<V>,
    C: EntryChecks,
{
    pub(crate) fn new(tag: Rc<str>, table: T, checks: C) -> Self {
        Self {
            tag,
            table: RefCell::new(table),
            checks,
            _value: PhantomData,
        }
    }

    pub(crate) fn tag(&self) -> &str {
        &self.tag
    }

    fn not_found(&self, key: &Passable) -> StoreError {
        StoreError::KeyNotFound {
            tag: self.tag.clone(),
            key: key.to_string(),
        }
    }

    fn already_registered(&self, key: String) -> StoreError {
        StoreError::KeyAlreadyRegistered {
            tag: self.tag.clone(),
            key,
        }
    }

    /// Never fails: a key the store could not hold is simply absent.
    pub(crate) fn has(&self, key: &Passable) -> bool {
        self.checks.key_fits(key).is_ok() && self.table.borrow().has_key(key)
    }

    pub(crate) fn get(&self, key: &Passable) -> Result<V> {
        self.checks.key_fits(key)?;
        self.table
            .borrow()
            .lookup(key)
            .cloned()
            .ok_or_else(|| self.not_found(key))
    }

    pub(crate) fn init(&self, key: Passable, value: V) -> Result<()> {
        if self.table.borrow().has_key(&key) {
            return Err(self.already_registered(key.to_string()));
        }
        self.checks.ok_to_add(&key, value.as_passable())?;
        let shown = key.clone();
        // The generation was already bumped by ok_to_add; a duplicate here
        // only costs live iterators a spurious StaleIterator.
        self.table
            .borrow_mut()
            .insert_new(key, value)
            .map_err(|InsertError::DuplicateKey| self.already_registered(shown.to_string()))
    }

    pub(crate) fn set(&self, key: &Passable, value: V) -> Result<()> {
        self.checks.key_fits(key)?;
        if !self.table.borrow().has_key(key) {
            return Err(self.not_found(key));
        }
        self.checks.ok_to_set(key, value.as_passable())?;
        self.table
            .borrow_mut()
            .overwrite(key, value)
            .map(drop)
            .map_err(|_| self.not_found(key))
    }

    pub(crate) fn delete(&self, key: &Passable) -> Result<()> {
        self.checks.key_fits(key)?;
        if !self.table.borrow().has_key(key) {
            return Err(self.not_found(key));
        }
        self.checks.ok_to_delete(key)?;
        self.table
            .borrow_mut()
            .take(key)
            .map(drop)
            .ok_or_else(|| self.not_found(key))
    }

    /// Overwrites present keys and initializes the rest. Stops at the
    /// first failure; entries before it stay applied.
    pub(crate) fn add_all<I>(&self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (Passable, V)>,
    {
        for (key, value) in entries {
            if self.has(&key) {
                self.set(&key, value)?;
            } else {
                self.init(key, value)?;
            }
        }
        Ok(())
    }

    pub(crate) fn live_len(&self) -> usize {
        self.table.borrow().live_len()
    }
}

impl<V: StoredValue> KeySource for StrongCore<V> {
    fn tag(&self) -> &Rc<str> {
        &self.tag
    }

    fn generation(&self) -> u64 {
        self.checks.generation()
    }

    fn sorted_keys(&self) -> Rc<[Passable]> {
        self.checks
            .sorted_keys(|| self.table.borrow().keys().cloned().collect())
    }

    fn has_key(&self, key: &Passable) -> bool {
        self.table.borrow().contains_key(key)
    }

    fn current_value(&self, key: &Passable) -> Option<Passable> {
        self.table.borrow().get(key).map(|v| v.entry_value(key))
    }
}

fn selection(key_patt: Pattern, value_patt: Pattern) -> Result<Selection> {
    assert_pattern(&key_patt)?;
    assert_pattern(&value_patt)?;
    Ok(Selection {
        key: key_patt,
        value: value_patt,
    })
}

impl<V: StoredValue> StrongCore<V> {
    pub(crate) fn keys(self: &Rc<Self>) -> Keys {
        Keys::new(self.clone(), None)
    }

    pub(crate) fn keys_matching(self: &Rc<Self>, key_patt: Pattern, value_patt: Pattern) -> Result<Keys> {
        Ok(Keys::new(self.clone(), Some(selection(key_patt, value_patt)?)))
    }

    pub(crate) fn values(self: &Rc<Self>) -> Values {
        Values::new(self.keys())
    }

    pub(crate) fn values_matching(self: &Rc<Self>, key_patt: Pattern, value_patt: Pattern) -> Result<Values> {
        Ok(Values::new(self.keys_matching(key_patt, value_patt)?))
    }

    pub(crate) fn entries(self: &Rc<Self>) -> Entries {
        Entries::new(self.keys())
    }

    pub(crate) fn entries_matching(self: &Rc<Self>, key_patt: Pattern, value_patt: Pattern) -> Result<Entries> {
        Ok(Entries::new(self.keys_matching(key_patt, value_patt)?))
    }

    pub(crate) fn snapshot_map(self: &Rc<Self>, key_patt: Pattern, value_patt: Pattern) -> Result<CopyMap> {
        let entries = self
            .entries_matching(key_patt, value_patt)?
            .collect::<Result<Vec<_>>>()?;
        Ok(CopyMap::from_sorted(entries))
    }

    pub(crate) fn snapshot_set(self: &Rc<Self>, key_patt: Pattern) -> Result<CopySet> {
        let keys = self
            .keys_matching(key_patt, Pattern::Any)?
            .collect::<Result<Vec<_>>>()?;
        Ok(CopySet::from_sorted(keys))
    }

    pub(crate) fn size(&self) -> usize {
        self.table.borrow().len()
    }

    pub(crate) fn size_matching(self: &Rc<Self>, key_patt: Pattern, value_patt: Pattern) -> Result<usize> {
        if key_patt.is_any() && value_patt.is_any() {
            return Ok(self.size());
        }
        let mut n = 0;
        for key in self.keys_matching(key_patt, value_patt)? {
            key?;
            n += 1;
        }
        Ok(n)
    }

    /// Deletes every entry without running delete checks per key.
    pub(crate) fn clear(&self) {
        self.table.borrow_mut().clear();
        self.checks.forget_sorted();
    }

    /// Deletes matching entries one at a time through `delete`.
    pub(crate) fn clear_matching(self: &Rc<Self>, key_patt: Pattern, value_patt: Pattern) -> Result<()> {
        if key_patt.is_any() && value_patt.is_any() {
            self.clear();
            return Ok(());
        }
        for key in self.keys_matching(key_patt, value_patt)? {
            self.delete(&key?)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rank::compare_rank;

    fn strong(key_shape: Pattern, value_shape: Pattern) -> Rc<StrongCore<Passable>> {
        let tag: Rc<str> = Rc::from("unit");
        let checks = ShapeChecks::new(tag.clone(), key_shape, value_shape);
        Rc::new(Container::new(
            tag.clone(),
            EntryTable::new(),
            CurrentKeys::new(tag, checks, compare_rank),
        ))
    }

    #[test]
    fn has_is_total() {
        let core = strong(Pattern::String, Pattern::Any);
        assert!(!core.has(&Passable::from(1)));
        assert!(!core.has(&Passable::array([])));
        core.init(Passable::from("a"), Passable::Null).unwrap();
        assert!(core.has(&Passable::from("a")));
    }

    #[test]
    fn key_shape_is_checked_before_presence() {
        let core = strong(Pattern::String, Pattern::Any);
        assert!(matches!(
            core.get(&Passable::from(1)),
            Err(StoreError::PatternMismatch { role: Role::Key, .. })
        ));
        assert!(matches!(
            core.delete(&Passable::from("missing")),
            Err(StoreError::KeyNotFound { .. })
        ));
    }

    #[test]
    fn failed_init_changes_nothing() {
        let core = strong(Pattern::Any, Pattern::Number);
        let before = core.generation();
        assert!(core.init(Passable::from("k"), Passable::from("v")).is_err());
        assert!(!core.has(&Passable::from("k")));
        assert_eq!(core.generation(), before);
    }

    #[test]
    fn duplicate_init_is_already_registered() {
        let core = strong(Pattern::Any, Pattern::Any);
        core.init(Passable::from("k"), Passable::from(1)).unwrap();
        let before = core.generation();
        match core.init(Passable::from("k"), Passable::from(2)) {
            Err(StoreError::KeyAlreadyRegistered { tag, key }) => {
                assert_eq!(&*tag, "unit");
                assert_eq!(key, Passable::from("k").to_string());
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(core.generation(), before);
        assert_eq!(core.get(&Passable::from("k")).unwrap(), Passable::from(1));
    }

    #[test]
    fn set_checks_value_shape() {
        let core = strong(Pattern::Any, Pattern::Number);
        core.init(Passable::from("k"), Passable::from(1)).unwrap();
        assert!(core.set(&Passable::from("k"), Passable::from("x")).is_err());
        assert_eq!(core.get(&Passable::from("k")).unwrap(), Passable::from(1));
    }

    #[test]
    fn filtered_size_counts_matches() {
        let core = strong(Pattern::Any, Pattern::Any);
        for i in 0..5 {
            core.init(Passable::from(i), Passable::from(i * 10)).unwrap();
        }
        assert_eq!(core.size_matching(Pattern::Any, Pattern::Any).unwrap(), 5);
        assert_eq!(core.size_matching(Pattern::lt(2), Pattern::Any).unwrap(), 2);
        assert_eq!(core.size_matching(Pattern::Any, Pattern::gte(30)).unwrap(), 2);
    }

    #[test]
    fn filtered_clear_spares_the_rest() {
        let core = strong(Pattern::Any, Pattern::Any);
        for k in ["a", "b", "c"] {
            core.init(Passable::from(k), Passable::Null).unwrap();
        }
        core.clear_matching(Pattern::neq("b"), Pattern::Any).unwrap();
        let left: Vec<_> = core.keys().collect::<Result<_>>().unwrap();
        assert_eq!(left, vec![Passable::from("b")]);
    }

    #[test]
    fn selections_reject_bad_patterns() {
        let core = strong(Pattern::Any, Pattern::Any);
        assert!(matches!(
            core.keys_matching(Pattern::kind("nonsense"), Pattern::Any),
            Err(StoreError::InvalidPatternDefinition { .. })
        ));
    }
}

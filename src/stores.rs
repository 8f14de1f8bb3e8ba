//! Store factories and the public store handles.
//!
//! Each handle is a cheap `Clone` over shared state plus the remotable that
//! stands for the store, so a store can itself be stored, compared by
//! identity, and recovered from a `Passable` with `from_passable`.

use core::fmt;
use std::rc::Rc;

use log::debug;

use crate::current_keys::{CurrentKeys, Entries, Keys, Values};
use crate::entry_table::EntryTable;
use crate::error::Result;
use crate::exo::far;
use crate::methods::{Container, ShapeChecks, StrongCore, WeakCore};
use crate::passable::{CopyMap, CopySet, Passable, Remotable};
use crate::pattern::{assert_pattern, Pattern};
use crate::rank::compare_rank;
use crate::weak_table::WeakBacking;

/// Creation options shared by all four factories. Set stores ignore
/// `value_shape`; strong stores ignore `long_lived`.
#[derive(Clone, Debug, PartialEq)]
pub struct StoreOptions {
    key_shape: Option<Pattern>,
    value_shape: Option<Pattern>,
    long_lived: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            key_shape: None,
            value_shape: None,
            long_lived: true,
        }
    }
}

impl StoreOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key_shape(mut self, patt: Pattern) -> Self {
        self.key_shape = Some(patt);
        self
    }

    pub fn value_shape(mut self, patt: Pattern) -> Self {
        self.value_shape = Some(patt);
        self
    }

    /// `false` backs a weak store with an ordinary table that holds its
    /// keys strongly. Method contracts are unchanged.
    pub fn long_lived(mut self, long_lived: bool) -> Self {
        self.long_lived = long_lived;
        self
    }

    fn shapes(&self) -> Result<(Pattern, Pattern)> {
        let key = self.key_shape.clone().unwrap_or(Pattern::Any);
        let value = self.value_shape.clone().unwrap_or(Pattern::Any);
        assert_pattern(&key)?;
        assert_pattern(&value)?;
        Ok((key, value))
    }
}

/// The weak-store surface. Anything implementing it can back an
/// `AtomicProvider` or `provide_lazy`.
pub trait WeakMapOps {
    fn tag(&self) -> &str;
    fn has(&self, key: &Passable) -> bool;
    fn get(&self, key: &Passable) -> Result<Passable>;
    fn init(&self, key: Passable, value: Passable) -> Result<()>;
    fn set(&self, key: &Passable, value: Passable) -> Result<()>;
    fn delete(&self, key: &Passable) -> Result<()>;
}

pub trait WeakSetOps {
    fn tag(&self) -> &str;
    fn has(&self, key: &Passable) -> bool;
    fn add(&self, key: Passable) -> Result<()>;
    fn delete(&self, key: &Passable) -> Result<()>;
}

fn strong_core<V: crate::methods::StoredValue>(
    tag: &str,
    key_shape: Pattern,
    value_shape: Pattern,
) -> Rc<StrongCore<V>> {
    let tag: Rc<str> = Rc::from(tag);
    let checks = ShapeChecks::new(tag.clone(), key_shape, value_shape);
    Rc::new(Container::new(
        tag.clone(),
        EntryTable::new(),
        CurrentKeys::new(tag, checks, compare_rank),
    ))
}

fn weak_core<V: crate::methods::StoredValue>(
    tag: &str,
    key_shape: Pattern,
    value_shape: Pattern,
    long_lived: bool,
) -> Rc<WeakCore<V>> {
    let tag: Rc<str> = Rc::from(tag);
    let checks = ShapeChecks::new(tag.clone(), key_shape, value_shape);
    Rc::new(Container::new(tag, WeakBacking::new(long_lived), checks))
}

/// Ordered map from scalar keys to passable values.
#[derive(Clone)]
pub struct MapStore {
    far: Remotable,
    core: Rc<StrongCore<Passable>>,
}

pub fn make_scalar_map_store(tag: &str, options: StoreOptions) -> Result<MapStore> {
    let (key_shape, value_shape) = options.shapes()?;
    debug!("making scalar map store {tag:?} with keys {key_shape}, values {value_shape}");
    let core = strong_core(tag, key_shape, value_shape);
    Ok(MapStore {
        far: far("scalarMapStore", core.clone()),
        core,
    })
}

impl MapStore {
    pub fn tag(&self) -> &str {
        self.core.tag()
    }

    pub fn has(&self, key: &Passable) -> bool {
        self.core.has(key)
    }

    pub fn get(&self, key: &Passable) -> Result<Passable> {
        self.core.get(key)
    }

    pub fn init(&self, key: Passable, value: Passable) -> Result<()> {
        self.core.init(key, value)
    }

    pub fn set(&self, key: &Passable, value: Passable) -> Result<()> {
        self.core.set(key, value)
    }

    pub fn delete(&self, key: &Passable) -> Result<()> {
        self.core.delete(key)
    }

    /// Overwrite-or-create for each entry. Accepts a `CopyMap` directly.
    pub fn add_all<I>(&self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (Passable, Passable)>,
    {
        self.core.add_all(entries)
    }

    pub fn keys(&self) -> Keys {
        self.core.keys()
    }

    pub fn keys_matching(&self, key_patt: Pattern, value_patt: Pattern) -> Result<Keys> {
        self.core.keys_matching(key_patt, value_patt)
    }

    pub fn values(&self) -> Values {
        self.core.values()
    }

    pub fn values_matching(&self, key_patt: Pattern, value_patt: Pattern) -> Result<Values> {
        self.core.values_matching(key_patt, value_patt)
    }

    pub fn entries(&self) -> Entries {
        self.core.entries()
    }

    pub fn entries_matching(&self, key_patt: Pattern, value_patt: Pattern) -> Result<Entries> {
        self.core.entries_matching(key_patt, value_patt)
    }

    pub fn snapshot(&self) -> Result<CopyMap> {
        self.core.snapshot_map(Pattern::Any, Pattern::Any)
    }

    pub fn snapshot_matching(&self, key_patt: Pattern, value_patt: Pattern) -> Result<CopyMap> {
        self.core.snapshot_map(key_patt, value_patt)
    }

    pub fn get_size(&self) -> usize {
        self.core.size()
    }

    pub fn get_size_matching(&self, key_patt: Pattern, value_patt: Pattern) -> Result<usize> {
        self.core.size_matching(key_patt, value_patt)
    }

    pub fn clear(&self) {
        self.core.clear()
    }

    pub fn clear_matching(&self, key_patt: Pattern, value_patt: Pattern) -> Result<()> {
        self.core.clear_matching(key_patt, value_patt)
    }

    pub fn to_remotable(&self) -> Remotable {
        self.far.clone()
    }

    pub fn from_passable(p: &Passable) -> Option<Self> {
        let far = p.as_remotable()?;
        let core = far.target::<StrongCore<Passable>>()?;
        Some(Self {
            far: far.clone(),
            core,
        })
    }
}

/// Ordered set of scalar keys.
#[derive(Clone)]
pub struct SetStore {
    far: Remotable,
    core: Rc<StrongCore<()>>,
}

pub fn make_scalar_set_store(tag: &str, options: StoreOptions) -> Result<SetStore> {
    let (key_shape, _) = options.shapes()?;
    debug!("making scalar set store {tag:?} with keys {key_shape}");
    let core = strong_core(tag, key_shape, Pattern::Any);
    Ok(SetStore {
        far: far("scalarSetStore", core.clone()),
        core,
    })
}

impl SetStore {
    pub fn tag(&self) -> &str {
        self.core.tag()
    }

    pub fn has(&self, key: &Passable) -> bool {
        self.core.has(key)
    }

    /// Fails with `KeyAlreadyRegistered` if `key` is already a member.
    pub fn add(&self, key: Passable) -> Result<()> {
        self.core.init(key, ())
    }

    pub fn delete(&self, key: &Passable) -> Result<()> {
        self.core.delete(key)
    }

    /// Adds each key not already present. Accepts a `CopySet` directly.
    pub fn add_all<I>(&self, keys: I) -> Result<()>
    where
        I: IntoIterator<Item = Passable>,
    {
        for key in keys {
            if !self.core.has(&key) {
                self.core.init(key, ())?;
            }
        }
        Ok(())
    }

    pub fn keys(&self) -> Keys {
        self.core.keys()
    }

    pub fn keys_matching(&self, key_patt: Pattern) -> Result<Keys> {
        self.core.keys_matching(key_patt, Pattern::Any)
    }

    /// Same as `keys`.
    pub fn values(&self) -> Values {
        self.core.values()
    }

    pub fn values_matching(&self, key_patt: Pattern) -> Result<Values> {
        self.core.values_matching(key_patt, Pattern::Any)
    }

    /// `(key, key)` pairs.
    pub fn entries(&self) -> Entries {
        self.core.entries()
    }

    pub fn snapshot(&self) -> Result<CopySet> {
        self.core.snapshot_set(Pattern::Any)
    }

    pub fn snapshot_matching(&self, key_patt: Pattern) -> Result<CopySet> {
        self.core.snapshot_set(key_patt)
    }

    pub fn get_size(&self) -> usize {
        self.core.size()
    }

    pub fn get_size_matching(&self, key_patt: Pattern) -> Result<usize> {
        self.core.size_matching(key_patt, Pattern::Any)
    }

    pub fn clear(&self) {
        self.core.clear()
    }

    pub fn clear_matching(&self, key_patt: Pattern) -> Result<()> {
        self.core.clear_matching(key_patt, Pattern::Any)
    }

    pub fn to_remotable(&self) -> Remotable {
        self.far.clone()
    }

    pub fn from_passable(p: &Passable) -> Option<Self> {
        let far = p.as_remotable()?;
        let core = far.target::<StrongCore<()>>()?;
        Some(Self {
            far: far.clone(),
            core,
        })
    }
}

/// Non-enumerable map; remotable keys do not keep their entries alive.
#[derive(Clone)]
pub struct WeakMapStore {
    far: Remotable,
    core: Rc<WeakCore<Passable>>,
}

pub fn make_scalar_weak_map_store(tag: &str, options: StoreOptions) -> Result<WeakMapStore> {
    let (key_shape, value_shape) = options.shapes()?;
    debug!(
        "making scalar weak map store {tag:?} (long_lived: {}) with keys {key_shape}, values {value_shape}",
        options.long_lived
    );
    let core = weak_core(tag, key_shape, value_shape, options.long_lived);
    Ok(WeakMapStore {
        far: far("scalarWeakMapStore", core.clone()),
        core,
    })
}

impl WeakMapStore {
    pub fn tag(&self) -> &str {
        self.core.tag()
    }

    pub fn has(&self, key: &Passable) -> bool {
        self.core.has(key)
    }

    pub fn get(&self, key: &Passable) -> Result<Passable> {
        self.core.get(key)
    }

    pub fn init(&self, key: Passable, value: Passable) -> Result<()> {
        self.core.init(key, value)
    }

    pub fn set(&self, key: &Passable, value: Passable) -> Result<()> {
        self.core.set(key, value)
    }

    pub fn delete(&self, key: &Passable) -> Result<()> {
        self.core.delete(key)
    }

    pub fn add_all<I>(&self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (Passable, Passable)>,
    {
        self.core.add_all(entries)
    }

    pub fn to_remotable(&self) -> Remotable {
        self.far.clone()
    }

    pub fn from_passable(p: &Passable) -> Option<Self> {
        let far = p.as_remotable()?;
        let core = far.target::<WeakCore<Passable>>()?;
        Some(Self {
            far: far.clone(),
            core,
        })
    }
}

/// Non-enumerable set; remotable members are held weakly.
#[derive(Clone)]
pub struct WeakSetStore {
    far: Remotable,
    core: Rc<WeakCore<()>>,
}

pub fn make_scalar_weak_set_store(tag: &str, options: StoreOptions) -> Result<WeakSetStore> {
    let (key_shape, _) = options.shapes()?;
    debug!(
        "making scalar weak set store {tag:?} (long_lived: {}) with keys {key_shape}",
        options.long_lived
    );
    let core = weak_core(tag, key_shape, Pattern::Any, options.long_lived);
    Ok(WeakSetStore {
        far: far("scalarWeakSetStore", core.clone()),
        core,
    })
}

impl WeakSetStore {
    pub fn tag(&self) -> &str {
        self.core.tag()
    }

    pub fn has(&self, key: &Passable) -> bool {
        self.core.has(key)
    }

    pub fn add(&self, key: Passable) -> Result<()> {
        self.core.init(key, ())
    }

    pub fn delete(&self, key: &Passable) -> Result<()> {
        self.core.delete(key)
    }

    pub fn add_all<I>(&self, keys: I) -> Result<()>
    where
        I: IntoIterator<Item = Passable>,
    {
        for key in keys {
            if !self.core.has(&key) {
                self.core.init(key, ())?;
            }
        }
        Ok(())
    }

    pub fn to_remotable(&self) -> Remotable {
        self.far.clone()
    }

    pub fn from_passable(p: &Passable) -> Option<Self> {
        let far = p.as_remotable()?;
        let core = far.target::<WeakCore<()>>()?;
        Some(Self {
            far: far.clone(),
            core,
        })
    }
}

macro_rules! store_identity {
    ($($store:ty),*) => {$(
        impl From<$store> for Passable {
            fn from(store: $store) -> Self {
                Passable::Remotable(store.far)
            }
        }

        impl PartialEq for $store {
            fn eq(&self, other: &Self) -> bool {
                self.far == other.far
            }
        }

        impl Eq for $store {}
    )*};
}

store_identity!(MapStore, SetStore, WeakMapStore, WeakSetStore);

impl fmt::Debug for MapStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapStore")
            .field("tag", &self.tag())
            .field("size", &self.get_size())
            .finish()
    }
}

impl fmt::Debug for SetStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetStore")
            .field("tag", &self.tag())
            .field("size", &self.get_size())
            .finish()
    }
}

impl fmt::Debug for WeakMapStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakMapStore")
            .field("tag", &self.tag())
            .field("live", &self.core.live_len())
            .finish()
    }
}

impl fmt::Debug for WeakSetStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakSetStore")
            .field("tag", &self.tag())
            .field("live", &self.core.live_len())
            .finish()
    }
}

macro_rules! weak_map_ops {
    ($($store:ty),*) => {$(
        impl WeakMapOps for $store {
            fn tag(&self) -> &str {
                self.core.tag()
            }
            fn has(&self, key: &Passable) -> bool {
                self.core.has(key)
            }
            fn get(&self, key: &Passable) -> Result<Passable> {
                self.core.get(key)
            }
            fn init(&self, key: Passable, value: Passable) -> Result<()> {
                self.core.init(key, value)
            }
            fn set(&self, key: &Passable, value: Passable) -> Result<()> {
                self.core.set(key, value)
            }
            fn delete(&self, key: &Passable) -> Result<()> {
                self.core.delete(key)
            }
        }
    )*};
}

weak_map_ops!(MapStore, WeakMapStore);

macro_rules! weak_set_ops {
    ($($store:ty),*) => {$(
        impl WeakSetOps for $store {
            fn tag(&self) -> &str {
                self.core.tag()
            }
            fn has(&self, key: &Passable) -> bool {
                self.core.has(key)
            }
            fn add(&self, key: Passable) -> Result<()> {
                self.core.init(key, ())
            }
            fn delete(&self, key: &Passable) -> Result<()> {
                self.core.delete(key)
            }
        }
    )*};
}

weak_set_ops!(SetStore, WeakSetStore);

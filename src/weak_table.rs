//! Tables backing weak stores.
//!
//! Remotable keys are held through `WeakRemotable`, so an entry never keeps
//! its key alive. Once the key's last strong handle drops, the entry is
//! unreachable (nobody can present the key again) and is reclaimed by the
//! next sweep. Primitive keys cannot be collected and are held as-is.

use log::trace;

use crate::entry_table::{EntryTable, InsertError};
use crate::passable::{Passable, WeakRemotable};

/// Lookup and mutation surface shared by strong and weak backings.
pub(crate) trait RawTable<V> {
    fn has_key(&self, key: &Passable) -> bool;
    fn lookup(&self, key: &Passable) -> Option<&V>;
    fn insert_new(&mut self, key: Passable, value: V) -> Result<(), InsertError>;
    /// Overwrites a present entry; hands `value` back if `key` is absent.
    fn overwrite(&mut self, key: &Passable, value: V) -> Result<V, V>;
    fn take(&mut self, key: &Passable) -> Option<V>;
    fn live_len(&self) -> usize;
}

impl<V> RawTable<V> for EntryTable<Passable, V> {
    fn has_key(&self, key: &Passable) -> bool {
        self.contains_key(key)
    }

    fn lookup(&self, key: &Passable) -> Option<&V> {
        self.get(key)
    }

    fn insert_new(&mut self, key: Passable, value: V) -> Result<(), InsertError> {
        self.insert(key, value)
    }

    fn overwrite(&mut self, key: &Passable, value: V) -> Result<V, V> {
        self.replace(key, value)
    }

    fn take(&mut self, key: &Passable) -> Option<V> {
        self.remove(key).map(|(_, v)| v)
    }

    fn live_len(&self) -> usize {
        self.len()
    }
}

struct WeakSlot<V> {
    holder: WeakRemotable,
    value: V,
}

const MIN_SWEEP: usize = 32;

pub(crate) struct WeakTable<V> {
    primitives: EntryTable<Passable, V>,
    remotables: EntryTable<u64, WeakSlot<V>>,
    sweep_at: usize,
}

impl<V> WeakTable<V> {
    pub(crate) fn new() -> Self {
        Self {
            primitives: EntryTable::new(),
            remotables: EntryTable::new(),
            sweep_at: MIN_SWEEP,
        }
    }

    /// Reclaims entries whose remotable key has been dropped.
    pub(crate) fn sweep(&mut self) -> usize {
        let dropped = self.remotables.retain(|_, slot| slot.holder.is_live());
        self.sweep_at = (self.remotables.len() * 2).max(MIN_SWEEP);
        if dropped > 0 {
            trace!("weak table swept {dropped} dead entries");
        }
        dropped
    }

    fn live_slot(&self, id: u64) -> Option<&WeakSlot<V>> {
        self.remotables.get(&id).filter(|s| s.holder.is_live())
    }
}

impl<V> RawTable<V> for WeakTable<V> {
    fn has_key(&self, key: &Passable) -> bool {
        match key {
            Passable::Remotable(r) => self.live_slot(r.id()).is_some(),
            _ => self.primitives.contains_key(key),
        }
    }

    fn lookup(&self, key: &Passable) -> Option<&V> {
        match key {
            Passable::Remotable(r) => self.live_slot(r.id()).map(|s| &s.value),
            _ => self.primitives.get(key),
        }
    }

    fn insert_new(&mut self, key: Passable, value: V) -> Result<(), InsertError> {
        match key {
            Passable::Remotable(r) => {
                if self.remotables.len() >= self.sweep_at {
                    self.sweep();
                }
                self.remotables.insert(
                    r.id(),
                    WeakSlot {
                        holder: r.downgrade(),
                        value,
                    },
                )
            }
            other => self.primitives.insert(other, value),
        }
    }

    fn overwrite(&mut self, key: &Passable, value: V) -> Result<V, V> {
        match key {
            Passable::Remotable(r) => match self.remotables.get_mut(&r.id()) {
                Some(slot) => Ok(core::mem::replace(&mut slot.value, value)),
                None => Err(value),
            },
            _ => self.primitives.replace(key, value),
        }
    }

    fn take(&mut self, key: &Passable) -> Option<V> {
        match key {
            Passable::Remotable(r) => self.remotables.remove(&r.id()).map(|(_, s)| s.value),
            _ => self.primitives.remove(key).map(|(_, v)| v),
        }
    }

    fn live_len(&self) -> usize {
        self.primitives.len()
            + self
                .remotables
                .iter()
                .filter(|(_, s)| s.holder.is_live())
                .count()
    }
}

/// Backing of a weak store: collectable, or plain when the store was
/// created with `long_lived = false`.
pub(crate) enum WeakBacking<V> {
    Weak(WeakTable<V>),
    Strong(EntryTable<Passable, V>),
}

impl<V> WeakBacking<V> {
    pub(crate) fn new(long_lived: bool) -> Self {
        if long_lived {
            WeakBacking::Weak(WeakTable::new())
        } else {
            WeakBacking::Strong(EntryTable::new())
        }
    }

    fn raw(&self) -> &dyn RawTable<V> {
        match self {
            WeakBacking::Weak(t) => t,
            WeakBacking::Strong(t) => t,
        }
    }

    fn raw_mut(&mut self) -> &mut dyn RawTable<V> {
        match self {
            WeakBacking::Weak(t) => t,
            WeakBacking::Strong(t) => t,
        }
    }
}

impl<V> RawTable<V> for WeakBacking<V> {
    fn has_key(&self, key: &Passable) -> bool {
        self.raw().has_key(key)
    }

    fn lookup(&self, key: &Passable) -> Option<&V> {
        self.raw().lookup(key)
    }

    fn insert_new(&mut self, key: Passable, value: V) -> Result<(), InsertError> {
        self.raw_mut().insert_new(key, value)
    }

    fn overwrite(&mut self, key: &Passable, value: V) -> Result<V, V> {
        self.raw_mut().overwrite(key, value)
    }

    fn take(&mut self, key: &Passable) -> Option<V> {
        self.raw_mut().take(key)
    }

    fn live_len(&self) -> usize {
        self.raw().live_len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passable::Remotable;
    use std::rc::Rc;

    #[test]
    fn dropped_remotable_keys_are_swept() {
        let mut t: WeakTable<Rc<u32>> = WeakTable::new();
        let kept = Remotable::new("Kept");
        let dropped = Remotable::new("Dropped");
        let payload = Rc::new(7u32);
        t.insert_new(Passable::from(kept.clone()), Rc::new(1)).unwrap();
        t.insert_new(Passable::from(dropped), payload.clone()).unwrap();
        assert_eq!(t.live_len(), 1);
        assert_eq!(Rc::strong_count(&payload), 2);

        assert_eq!(t.sweep(), 1);
        assert_eq!(Rc::strong_count(&payload), 1);
        assert!(t.has_key(&Passable::from(kept)));
    }

    #[test]
    fn primitives_are_held_strongly() {
        let mut t: WeakTable<i32> = WeakTable::new();
        t.insert_new(Passable::from("k"), 1).unwrap();
        assert_eq!(t.sweep(), 0);
        assert_eq!(t.lookup(&Passable::from("k")), Some(&1));
        assert_eq!(t.overwrite(&Passable::from("k"), 2), Ok(1));
        assert_eq!(t.take(&Passable::from("k")), Some(2));
        assert_eq!(t.overwrite(&Passable::from("k"), 3), Err(3));
    }

    #[test]
    fn insertion_triggers_amortized_sweep() {
        let mut t: WeakTable<()> = WeakTable::new();
        for _ in 0..MIN_SWEEP {
            t.insert_new(Passable::from(Remotable::new("Temp")), ()).unwrap();
        }
        assert_eq!(t.remotables.len(), MIN_SWEEP);
        let survivor = Remotable::new("Survivor");
        t.insert_new(Passable::from(survivor.clone()), ()).unwrap();
        assert_eq!(t.remotables.len(), 1);
        assert!(t.has_key(&Passable::from(survivor)));
    }

    #[test]
    fn short_lived_backing_is_plain() {
        let mut b: WeakBacking<i32> = WeakBacking::new(false);
        assert!(matches!(b, WeakBacking::Strong(_)));
        let r = Remotable::new("R");
        b.insert_new(Passable::from(r.clone()), 5).unwrap();
        assert_eq!(b.lookup(&Passable::from(r)), Some(&5));
        assert!(matches!(WeakBacking::<i32>::new(true), WeakBacking::Weak(_)));
    }
}

//! Passable values: the data stores accept as keys and values.
//!
//! A `Passable` is immutable once built. Composites share their contents
//! through `Rc`, so cloning a value is cheap and a stored value can never
//! be mutated through another handle. Identity-bearing leaves
//! (`Remotable`, `PromiseRef`) compare by an unforgeable id minted at
//! creation.

use core::cell::RefCell;
use core::cmp::Ordering;
use core::fmt;
use core::hash::{Hash, Hasher};
use std::any::Any;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use crate::error::{Result, StoreError};
use crate::rank::compare_rank;

static NEXT_IDENTITY: AtomicU64 = AtomicU64::new(1);

fn next_identity() -> u64 {
    NEXT_IDENTITY.fetch_add(1, AtomicOrdering::Relaxed)
}

/// Classification of a passable. Declaration order is rank order.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum PassStyle {
    Undefined,
    Null,
    Boolean,
    Number,
    Bigint,
    String,
    Symbol,
    CopyArray,
    CopyRecord,
    CopySet,
    CopyMap,
    Remotable,
    Promise,
    Error,
}

impl PassStyle {
    pub const ALL: [PassStyle; 14] = [
        PassStyle::Undefined,
        PassStyle::Null,
        PassStyle::Boolean,
        PassStyle::Number,
        PassStyle::Bigint,
        PassStyle::String,
        PassStyle::Symbol,
        PassStyle::CopyArray,
        PassStyle::CopyRecord,
        PassStyle::CopySet,
        PassStyle::CopyMap,
        PassStyle::Remotable,
        PassStyle::Promise,
        PassStyle::Error,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PassStyle::Undefined => "undefined",
            PassStyle::Null => "null",
            PassStyle::Boolean => "boolean",
            PassStyle::Number => "number",
            PassStyle::Bigint => "bigint",
            PassStyle::String => "string",
            PassStyle::Symbol => "symbol",
            PassStyle::CopyArray => "copyArray",
            PassStyle::CopyRecord => "copyRecord",
            PassStyle::CopySet => "copySet",
            PassStyle::CopyMap => "copyMap",
            PassStyle::Remotable => "remotable",
            PassStyle::Promise => "promise",
            PassStyle::Error => "error",
        }
    }

    pub fn from_name(name: &str) -> Option<PassStyle> {
        PassStyle::ALL.iter().copied().find(|s| s.as_str() == name)
    }

    /// Primitives and remotables.
    pub fn is_scalar(self) -> bool {
        matches!(
            self,
            PassStyle::Undefined
                | PassStyle::Null
                | PassStyle::Boolean
                | PassStyle::Number
                | PassStyle::Bigint
                | PassStyle::String
                | PassStyle::Symbol
                | PassStyle::Remotable
        )
    }
}

impl fmt::Display for PassStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug)]
pub enum Passable {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    BigInt(i128),
    String(Rc<str>),
    /// A registered symbol, recreatable from its name.
    Symbol(Rc<str>),
    Array(Rc<[Passable]>),
    Record(Rc<BTreeMap<String, Passable>>),
    Set(CopySet),
    Map(CopyMap),
    Remotable(Remotable),
    Promise(PromiseRef),
    Error(CopyError),
}

impl Passable {
    pub fn string(s: &str) -> Self {
        Passable::String(Rc::from(s))
    }

    pub fn symbol(name: &str) -> Self {
        Passable::Symbol(Rc::from(name))
    }

    pub fn array<I: IntoIterator<Item = Passable>>(items: I) -> Self {
        Passable::Array(items.into_iter().collect())
    }

    pub fn record<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Passable)>,
    {
        Passable::Record(Rc::new(
            fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    pub fn pass_style(&self) -> PassStyle {
        match self {
            Passable::Undefined => PassStyle::Undefined,
            Passable::Null => PassStyle::Null,
            Passable::Bool(_) => PassStyle::Boolean,
            Passable::Number(_) => PassStyle::Number,
            Passable::BigInt(_) => PassStyle::Bigint,
            Passable::String(_) => PassStyle::String,
            Passable::Symbol(_) => PassStyle::Symbol,
            Passable::Array(_) => PassStyle::CopyArray,
            Passable::Record(_) => PassStyle::CopyRecord,
            Passable::Set(_) => PassStyle::CopySet,
            Passable::Map(_) => PassStyle::CopyMap,
            Passable::Remotable(_) => PassStyle::Remotable,
            Passable::Promise(_) => PassStyle::Promise,
            Passable::Error(_) => PassStyle::Error,
        }
    }

    pub fn is_scalar(&self) -> bool {
        self.pass_style().is_scalar()
    }

    /// Scalars, and copy composites containing only keys. Never a promise
    /// or an error, at any depth.
    pub fn is_key(&self) -> bool {
        match self {
            Passable::Array(items) => items.iter().all(Passable::is_key),
            Passable::Record(fields) => fields.values().all(Passable::is_key),
            Passable::Set(set) => set.iter().all(Passable::is_key),
            Passable::Map(map) => map.iter().all(|(k, v)| k.is_key() && v.is_key()),
            Passable::Promise(_) | Passable::Error(_) => false,
            _ => true,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Passable::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Passable::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_remotable(&self) -> Option<&Remotable> {
        match self {
            Passable::Remotable(r) => Some(r),
            _ => None,
        }
    }
}

/// Canonical bit pattern: one zero, one NaN.
pub(crate) fn canonical_bits(n: f64) -> u64 {
    if n.is_nan() {
        f64::NAN.to_bits()
    } else if n == 0.0 {
        0
    } else {
        n.to_bits()
    }
}

impl PartialEq for Passable {
    fn eq(&self, other: &Self) -> bool {
        compare_rank(self, other) == Ordering::Equal
    }
}

impl Eq for Passable {}

impl PartialOrd for Passable {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Passable {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_rank(self, other)
    }
}

impl Hash for Passable {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.pass_style().hash(state);
        match self {
            Passable::Undefined | Passable::Null => {}
            Passable::Bool(b) => b.hash(state),
            Passable::Number(n) => canonical_bits(*n).hash(state),
            Passable::BigInt(n) => n.hash(state),
            Passable::String(s) | Passable::Symbol(s) => s.hash(state),
            Passable::Array(items) => {
                items.len().hash(state);
                for item in items.iter() {
                    item.hash(state);
                }
            }
            Passable::Record(fields) => {
                fields.len().hash(state);
                for (name, value) in fields.iter() {
                    name.hash(state);
                    value.hash(state);
                }
            }
            Passable::Set(set) => {
                set.len().hash(state);
                for k in set.iter() {
                    k.hash(state);
                }
            }
            Passable::Map(map) => {
                map.len().hash(state);
                for (k, v) in map.iter() {
                    k.hash(state);
                    v.hash(state);
                }
            }
            Passable::Remotable(r) => r.id().hash(state),
            Passable::Promise(p) => p.id().hash(state),
            Passable::Error(e) => e.hash(state),
        }
    }
}

fn write_list<'a, I, T>(f: &mut fmt::Formatter<'_>, open: &str, items: I, close: &str) -> fmt::Result
where
    I: IntoIterator<Item = &'a T>,
    T: fmt::Display + 'a,
{
    f.write_str(open)?;
    for (i, item) in items.into_iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    f.write_str(close)
}

impl fmt::Display for Passable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Passable::Undefined => f.write_str("undefined"),
            Passable::Null => f.write_str("null"),
            Passable::Bool(b) => write!(f, "{b}"),
            Passable::Number(n) if n.is_nan() => f.write_str("NaN"),
            Passable::Number(n) => write!(f, "{n}"),
            Passable::BigInt(n) => write!(f, "{n}n"),
            Passable::String(s) => write!(f, "{s:?}"),
            Passable::Symbol(s) => write!(f, "Symbol({s})"),
            Passable::Array(items) => write_list(f, "[", items.iter(), "]"),
            Passable::Record(fields) => {
                f.write_str("{")?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name:?}: {value}")?;
                }
                f.write_str("}")
            }
            Passable::Set(set) => write_list(f, "makeCopySet([", set.iter(), "])"),
            Passable::Map(map) => {
                f.write_str("makeCopyMap([")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "[{k}, {v}]")?;
                }
                f.write_str("])")
            }
            Passable::Remotable(r) => write!(f, "[Alleged: {}]", r.iface()),
            Passable::Promise(_) => f.write_str("[Promise]"),
            Passable::Error(e) => write!(f, "{}: {}", e.name, e.message),
        }
    }
}

impl From<bool> for Passable {
    fn from(b: bool) -> Self {
        Passable::Bool(b)
    }
}

impl From<f64> for Passable {
    fn from(n: f64) -> Self {
        Passable::Number(n)
    }
}

impl From<i32> for Passable {
    fn from(n: i32) -> Self {
        Passable::Number(f64::from(n))
    }
}

impl From<u32> for Passable {
    fn from(n: u32) -> Self {
        Passable::Number(f64::from(n))
    }
}

impl From<i64> for Passable {
    fn from(n: i64) -> Self {
        Passable::BigInt(i128::from(n))
    }
}

impl From<u64> for Passable {
    fn from(n: u64) -> Self {
        Passable::BigInt(i128::from(n))
    }
}

impl From<i128> for Passable {
    fn from(n: i128) -> Self {
        Passable::BigInt(n)
    }
}

impl From<&str> for Passable {
    fn from(s: &str) -> Self {
        Passable::string(s)
    }
}

impl From<String> for Passable {
    fn from(s: String) -> Self {
        Passable::String(Rc::from(s))
    }
}

impl From<Vec<Passable>> for Passable {
    fn from(items: Vec<Passable>) -> Self {
        Passable::Array(items.into())
    }
}

impl From<Remotable> for Passable {
    fn from(r: Remotable) -> Self {
        Passable::Remotable(r)
    }
}

impl From<PromiseRef> for Passable {
    fn from(p: PromiseRef) -> Self {
        Passable::Promise(p)
    }
}

impl From<CopySet> for Passable {
    fn from(s: CopySet) -> Self {
        Passable::Set(s)
    }
}

impl From<CopyMap> for Passable {
    fn from(m: CopyMap) -> Self {
        Passable::Map(m)
    }
}

impl From<CopyError> for Passable {
    fn from(e: CopyError) -> Self {
        Passable::Error(e)
    }
}

struct Face {
    id: u64,
    iface: Rc<str>,
    target: Option<Rc<dyn Any>>,
}

/// An opaque, unforgeable reference. Equality and hashing use identity
/// only; the interface name is a debugging aid.
///
/// Remotables minted together with `siblings` share one allocation: each
/// keeps its own identity, and holding any one keeps all of them alive.
#[derive(Clone)]
pub struct Remotable {
    group: Rc<[Face]>,
    slot: usize,
}

impl Remotable {
    pub fn new(iface: &str) -> Self {
        Self::single(Face {
            id: next_identity(),
            iface: Rc::from(iface),
            target: None,
        })
    }

    /// A remotable standing for `target`, recoverable with `target::<T>()`.
    pub fn with_target(iface: &str, target: Rc<dyn Any>) -> Self {
        Self::single(Face {
            id: next_identity(),
            iface: Rc::from(iface),
            target: Some(target),
        })
    }

    /// Mints one remotable per `(iface, target)` pair, in order. They live
    /// and die together.
    pub fn siblings<I>(faces: I) -> Vec<Remotable>
    where
        I: IntoIterator<Item = (Rc<str>, Rc<dyn Any>)>,
    {
        let group: Rc<[Face]> = faces
            .into_iter()
            .map(|(iface, target)| Face {
                id: next_identity(),
                iface,
                target: Some(target),
            })
            .collect();
        (0..group.len())
            .map(|slot| Remotable {
                group: group.clone(),
                slot,
            })
            .collect()
    }

    fn single(face: Face) -> Self {
        Self {
            group: Rc::from(vec![face]),
            slot: 0,
        }
    }

    fn face(&self) -> &Face {
        &self.group[self.slot]
    }

    pub fn id(&self) -> u64 {
        self.face().id
    }

    pub fn iface(&self) -> &str {
        &self.face().iface
    }

    pub fn target<T: Any>(&self) -> Option<Rc<T>> {
        self.face().target.clone()?.downcast::<T>().ok()
    }

    /// The remotable minted at position `slot` alongside this one.
    pub fn sibling(&self, slot: usize) -> Option<Remotable> {
        (slot < self.group.len()).then(|| Remotable {
            group: self.group.clone(),
            slot,
        })
    }

    pub fn downgrade(&self) -> WeakRemotable {
        WeakRemotable {
            id: self.id(),
            group: Rc::downgrade(&self.group),
            slot: self.slot,
        }
    }
}

impl PartialEq for Remotable {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Remotable {}

impl Hash for Remotable {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Debug for Remotable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Remotable")
            .field("id", &self.id())
            .field("iface", &self.face().iface)
            .finish()
    }
}

/// Non-owning handle to a remotable; does not keep it alive.
#[derive(Clone)]
pub struct WeakRemotable {
    id: u64,
    group: Weak<[Face]>,
    slot: usize,
}

impl WeakRemotable {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn upgrade(&self) -> Option<Remotable> {
        self.group.upgrade().map(|group| Remotable {
            group,
            slot: self.slot,
        })
    }

    pub fn is_live(&self) -> bool {
        self.group.strong_count() > 0
    }
}

impl fmt::Debug for WeakRemotable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakRemotable")
            .field("id", &self.id)
            .field("live", &self.is_live())
            .finish()
    }
}

#[derive(Clone, Debug)]
pub enum Settlement {
    Pending,
    Fulfilled(Passable),
    Rejected(Passable),
}

struct PromiseInner {
    id: u64,
    settlement: RefCell<Settlement>,
}

/// A reference to an eventual value. Passable as a value, never a key,
/// whether or not it has settled.
#[derive(Clone)]
pub struct PromiseRef(Rc<PromiseInner>);

impl PromiseRef {
    pub fn pending() -> Self {
        Self(Rc::new(PromiseInner {
            id: next_identity(),
            settlement: RefCell::new(Settlement::Pending),
        }))
    }

    pub fn resolved(value: Passable) -> Self {
        let p = Self::pending();
        p.resolve(value);
        p
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    /// Returns false if the promise had already settled.
    pub fn resolve(&self, value: Passable) -> bool {
        self.settle(Settlement::Fulfilled(value))
    }

    pub fn reject(&self, reason: Passable) -> bool {
        self.settle(Settlement::Rejected(reason))
    }

    fn settle(&self, outcome: Settlement) -> bool {
        let mut s = self.0.settlement.borrow_mut();
        if matches!(*s, Settlement::Pending) {
            *s = outcome;
            true
        } else {
            false
        }
    }

    pub fn settlement(&self) -> Settlement {
        self.0.settlement.borrow().clone()
    }

    pub fn is_settled(&self) -> bool {
        !matches!(*self.0.settlement.borrow(), Settlement::Pending)
    }
}

impl fmt::Debug for PromiseRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromiseRef")
            .field("id", &self.0.id)
            .field("settled", &self.is_settled())
            .finish()
    }
}

/// Pass-by-copy error data. Passable, but not a key.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct CopyError {
    pub name: Rc<str>,
    pub message: Rc<str>,
}

impl CopyError {
    pub fn new(name: &str, message: &str) -> Self {
        Self {
            name: Rc::from(name),
            message: Rc::from(message),
        }
    }
}

/// Immutable set of keys in rank order, without duplicates.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CopySet(Rc<[Passable]>);

impl CopySet {
    /// Sorts and deduplicates; every element must be a key.
    pub fn from_keys<I: IntoIterator<Item = Passable>>(keys: I) -> Result<Self> {
        let mut keys: Vec<Passable> = keys.into_iter().collect();
        for k in &keys {
            assert_key(k)?;
        }
        keys.sort();
        keys.dedup();
        Ok(Self(keys.into()))
    }

    /// Caller provides keys already in strictly ascending rank order.
    /// `assert_passable_value` rejects sets built out of order.
    pub fn from_sorted(keys: Vec<Passable>) -> Self {
        Self(keys.into())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, key: &Passable) -> bool {
        self.0.binary_search(key).is_ok()
    }

    pub fn iter(&self) -> core::slice::Iter<'_, Passable> {
        self.0.iter()
    }
}

impl<'a> IntoIterator for &'a CopySet {
    type Item = &'a Passable;
    type IntoIter = core::slice::Iter<'a, Passable>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl IntoIterator for CopySet {
    type Item = Passable;
    type IntoIter = std::vec::IntoIter<Passable>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.to_vec().into_iter()
    }
}

/// Immutable map from keys to passables, in key rank order.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CopyMap(Rc<[(Passable, Passable)]>);

impl CopyMap {
    /// Sorts by key. Keys must be keys and distinct; values must be passable.
    pub fn from_entries<I: IntoIterator<Item = (Passable, Passable)>>(entries: I) -> Result<Self> {
        let mut entries: Vec<(Passable, Passable)> = entries.into_iter().collect();
        for (k, v) in &entries {
            assert_key(k)?;
            assert_passable_value(v)?;
        }
        entries.sort_by(|a, b| compare_rank(&a.0, &b.0));
        if let Some(pair) = entries.windows(2).find(|w| w[0].0 == w[1].0) {
            return Err(StoreError::NotPassable {
                reason: format!("copyMap has duplicate key {}", pair[0].0),
            });
        }
        Ok(Self(entries.into()))
    }

    /// Caller provides entries already in strictly ascending key order.
    pub fn from_sorted(entries: Vec<(Passable, Passable)>) -> Self {
        Self(entries.into())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &Passable) -> Option<&Passable> {
        self.0
            .binary_search_by(|(k, _)| compare_rank(k, key))
            .ok()
            .map(|i| &self.0[i].1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Passable, &Passable)> {
        self.0.iter().map(|(k, v)| (k, v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &Passable> {
        self.0.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &Passable> {
        self.0.iter().map(|(_, v)| v)
    }
}

impl IntoIterator for CopyMap {
    type Item = (Passable, Passable);
    type IntoIter = std::vec::IntoIter<(Passable, Passable)>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.to_vec().into_iter()
    }
}

/// Fails with `InvalidKeyKind` unless `key` is a primitive or remotable.
/// Promises are rejected whether or not they have settled.
pub fn assert_scalar_key(tag: &Rc<str>, key: &Passable) -> Result<()> {
    if key.is_scalar() {
        return Ok(());
    }
    Err(StoreError::InvalidKeyKind {
        tag: tag.clone(),
        style: key.pass_style().as_str(),
        key: key.to_string(),
    })
}

pub fn assert_key(key: &Passable) -> Result<()> {
    if key.is_key() {
        Ok(())
    } else {
        Err(StoreError::NotPassable {
            reason: format!("{} {key} is not a key", key.pass_style()),
        })
    }
}

/// Checks the structural invariants the type system cannot: copy sets and
/// copy maps must hold keys in strictly ascending rank order.
pub fn assert_passable_value(value: &Passable) -> Result<()> {
    match value {
        Passable::Array(items) => items.iter().try_for_each(assert_passable_value),
        Passable::Record(fields) => fields.values().try_for_each(assert_passable_value),
        Passable::Set(set) => {
            for k in set.iter() {
                if !k.is_key() {
                    return Err(StoreError::NotPassable {
                        reason: format!("copySet element {k} is not a key"),
                    });
                }
            }
            if set.0.windows(2).any(|w| compare_rank(&w[0], &w[1]) != Ordering::Less) {
                return Err(StoreError::NotPassable {
                    reason: format!("copySet {value} must be sorted and free of duplicates"),
                });
            }
            Ok(())
        }
        Passable::Map(map) => {
            for (k, v) in map.iter() {
                if !k.is_key() {
                    return Err(StoreError::NotPassable {
                        reason: format!("copyMap key {k} is not a key"),
                    });
                }
                assert_passable_value(v)?;
            }
            if map
                .0
                .windows(2)
                .any(|w| compare_rank(&w[0].0, &w[1].0) != Ordering::Less)
            {
                return Err(StoreError::NotPassable {
                    reason: format!("copyMap {value} keys must be sorted and free of duplicates"),
                });
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

//! Shape patterns over passables.
//!
//! A `Pattern` either matches a specimen or not; `must_match` turns a
//! miss into a `PatternMismatch` error naming the store and role. Patterns
//! are validated once, when a store or guard is defined, with
//! `assert_pattern`.

use core::cmp::Ordering;
use core::fmt;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::error::{Result, Role, StoreError};
use crate::passable::{PassStyle, Passable};
use crate::rank::compare_keys;

#[derive(Clone, Debug, PartialEq)]
pub enum Pattern {
    Any,
    Scalar,
    Key,
    /// Anything usable as a literal pattern. With no matcher values in the
    /// passable model this is every passable free of promises and errors.
    PatternShape,
    /// Matches a pass style by name, e.g. `"copyRecord"`.
    Kind(Rc<str>),
    Boolean,
    Number,
    BigInt,
    /// Non-negative bigint.
    Nat,
    String,
    Symbol,
    Record,
    Array,
    Set,
    Map,
    /// Any remotable; the label only documents intent.
    Remotable(Option<Rc<str>>),
    Error,
    Promise,
    Undefined,
    Null,
    Eq(Passable),
    Lt(Passable),
    Lte(Passable),
    Gte(Passable),
    Gt(Passable),
    And(Vec<Pattern>),
    Or(Vec<Pattern>),
    Not(Box<Pattern>),
    ArrayOf(Box<Pattern>),
    RecordOf(Box<Pattern>, Box<Pattern>),
    SetOf(Box<Pattern>),
    MapOf(Box<Pattern>, Box<Pattern>),
    /// A copyArray of exactly these element shapes.
    Tuple(Vec<Pattern>),
    /// A copyRecord with exactly these property names and value shapes.
    Fields(BTreeMap<String, Pattern>),
    /// `base` is a `Tuple` or `Fields` whose parts are all required. What
    /// the specimen has beyond them must match `rest`, if given.
    Split(Box<Pattern>, Option<Box<Pattern>>),
    /// Like `Split`, but each base part may be missing or undefined.
    Partial(Box<Pattern>, Option<Box<Pattern>>),
    /// `patt`, or a promise for it.
    Eref(Box<Pattern>),
}

impl Pattern {
    pub fn kind(name: &str) -> Self {
        Pattern::Kind(Rc::from(name))
    }

    pub fn eq(key: impl Into<Passable>) -> Self {
        Pattern::Eq(key.into())
    }

    pub fn neq(key: impl Into<Passable>) -> Self {
        Pattern::not(Pattern::eq(key))
    }

    pub fn lt(key: impl Into<Passable>) -> Self {
        Pattern::Lt(key.into())
    }

    pub fn lte(key: impl Into<Passable>) -> Self {
        Pattern::Lte(key.into())
    }

    pub fn gte(key: impl Into<Passable>) -> Self {
        Pattern::Gte(key.into())
    }

    pub fn gt(key: impl Into<Passable>) -> Self {
        Pattern::Gt(key.into())
    }

    pub fn and<I: IntoIterator<Item = Pattern>>(patts: I) -> Self {
        Pattern::And(patts.into_iter().collect())
    }

    pub fn or<I: IntoIterator<Item = Pattern>>(patts: I) -> Self {
        Pattern::Or(patts.into_iter().collect())
    }

    pub fn not(patt: Pattern) -> Self {
        Pattern::Not(Box::new(patt))
    }

    /// `patt` or undefined.
    pub fn opt(patt: Pattern) -> Self {
        Pattern::Or(vec![patt, Pattern::Undefined])
    }

    pub fn remotable(label: &str) -> Self {
        Pattern::Remotable(Some(Rc::from(label)))
    }

    pub fn array_of(patt: Pattern) -> Self {
        Pattern::ArrayOf(Box::new(patt))
    }

    pub fn record_of(key_patt: Pattern, value_patt: Pattern) -> Self {
        Pattern::RecordOf(Box::new(key_patt), Box::new(value_patt))
    }

    pub fn set_of(patt: Pattern) -> Self {
        Pattern::SetOf(Box::new(patt))
    }

    pub fn map_of(key_patt: Pattern, value_patt: Pattern) -> Self {
        Pattern::MapOf(Box::new(key_patt), Box::new(value_patt))
    }

    pub fn fields<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Pattern)>,
    {
        Pattern::Fields(fields.into_iter().map(|(k, p)| (k.into(), p)).collect())
    }

    /// Splits a record or array specimen against `base`; see `Split`.
    pub fn split(base: Pattern, rest: impl Into<Option<Pattern>>) -> Self {
        Pattern::Split(Box::new(base), rest.into().map(Box::new))
    }

    /// Like `split`, with every base part optional.
    pub fn partial(base: Pattern, rest: impl Into<Option<Pattern>>) -> Self {
        Pattern::Partial(Box::new(base), rest.into().map(Box::new))
    }

    pub fn eref(patt: Pattern) -> Self {
        Pattern::Eref(Box::new(patt))
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Pattern::Any)
    }

    pub fn matches(&self, specimen: &Passable) -> bool {
        let style = specimen.pass_style();
        match self {
            Pattern::Any => true,
            Pattern::Scalar => specimen.is_scalar(),
            Pattern::Key | Pattern::PatternShape => specimen.is_key(),
            Pattern::Kind(name) => style.as_str() == &**name,
            Pattern::Boolean => style == PassStyle::Boolean,
            Pattern::Number => style == PassStyle::Number,
            Pattern::BigInt => style == PassStyle::Bigint,
            Pattern::Nat => matches!(specimen, Passable::BigInt(n) if *n >= 0),
            Pattern::String => style == PassStyle::String,
            Pattern::Symbol => style == PassStyle::Symbol,
            Pattern::Record => style == PassStyle::CopyRecord,
            Pattern::Array => style == PassStyle::CopyArray,
            Pattern::Set => style == PassStyle::CopySet,
            Pattern::Map => style == PassStyle::CopyMap,
            Pattern::Remotable(_) => style == PassStyle::Remotable,
            Pattern::Error => style == PassStyle::Error,
            Pattern::Promise => style == PassStyle::Promise,
            Pattern::Undefined => style == PassStyle::Undefined,
            Pattern::Null => style == PassStyle::Null,
            Pattern::Eq(key) => specimen.is_key() && specimen == key,
            Pattern::Lt(key) => compare_keys(specimen, key) == Some(Ordering::Less),
            Pattern::Lte(key) => matches!(
                compare_keys(specimen, key),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Pattern::Gte(key) => matches!(
                compare_keys(specimen, key),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Pattern::Gt(key) => compare_keys(specimen, key) == Some(Ordering::Greater),
            Pattern::And(patts) => patts.iter().all(|p| p.matches(specimen)),
            Pattern::Or(patts) => patts.iter().any(|p| p.matches(specimen)),
            Pattern::Not(patt) => !patt.matches(specimen),
            Pattern::ArrayOf(patt) => match specimen {
                Passable::Array(items) => items.iter().all(|i| patt.matches(i)),
                _ => false,
            },
            Pattern::RecordOf(key_patt, value_patt) => match specimen {
                Passable::Record(fields) => fields
                    .iter()
                    .all(|(k, v)| key_patt.matches(&Passable::string(k)) && value_patt.matches(v)),
                _ => false,
            },
            Pattern::SetOf(patt) => match specimen {
                Passable::Set(set) => set.iter().all(|k| patt.matches(k)),
                _ => false,
            },
            Pattern::MapOf(key_patt, value_patt) => match specimen {
                Passable::Map(map) => map
                    .iter()
                    .all(|(k, v)| key_patt.matches(k) && value_patt.matches(v)),
                _ => false,
            },
            Pattern::Tuple(patts) => match specimen {
                Passable::Array(items) => {
                    items.len() == patts.len()
                        && items.iter().zip(patts).all(|(i, p)| p.matches(i))
                }
                _ => false,
            },
            Pattern::Fields(patts) => match specimen {
                Passable::Record(fields) => {
                    fields.len() == patts.len()
                        && fields
                            .iter()
                            .zip(patts)
                            .all(|((fk, fv), (pk, p))| fk == pk && p.matches(fv))
                }
                _ => false,
            },
            Pattern::Split(base, rest) => split_matches(base, rest.as_deref(), specimen, false),
            Pattern::Partial(base, rest) => split_matches(base, rest.as_deref(), specimen, true),
            Pattern::Eref(patt) => style == PassStyle::Promise || patt.matches(specimen),
        }
    }
}

/// Matches the base parts of `specimen` against `base` and hands whatever
/// is left over, as a value of the same kind, to `rest`. Optional parts
/// accept an absent or undefined specimen part.
fn split_matches(base: &Pattern, rest: Option<&Pattern>, specimen: &Passable, optional: bool) -> bool {
    let part_ok = |patt: &Pattern, part: &Passable| {
        (optional && matches!(part, Passable::Undefined)) || patt.matches(part)
    };
    let leftover = match (base, specimen) {
        (Pattern::Tuple(patts), Passable::Array(items)) => {
            if items.len() < patts.len() && !optional {
                return false;
            }
            if !items.iter().zip(patts).all(|(item, p)| part_ok(p, item)) {
                return false;
            }
            Passable::array(items.iter().skip(patts.len()).cloned())
        }
        (Pattern::Fields(patts), Passable::Record(fields)) => {
            if !optional && !patts.keys().all(|k| fields.contains_key(k)) {
                return false;
            }
            let mut extra = Vec::new();
            for (name, value) in fields.iter() {
                match patts.get(name) {
                    Some(p) if !part_ok(p, value) => return false,
                    Some(_) => {}
                    None => extra.push((name.clone(), value.clone())),
                }
            }
            Passable::record(extra)
        }
        _ => return false,
    };
    rest.map_or(true, |r| r.matches(&leftover))
}

fn operand_must_be_key(op: &str, key: &Passable) -> Result<()> {
    if key.is_key() {
        Ok(())
    } else {
        Err(StoreError::InvalidPatternDefinition {
            reason: format!("M.{op}() operand {key} must be a key"),
        })
    }
}

/// Rejects patterns that can never be meaningful: unknown kinds, and
/// comparisons against non-keys.
pub fn assert_pattern(patt: &Pattern) -> Result<()> {
    match patt {
        Pattern::Kind(name) => match PassStyle::from_name(name) {
            Some(_) => Ok(()),
            None => Err(StoreError::InvalidPatternDefinition {
                reason: format!("M.kind({name:?}) names no pass style"),
            }),
        },
        Pattern::Eq(key) => operand_must_be_key("eq", key),
        Pattern::Lt(key) => operand_must_be_key("lt", key),
        Pattern::Lte(key) => operand_must_be_key("lte", key),
        Pattern::Gte(key) => operand_must_be_key("gte", key),
        Pattern::Gt(key) => operand_must_be_key("gt", key),
        Pattern::And(patts) | Pattern::Or(patts) | Pattern::Tuple(patts) => {
            patts.iter().try_for_each(assert_pattern)
        }
        Pattern::Not(p) | Pattern::ArrayOf(p) | Pattern::SetOf(p) => assert_pattern(p),
        Pattern::RecordOf(k, v) | Pattern::MapOf(k, v) => {
            assert_pattern(k)?;
            assert_pattern(v)
        }
        Pattern::Fields(patts) => patts.values().try_for_each(assert_pattern),
        Pattern::Split(base, rest) | Pattern::Partial(base, rest) => {
            if !matches!(**base, Pattern::Tuple(_) | Pattern::Fields(_)) {
                return Err(StoreError::InvalidPatternDefinition {
                    reason: format!("split base {base} must be a record or array of patterns"),
                });
            }
            assert_pattern(base)?;
            rest.as_deref().map_or(Ok(()), assert_pattern)
        }
        Pattern::Eref(p) => assert_pattern(p),
        _ => Ok(()),
    }
}

/// Fails with `PatternMismatch` when `specimen` does not match `patt`.
pub fn must_match(specimen: &Passable, patt: &Pattern, tag: &Rc<str>, role: Role) -> Result<()> {
    if patt.matches(specimen) {
        return Ok(());
    }
    Err(StoreError::PatternMismatch {
        tag: tag.clone(),
        role,
        expected: patt.to_string(),
        specimen: specimen.to_string(),
    })
}

fn write_args(f: &mut fmt::Formatter<'_>, name: &str, patts: &[Pattern]) -> fmt::Result {
    write!(f, "M.{name}(")?;
    for (i, p) in patts.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{p}")?;
    }
    f.write_str(")")
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Any => f.write_str("M.any()"),
            Pattern::Scalar => f.write_str("M.scalar()"),
            Pattern::Key => f.write_str("M.key()"),
            Pattern::PatternShape => f.write_str("M.pattern()"),
            Pattern::Kind(name) => write!(f, "M.kind({name:?})"),
            Pattern::Boolean => f.write_str("M.boolean()"),
            Pattern::Number => f.write_str("M.number()"),
            Pattern::BigInt => f.write_str("M.bigint()"),
            Pattern::Nat => f.write_str("M.nat()"),
            Pattern::String => f.write_str("M.string()"),
            Pattern::Symbol => f.write_str("M.symbol()"),
            Pattern::Record => f.write_str("M.record()"),
            Pattern::Array => f.write_str("M.array()"),
            Pattern::Set => f.write_str("M.set()"),
            Pattern::Map => f.write_str("M.map()"),
            Pattern::Remotable(Some(label)) => write!(f, "M.remotable({label:?})"),
            Pattern::Remotable(None) => f.write_str("M.remotable()"),
            Pattern::Error => f.write_str("M.error()"),
            Pattern::Promise => f.write_str("M.promise()"),
            Pattern::Undefined => f.write_str("M.undefined()"),
            Pattern::Null => f.write_str("M.null()"),
            Pattern::Eq(key) => write!(f, "{key}"),
            Pattern::Lt(key) => write!(f, "M.lt({key})"),
            Pattern::Lte(key) => write!(f, "M.lte({key})"),
            Pattern::Gte(key) => write!(f, "M.gte({key})"),
            Pattern::Gt(key) => write!(f, "M.gt({key})"),
            Pattern::And(patts) => write_args(f, "and", patts),
            Pattern::Or(patts) => write_args(f, "or", patts),
            Pattern::Not(p) => write!(f, "M.not({p})"),
            Pattern::ArrayOf(p) => write!(f, "M.arrayOf({p})"),
            Pattern::RecordOf(k, v) => write!(f, "M.recordOf({k}, {v})"),
            Pattern::SetOf(p) => write!(f, "M.setOf({p})"),
            Pattern::MapOf(k, v) => write!(f, "M.mapOf({k}, {v})"),
            Pattern::Tuple(patts) => {
                f.write_str("[")?;
                for (i, p) in patts.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{p}")?;
                }
                f.write_str("]")
            }
            Pattern::Fields(patts) => {
                f.write_str("{")?;
                for (i, (name, p)) in patts.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name:?}: {p}")?;
                }
                f.write_str("}")
            }
            Pattern::Split(base, Some(rest)) => write!(f, "M.split({base}, {rest})"),
            Pattern::Split(base, None) => write!(f, "M.split({base})"),
            Pattern::Partial(base, Some(rest)) => write!(f, "M.partial({base}, {rest})"),
            Pattern::Partial(base, None) => write!(f, "M.partial({base})"),
            Pattern::Eref(p) => write!(f, "M.eref({p})"),
        }
    }
}

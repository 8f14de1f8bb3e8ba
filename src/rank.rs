//! Orderings over passables.
//!
//! `compare_rank` is total and drives iteration order and copy-collection
//! layout. `compare_keys` is the partial order range patterns use; it
//! answers `None` for incomparable keys.

use core::cmp::Ordering;

use crate::passable::{CopySet, Passable};

/// NaN sorts after every other number; the two zeros are equal.
pub fn compare_numbers(left: f64, right: f64) -> Ordering {
    match (left.is_nan(), right.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => left.partial_cmp(&right).unwrap_or(Ordering::Equal),
    }
}

fn lexicographic<I, F>(mut left: I, mut right: I, mut cmp: F) -> Ordering
where
    I: Iterator,
    F: FnMut(I::Item, I::Item) -> Ordering,
{
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(a), Some(b)) => {
                let o = cmp(a, b);
                if o != Ordering::Equal {
                    return o;
                }
            }
        }
    }
}

/// Total order: pass style first, then contents.
pub fn compare_rank(left: &Passable, right: &Passable) -> Ordering {
    let by_style = left.pass_style().cmp(&right.pass_style());
    if by_style != Ordering::Equal {
        return by_style;
    }
    match (left, right) {
        (Passable::Bool(a), Passable::Bool(b)) => a.cmp(b),
        (Passable::Number(a), Passable::Number(b)) => compare_numbers(*a, *b),
        (Passable::BigInt(a), Passable::BigInt(b)) => a.cmp(b),
        (Passable::String(a), Passable::String(b)) | (Passable::Symbol(a), Passable::Symbol(b)) => {
            a.cmp(b)
        }
        (Passable::Array(a), Passable::Array(b)) => lexicographic(a.iter(), b.iter(), compare_rank),
        (Passable::Record(a), Passable::Record(b)) => {
            lexicographic(a.iter(), b.iter(), |(ka, va), (kb, vb)| {
                ka.cmp(kb).then_with(|| compare_rank(va, vb))
            })
        }
        (Passable::Set(a), Passable::Set(b)) => lexicographic(a.iter(), b.iter(), compare_rank),
        (Passable::Map(a), Passable::Map(b)) => lexicographic(a.iter(), b.iter(), |(ka, va), (kb, vb)| {
            compare_rank(ka, kb).then_with(|| compare_rank(va, vb))
        }),
        (Passable::Remotable(a), Passable::Remotable(b)) => a.id().cmp(&b.id()),
        (Passable::Promise(a), Passable::Promise(b)) => a.id().cmp(&b.id()),
        (Passable::Error(a), Passable::Error(b)) => a.cmp(b),
        _ => Ordering::Equal,
    }
}

/// Combines pointwise comparisons: all-equal is Equal, a mix of Less and
/// Greater is incomparable.
fn combine(acc: Option<Ordering>, next: Option<Ordering>) -> Option<Ordering> {
    match (acc?, next?) {
        (Ordering::Equal, o) | (o, Ordering::Equal) => Some(o),
        (a, b) if a == b => Some(a),
        _ => None,
    }
}

fn compare_sets(a: &CopySet, b: &CopySet) -> Option<Ordering> {
    let a_in_b = a.iter().all(|k| b.contains(k));
    let b_in_a = b.iter().all(|k| a.contains(k));
    match (a_in_b, b_in_a) {
        (true, true) => Some(Ordering::Equal),
        (true, false) => Some(Ordering::Less),
        (false, true) => Some(Ordering::Greater),
        (false, false) => None,
    }
}

fn compare_key_parts(left: &Passable, right: &Passable) -> Option<Ordering> {
    if left.pass_style() != right.pass_style() {
        return None;
    }
    match (left, right) {
        (Passable::Remotable(a), Passable::Remotable(b)) => (a == b).then_some(Ordering::Equal),
        (Passable::Array(a), Passable::Array(b)) => {
            for (x, y) in a.iter().zip(b.iter()) {
                match compare_key_parts(x, y)? {
                    Ordering::Equal => continue,
                    o => return Some(o),
                }
            }
            Some(a.len().cmp(&b.len()))
        }
        (Passable::Record(a), Passable::Record(b)) => {
            if a.len() != b.len() || !a.keys().eq(b.keys()) {
                return None;
            }
            a.values()
                .zip(b.values())
                .fold(Some(Ordering::Equal), |acc, (x, y)| {
                    combine(acc, compare_key_parts(x, y))
                })
        }
        (Passable::Set(a), Passable::Set(b)) => compare_sets(a, b),
        (Passable::Map(a), Passable::Map(b)) => (a == b).then_some(Ordering::Equal),
        _ => Some(compare_rank(left, right)),
    }
}

/// Partial order over keys. Remotables are only equal to themselves,
/// sets order by inclusion, records compare pointwise over identical
/// property names. Non-keys are incomparable to everything.
pub fn compare_keys(left: &Passable, right: &Passable) -> Option<Ordering> {
    if !left.is_key() || !right.is_key() {
        return None;
    }
    compare_key_parts(left, right)
}

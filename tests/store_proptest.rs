// MapStore property tests.
//
// Property 1: a MapStore behaves like an ordered map under the presence
// discipline.
//  - Model: BTreeMap<i64, i64> keyed by the same integers.
//  - Operations: init, set, delete, get, add_all of one pair.
//  - Invariant: each operation succeeds exactly when the model says it
//    should; on failure the store is unchanged. After every step,
//    get_size() == model.len() and keys() yields the model keys in order.
//
// Property 2: stale iteration.
//  - Model: a live iterator plus a flag "an addition happened since it was
//    created".
//  - Invariant: the next step yields StaleIterator exactly when the flag is
//    set; deletions and overwrites never set it.
use std::collections::BTreeMap;

use proptest::prelude::*;
use scalar_stores::{make_scalar_map_store, Passable, StoreError, StoreOptions};

fn key(k: i64) -> Passable {
    Passable::from(k as i32)
}

fn store_keys(m: &scalar_stores::MapStore) -> Vec<Passable> {
    m.keys().collect::<Result<_, _>>().unwrap()
}

proptest! {
    #[test]
    fn prop_map_store_matches_model(ops in proptest::collection::vec((0u8..=4u8, -8i64..8i64, 0i64..100i64), 1..120)) {
        let m = make_scalar_map_store("prop", StoreOptions::new()).unwrap();
        let mut model: BTreeMap<i64, i64> = BTreeMap::new();

        for (op, k, v) in ops {
            match op {
                // init only if absent
                0 => {
                    let res = m.init(key(k), Passable::from(v as i32));
                    if let std::collections::btree_map::Entry::Vacant(e) = model.entry(k) {
                        prop_assert!(res.is_ok());
                        e.insert(v);
                    } else {
                        let already = matches!(res, Err(StoreError::KeyAlreadyRegistered { .. }));
                        prop_assert!(already);
                    }
                }
                // set only if present
                1 => {
                    let res = m.set(&key(k), Passable::from(v as i32));
                    if let Some(slot) = model.get_mut(&k) {
                        prop_assert!(res.is_ok());
                        *slot = v;
                    } else {
                        let missing = matches!(res, Err(StoreError::KeyNotFound { .. }));
                        prop_assert!(missing);
                    }
                }
                // delete only if present
                2 => {
                    let res = m.delete(&key(k));
                    prop_assert_eq!(res.is_ok(), model.remove(&k).is_some());
                }
                // get agrees with the model
                3 => {
                    let got = m.get(&key(k)).ok();
                    prop_assert_eq!(got, model.get(&k).map(|v| Passable::from(*v as i32)));
                }
                // add_all overwrites or creates
                _ => {
                    m.add_all([(key(k), Passable::from(v as i32))]).unwrap();
                    model.insert(k, v);
                }
            }
            prop_assert_eq!(m.get_size(), model.len());
            let expected: Vec<Passable> = model.keys().map(|k| key(*k)).collect();
            prop_assert_eq!(store_keys(&m), expected);
        }
    }
}

proptest! {
    #[test]
    fn prop_iterator_goes_stale_only_on_addition(ops in proptest::collection::vec((0u8..=2u8, 0i64..6i64), 1..40)) {
        let m = make_scalar_map_store("stale", StoreOptions::new()).unwrap();
        for k in 0..3 {
            m.init(key(k), Passable::Null).unwrap();
        }
        let mut it = m.keys();
        let mut added = false;
        let mut stopped = false;

        for (op, k) in ops {
            match op {
                0 => {
                    if !m.has(&key(k)) {
                        m.init(key(k), Passable::Null).unwrap();
                        added = true;
                    }
                }
                1 => {
                    let _ = m.delete(&key(k));
                }
                _ => {
                    let _ = m.set(&key(k), Passable::from(1));
                }
            }
            if stopped {
                prop_assert!(it.next().is_none());
                continue;
            }
            match it.next() {
                Some(Err(StoreError::StaleIterator { .. })) => {
                    prop_assert!(added);
                    stopped = true;
                }
                Some(Ok(_)) => prop_assert!(!added),
                Some(Err(other)) => prop_assert!(false, "unexpected error {:?}", other),
                None => {
                    prop_assert!(!added);
                    stopped = true;
                }
            }
        }
    }
}

// Weak map and weak set stores.
//
// Invariants exercised:
// - Same presence discipline and shape checks as strong stores.
// - A remotable key does not keep its entry alive (long_lived = true).
// - With long_lived = false the store holds its keys like a plain map.
// - Weak stores plug into anything generic over WeakMapOps / WeakSetOps.
use scalar_stores::{
    make_scalar_map_store, make_scalar_set_store, make_scalar_weak_map_store,
    make_scalar_weak_set_store, Passable, Pattern, Remotable, StoreError, StoreOptions,
    WeakMapOps, WeakSetOps,
};

// Test: presence discipline on a weak map.
// Assumes: weak maps share the checked method layer with strong maps.
// Verifies: init/get/set/delete succeed and fail exactly as on a MapStore.
#[test]
fn weak_map_presence() {
    let w = make_scalar_weak_map_store("weak", StoreOptions::new()).unwrap();
    let key = Passable::from(Remotable::new("Holder"));
    w.init(key.clone(), Passable::from(1)).unwrap();
    assert!(matches!(
        w.init(key.clone(), Passable::from(2)),
        Err(StoreError::KeyAlreadyRegistered { .. })
    ));
    w.set(&key, Passable::from(3)).unwrap();
    assert_eq!(w.get(&key).unwrap(), Passable::from(3));
    w.delete(&key).unwrap();
    assert!(matches!(w.get(&key), Err(StoreError::KeyNotFound { .. })));
    assert!(matches!(
        w.init(Passable::array([]), Passable::Null),
        Err(StoreError::InvalidKeyKind { .. })
    ));
}

// Test: entries for dropped keys are reclaimed.
// Assumes: long_lived defaults to true.
// Verifies: the live count forgets entries whose remotable key was dropped,
// while values reachable from a held key stay.
#[test]
fn dropped_keys_release_entries() {
    let w = make_scalar_weak_map_store("cache", StoreOptions::new()).unwrap();
    let kept = Remotable::new("Kept");
    w.init(Passable::from(kept.clone()), Passable::from("kept")).unwrap();
    {
        let transient = Remotable::new("Transient");
        w.init(Passable::from(transient), Passable::from("gone")).unwrap();
        assert_eq!(format!("{w:?}"), "WeakMapStore { tag: \"cache\", live: 2 }");
    }
    assert_eq!(format!("{w:?}"), "WeakMapStore { tag: \"cache\", live: 1 }");
    assert_eq!(w.get(&Passable::from(kept)).unwrap(), Passable::from("kept"));
}

// Test: short-lived weak stores.
// Assumes: long_lived = false selects a plain backing.
// Verifies: an entry survives its key's other handles being dropped,
// unlike in a long-lived store.
#[test]
fn short_lived_store_holds_keys() {
    let short = make_scalar_weak_set_store("short", StoreOptions::new().long_lived(false)).unwrap();
    let long = make_scalar_weak_set_store("long", StoreOptions::new()).unwrap();
    short.add(Passable::from(Remotable::new("Member"))).unwrap();
    long.add(Passable::from(Remotable::new("Member"))).unwrap();
    assert_eq!(format!("{short:?}"), "WeakSetStore { tag: \"short\", live: 1 }");
    assert_eq!(format!("{long:?}"), "WeakSetStore { tag: \"long\", live: 0 }");
}

// Test: weak set membership and shapes.
// Assumes: add_all tolerates existing members.
// Verifies: duplicate add fails, add_all does not, shapes apply.
#[test]
fn weak_set_membership() {
    let w = make_scalar_weak_set_store(
        "names",
        StoreOptions::new().key_shape(Pattern::String),
    )
    .unwrap();
    w.add(Passable::from("a")).unwrap();
    assert!(w.add(Passable::from("a")).is_err());
    w.add_all(["a", "b"].map(Passable::from)).unwrap();
    assert!(w.has(&Passable::from("b")));
    assert!(matches!(
        w.add(Passable::from(1)),
        Err(StoreError::PatternMismatch { .. })
    ));
    w.delete(&Passable::from("a")).unwrap();
    assert!(!w.has(&Passable::from("a")));
}

fn count_present<S: WeakSetOps>(set: &S, keys: &[Passable]) -> usize {
    keys.iter().filter(|k| set.has(k)).count()
}

fn bump<M: WeakMapOps>(map: &M, key: &Passable) -> Result<(), StoreError> {
    if !map.has(key) {
        return map.init(key.clone(), Passable::from(1));
    }
    let n = map.get(key)?.as_number().unwrap_or(0.0);
    map.set(key, Passable::from(n + 1.0))
}

// Test: strong stores satisfy the weak interfaces.
// Assumes: MapStore implements WeakMapOps and SetStore implements WeakSetOps.
// Verifies: generic helpers behave the same over strong and weak stores.
#[test]
fn strong_stores_serve_weak_interfaces() {
    let key = Passable::from("hits");
    let strong = make_scalar_map_store("strong", StoreOptions::new()).unwrap();
    let weak = make_scalar_weak_map_store("weak", StoreOptions::new()).unwrap();
    for _ in 0..3 {
        bump(&strong, &key).unwrap();
        bump(&weak, &key).unwrap();
    }
    assert_eq!(strong.get(&key).unwrap(), Passable::from(3));
    assert_eq!(weak.get(&key).unwrap(), Passable::from(3));

    let keys = ["x", "y", "z"].map(Passable::from);
    let strong_set = make_scalar_set_store("strong-set", StoreOptions::new()).unwrap();
    let weak_set = make_scalar_weak_set_store("weak-set", StoreOptions::new()).unwrap();
    for set in [&strong_set as &dyn WeakSetOps, &weak_set] {
        set.add(keys[0].clone()).unwrap();
        set.add(keys[2].clone()).unwrap();
    }
    assert_eq!(count_present(&strong_set, &keys), 2);
    assert_eq!(count_present(&weak_set, &keys), 2);
    assert_eq!(WeakSetOps::tag(&weak_set), "weak-set");
}

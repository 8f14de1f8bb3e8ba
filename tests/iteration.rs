// Ordered iteration over strong stores.
//
// Invariants exercised:
// - Iteration yields keys in rank order, deterministic for a generation.
// - Adding a key while an iterator is live makes its next step fail with
//   StaleIterator; the iterator then stops.
// - Deleting keys while iterating is safe; deleted keys are skipped.
// - Filters select by key and value pattern, reading current values.
use scalar_stores::{
    make_scalar_map_store, make_scalar_set_store, Passable, Pattern, Remotable, StoreError,
    StoreOptions,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn keys_of<I: Iterator<Item = Result<Passable, StoreError>>>(it: I) -> Vec<Passable> {
    it.collect::<Result<_, _>>().expect("iteration ok")
}

// Test: rank order across pass styles.
// Assumes: numbers rank before strings; remotables order by creation.
// Verifies: keys come back sorted regardless of insertion order.
#[test]
fn keys_iterate_in_rank_order() {
    init_logging();
    let m = make_scalar_map_store("ordered", StoreOptions::new()).unwrap();
    let first = Remotable::new("First");
    let second = Remotable::new("Second");
    for key in [
        Passable::from(second.clone()),
        Passable::from("b"),
        Passable::from(10),
        Passable::from(first.clone()),
        Passable::from("a"),
        Passable::from(-1),
        Passable::Null,
    ] {
        m.init(key, Passable::Null).unwrap();
    }
    assert_eq!(
        keys_of(m.keys()),
        vec![
            Passable::Null,
            Passable::from(-1),
            Passable::from(10),
            Passable::from("a"),
            Passable::from("b"),
            Passable::from(first),
            Passable::from(second),
        ]
    );
}

// Test: stale iterator detection.
// Assumes: the generation is captured when the iterator is created.
// Verifies: an addition after creation fails the next step, once.
#[test]
fn addition_during_iteration_fails_fast() {
    init_logging();
    let m = make_scalar_map_store("stale", StoreOptions::new()).unwrap();
    m.init(Passable::from("a"), Passable::Null).unwrap();
    m.init(Passable::from("b"), Passable::Null).unwrap();

    let mut it = m.keys();
    assert_eq!(it.next().unwrap().unwrap(), Passable::from("a"));
    m.init(Passable::from("c"), Passable::Null).unwrap();
    match it.next() {
        Some(Err(StoreError::StaleIterator { tag })) => assert_eq!(&*tag, "stale"),
        other => panic!("unexpected: {other:?}"),
    }
    assert!(it.next().is_none());
}

// Test: an iterator created before an addition but not yet advanced.
// Assumes: the first step also checks the generation.
// Verifies: even an unstarted iterator goes stale.
#[test]
fn unstarted_iterator_goes_stale() {
    let s = make_scalar_set_store("unstarted", StoreOptions::new()).unwrap();
    let mut it = s.keys();
    s.add(Passable::from(1)).unwrap();
    assert!(matches!(it.next(), Some(Err(StoreError::StaleIterator { .. }))));
}

// Test: deletion during iteration.
// Assumes: deletion does not bump the generation.
// Verifies: deleting the current and upcoming keys is safe; deleted keys
// are skipped.
#[test]
fn deletion_during_iteration_is_safe() {
    let m = make_scalar_map_store("deletes", StoreOptions::new()).unwrap();
    for i in 0..5 {
        m.init(Passable::from(i), Passable::from(i)).unwrap();
    }
    let mut seen = Vec::new();
    for key in m.keys() {
        let key = key.unwrap();
        if key == Passable::from(1) {
            m.delete(&Passable::from(2)).unwrap();
        }
        m.delete(&key).unwrap();
        seen.push(key);
    }
    assert_eq!(
        seen,
        vec![Passable::from(0), Passable::from(1), Passable::from(3), Passable::from(4)]
    );
    assert_eq!(m.get_size(), 0);
}

// Test: set during iteration.
// Assumes: set is not an addition.
// Verifies: values() observes values overwritten mid-iteration.
#[test]
fn values_reflect_current_state() {
    let m = make_scalar_map_store("current", StoreOptions::new()).unwrap();
    m.init(Passable::from("a"), Passable::from(1)).unwrap();
    m.init(Passable::from("b"), Passable::from(2)).unwrap();
    let mut values = m.values();
    assert_eq!(values.next().unwrap().unwrap(), Passable::from(1));
    m.set(&Passable::from("b"), Passable::from(20)).unwrap();
    assert_eq!(values.next().unwrap().unwrap(), Passable::from(20));
    assert!(values.next().is_none());
}

// Test: filtered iteration.
// Assumes: key and value patterns both apply.
// Verifies: only matching entries are yielded, in order.
#[test]
fn filtered_entries() {
    let m = make_scalar_map_store("filtered", StoreOptions::new()).unwrap();
    for (k, v) in [("apple", 3), ("banana", 12), ("cherry", 7), ("date", 15)] {
        m.init(Passable::from(k), Passable::from(v)).unwrap();
    }
    let cheap: Vec<_> = m
        .entries_matching(Pattern::Any, Pattern::lt(10))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(
        cheap,
        vec![
            (Passable::from("apple"), Passable::from(3)),
            (Passable::from("cherry"), Passable::from(7)),
        ]
    );
    let late = keys_of(m.keys_matching(Pattern::gte("c"), Pattern::Any).unwrap());
    assert_eq!(late, vec![Passable::from("cherry"), Passable::from("date")]);

    assert!(matches!(
        m.keys_matching(Pattern::eq(scalar_stores::PromiseRef::pending()), Pattern::Any),
        Err(StoreError::InvalidPatternDefinition { .. })
    ));
}

// Test: repeated iteration without mutation.
// Assumes: the sorted key list is memoized between additions.
// Verifies: two passes agree.
#[test]
fn iteration_is_repeatable() {
    let s = make_scalar_set_store("repeat", StoreOptions::new()).unwrap();
    s.add_all(["q", "w", "e", "r"].map(Passable::from)).unwrap();
    assert_eq!(keys_of(s.keys()), keys_of(s.values()));
    assert_eq!(keys_of(s.keys()), keys_of(s.keys()));
}

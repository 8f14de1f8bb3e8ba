//! scalar-stores: pattern-checked map and set stores keyed by scalars,
//! a deduplicating async provider on top of them, and guarded capability
//! objects ("exos") that stores and user code can pass around by identity.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: keep each layer small enough that its contract can be read in
//!   one sitting, and let the layers above rely on it without re-checking.
//! - Layers:
//!   - `passable` / `rank` / `pattern`: the data model. Immutable values,
//!     a total rank order, a partial key order, and shape patterns.
//!   - `EntryTable<K, V, S>`: structural hash table (hashbrown index over
//!     slotmap storage) with cached hashes and a debug-only reentrancy
//!     guard.
//!   - `WeakTable<V>`: entry table variant that holds remotable keys
//!     through weak references and sweeps dead entries on insert.
//!   - `Container` methods: has/get/init/set/delete/add_all over any
//!     backing table, run behind `EntryChecks` (scalar key, key shape,
//!     value passability, value shape).
//!   - `CurrentKeys`: wraps the checks of strong stores; bumps a generation
//!     on every addition and memoizes the sorted key list between
//!     additions. Iterators fail fast once the generation moves.
//!   - Stores: `MapStore`, `SetStore`, `WeakMapStore`, `WeakSetStore`.
//!   - `AtomicProvider`: get-or-create over any `WeakMapOps` store, one
//!     construction per key however many callers wait on it.
//!   - `exo`: guarded objects built from an `InterfaceGuard`, a method
//!     table, and per-instance state.
//!
//! Constraints
//! - Single-threaded: stores and exos are `!Send`/`!Sync` (`Rc`, `RefCell`).
//! - Every mutation validates first and touches the table last, so a
//!   failed call leaves the store unchanged.
//! - Keys are scalars only: primitives and remotables. Promises are never
//!   keys, settled or not.
//! - Iteration order is rank order, deterministic for a fixed generation.
//!
//! Identity
//! - Remotables compare by an id minted at creation. Stores and exos are
//!   remotables whose target is their shared state, so they can be stored
//!   as keys or values and recovered with `from_passable`.
//! - Kit facets are minted together as sibling remotables. Each keeps its
//!   identity while any sibling is held. Facets own their state; the state
//!   never points back, so there are no Rc cycles.
//!
//! Reentrancy policy
//! - `EntryTable` methods enter a debug-only guard. No user code runs
//!   inside a table operation; checks and value construction run before
//!   the table is borrowed.
//! - `provide_lazy` and `AtomicProvider` run the value maker outside any
//!   table borrow, so a maker may itself use the store.
//!
//! Notes and non-goals
//! - No persistence, no durable (virtual) stores, no cross-thread sharing.
//! - Weak stores are not enumerable and have no size.
//! - Primitive keys in weak stores are held strongly; nothing could
//!   observe their collection.

mod current_keys;
mod entry_table;
pub mod error;
pub mod exo;
pub mod interface;
mod methods;
pub mod passable;
pub mod pattern;
mod provide;
pub mod rank;
mod reentrancy;
mod stores;
mod weak_table;

// Public surface
pub use current_keys::{Entries, Keys, Values};
pub use entry_table::{EntryTable, InsertError};
pub use error::{ErrorCode, ExoError, ProvideError, Result, Role, StoreError};
pub use exo::{
    define_exo_class, define_exo_class_kit, far, make_exo, Exo, ExoClass, ExoClassKit,
    ExoClassOptions, ExoContext, FacetKit, MethodFn, MethodTable,
};
pub use interface::{InterfaceGuard, MethodGuard};
pub use passable::{
    assert_key, assert_passable_value, assert_scalar_key, CopyError, CopyMap, CopySet, PassStyle,
    Passable, PromiseRef, Remotable, Settlement, WeakRemotable,
};
pub use pattern::{assert_pattern, must_match, Pattern};
pub use provide::{make_atomic_provider, provide_lazy, AtomicProvider, Provided};
pub use rank::{compare_keys, compare_rank};
pub use reentrancy::{DebugReentrancy, ReentrancyGuard};
pub use stores::{
    make_scalar_map_store, make_scalar_set_store, make_scalar_weak_map_store,
    make_scalar_weak_set_store, MapStore, SetStore, StoreOptions, WeakMapOps, WeakMapStore,
    WeakSetOps, WeakSetStore,
};

//! Debug-only reentrancy guard for entry tables.
//!
//! Stores are single-threaded, but a table operation can still be
//! re-entered from inside itself. In debug builds a nested `enter` panics
//! naming the operation already in progress. In release builds the guard
//! compiles away.

#[cfg(debug_assertions)]
use core::cell::Cell;
use core::marker::PhantomData;

/// Embed in a table and guard entry points with
/// `let _g = self.reentrancy.enter("insert");`.
#[derive(Debug)]
pub struct DebugReentrancy {
    #[cfg(debug_assertions)]
    active: Cell<Option<&'static str>>,
    // !Send + !Sync, like the tables that own it.
    _nosend: PhantomData<*mut ()>,
}

impl DebugReentrancy {
    pub const fn new() -> Self {
        Self {
            #[cfg(debug_assertions)]
            active: Cell::new(None),
            _nosend: PhantomData,
        }
    }

    /// Enter the named operation. Panics in debug builds if another
    /// operation on the same table has not returned.
    #[inline]
    pub fn enter(&self, op: &'static str) -> ReentrancyGuard<'_> {
        #[cfg(debug_assertions)]
        {
            if let Some(outer) = self.active.get() {
                panic!("reentrancy detected: `{op}` entered during `{outer}` on the same table");
            }
            self.active.set(Some(op));
            ReentrancyGuard { owner: self }
        }

        #[cfg(not(debug_assertions))]
        {
            let _ = op;
            ReentrancyGuard { _z: PhantomData }
        }
    }

    /// The operation currently in progress, if any. Always `None` in
    /// release builds.
    pub fn active(&self) -> Option<&'static str> {
        #[cfg(debug_assertions)]
        {
            self.active.get()
        }
        #[cfg(not(debug_assertions))]
        {
            None
        }
    }
}

impl Default for DebugReentrancy {
    fn default() -> Self {
        Self::new()
    }
}

/// Returned by `DebugReentrancy::enter`; leaves the section on drop.
pub struct ReentrancyGuard<'a> {
    #[cfg(debug_assertions)]
    owner: &'a DebugReentrancy,
    #[cfg(not(debug_assertions))]
    _z: PhantomData<&'a ()>,
}

impl Drop for ReentrancyGuard<'_> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        {
            debug_assert!(self.owner.active.get().is_some());
            self.owner.active.set(None);
        }
    }
}

//! Get-or-create helpers over weak-map stores.
//!
//! `provide_lazy` is the synchronous form. `AtomicProvider` is the
//! asynchronous one: concurrent requests for the same key share a single
//! construction, because the pending entry is registered before the
//! returned future is first polled.

use core::cell::RefCell;
use core::future::Future;
use std::error::Error;
use std::rc::Rc;

use futures::future::{self, FutureExt, LocalBoxFuture, Shared};
use hashbrown::HashMap;
use log::{debug, trace};

use crate::error::{ProvideError, Result};
use crate::passable::Passable;
use crate::stores::WeakMapOps;

/// Returns the stored value for `key`, creating and storing it with
/// `make_value` when absent.
pub fn provide_lazy<S, F>(store: &S, key: Passable, make_value: F) -> Result<Passable>
where
    S: WeakMapOps + ?Sized,
    F: FnOnce(&Passable) -> Passable,
{
    if !store.has(&key) {
        let value = make_value(&key);
        store.init(key.clone(), value)?;
    }
    store.get(&key)
}

/// A value being provided, shareable between every caller that asked for
/// the same key.
pub type Provided = Shared<LocalBoxFuture<'static, std::result::Result<Passable, ProvideError>>>;

type Finisher = Box<dyn FnOnce(Passable, Passable) -> LocalBoxFuture<'static, std::result::Result<(), ProvideError>>>;

type Pending = Rc<RefCell<HashMap<Passable, Provided>>>;

/// Deduplicating async provider over a weak-map store.
pub struct AtomicProvider<S> {
    store: S,
    pending: Pending,
}

pub fn make_atomic_provider<S>(store: S) -> AtomicProvider<S>
where
    S: WeakMapOps + Clone + 'static,
{
    AtomicProvider::new(store)
}

impl<S> AtomicProvider<S>
where
    S: WeakMapOps + Clone + 'static,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            pending: Rc::new(RefCell::new(HashMap::new())),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Number of constructions registered and not yet settled.
    pub fn pending_len(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Resolves to the stored value for `key`, constructing it with
    /// `make_value` at most once no matter how many callers ask while
    /// construction is in flight. A failed construction is not cached;
    /// the next request starts over.
    pub fn provide_async<M, Fut, E>(&self, key: Passable, make_value: M) -> Provided
    where
        M: FnOnce(Passable) -> Fut,
        Fut: Future<Output = std::result::Result<Passable, E>> + 'static,
        E: Error + 'static,
    {
        self.provide(key, make_value, None)
    }

    /// Like `provide_async`, then awaits `finish_value(key, value)` after
    /// the value is stored and before any caller sees it.
    pub fn provide_async_with_finish<M, Fut, E, F, FinFut, FinE>(
        &self,
        key: Passable,
        make_value: M,
        finish_value: F,
    ) -> Provided
    where
        M: FnOnce(Passable) -> Fut,
        Fut: Future<Output = std::result::Result<Passable, E>> + 'static,
        E: Error + 'static,
        F: FnOnce(Passable, Passable) -> FinFut + 'static,
        FinFut: Future<Output = std::result::Result<(), FinE>> + 'static,
        FinE: Error + 'static,
    {
        let finisher: Finisher = Box::new(move |k, v| {
            finish_value(k, v)
                .map(|r| r.map_err(ProvideError::construction))
                .boxed_local()
        });
        self.provide(key, make_value, Some(finisher))
    }

    fn provide<M, Fut, E>(&self, key: Passable, make_value: M, finish: Option<Finisher>) -> Provided
    where
        M: FnOnce(Passable) -> Fut,
        Fut: Future<Output = std::result::Result<Passable, E>> + 'static,
        E: Error + 'static,
    {
        if self.store.has(&key) {
            let stored = self.store.get(&key).map_err(ProvideError::from);
            return future::ready(stored).boxed_local().shared();
        }
        if let Some(inflight) = self.pending.borrow().get(&key) {
            trace!("store {:?}: joining pending construction of {key}", self.store.tag());
            return inflight.clone();
        }

        debug!("store {:?}: constructing value for {key}", self.store.tag());
        let making = make_value(key.clone());
        let store = self.store.clone();
        let registry = Rc::downgrade(&self.pending);
        let k = key.clone();
        let construction = async move {
            let outcome = async {
                let value = making.await.map_err(ProvideError::construction)?;
                store.init(k.clone(), value.clone())?;
                if let Some(finish) = finish {
                    finish(k.clone(), value.clone()).await?;
                }
                Ok::<_, ProvideError>(value)
            }
            .await;
            match &outcome {
                Ok(_) => debug!("store {:?}: provided {k}", store.tag()),
                Err(e) => debug!("store {:?}: providing {k} failed: {e}", store.tag()),
            }
            if let Some(registry) = registry.upgrade() {
                registry.borrow_mut().remove(&k);
            }
            outcome
        }
        .boxed_local()
        .shared();

        self.pending.borrow_mut().insert(key, construction.clone());
        construction
    }
}

//! The one-time default population protocol.
//!
//! On first use of an accessor, [`DefaultPopulator::ensure`] decides what
//! happens to its key:
//!
//! 1. Key already present: nothing. Persisted state always beats defaults.
//! 2. No default configured: nothing.
//! 3. Immediate default: converted and written before `ensure` returns.
//!    Errors propagate to the caller that triggered population.
//! 4. Async loader: spawned on the store's executor; the accessor is usable
//!    right away and reads absent until the store applies the completion.
//!    Loader and conversion errors are logged by the store and never
//!    surface to a caller.
//!
//! Whatever the outcome, the protocol runs once per accessor. Later calls
//! to `ensure` (including re-entrant ones from observers) return at once.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use savedstate_core::{Adapter, Error, Key, Result, Value};
use tracing::debug;

use crate::dispatch::{Outcome, PopulationState, PopulationTicket};
use crate::executor::TaskHandle;
use crate::store::KeyedStateStore;

/// Error type async default loaders may return.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub(crate) type LoadFuture<T> = Pin<Box<dyn Future<Output = std::result::Result<Option<T>, BoxError>> + Send>>;

/// A reusable async default. Reusable so population can be re-invoked
/// explicitly after a failure.
pub(crate) type Loader<T> = Arc<dyn Fn() -> LoadFuture<T> + Send + Sync>;

pub(crate) enum DefaultSource<T> {
    None,
    Immediate(T),
    Loader(Loader<T>),
}

pub(crate) struct DefaultPopulator<T, A> {
    key: Key,
    adapter: Arc<A>,
    default: RefCell<DefaultSource<T>>,
    ticket: Arc<PopulationTicket>,
    task: RefCell<Option<TaskHandle>>,
}

impl<T, A> DefaultPopulator<T, A> {
    pub(crate) fn new(key: Key, adapter: A, default: DefaultSource<T>) -> Self {
        Self {
            key,
            adapter: Arc::new(adapter),
            default: RefCell::new(default),
            ticket: PopulationTicket::new(),
            task: RefCell::new(None),
        }
    }

    pub(crate) fn key(&self) -> &Key {
        &self.key
    }

    pub(crate) fn adapter(&self) -> &Arc<A> {
        &self.adapter
    }

    pub(crate) fn state(&self) -> PopulationState {
        self.ticket.state()
    }
}

impl<T: Send + 'static, A: Adapter<T>> DefaultPopulator<T, A> {
    /// Run the protocol if it has not run yet.
    pub(crate) fn ensure(&self, store: &KeyedStateStore) -> Result<()> {
        if self.ticket.state() != PopulationState::Unpopulated {
            return Ok(());
        }
        self.populate(store)
    }

    /// Start a new round of the protocol. Only async loaders can produce a
    /// value the second time; an immediate default is consumed by the
    /// first run.
    ///
    /// Returns false without doing anything while a load is in flight.
    pub(crate) fn repopulate(&self, store: &KeyedStateStore) -> Result<bool> {
        if self.ticket.state() == PopulationState::Populating {
            return Ok(false);
        }
        self.populate(store)?;
        Ok(true)
    }

    fn populate(&self, store: &KeyedStateStore) -> Result<()> {
        if store.contains(&self.key)? {
            debug!(key = %self.key, "key already set; skipping default");
            self.ticket.set_state(PopulationState::Populated);
            return Ok(());
        }

        let source = std::mem::replace(&mut *self.default.borrow_mut(), DefaultSource::None);
        match source {
            DefaultSource::None => {
                self.ticket.set_state(PopulationState::Populated);
                Ok(())
            }
            DefaultSource::Immediate(value) => {
                // Mark first so observers of the write below see a finished accessor.
                self.ticket.set_state(PopulationState::Populated);
                let stored = self.adapter.encode(value)?;
                store.set(&self.key, stored)?;
                debug!(key = %self.key, "applied immediate default");
                Ok(())
            }
            DefaultSource::Loader(loader) => {
                *self.default.borrow_mut() = DefaultSource::Loader(loader.clone());
                self.ticket.set_state(PopulationState::Populating);
                self.spawn_load(store, loader);
                Ok(())
            }
        }
    }

    fn spawn_load(&self, store: &KeyedStateStore, loader: Loader<T>) {
        let adapter = self.adapter.clone();
        let key = self.key.clone();
        let load = async move {
            match loader().await {
                Ok(Some(value)) => match adapter.encode(value) {
                    Ok(stored) => Outcome::Loaded(stored),
                    Err(err) => Outcome::Failed(err),
                },
                Ok(None) => Outcome::Loaded(Value::Null),
                Err(err) => Outcome::Failed(Error::Loader {
                    key,
                    message: err.to_string(),
                }),
            }
        };

        debug!(key = %self.key, "spawning async default");
        let handle = store.spawn_load(self.key.clone(), self.ticket.clone(), load);
        if let Some(previous) = self.task.borrow_mut().replace(handle) {
            previous.abort();
        }
    }
}

impl<T, A> Drop for DefaultPopulator<T, A> {
    fn drop(&mut self) {
        self.ticket.revoke();
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

//! The keyed state store: a typed facade over a state container.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::rc::Rc;
use std::sync::Arc;

use savedstate_core::{Adapter, IdentityAdapter, Key, Result, StateContainer, Value};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::accessor::Declaration;
use crate::config::{ConflictPolicy, StoreConfig};
use crate::dispatch::{
    completion_channel, Completion, CompletionGuard, CompletionReceiver, CompletionSender,
    Outcome, PopulationState, PopulationTicket,
};
use crate::executor::{BackgroundExecutor, TaskHandle};
use crate::observable::{ObservableValue, Slot};

struct Shared {
    id: Uuid,
    config: StoreConfig,
    container: RefCell<Box<dyn StateContainer>>,
    slots: RefCell<HashMap<Key, Rc<Slot>>>,
    executor: Arc<dyn BackgroundExecutor>,
    completions_tx: CompletionSender,
    completions_rx: tokio::sync::Mutex<CompletionReceiver>,
    in_flight: Cell<usize>,
}

/// Typed access to one session's state container.
///
/// The store is a cheap, clonable handle; accessors and observables keep a
/// clone. It is deliberately `!Send`: the thread that owns it is the
/// synchronization context, and every container write and every observer
/// notification happens there. Background loaders only ever post
/// completions, which the owning thread applies with
/// [`run_pending`](Self::run_pending), [`next_completion`](Self::next_completion)
/// or [`settle`](Self::settle).
///
/// # Example
///
/// ```rust
/// use savedstate::{InMemoryContainer, KeyedStateStore, ManualExecutor};
/// use std::sync::Arc;
///
/// let store = KeyedStateStore::new(
///     InMemoryContainer::new(),
///     Arc::new(ManualExecutor::new().unwrap()),
/// );
///
/// let count = store.declare::<i64>("count").default_value(0).property();
/// assert_eq!(count.get().unwrap(), Some(0));
///
/// count.set(5).unwrap();
/// assert_eq!(count.get().unwrap(), Some(5));
/// ```
#[derive(Clone)]
pub struct KeyedStateStore {
    shared: Rc<Shared>,
}

impl KeyedStateStore {
    /// Create a store over a container, loading async defaults on `executor`.
    pub fn new(
        container: impl StateContainer + 'static,
        executor: Arc<dyn BackgroundExecutor>,
    ) -> Self {
        Self::with_config(container, executor, StoreConfig::default())
    }

    pub fn with_config(
        container: impl StateContainer + 'static,
        executor: Arc<dyn BackgroundExecutor>,
        config: StoreConfig,
    ) -> Self {
        let (completions_tx, completions_rx) = completion_channel();
        let id = Uuid::new_v4();
        debug!(session = %id, ?config, "opening state store");
        Self {
            shared: Rc::new(Shared {
                id,
                config,
                container: RefCell::new(Box::new(container)),
                slots: RefCell::new(HashMap::new()),
                executor,
                completions_tx,
                completions_rx: tokio::sync::Mutex::new(completions_rx),
                in_flight: Cell::new(0),
            }),
        }
    }

    /// Identifier of this store, used in log fields.
    pub fn session_id(&self) -> Uuid {
        self.shared.id
    }

    pub fn config(&self) -> &StoreConfig {
        &self.shared.config
    }

    // === Container pass-through ===

    /// Whether a value (possibly a stored null) has been set for `key`.
    pub fn contains(&self, key: &Key) -> Result<bool> {
        self.shared.container.borrow().contains(key)
    }

    /// The stored representation for `key`, or `None` if it was never set.
    pub fn get(&self, key: &Key) -> Result<Option<Value>> {
        self.shared.container.borrow().get(key)
    }

    /// Store a value and notify the key's observers, if any.
    ///
    /// Observers run synchronously, after the container holds the value and
    /// before this call returns.
    pub fn set(&self, key: &Key, value: Value) -> Result<()> {
        self.shared
            .container
            .borrow_mut()
            .set(key, value.clone())?;

        let slot = self.shared.slots.borrow().get(key).cloned();
        if let Some(slot) = slot {
            slot.publish(&value);
        }
        trace!(session = %self.shared.id, key = %key, "stored value");
        Ok(())
    }

    /// Remove a key. Its observers are not notified, but their cached
    /// value is cleared so late subscribers see nothing to replay.
    pub fn remove(&self, key: &Key) -> Result<Option<Value>> {
        let removed = self.shared.container.borrow_mut().remove(key)?;
        if let Some(slot) = self.shared.slots.borrow().get(key) {
            slot.clear();
        }
        Ok(removed)
    }

    pub fn keys(&self) -> Result<Vec<Key>> {
        self.shared.container.borrow().keys()
    }

    /// Copy every entry out of the container.
    ///
    /// Hosts use this to build the container for the next session.
    pub fn snapshot(&self) -> Result<BTreeMap<Key, Value>> {
        let container = self.shared.container.borrow();
        let mut entries = BTreeMap::new();
        for key in container.keys()? {
            if let Some(value) = container.get(&key)? {
                entries.insert(key, value);
            }
        }
        Ok(entries)
    }

    // === Typed access ===

    /// Read and decode `key`. Absent keys and stored nulls are `Ok(None)`.
    pub fn get_typed<T, A: Adapter<T>>(&self, key: &Key, adapter: &A) -> Result<Option<T>> {
        match self.get(key)? {
            Some(value) => adapter.decode(value),
            None => Ok(None),
        }
    }

    /// Encode and store a domain value.
    pub fn set_typed<T, A: Adapter<T>>(&self, key: &Key, adapter: &A, value: T) -> Result<()> {
        let stored = adapter.encode(value)?;
        self.set(key, stored)
    }

    /// Start declaring an accessor for `key`.
    ///
    /// The declaration picks an adapter and a default; the accessor it
    /// builds does nothing until first used.
    pub fn declare<T>(&self, key: impl Into<Key>) -> Declaration<T, IdentityAdapter<T>> {
        Declaration::new(self.clone(), key.into(), IdentityAdapter::new())
    }

    /// Observe `key` directly, with no default population.
    pub fn observe<T, A: Adapter<T>>(
        &self,
        key: impl Into<Key>,
        adapter: A,
    ) -> Result<ObservableValue<T, A>> {
        self.observe_shared(key.into(), Arc::new(adapter))
    }

    pub(crate) fn observe_shared<T, A>(
        &self,
        key: Key,
        adapter: Arc<A>,
    ) -> Result<ObservableValue<T, A>> {
        Ok(ObservableValue::new(self.slot(key)?, adapter))
    }

    fn slot(&self, key: Key) -> Result<Rc<Slot>> {
        if let Some(slot) = self.shared.slots.borrow().get(&key) {
            return Ok(slot.clone());
        }
        let initial = self.get(&key)?;
        let slot = Slot::new(key.clone(), initial);
        self.shared.slots.borrow_mut().insert(key, slot.clone());
        Ok(slot)
    }

    // === Background loads ===

    /// Number of async defaults spawned but not yet applied or discarded.
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.get()
    }

    pub(crate) fn spawn_load<F>(
        &self,
        key: Key,
        ticket: Arc<PopulationTicket>,
        load: F,
    ) -> TaskHandle
    where
        F: Future<Output = Outcome> + Send + 'static,
    {
        let guard = CompletionGuard::new(self.shared.completions_tx.clone(), key, ticket);
        self.shared.in_flight.set(self.shared.in_flight.get() + 1);
        self.shared.executor.spawn(Box::pin(async move {
            let outcome = load.await;
            guard.finish(outcome);
        }))
    }

    /// Apply every completion that has already arrived, without waiting.
    ///
    /// Returns the number of completions processed.
    pub fn run_pending(&self) -> usize {
        let drained: Vec<Completion> = match self.shared.completions_rx.try_lock() {
            Ok(mut rx) => std::iter::from_fn(|| rx.try_recv().ok()).collect(),
            // A pending next_completion holds the receiver.
            Err(_) => return 0,
        };
        let count = drained.len();
        for completion in drained {
            self.apply(completion);
        }
        count
    }

    /// Wait for the next completion and apply it.
    ///
    /// Returns false only if no completion can ever arrive.
    pub async fn next_completion(&self) -> bool {
        let completion = {
            let mut rx = self.shared.completions_rx.lock().await;
            rx.recv().await
        };
        match completion {
            Some(completion) => {
                self.apply(completion);
                true
            }
            None => false,
        }
    }

    /// Wait until every spawned default has been applied or discarded.
    ///
    /// Needs an executor that makes progress on its own; with a
    /// [`ManualExecutor`](crate::ManualExecutor) use `run_all` and
    /// [`run_pending`](Self::run_pending) instead.
    pub async fn settle(&self) {
        while self.in_flight() > 0 {
            if !self.next_completion().await {
                break;
            }
        }
    }

    fn apply(&self, completion: Completion) {
        let Completion {
            key,
            ticket,
            outcome,
        } = completion;
        let session = self.shared.id;
        self.shared
            .in_flight
            .set(self.shared.in_flight.get().saturating_sub(1));

        if !ticket.is_alive() {
            debug!(%session, key = %key, "accessor dropped before its default loaded; discarding");
            return;
        }
        ticket.set_state(PopulationState::Populated);

        let value = match outcome {
            Outcome::Loaded(value) => value,
            Outcome::Failed(err) => {
                warn!(%session, key = %key, error = %err, "async default failed; key stays absent");
                return;
            }
            Outcome::Abandoned => {
                debug!(%session, key = %key, "async default abandoned before finishing");
                return;
            }
        };

        if self.shared.config.conflict_policy == ConflictPolicy::KeepExisting {
            match self.contains(&key) {
                Ok(false) => {}
                Ok(true) => {
                    debug!(%session, key = %key, "key populated while loading; keeping existing value");
                    return;
                }
                Err(err) => {
                    warn!(%session, key = %key, error = %err, "could not check key before applying default");
                    return;
                }
            }
        }

        match self.set(&key, value) {
            Ok(()) => debug!(%session, key = %key, "applied async default"),
            Err(err) => warn!(%session, key = %key, error = %err, "failed to store async default"),
        }
    }
}

impl std::fmt::Debug for KeyedStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedStateStore")
            .field("session", &self.shared.id)
            .field("config", &self.shared.config)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

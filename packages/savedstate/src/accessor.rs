//! Lazily-bound accessors for one key.
//!
//! Accessors are declared through [`KeyedStateStore::declare`] and do no
//! work until first used. The first `get`, `set` or `subscribe` runs the
//! default population protocol for the key exactly once; afterwards every
//! call goes straight to the store.

use std::cell::OnceCell;
use std::future::Future;
use std::sync::Arc;

use savedstate_core::{Adapter, Key, Result};

use crate::dispatch::PopulationState;
use crate::observable::{ObservableValue, Subscription};
use crate::populate::{BoxError, DefaultPopulator, DefaultSource, LoadFuture};
use crate::store::KeyedStateStore;

/// Builder for an accessor: pick an adapter and a default, then build a
/// read-write [`Property`] or a read-only [`LiveProperty`].
///
/// ```rust
/// use savedstate::{InMemoryContainer, KeyedStateStore, ManualExecutor, OrdinalAdapter, Ordinal};
/// use std::sync::Arc;
///
/// #[derive(Clone, Copy, Debug, PartialEq)]
/// enum Step {
///     One,
///     Ten,
/// }
///
/// impl Ordinal for Step {
///     const VARIANTS: &'static [Self] = &[Step::One, Step::Ten];
/// }
///
/// let store = KeyedStateStore::new(
///     InMemoryContainer::new(),
///     Arc::new(ManualExecutor::new().unwrap()),
/// );
///
/// let step = store
///     .declare::<Step>("step")
///     .adapter(OrdinalAdapter::new())
///     .default_value(Step::One)
///     .property();
///
/// assert_eq!(step.get().unwrap(), Some(Step::One));
/// ```
#[must_use = "a declaration does nothing until turned into an accessor"]
pub struct Declaration<T, A> {
    store: KeyedStateStore,
    key: Key,
    adapter: A,
    default: DefaultSource<T>,
}

impl<T, A> Declaration<T, A> {
    pub(crate) fn new(store: KeyedStateStore, key: Key, adapter: A) -> Self {
        Self {
            store,
            key,
            adapter,
            default: DefaultSource::None,
        }
    }

    /// Convert through `adapter` instead of storing `T` directly.
    pub fn adapter<B: Adapter<T>>(self, adapter: B) -> Declaration<T, B> {
        Declaration {
            store: self.store,
            key: self.key,
            adapter,
            default: self.default,
        }
    }

    /// Write `value` on first use if the key is absent.
    pub fn default_value(mut self, value: T) -> Self {
        self.default = DefaultSource::Immediate(value);
        self
    }

    /// Compute the default in the background on first use if the key is
    /// absent. A loader that yields `None` stores a null.
    ///
    /// The loader is kept so [`Property::repopulate`] can run it again.
    pub fn default_loader<F, Fut, E>(mut self, loader: F) -> Self
    where
        T: Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Option<T>, E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        self.default = DefaultSource::Loader(Arc::new(move || -> LoadFuture<T> {
            let pending = loader();
            Box::pin(async move { pending.await.map_err(Into::into) })
        }));
        self
    }
}

impl<T: Send + 'static, A: Adapter<T>> Declaration<T, A> {
    /// Build a read-write accessor.
    pub fn property(self) -> Property<T, A> {
        Property {
            populator: DefaultPopulator::new(self.key, self.adapter, self.default),
            store: self.store,
        }
    }

    /// Build a read-only accessor that can be observed.
    pub fn live(self) -> LiveProperty<T, A> {
        LiveProperty {
            populator: DefaultPopulator::new(self.key, self.adapter, self.default),
            store: self.store,
            observable: OnceCell::new(),
        }
    }
}

/// Read-write accessor bound to one key.
///
/// Dropping the property cancels its in-flight async default, if any; the
/// loaded value is then never written.
pub struct Property<T, A> {
    store: KeyedStateStore,
    populator: DefaultPopulator<T, A>,
}

impl<T: Send + 'static, A: Adapter<T>> Property<T, A> {
    pub fn key(&self) -> &Key {
        self.populator.key()
    }

    /// Read the current value.
    ///
    /// Returns `Ok(None)` while an async default is still loading.
    pub fn get(&self) -> Result<Option<T>> {
        self.populator.ensure(&self.store)?;
        self.store
            .get_typed(self.populator.key(), self.populator.adapter().as_ref())
    }

    pub fn set(&self, value: T) -> Result<()> {
        self.populator.ensure(&self.store)?;
        self.store
            .set_typed(self.populator.key(), self.populator.adapter().as_ref(), value)
    }

    /// Read, transform and write back in one step.
    pub fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(Option<T>) -> T,
    {
        let current = self.get()?;
        self.set(f(current))
    }

    pub fn population_state(&self) -> PopulationState {
        self.populator.state()
    }

    /// Run the async default again, e.g. after it failed.
    ///
    /// Does nothing if the key is set by now. Returns false while a load
    /// is still in flight.
    pub fn repopulate(&self) -> Result<bool> {
        self.populator.repopulate(&self.store)
    }
}

impl<T, A> std::fmt::Debug for Property<T, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Property")
            .field("key", self.populator.key())
            .field("state", &self.populator.state())
            .finish()
    }
}

/// Read-only accessor bound to one key, observable through
/// [`value`](Self::value).
///
/// Consumers holding a `LiveProperty` can watch the key but never write it.
/// Dropping it detaches every callback subscribed through it.
pub struct LiveProperty<T, A> {
    store: KeyedStateStore,
    populator: DefaultPopulator<T, A>,
    observable: OnceCell<ObservableValue<T, A>>,
}

impl<T: Send + 'static, A: Adapter<T>> LiveProperty<T, A> {
    pub fn key(&self) -> &Key {
        self.populator.key()
    }

    pub fn get(&self) -> Result<Option<T>> {
        self.populator.ensure(&self.store)?;
        self.store
            .get_typed(self.populator.key(), self.populator.adapter().as_ref())
    }

    /// The observable for this key.
    ///
    /// The first call attaches the observable before running population,
    /// so an immediate default is already its current value and an async
    /// default reaches subscribers when it lands.
    pub fn value(&self) -> Result<&ObservableValue<T, A>> {
        if let Some(observable) = self.observable.get() {
            return Ok(observable);
        }
        let observable = self
            .store
            .observe_shared(self.populator.key().clone(), self.populator.adapter().clone())?;
        let observable = self.observable.get_or_init(|| observable);
        self.populator.ensure(&self.store)?;
        Ok(observable)
    }

    /// Shorthand for `value()?.subscribe(callback)`.
    pub fn subscribe<F>(&self, callback: F) -> Result<Subscription>
    where
        F: FnMut(Option<T>) + 'static,
    {
        Ok(self.value()?.subscribe(callback))
    }

    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        match self.observable.get() {
            Some(observable) => observable.unsubscribe(subscription),
            None => false,
        }
    }

    pub fn population_state(&self) -> PopulationState {
        self.populator.state()
    }

    pub fn repopulate(&self) -> Result<bool> {
        self.populator.repopulate(&self.store)
    }
}

impl<T, A> std::fmt::Debug for LiveProperty<T, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveProperty")
            .field("key", self.populator.key())
            .field("state", &self.populator.state())
            .field("observed", &self.observable.get().is_some())
            .finish()
    }
}

//! Single-writer, multi-reader observable values.
//!
//! Every key that is observed gets one [`Slot`] in its store. The slot
//! caches the latest stored value and a list of subscribers. The store is
//! the only writer: each successful `set` on the key publishes to the slot,
//! synchronously and on the store's thread. Typed [`ObservableValue`]
//! handles share the slot and decode through their adapter.
//!
//! # Invariants
//!
//! 1. Subscribers are notified in subscription order.
//! 2. A new subscriber is called immediately with the latest value, if any.
//! 3. Notifications for a write happen after the container holds the value.
//!
//! A subscriber that writes back to the same key from inside its callback
//! is not supported; that callback is skipped for the nested notification.
//!
//! The slot holds subscribers weakly. The [`ObservableValue`] handle that
//! registered a callback owns it, so dropping that handle (and its clones)
//! detaches the callback; dead entries are pruned on the next notification.

use std::cell::{Cell, RefCell};
use std::marker::PhantomData;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use savedstate_core::{Adapter, Key, Result, Value};
use tracing::{trace, warn};

type Callback = Rc<RefCell<dyn FnMut(&Value)>>;
type WeakCallback = Weak<RefCell<dyn FnMut(&Value)>>;

/// The untyped observable cell for one key.
pub(crate) struct Slot {
    key: Key,
    latest: RefCell<Option<Value>>,
    subscribers: RefCell<Vec<(u64, WeakCallback)>>,
    next_id: Cell<u64>,
}

impl Slot {
    pub(crate) fn new(key: Key, initial: Option<Value>) -> Rc<Self> {
        Rc::new(Self {
            key,
            latest: RefCell::new(initial),
            subscribers: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
        })
    }

    pub(crate) fn key(&self) -> &Key {
        &self.key
    }

    pub(crate) fn latest(&self) -> Option<Value> {
        self.latest.borrow().clone()
    }

    /// Record a new value and notify every subscriber.
    pub(crate) fn publish(&self, value: &Value) {
        *self.latest.borrow_mut() = Some(value.clone());

        // Snapshot so callbacks may subscribe or unsubscribe while we iterate.
        let subscribers = self.live_subscribers();

        trace!(key = %self.key, subscribers = subscribers.len(), "notifying observers");
        for callback in subscribers {
            match callback.try_borrow_mut() {
                Ok(mut callback) => (*callback)(value),
                Err(_) => warn!(key = %self.key, "observer wrote to its own key; skipping nested notification"),
            }
        }
    }

    /// Forget the cached value without notifying anyone.
    pub(crate) fn clear(&self) {
        *self.latest.borrow_mut() = None;
    }

    /// Upgrade every subscriber still owned by a handle, dropping the rest.
    fn live_subscribers(&self) -> Vec<Callback> {
        let mut live = Vec::new();
        self.subscribers.borrow_mut().retain(|(_, weak)| match weak.upgrade() {
            Some(callback) => {
                live.push(callback);
                true
            }
            None => false,
        });
        live
    }

    fn subscribe(&self, callback: &Callback) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.subscribers.borrow_mut().push((id, Rc::downgrade(callback)));

        let latest = self.latest();
        if let Some(value) = latest {
            if let Ok(mut callback) = callback.try_borrow_mut() {
                (*callback)(&value);
            }
        }
        id
    }

    fn unsubscribe(&self, id: u64) -> bool {
        let mut subscribers = self.subscribers.borrow_mut();
        let before = subscribers.len();
        subscribers.retain(|(existing, _)| *existing != id);
        subscribers.len() != before
    }

    fn subscriber_count(&self) -> usize {
        self.live_subscribers().len()
    }
}

/// Handle returned by [`ObservableValue::subscribe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    key: Key,
    id: u64,
}

impl Subscription {
    pub fn key(&self) -> &Key {
        &self.key
    }
}

/// A typed view of the observable cell for one key.
///
/// Obtain one from [`KeyedStateStore::observe`](crate::KeyedStateStore::observe)
/// or [`LiveProperty::value`](crate::LiveProperty::value). Handles for the
/// same key share the same cell and the same subscribers.
///
/// Subscriber callbacks receive `None` when the key holds a stored null or
/// a value the adapter maps to absent.
///
/// Callbacks stay registered while this handle or one of its clones is
/// alive. Handles obtained separately from the store own their callbacks
/// separately.
pub struct ObservableValue<T, A> {
    slot: Rc<Slot>,
    adapter: Arc<A>,
    owned: Rc<RefCell<Vec<(u64, Callback)>>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T, A> ObservableValue<T, A> {
    pub(crate) fn new(slot: Rc<Slot>, adapter: Arc<A>) -> Self {
        Self {
            slot,
            adapter,
            owned: Rc::new(RefCell::new(Vec::new())),
            _marker: PhantomData,
        }
    }

    pub fn key(&self) -> &Key {
        self.slot.key()
    }

    /// Remove a subscriber. Returns false if it was already gone or belongs
    /// to a different key.
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        if &subscription.key != self.key() {
            return false;
        }
        self.owned
            .borrow_mut()
            .retain(|(id, _)| *id != subscription.id);
        self.slot.unsubscribe(subscription.id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.slot.subscriber_count()
    }
}

impl<T: 'static, A: Adapter<T>> ObservableValue<T, A> {
    /// The latest published value, decoded.
    pub fn current(&self) -> Result<Option<T>> {
        match self.slot.latest() {
            Some(value) => self.adapter.decode(value),
            None => Ok(None),
        }
    }

    /// Register a callback for every future write to this key.
    ///
    /// If the key already has a value, the callback runs once right away
    /// with it. A value that fails to decode is logged and not delivered.
    pub fn subscribe<F>(&self, mut callback: F) -> Subscription
    where
        F: FnMut(Option<T>) + 'static,
    {
        let adapter = self.adapter.clone();
        let key = self.key().clone();
        let decoding = move |value: &Value| match adapter.decode(value.clone()) {
            Ok(decoded) => callback(decoded),
            Err(err) => warn!(key = %key, error = %err, "observed value failed to decode"),
        };
        let callback: Callback = Rc::new(RefCell::new(decoding));
        let id = self.slot.subscribe(&callback);
        self.owned.borrow_mut().push((id, callback));
        Subscription {
            key: self.key().clone(),
            id,
        }
    }
}

impl<T, A> Clone for ObservableValue<T, A> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
            adapter: self.adapter.clone(),
            owned: self.owned.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T, A> std::fmt::Debug for ObservableValue<T, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservableValue")
            .field("key", self.key())
            .field("latest", &self.slot.latest())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

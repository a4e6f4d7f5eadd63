//! The persisted container interface and an in-memory implementation.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::{Error, Key, Result, Value};

/// A keyed container of stored values.
///
/// This is the collaborator that actually keeps state alive across
/// re-materializations of its consumers. Durability and serialization to
/// disk are the implementor's business; the saved-state layers only need
/// containment, reads and writes.
///
/// `contains` must distinguish "never set" from "set to [`Value::Null`]".
pub trait StateContainer {
    /// Whether a value has been explicitly set for `key`.
    fn contains(&self, key: &Key) -> Result<bool>;

    /// Read the stored value.
    ///
    /// # Returns
    ///
    /// * `Ok(None)` - The key has never been set (or was removed).
    /// * `Ok(Some(value))` - The stored value, possibly `Value::Null`.
    /// * `Err(Error)` - The container failed.
    fn get(&self, key: &Key) -> Result<Option<Value>>;

    /// Store a value, overwriting whatever was there.
    fn set(&mut self, key: &Key, value: Value) -> Result<()>;

    /// Remove a key, returning the previous value.
    fn remove(&mut self, key: &Key) -> Result<Option<Value>>;

    /// All keys currently set.
    fn keys(&self) -> Result<Vec<Key>>;
}

impl<T: StateContainer + ?Sized> StateContainer for Box<T> {
    fn contains(&self, key: &Key) -> Result<bool> {
        self.as_ref().contains(key)
    }

    fn get(&self, key: &Key) -> Result<Option<Value>> {
        self.as_ref().get(key)
    }

    fn set(&mut self, key: &Key, value: Value) -> Result<()> {
        self.as_mut().set(key, value)
    }

    fn remove(&mut self, key: &Key) -> Result<Option<Value>> {
        self.as_mut().remove(key)
    }

    fn keys(&self) -> Result<Vec<Key>> {
        self.as_ref().keys()
    }
}

/// A container shared with its host.
///
/// Lets the host keep its own handle to the container while a store
/// borrows it. Fails instead of panicking if the host is holding a
/// conflicting borrow at the time of the call.
impl<T: StateContainer + ?Sized> StateContainer for Rc<RefCell<T>> {
    fn contains(&self, key: &Key) -> Result<bool> {
        self.try_borrow()
            .map_err(|e| Error::container("contains", e.to_string()))?
            .contains(key)
    }

    fn get(&self, key: &Key) -> Result<Option<Value>> {
        self.try_borrow()
            .map_err(|e| Error::container("get", e.to_string()))?
            .get(key)
    }

    fn set(&mut self, key: &Key, value: Value) -> Result<()> {
        self.try_borrow_mut()
            .map_err(|e| Error::container("set", e.to_string()))?
            .set(key, value)
    }

    fn remove(&mut self, key: &Key) -> Result<Option<Value>> {
        self.try_borrow_mut()
            .map_err(|e| Error::container("remove", e.to_string()))?
            .remove(key)
    }

    fn keys(&self) -> Result<Vec<Key>> {
        self.try_borrow()
            .map_err(|e| Error::container("keys", e.to_string()))?
            .keys()
    }
}

/// An in-memory container.
///
/// # Example
///
/// ```rust
/// use savedstate_core::{InMemoryContainer, Key, StateContainer, Value};
///
/// let mut container = InMemoryContainer::new();
/// let key = Key::new("name");
///
/// assert!(!container.contains(&key).unwrap());
/// container.set(&key, Value::from("Alice")).unwrap();
/// assert_eq!(container.get(&key).unwrap(), Some(Value::from("Alice")));
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryContainer {
    entries: BTreeMap<Key, Value>,
}

impl InMemoryContainer {
    /// Create a new empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a container with initial data, e.g. a restored snapshot.
    pub fn with_data(entries: BTreeMap<Key, Value>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consume the container, returning its entries.
    pub fn into_entries(self) -> BTreeMap<Key, Value> {
        self.entries
    }
}

impl<K: Into<Key>, V: Into<Value>> FromIterator<(K, V)> for InMemoryContainer {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl StateContainer for InMemoryContainer {
    fn contains(&self, key: &Key) -> Result<bool> {
        Ok(self.entries.contains_key(key))
    }

    fn get(&self, key: &Key) -> Result<Option<Value>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &Key, value: Value) -> Result<()> {
        self.entries.insert(key.clone(), value);
        Ok(())
    }

    fn remove(&mut self, key: &Key) -> Result<Option<Value>> {
        Ok(self.entries.remove(key))
    }

    fn keys(&self) -> Result<Vec<Key>> {
        Ok(self.entries.keys().cloned().collect())
    }
}

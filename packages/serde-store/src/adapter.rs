//! An adapter for any serde-serializable type.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;
use savedstate_core::{Adapter, Error, Value};

use crate::convert::{from_value, to_value};

/// Stores a serde type as a [`Value`] tree.
///
/// Use this for domain types with no natural primitive representation,
/// such as structs or enums with data.
///
/// ```rust
/// use savedstate_core::Adapter;
/// use savedstate_serde::SerdeAdapter;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, PartialEq, Serialize, Deserialize)]
/// struct Filter {
///     query: String,
///     limit: u32,
/// }
///
/// let adapter = SerdeAdapter::<Filter>::new();
/// let stored = adapter
///     .encode(Filter { query: "rust".into(), limit: 10 })
///     .unwrap();
/// let back = adapter.decode(stored).unwrap();
/// assert_eq!(back, Some(Filter { query: "rust".into(), limit: 10 }));
/// ```
pub struct SerdeAdapter<T>(PhantomData<fn() -> T>);

impl<T> SerdeAdapter<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for SerdeAdapter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for SerdeAdapter<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> Adapter<T> for SerdeAdapter<T>
where
    T: Serialize + DeserializeOwned + 'static,
{
    type State = Value;

    fn to_saved_state(&self, value: T) -> Result<Value, Error> {
        to_value(&value)
    }

    fn from_saved_state(&self, state: Value) -> Result<Option<T>, Error> {
        from_value(state).map(Some)
    }
}

//! Typed container extension trait.

use serde::de::DeserializeOwned;
use serde::Serialize;

use savedstate_core::{Error, Key, StateContainer};

use crate::convert::{from_value, to_value};

/// Extension trait for reading and writing serde types on any container.
///
/// Automatically implemented for every [`StateContainer`]. Useful to hosts
/// that seed or inspect a container directly, outside of any accessor.
///
/// # Example
///
/// ```rust
/// use savedstate_core::{InMemoryContainer, Key};
/// use savedstate_serde::TypedContainer;
///
/// let mut container = InMemoryContainer::new();
/// container.set_as(&Key::new("ids"), &vec![1u32, 2, 3]).unwrap();
///
/// let ids: Option<Vec<u32>> = container.get_as(&Key::new("ids")).unwrap();
/// assert_eq!(ids, Some(vec![1, 2, 3]));
/// ```
pub trait TypedContainer: StateContainer {
    /// Read a key and deserialize it. `Ok(None)` if the key is absent.
    fn get_as<T: DeserializeOwned>(&self, key: &Key) -> Result<Option<T>, Error> {
        match self.get(key)? {
            Some(value) => from_value(value).map(Some),
            None => Ok(None),
        }
    }

    /// Serialize a value and store it under a key.
    fn set_as<T: Serialize + ?Sized>(&mut self, key: &Key, data: &T) -> Result<(), Error> {
        let value = to_value(data)?;
        self.set(key, value)
    }

    /// Read a key as a serde_json::Value.
    fn get_json(&self, key: &Key) -> Result<Option<serde_json::Value>, Error> {
        self.get_as(key)
    }
}

impl<C: StateContainer + ?Sized> TypedContainer for C {}

#[cfg(test)]
mod tests {
    use super::*;
    use savedstate_core::{InMemoryContainer, Value};
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Session {
        user: String,
        visits: u32,
    }

    #[test]
    fn typed_roundtrip() {
        let mut container = InMemoryContainer::new();
        let key = Key::new("session");
        let session = Session {
            user: "alice".to_string(),
            visits: 2,
        };

        container.set_as(&key, &session).unwrap();
        let recovered: Session = container.get_as(&key).unwrap().unwrap();

        assert_eq!(recovered, session);
    }

    #[test]
    fn absent_key_is_none() {
        let container = InMemoryContainer::new();
        let result: Option<Session> = container.get_as(&Key::new("missing")).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn json_view_of_plain_values() {
        let mut container = InMemoryContainer::new();
        container.set(&Key::new("n"), Value::Integer(4)).unwrap();

        let json = container.get_json(&Key::new("n")).unwrap();
        assert_eq!(json, Some(serde_json::json!(4)));
    }
}

//! Adapters between domain values and stored values.
//!
//! An [`Adapter`] is a pure, stateless pair of conversions. Writing goes
//! `T -> State -> Value`, reading goes `Value -> State -> Option<T>`. The
//! reverse direction is allowed to be lossy: a stored representation with
//! no domain counterpart reads back as absent instead of failing.
//!
//! Every adapter must satisfy the round-trip law for the values it writes:
//! `from_saved_state(to_saved_state(v)) == Some(v)`.

use std::marker::PhantomData;

use crate::{Error, Result, Storable, Value};

/// Bidirectional conversion between a domain type `T` and a storable state.
pub trait Adapter<T>: Send + Sync + 'static {
    /// The representation actually held by the container.
    type State: Storable;

    /// Convert a domain value into its stored representation.
    fn to_saved_state(&self, value: T) -> Result<Self::State>;

    /// Recover a domain value. `Ok(None)` means the state has no domain
    /// counterpart, which callers treat the same as an absent key.
    fn from_saved_state(&self, state: Self::State) -> Result<Option<T>>;

    /// Convert all the way down to a [`Value`].
    fn encode(&self, value: T) -> Result<Value> {
        Ok(self.to_saved_state(value)?.into_value())
    }

    /// Convert a stored [`Value`] all the way up. A stored null is absent.
    fn decode(&self, stored: Value) -> Result<Option<T>> {
        if stored.is_null() {
            return Ok(None);
        }
        let state = Self::State::from_value(stored)?;
        self.from_saved_state(state)
    }
}

/// The adapter used when the domain type is itself storable.
pub struct IdentityAdapter<T>(PhantomData<fn() -> T>);

impl<T> IdentityAdapter<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for IdentityAdapter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for IdentityAdapter<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T: Storable> Adapter<T> for IdentityAdapter<T> {
    type State = T;

    fn to_saved_state(&self, value: T) -> Result<T> {
        Ok(value)
    }

    fn from_saved_state(&self, state: T) -> Result<Option<T>> {
        Ok(Some(state))
    }
}

/// A fieldless enum whose variants can be stored by position.
///
/// `VARIANTS` lists every variant in ordinal order. It doubles as the
/// reverse lookup table: the stored ordinal indexes straight into it.
///
/// ```rust
/// use savedstate_core::Ordinal;
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
/// assert_eq!(Step::Ten.ordinal(), Some(1));
/// ```
pub trait Ordinal: Copy + PartialEq + Send + Sync + 'static {
    const VARIANTS: &'static [Self];

    /// Position of this variant in [`Ordinal::VARIANTS`].
    fn ordinal(self) -> Option<usize> {
        Self::VARIANTS.iter().position(|v| *v == self)
    }

    /// Variant at an ordinal, if there is one.
    fn from_ordinal(ordinal: i64) -> Option<Self> {
        usize::try_from(ordinal)
            .ok()
            .and_then(|i| Self::VARIANTS.get(i))
            .copied()
    }
}

/// Stores an [`Ordinal`] enum as its integer position.
///
/// Unknown ordinals read back as absent.
pub struct OrdinalAdapter<E>(PhantomData<fn() -> E>);

impl<E> OrdinalAdapter<E> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<E> Default for OrdinalAdapter<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for OrdinalAdapter<E> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<E: Ordinal> Adapter<E> for OrdinalAdapter<E> {
    type State = i64;

    fn to_saved_state(&self, value: E) -> Result<i64> {
        value
            .ordinal()
            .map(|i| i as i64)
            .ok_or_else(|| Error::adapter("variant missing from Ordinal::VARIANTS"))
    }

    fn from_saved_state(&self, state: i64) -> Result<Option<E>> {
        Ok(E::from_ordinal(state))
    }
}

/// An adapter built from a pair of closures.
///
/// ```rust
/// use savedstate_core::{Adapter, FnAdapter, Value};
///
/// // Store a temperature in tenths of a degree.
/// let tenths = FnAdapter::new(
///     |celsius: f64| (celsius * 10.0).round() as i64,
///     |stored: i64| Some(stored as f64 / 10.0),
/// );
///
/// assert_eq!(tenths.encode(21.5).unwrap(), Value::Integer(215));
/// assert_eq!(tenths.decode(Value::Integer(215)).unwrap(), Some(21.5));
/// ```
pub struct FnAdapter<T, S, F, G> {
    to: F,
    from: G,
    _marker: PhantomData<fn(T) -> S>,
}

impl<T, S, F, G> FnAdapter<T, S, F, G>
where
    F: Fn(T) -> S,
    G: Fn(S) -> Option<T>,
{
    pub fn new(to: F, from: G) -> Self {
        Self {
            to,
            from,
            _marker: PhantomData,
        }
    }
}

impl<T, S, F, G> Adapter<T> for FnAdapter<T, S, F, G>
where
    T: 'static,
    S: Storable,
    F: Fn(T) -> S + Send + Sync + 'static,
    G: Fn(S) -> Option<T> + Send + Sync + 'static,
{
    type State = S;

    fn to_saved_state(&self, value: T) -> Result<S> {
        Ok((self.to)(value))
    }

    fn from_saved_state(&self, state: S) -> Result<Option<T>> {
        Ok((self.from)(state))
    }
}

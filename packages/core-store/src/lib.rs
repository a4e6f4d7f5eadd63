//! Core saved-state layer.
//!
//! This crate holds the vocabulary every other layer speaks:
//! - `Key`: names one slot in a container
//! - `Value`: the storable representation a container holds
//! - `StateContainer`: the persisted key-value container (contains/get/set)
//! - `Adapter`: pure conversion between a domain type and a storable state
//!
//! Containers are deliberately dumb. Lazy defaults, cross-thread population
//! and observation live in the `savedstate` crate on top of this one.
//!
//! # Example
//!
//! ```rust
//! use savedstate_core::{Adapter, InMemoryContainer, Key, Ordinal, OrdinalAdapter, StateContainer};
//!
//! #[derive(Clone, Copy, Debug, PartialEq)]
//! enum Mode {
//!     Light,
//!     Dark,
//! }
//!
//! impl Ordinal for Mode {
//!     const VARIANTS: &'static [Self] = &[Mode::Light, Mode::Dark];
//! }
//!
//! let adapter = OrdinalAdapter::<Mode>::new();
//! let mut container = InMemoryContainer::new();
//! let key = Key::new("mode");
//!
//! container.set(&key, adapter.encode(Mode::Dark).unwrap()).unwrap();
//! let stored = container.get(&key).unwrap().unwrap();
//! assert_eq!(adapter.decode(stored).unwrap(), Some(Mode::Dark));
//! ```

mod adapter;
mod container;
mod error;
mod key;
mod storable;
mod value;

pub use adapter::{Adapter, FnAdapter, IdentityAdapter, Ordinal, OrdinalAdapter};
pub use container::{InMemoryContainer, StateContainer};
pub use error::{Error, Result};
pub use key::Key;
pub use storable::Storable;
pub use value::Value;

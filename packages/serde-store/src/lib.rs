//! Serde integration for saved state.
//!
//! This layer adds typed access for serde types on top of the core layer:
//! - `SerdeAdapter`: an `Adapter` for any `Serialize + DeserializeOwned` type
//! - `TypedContainer`: read and write serde types directly on a container
//! - Value <-> serde conversions
//!
//! # Example
//!
//! ```rust,ignore
//! use savedstate::KeyedStateStore;
//! use savedstate_serde::SerdeAdapter;
//!
//! let filter = store
//!     .declare::<Filter>("filter")
//!     .adapter(SerdeAdapter::new())
//!     .default_value(Filter::default())
//!     .property();
//! ```

mod adapter;
mod convert;
mod typed;

pub use adapter::SerdeAdapter;
pub use convert::{from_value, json_to_value, to_value, value_to_json};
pub use typed::TypedContainer;

pub use savedstate_core::{Adapter, Error, Key, StateContainer, Value};

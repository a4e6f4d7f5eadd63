//! Typed, lazily-populated accessors over a keyed saved-state container.
//!
//! A consumer declares "a value of type `T` at key `K`, falling back to a
//! default if absent" and gets back an accessor. The first use of that
//! accessor runs the default population protocol once:
//!
//! - key already present: leave it alone
//! - immediate default: convert and write it before the first use returns
//! - async default: load it on a background executor and marshal the write
//!   back onto the store's thread
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────┐
//! │  Property / LiveProperty  (accessor)       │  declared via store.declare()
//! ├────────────────────────────────────────────┤
//! │  DefaultPopulator  ──spawn──▶  Executor    │  background loads
//! │        ▲                          │        │
//! │        └──────── Completion ◀─────┘        │  mpsc, applied on store thread
//! ├────────────────────────────────────────────┤
//! │  KeyedStateStore  +  ObservableValue slots │
//! ├────────────────────────────────────────────┤
//! │  StateContainer  (savedstate-core)         │  the persisted collaborator
//! └────────────────────────────────────────────┘
//! ```
//!
//! The store is `!Send`. The thread holding it is the only one that writes
//! the container or notifies observers; background loaders hand their result
//! back as a message and the store applies it from
//! [`KeyedStateStore::run_pending`], [`KeyedStateStore::next_completion`] or
//! [`KeyedStateStore::settle`].
//!
//! # Example
//!
//! ```rust
//! use savedstate::{InMemoryContainer, KeyedStateStore, TokioExecutor};
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> savedstate::Result<()> {
//! let store = KeyedStateStore::new(InMemoryContainer::new(), Arc::new(TokioExecutor::current()?));
//!
//! let count = store.declare::<i64>("count").default_value(0).live();
//! let greeting = store
//!     .declare::<String>("greeting")
//!     .default_loader(|| async { Ok::<_, std::io::Error>(Some("hello".to_string())) })
//!     .property();
//!
//! count.subscribe(|n| println!("count is now {n:?}"))?;
//! assert_eq!(greeting.get()?, None);
//!
//! store.settle().await;
//! assert_eq!(greeting.get()?, Some("hello".to_string()));
//! # Ok(())
//! # }
//! ```

mod accessor;
mod config;
mod dispatch;
mod executor;
mod observable;
mod populate;
mod store;

pub use accessor::{Declaration, LiveProperty, Property};
pub use config::{ConflictPolicy, PoolConfig, StoreConfig};
pub use dispatch::PopulationState;
pub use executor::{BackgroundExecutor, LoadTask, ManualExecutor, TaskHandle, TokioExecutor};
pub use observable::{ObservableValue, Subscription};
pub use populate::BoxError;
pub use store::KeyedStateStore;

pub use savedstate_core::{
    Adapter, Error, FnAdapter, IdentityAdapter, InMemoryContainer, Key, Ordinal, OrdinalAdapter,
    Result, StateContainer, Storable, Value,
};

//! Default population driven deterministically with `ManualExecutor`.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use savedstate::{
    Adapter, ConflictPolicy, Error, InMemoryContainer, Key, KeyedStateStore, ManualExecutor, Ordinal,
    OrdinalAdapter, PopulationState, StateContainer, StoreConfig, Value,
};
use savedstate_serde::SerdeAdapter;

/// Wraps a container and counts writes.
struct CountingContainer {
    inner: InMemoryContainer,
    sets: Arc<AtomicUsize>,
}

impl StateContainer for CountingContainer {
    fn contains(&self, key: &Key) -> savedstate::Result<bool> {
        self.inner.contains(key)
    }

    fn get(&self, key: &Key) -> savedstate::Result<Option<Value>> {
        self.inner.get(key)
    }

    fn set(&mut self, key: &Key, value: Value) -> savedstate::Result<()> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.inner.set(key, value)
    }

    fn remove(&mut self, key: &Key) -> savedstate::Result<Option<Value>> {
        self.inner.remove(key)
    }

    fn keys(&self) -> savedstate::Result<Vec<Key>> {
        self.inner.keys()
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Step {
    One,
    Ten,
}

impl Ordinal for Step {
    const VARIANTS: &'static [Self] = &[Step::One, Step::Ten];
}

/// Accepts stored numbers but refuses to store any.
struct RejectingAdapter;

impl Adapter<i64> for RejectingAdapter {
    type State = i64;

    fn to_saved_state(&self, _: i64) -> savedstate::Result<i64> {
        Err(Error::adapter("refusing to store"))
    }

    fn from_saved_state(&self, n: i64) -> savedstate::Result<Option<i64>> {
        Ok(Some(n))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Filter {
    query: String,
    limit: u32,
}

fn manual_store() -> (KeyedStateStore, ManualExecutor) {
    manual_store_with(InMemoryContainer::new(), StoreConfig::default())
}

fn manual_store_with(
    container: impl StateContainer + 'static,
    config: StoreConfig,
) -> (KeyedStateStore, ManualExecutor) {
    let executor = ManualExecutor::new().unwrap();
    let store = KeyedStateStore::with_config(container, Arc::new(executor.clone()), config);
    (store, executor)
}

fn drive(store: &KeyedStateStore, executor: &ManualExecutor) {
    executor.run_all();
    store.run_pending();
}

fn recorder<T: 'static>() -> (Rc<RefCell<Vec<Option<T>>>>, impl FnMut(Option<T>)) {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    (seen, move |v| sink.borrow_mut().push(v))
}

// === Synchronous defaults ===

#[test]
fn test_count_scenario() {
    let (store, _executor) = manual_store();
    let count = store.declare::<i64>("count").default_value(0).property();
    let watcher = store.declare::<i64>("count").live();

    assert_eq!(count.get().unwrap(), Some(0));

    let (seen, callback) = recorder();
    watcher.subscribe(callback).unwrap();
    assert_eq!(*seen.borrow(), vec![Some(0)]);

    count.set(5).unwrap();

    assert_eq!(count.get().unwrap(), Some(5));
    assert_eq!(*seen.borrow(), vec![Some(0), Some(5)]);
}

#[test]
fn test_immediate_default_visible_before_first_use_returns() {
    let (store, _executor) = manual_store();
    let count = store.declare::<i64>("count").default_value(0).property();

    count.get().unwrap();

    assert_eq!(
        store.get(&Key::new("count")).unwrap(),
        Some(Value::Integer(0))
    );
}

#[test]
fn test_existing_value_wins_over_default() {
    let mut container = InMemoryContainer::new();
    container.set(&Key::new("count"), Value::Integer(3)).unwrap();
    let sets = Arc::new(AtomicUsize::new(0));
    let (store, executor) = manual_store_with(
        CountingContainer {
            inner: container,
            sets: sets.clone(),
        },
        StoreConfig::default(),
    );

    let count = store.declare::<i64>("count").default_value(0).property();
    let loaded = store
        .declare::<i64>("count")
        .default_loader(|| async { Ok::<_, std::io::Error>(Some(100)) })
        .property();

    assert_eq!(count.get().unwrap(), Some(3));
    assert_eq!(loaded.get().unwrap(), Some(3));
    assert_eq!(executor.pending(), 0);
    assert_eq!(sets.load(Ordering::SeqCst), 0);
}

#[test]
fn test_population_runs_once_per_accessor() {
    let sets = Arc::new(AtomicUsize::new(0));
    let (store, _executor) = manual_store_with(
        CountingContainer {
            inner: InMemoryContainer::new(),
            sets: sets.clone(),
        },
        StoreConfig::default(),
    );
    let count = store.declare::<i64>("count").default_value(0).property();

    for _ in 0..5 {
        assert_eq!(count.get().unwrap(), Some(0));
    }

    assert_eq!(sets.load(Ordering::SeqCst), 1);
}

#[test]
fn test_ordinal_default_is_stored_by_ordinal() {
    let (store, _executor) = manual_store();
    let step = store
        .declare::<Step>("step")
        .adapter(OrdinalAdapter::new())
        .default_value(Step::Ten)
        .property();

    assert_eq!(step.get().unwrap(), Some(Step::Ten));
    assert_eq!(store.get(&Key::new("step")).unwrap(), Some(Value::Integer(1)));

    step.set(Step::One).unwrap();
    assert_eq!(store.get(&Key::new("step")).unwrap(), Some(Value::Integer(0)));
}

#[test]
fn test_unknown_ordinal_reads_absent() {
    let (store, _executor) = manual_store();
    store.set(&Key::new("step"), Value::Integer(7)).unwrap();
    let step = store
        .declare::<Step>("step")
        .adapter(OrdinalAdapter::new())
        .default_value(Step::One)
        .property();

    assert_eq!(step.get().unwrap(), None);
}

#[test]
fn test_wrong_stored_type_is_an_error() {
    let (store, _executor) = manual_store();
    store.set(&Key::new("count"), Value::from("many")).unwrap();
    let count = store.declare::<i64>("count").default_value(0).property();

    assert!(matches!(count.get(), Err(Error::TypeMismatch { .. })));
}

#[test]
fn test_serde_property() {
    let (store, _executor) = manual_store();
    let filter = store
        .declare::<Filter>("filter")
        .adapter(SerdeAdapter::new())
        .default_value(Filter {
            query: String::new(),
            limit: 20,
        })
        .property();

    filter
        .update(|current| Filter {
            query: "rust".to_string(),
            ..current.unwrap()
        })
        .unwrap();

    assert_eq!(
        filter.get().unwrap(),
        Some(Filter {
            query: "rust".to_string(),
            limit: 20,
        })
    );
    assert!(matches!(
        store.get(&Key::new("filter")).unwrap(),
        Some(Value::Map(_))
    ));
}

#[test]
fn test_restore_from_snapshot_skips_defaults() {
    let (store, _executor) = manual_store();
    let count = store.declare::<i64>("count").default_value(0).property();
    count.set(12).unwrap();
    let snapshot = store.snapshot().unwrap();
    drop(count);
    drop(store);

    let (restored, executor) = manual_store_with(
        InMemoryContainer::with_data(snapshot),
        StoreConfig::default(),
    );
    let count = restored.declare::<i64>("count").default_value(0).property();

    assert_eq!(count.get().unwrap(), Some(12));
    assert_eq!(executor.pending(), 0);
}

#[test]
fn test_shared_container_outlives_store() {
    let container = Rc::new(RefCell::new(InMemoryContainer::new()));
    {
        let (store, _executor) = manual_store_with(container.clone(), StoreConfig::default());
        let name = store.declare::<String>("name").property();
        name.set("ada".to_string()).unwrap();
    }

    assert_eq!(
        container.borrow().get(&Key::new("name")).unwrap(),
        Some(Value::from("ada"))
    );
}

// === Asynchronous defaults ===

#[test]
fn test_async_default_reads_absent_until_applied() {
    let (store, executor) = manual_store();
    let greeting = store
        .declare::<String>("greeting")
        .default_loader(|| async { Ok::<_, std::io::Error>(Some("hello".to_string())) })
        .property();

    assert_eq!(greeting.get().unwrap(), None);
    assert_eq!(greeting.population_state(), PopulationState::Populating);
    assert_eq!(store.in_flight(), 1);

    executor.run_all();
    // Loaded but not yet marshaled onto this thread.
    assert_eq!(greeting.get().unwrap(), None);

    assert_eq!(store.run_pending(), 1);
    assert_eq!(greeting.get().unwrap(), Some("hello".to_string()));
    assert_eq!(greeting.population_state(), PopulationState::Populated);
    assert_eq!(store.in_flight(), 0);
}

#[test]
fn test_async_observer_notified_once_after_write() {
    let (store, executor) = manual_store();
    let value = store
        .declare::<String>("value")
        .default_loader(|| async { Ok::<_, std::io::Error>(Some("loaded".to_string())) })
        .live();

    let reader = store.clone();
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = log.clone();
    value
        .subscribe(move |v| {
            let stored = reader.get(&Key::new("value")).unwrap();
            sink.borrow_mut().push((v, stored));
        })
        .unwrap();
    assert!(log.borrow().is_empty());

    drive(&store, &executor);

    assert_eq!(
        *log.borrow(),
        vec![(Some("loaded".to_string()), Some(Value::from("loaded")))]
    );
}

#[test]
fn test_loader_runs_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let (store, executor) = manual_store();
    let counter = calls.clone();
    let greeting = store
        .declare::<String>("greeting")
        .default_loader(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, std::io::Error>(Some("hi".to_string())) }
        })
        .property();

    greeting.get().unwrap();
    greeting.get().unwrap();
    drive(&store, &executor);
    greeting.get().unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_loader_yielding_none_stores_null() {
    let (store, executor) = manual_store();
    let greeting = store
        .declare::<String>("greeting")
        .default_loader(|| async { Ok::<Option<String>, std::io::Error>(None) })
        .property();

    greeting.get().unwrap();
    drive(&store, &executor);

    assert!(store.contains(&Key::new("greeting")).unwrap());
    assert_eq!(greeting.get().unwrap(), None);
}

#[test]
fn test_failed_loader_leaves_key_absent_and_can_retry() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let (store, executor) = manual_store();
    let counter = attempts.clone();
    let greeting = store
        .declare::<String>("greeting")
        .default_loader(move || {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Err(std::io::Error::other("backend unavailable"))
                } else {
                    Ok(Some("second time".to_string()))
                }
            }
        })
        .property();

    greeting.get().unwrap();
    drive(&store, &executor);

    assert_eq!(greeting.get().unwrap(), None);
    assert!(!store.contains(&Key::new("greeting")).unwrap());
    assert_eq!(greeting.population_state(), PopulationState::Populated);

    assert!(greeting.repopulate().unwrap());
    assert!(!greeting.repopulate().unwrap());
    drive(&store, &executor);

    assert_eq!(greeting.get().unwrap(), Some("second time".to_string()));
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[test]
fn test_sync_set_wins_over_pending_default() {
    let (store, executor) = manual_store();
    let greeting = store
        .declare::<String>("greeting")
        .default_loader(|| async { Ok::<_, std::io::Error>(Some("default".to_string())) })
        .property();

    greeting.get().unwrap();
    greeting.set("typed by user".to_string()).unwrap();
    drive(&store, &executor);

    assert_eq!(greeting.get().unwrap(), Some("typed by user".to_string()));
    assert_eq!(store.in_flight(), 0);
}

#[test]
fn test_last_write_wins_policy() {
    let config = StoreConfig::default().with_conflict_policy(ConflictPolicy::LastWriteWins);
    let (store, executor) = manual_store_with(InMemoryContainer::new(), config);
    let greeting = store
        .declare::<String>("greeting")
        .default_loader(|| async { Ok::<_, std::io::Error>(Some("default".to_string())) })
        .property();

    greeting.get().unwrap();
    greeting.set("typed by user".to_string()).unwrap();
    drive(&store, &executor);

    assert_eq!(greeting.get().unwrap(), Some("default".to_string()));
}

#[test]
fn test_first_landed_default_wins_between_accessors() {
    let (store, executor) = manual_store();
    let first = store
        .declare::<i64>("n")
        .default_loader(|| async { Ok::<_, std::io::Error>(Some(1)) })
        .property();
    let second = store
        .declare::<i64>("n")
        .default_loader(|| async { Ok::<_, std::io::Error>(Some(2)) })
        .property();

    first.get().unwrap();
    second.get().unwrap();
    assert_eq!(executor.pending(), 2);
    drive(&store, &executor);

    assert_eq!(first.get().unwrap(), Some(1));
    assert_eq!(second.get().unwrap(), Some(1));
}

#[test]
fn test_dropped_accessor_discards_loaded_default() {
    let (store, executor) = manual_store();
    let greeting = store
        .declare::<String>("greeting")
        .default_loader(|| async { Ok::<_, std::io::Error>(Some("late".to_string())) })
        .property();

    greeting.get().unwrap();
    drop(greeting);

    drive(&store, &executor);

    assert!(!store.contains(&Key::new("greeting")).unwrap());
    assert_eq!(store.in_flight(), 0);
}

#[test]
fn test_discarded_load_is_accounted_for() {
    let (store, executor) = manual_store();
    let greeting = store
        .declare::<String>("greeting")
        .default_loader(|| async { Ok::<_, std::io::Error>(Some("never".to_string())) })
        .property();

    greeting.get().unwrap();
    assert_eq!(executor.discard_all(), 1);

    assert_eq!(store.run_pending(), 1);
    assert_eq!(store.in_flight(), 0);
    assert_eq!(greeting.get().unwrap(), None);
    assert_eq!(greeting.population_state(), PopulationState::Populated);
}

#[test]
fn test_loaded_default_rejected_by_adapter_is_not_written() {
    let (store, executor) = manual_store();
    let n = store
        .declare::<i64>("n")
        .adapter(RejectingAdapter)
        .default_loader(|| async { Ok::<_, std::io::Error>(Some(5)) })
        .property();

    assert_eq!(n.get().unwrap(), None);
    assert_eq!(executor.pending(), 1);
    drive(&store, &executor);

    assert!(!store.contains(&Key::new("n")).unwrap());
    assert_eq!(n.get().unwrap(), None);
    assert_eq!(n.population_state(), PopulationState::Populated);
    assert_eq!(store.in_flight(), 0);
}

#[test]
fn test_loaded_value_never_written_off_thread() {
    let (store, executor) = manual_store();
    let greeting = store
        .declare::<String>("greeting")
        .default_loader(|| async { Ok::<_, std::io::Error>(Some("hello".to_string())) })
        .property();

    greeting.get().unwrap();
    executor.run_all();

    // Loads only post completions; nothing lands until the store drains them.
    assert!(!store.contains(&Key::new("greeting")).unwrap());
    assert_eq!(store.in_flight(), 1);
}

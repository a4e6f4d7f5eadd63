//! A counter whose state survives simulated process restarts.
//!
//! Each session builds a fresh [`KeyedStateStore`] over a container
//! restored from the previous session's snapshot, then declares the same
//! accessors again. Values written in earlier sessions win over defaults;
//! async defaults only load when nothing was saved.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use savedstate::{
    IdentityAdapter, InMemoryContainer, Key, KeyedStateStore, LiveProperty, Ordinal,
    OrdinalAdapter, Property, Result, TokioExecutor, Value,
};
use tracing::{debug, info};

/// Lines kept in the saved log, header included.
pub const MAX_LOG_LINES: usize = 5;

const LOG_HEADER: &str = "Log:";

/// How much one press of "count up" adds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountUp {
    One,
    Ten,
}

impl CountUp {
    pub fn amount(self) -> i64 {
        match self {
            CountUp::One => 1,
            CountUp::Ten => 10,
        }
    }
}

impl Ordinal for CountUp {
    const VARIANTS: &'static [Self] = &[CountUp::One, CountUp::Ten];
}

/// The sample's view model.
///
/// `session_count` lives only as long as this value; `saved_count` is kept
/// in the store and carries over to the next session.
pub struct CounterViewModel {
    session_count: i64,
    step: Property<CountUp, OrdinalAdapter<CountUp>>,
    loaded_step: Property<CountUp, OrdinalAdapter<CountUp>>,
    saved_count: Property<i64, IdentityAdapter<i64>>,
    greeting: LiveProperty<String, IdentityAdapter<String>>,
    log: Property<String, IdentityAdapter<String>>,
}

impl CounterViewModel {
    /// Declare the accessors on `store`. Async defaults take `delay` to load.
    pub fn new(store: &KeyedStateStore, delay: Duration) -> Result<Self> {
        let view_model = Self {
            session_count: 0,
            step: store
                .declare::<CountUp>("step")
                .adapter(OrdinalAdapter::new())
                .default_value(CountUp::One)
                .property(),
            loaded_step: store
                .declare::<CountUp>("loaded_step")
                .adapter(OrdinalAdapter::new())
                .default_loader(move || async move {
                    tokio::time::sleep(delay * 2).await;
                    Ok::<_, std::io::Error>(Some(CountUp::One))
                })
                .property(),
            saved_count: store.declare::<i64>("saved_count").default_value(0).property(),
            greeting: store
                .declare::<String>("greeting")
                .default_loader(move || async move {
                    tokio::time::sleep(delay).await;
                    Ok::<_, std::io::Error>(Some("String loaded in the background.".to_string()))
                })
                .live(),
            log: store
                .declare::<String>("log")
                .default_value(LOG_HEADER.to_string())
                .property(),
        };

        view_model.greeting.subscribe(|greeting| {
            if let Some(greeting) = greeting {
                info!(%greeting, "greeting available");
            }
        })?;
        // Touch the loaded step so its default starts loading with the session.
        view_model.loaded_step.get()?;
        view_model.append_log("view model created")?;
        Ok(view_model)
    }

    pub fn count_up(&mut self) -> Result<()> {
        let amount = self.step.get()?.map(CountUp::amount).unwrap_or(0);
        self.session_count += amount;
        self.saved_count.update(|count| count.unwrap_or(0) + amount)?;
        debug!(amount, session_count = self.session_count, "counted up");
        Ok(())
    }

    pub fn set_step(&self, step: CountUp) -> Result<()> {
        self.step.set(step)
    }

    /// Append a line, dropping the oldest lines past [`MAX_LOG_LINES`].
    pub fn append_log(&self, text: &str) -> Result<()> {
        self.log.update(|log| {
            let log = log.unwrap_or_else(|| LOG_HEADER.to_string());
            let mut lines: Vec<&str> = log.split('\n').collect();
            lines.push(text);
            let skip = lines.len().saturating_sub(MAX_LOG_LINES);
            lines[skip..].join("\n")
        })
    }

    pub fn session_count(&self) -> i64 {
        self.session_count
    }

    pub fn saved_count(&self) -> Result<Option<i64>> {
        self.saved_count.get()
    }

    pub fn loaded_step(&self) -> Result<Option<CountUp>> {
        self.loaded_step.get()
    }

    pub fn greeting(&self) -> Result<Option<String>> {
        self.greeting.get()
    }

    pub fn log(&self) -> Result<Option<String>> {
        self.log.get()
    }

    /// End of the view model's life: record it in the log.
    pub fn clear(self) -> Result<()> {
        self.append_log("view model cleared")
    }
}

/// Options for [`run`].
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub delay: Duration,
    pub restarts: usize,
    pub count_ups: usize,
}

/// Run one session per restart, carrying the store snapshot across.
pub async fn run(options: RunOptions) -> Result<()> {
    let executor = Arc::new(TokioExecutor::current()?);
    let mut saved: BTreeMap<Key, Value> = BTreeMap::new();

    for session in 0..=options.restarts {
        let store = KeyedStateStore::new(InMemoryContainer::with_data(saved), executor.clone());
        info!(session, id = %store.session_id(), "session started");

        let mut view_model = CounterViewModel::new(&store, options.delay)?;
        if session % 2 == 1 {
            view_model.set_step(CountUp::Ten)?;
        }
        for _ in 0..options.count_ups {
            view_model.count_up()?;
        }
        store.settle().await;

        println!("== session {session} ==");
        println!("session count: {}", view_model.session_count());
        println!("saved count:   {}", view_model.saved_count()?.unwrap_or(0));
        println!(
            "loaded step:   {}",
            view_model
                .loaded_step()?
                .map_or("-".to_string(), |step| format!("{step:?}"))
        );
        println!(
            "greeting:      {}",
            view_model.greeting()?.unwrap_or_else(|| "-".to_string())
        );
        println!("{}", view_model.log()?.unwrap_or_default());
        println!();

        view_model.clear()?;
        saved = store.snapshot()?;
    }
    Ok(())
}

//! Marshaling loaded defaults back onto the store's thread.
//!
//! A background load never touches the container. It ends by sending one
//! [`Completion`] through an unbounded channel; the store drains that
//! channel on its own thread and decides whether to write.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use savedstate_core::{Error, Key, Value};
use tokio::sync::mpsc;
use tracing::debug;

/// Where an accessor is in its one-time default population.
///
/// Transitions only move forward: `Unpopulated -> Populated` on the
/// synchronous path, `Unpopulated -> Populating -> Populated` on the
/// asynchronous one. An explicit repopulate starts a new round from
/// `Populated`. `Populated` means the protocol finished, not that the key
/// holds a value: a failed loader also ends here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopulationState {
    Unpopulated,
    Populating,
    Populated,
}

impl PopulationState {
    fn to_u8(self) -> u8 {
        match self {
            PopulationState::Unpopulated => 0,
            PopulationState::Populating => 1,
            PopulationState::Populated => 2,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => PopulationState::Unpopulated,
            1 => PopulationState::Populating,
            _ => PopulationState::Populated,
        }
    }
}

/// Shared between an accessor and its in-flight load.
///
/// The accessor revokes the ticket when it is dropped; the store checks it
/// before applying a completion, so a load that outlives its accessor
/// never writes.
#[derive(Debug)]
pub(crate) struct PopulationTicket {
    alive: AtomicBool,
    state: AtomicU8,
}

impl PopulationTicket {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            alive: AtomicBool::new(true),
            state: AtomicU8::new(PopulationState::Unpopulated.to_u8()),
        })
    }

    pub(crate) fn state(&self) -> PopulationState {
        PopulationState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: PopulationState) {
        self.state.store(state.to_u8(), Ordering::Release);
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub(crate) fn revoke(&self) {
        self.alive.store(false, Ordering::Release);
    }
}

/// Result of one background load.
#[derive(Debug)]
pub(crate) enum Outcome {
    /// The loader produced a value (already converted for storage).
    Loaded(Value),
    /// The loader or the adapter failed.
    Failed(Error),
    /// The task was dropped before it finished.
    Abandoned,
}

#[derive(Debug)]
pub(crate) struct Completion {
    pub(crate) key: Key,
    pub(crate) ticket: Arc<PopulationTicket>,
    pub(crate) outcome: Outcome,
}

pub(crate) type CompletionSender = mpsc::UnboundedSender<Completion>;
pub(crate) type CompletionReceiver = mpsc::UnboundedReceiver<Completion>;

pub(crate) fn completion_channel() -> (CompletionSender, CompletionReceiver) {
    mpsc::unbounded_channel()
}

/// Sends exactly one completion for a spawned load.
///
/// Lives inside the load task. If the task is cancelled or panics, the
/// guard is dropped unfinished and reports the load as abandoned, which
/// keeps the store's in-flight count honest.
pub(crate) struct CompletionGuard {
    tx: CompletionSender,
    key: Key,
    ticket: Arc<PopulationTicket>,
    sent: bool,
}

impl CompletionGuard {
    pub(crate) fn new(tx: CompletionSender, key: Key, ticket: Arc<PopulationTicket>) -> Self {
        Self {
            tx,
            key,
            ticket,
            sent: false,
        }
    }

    pub(crate) fn finish(mut self, outcome: Outcome) {
        self.send(outcome);
    }

    fn send(&mut self, outcome: Outcome) {
        if self.sent {
            return;
        }
        self.sent = true;
        let completion = Completion {
            key: self.key.clone(),
            ticket: self.ticket.clone(),
            outcome,
        };
        if self.tx.send(completion).is_err() {
            debug!(key = %self.key, "store closed before default finished loading; dropping it");
        }
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.send(Outcome::Abandoned);
    }
}

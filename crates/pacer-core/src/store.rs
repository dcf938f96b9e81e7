//! Observable state container.
//!
//! Each engine keeps its state in a [`Store`]. Writers go through
//! [`Store::set_state`]; readers either take a snapshot with [`Store::state`]
//! or subscribe for change notifications.

use tokio::sync::watch;

/// A `watch`-backed container holding the current state snapshot.
#[derive(Debug)]
pub struct Store<S> {
    tx: watch::Sender<S>,
}

impl<S: Clone> Store<S> {
    #[must_use]
    pub fn new(initial: S) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> S {
        self.tx.borrow().clone()
    }

    /// Apply `update` in place and notify subscribers.
    ///
    /// The value is updated even when no receiver is alive.
    pub fn set_state(&self, update: impl FnOnce(&mut S)) {
        self.tx.send_modify(update);
    }

    /// Read a projection of the state without cloning all of it.
    pub fn with_state<R>(&self, read: impl FnOnce(&S) -> R) -> R {
        read(&self.tx.borrow())
    }

    /// Receive a notification after every state change.
    pub fn subscribe(&self) -> watch::Receiver<S> {
        self.tx.subscribe()
    }
}

//! Completion handles for async debounced calls.
//!
//! Every call to `AsyncDebouncer::maybe_execute` gets a [`CompletionHandle`].
//! Handles that do not execute on the leading edge join the burst's
//! [`Waiters`]; the whole set is detached in one step when the burst ends and
//! resolved with a single shared outcome.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

/// Outcome delivered to a caller.
///
/// `Ok(None)` means the call was cancelled, skipped, aborted, or its error
/// was handled by `on_error` without rethrowing.
pub type Completion<T, E> = Result<Option<T>, Arc<E>>;

enum HandleState<T, E> {
    Ready(Option<Completion<T, E>>),
    Waiting(oneshot::Receiver<Completion<T, E>>),
}

/// Future resolving to one caller's [`Completion`].
#[must_use = "a completion handle does nothing unless awaited"]
pub struct CompletionHandle<T, E> {
    state: HandleState<T, E>,
}

impl<T, E> CompletionHandle<T, E> {
    /// A handle that is already resolved.
    pub fn ready(outcome: Completion<T, E>) -> Self {
        Self {
            state: HandleState::Ready(Some(outcome)),
        }
    }

    fn waiting(rx: oneshot::Receiver<Completion<T, E>>) -> Self {
        Self {
            state: HandleState::Waiting(rx),
        }
    }
}

// Neither variant is ever pinned structurally.
impl<T, E> Unpin for CompletionHandle<T, E> {}

impl<T, E> Future for CompletionHandle<T, E> {
    type Output = Completion<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            HandleState::Ready(outcome) => Poll::Ready(outcome.take().unwrap_or(Ok(None))),
            // A dropped sender means the owning debouncer went away mid-burst.
            HandleState::Waiting(rx) => Pin::new(rx).poll(cx).map(|r| r.unwrap_or(Ok(None))),
        }
    }
}

impl<T, E> fmt::Debug for CompletionHandle<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            HandleState::Ready(_) => "ready",
            HandleState::Waiting(_) => "waiting",
        };
        f.debug_struct("CompletionHandle").field("state", &state).finish()
    }
}

/// Unresolved handles of the current burst.
pub struct Waiters<T, E> {
    senders: Vec<oneshot::Sender<Completion<T, E>>>,
}

impl<T, E> Default for Waiters<T, E> {
    fn default() -> Self {
        Self {
            senders: Vec::new(),
        }
    }
}

impl<T: Clone, E> Waiters<T, E> {
    /// Add a caller to the set and return its handle.
    pub fn register(&mut self) -> CompletionHandle<T, E> {
        let (tx, rx) = oneshot::channel();
        self.senders.push(tx);
        CompletionHandle::waiting(rx)
    }

    /// Detach the whole set, leaving this one empty.
    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }

    /// Resolve every handle in the set with the same outcome.
    pub fn settle(self, outcome: &Completion<T, E>) {
        for tx in self.senders {
            // Receiver gone means the caller stopped waiting.
            let _ = tx.send(outcome.clone());
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.senders.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }
}

impl<T, E> fmt::Debug for Waiters<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Waiters")
            .field("len", &self.senders.len())
            .finish()
    }
}

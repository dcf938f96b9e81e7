//! Keyed state mirroring between debouncer instances.
//!
//! Instances constructed with the same `key` and the same [`MirrorHub`]
//! publish a snapshot of their state and plain options after each of their own
//! changes, and adopt snapshots published by their peers. Adopted snapshots
//! are applied silently (never re-published), last writer wins, and adopting
//! never arms timers.

use std::sync::Arc;
use std::sync::Weak;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const DEFAULT_CAPACITY: usize = 64;

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique id used to recognise an instance's own events.
pub(crate) fn next_instance_id() -> u64 {
    NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Options that can cross instances. Resolver-valued fields are not mirrored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptionsSnapshot {
    pub enabled: Option<bool>,
    pub wait: Option<Duration>,
    /// Outer `None`: not mirrored. `Some(None)`: max-wait unset.
    pub max_wait: Option<Option<Duration>>,
    pub leading: bool,
    pub trailing: bool,
    /// Async instances only.
    pub throw_on_error: Option<bool>,
}

/// One published snapshot.
#[derive(Debug, Clone)]
pub struct MirrorEvent<S> {
    pub origin: u64,
    pub key: String,
    pub state: S,
    pub options: OptionsSnapshot,
}

/// Broadcast channel shared by mirrored instances.
#[derive(Debug)]
pub struct MirrorHub<S> {
    tx: broadcast::Sender<Arc<MirrorEvent<S>>>,
}

impl<S> Clone for MirrorHub<S> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<S> MirrorHub<S> {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Returns the number of listeners the event reached.
    pub fn publish(&self, event: MirrorEvent<S>) -> usize {
        self.tx.send(Arc::new(event)).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<MirrorEvent<S>>> {
        self.tx.subscribe()
    }
}

impl<S> Default for MirrorHub<S> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Aborts the listener task when the owning instance goes away.
#[derive(Debug)]
pub(crate) struct ListenerGuard(JoinHandle<()>);

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Spawn a task applying peer events for `key` to `target`.
///
/// The task only holds a weak reference, so it never keeps the instance alive.
pub(crate) fn spawn_listener<S, W>(
    runtime: &Handle,
    hub: &MirrorHub<S>,
    key: String,
    origin: u64,
    target: Weak<W>,
    apply: impl Fn(Arc<W>, &MirrorEvent<S>) + Send + 'static,
) -> ListenerGuard
where
    S: Send + Sync + 'static,
    W: Send + Sync + 'static,
{
    let mut rx = hub.subscribe();
    ListenerGuard(runtime.spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if event.origin == origin || event.key != key {
                        continue;
                    }
                    // Upgrade fails while the instance is being built or torn down.
                    if let Some(target) = target.upgrade() {
                        debug!(key = %key, from = event.origin, "adopting mirrored state");
                        apply(target, &event);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(key = %key, skipped, "mirror listener lagged; older snapshots dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }))
}

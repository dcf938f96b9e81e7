//! Asynchronous debouncer.
//!
//! Same scheduling as [`Debouncer`](crate::debouncer::Debouncer), but the
//! wrapped operation is async and fallible. Each call returns a
//! [`CompletionHandle`]; every handle registered during one burst resolves
//! with the outcome of the single execution that ends the burst.
//!
//! Executions run inside an [`AsyncRetryer`] registered under a monotonic
//! execution id, so they can be retried per [`RetryPolicy`] and aborted
//! individually ([`AsyncDebouncer::abort_signal`]) or all at once
//! ([`AsyncDebouncer::abort`]). `cancel` and `abort` are separate surfaces:
//! `cancel` drops scheduled work, `abort` stops started work.
//!
//! # Error policy
//!
//! A failed execution increments `error_count` and calls `on_error`. The
//! caller's handle is rejected only when the throw policy is on: the explicit
//! `throw_on_error` if set, otherwise "on unless an `on_error` handler is
//! configured". `on_success` returning `Err` is treated like a failed
//! execution; `on_settled` returning `Err` is reported to `on_error` only.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tracing::{debug, trace, warn};

use crate::completion::{Completion, CompletionHandle, Waiters};
use crate::gate::{Status, admits_leading};
use crate::mirror::{self, ListenerGuard, MirrorEvent, MirrorHub, OptionsSnapshot};
use crate::param::Param;
use crate::retry::{AbortSignal, AsyncOperation, AsyncRetryer, RetryError, RetryPolicy, operation_fn};
use crate::store::Store;
use crate::timer::BurstTimers;

pub type OnSuccess<A, T, E> =
    Arc<dyn Fn(&T, &A, &AsyncDebouncer<A, T, E>) -> Result<(), E> + Send + Sync>;
pub type OnError<A, T, E> = Arc<dyn Fn(&E, &A, &AsyncDebouncer<A, T, E>) + Send + Sync>;
pub type OnSettled<A, T, E> =
    Arc<dyn Fn(&A, &AsyncDebouncer<A, T, E>) -> Result<(), E> + Send + Sync>;

// =============================================================================
// State
// =============================================================================

/// Observable state of an [`AsyncDebouncer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AsyncDebouncerState<A, T> {
    pub can_leading_execute: bool,
    pub error_count: u64,
    /// At least one execution is in flight.
    pub is_executing: bool,
    pub is_pending: bool,
    pub last_args: Option<A>,
    /// Most recent successful result; survives errors and cancellation.
    pub last_result: Option<T>,
    pub maybe_execute_count: u64,
    pub settle_count: u64,
    pub status: Status,
    pub success_count: u64,
}

impl<A, T> Default for AsyncDebouncerState<A, T> {
    fn default() -> Self {
        Self {
            can_leading_execute: true,
            error_count: 0,
            is_executing: false,
            is_pending: false,
            last_args: None,
            last_result: None,
            maybe_execute_count: 0,
            settle_count: 0,
            status: Status::Idle,
            success_count: 0,
        }
    }
}

impl<A, T> AsyncDebouncerState<A, T> {
    fn derive_status(&mut self, enabled: bool) {
        self.status =
            Status::derive(enabled, self.is_executing, self.is_pending, self.settle_count > 0);
    }
}

// =============================================================================
// Options
// =============================================================================

/// Configuration for an [`AsyncDebouncer`].
pub struct AsyncDebouncerOptions<A, T, E> {
    pub enabled: Param<bool, AsyncDebouncer<A, T, E>>,
    pub wait: Param<Duration, AsyncDebouncer<A, T, E>>,
    pub max_wait: Option<Param<Duration, AsyncDebouncer<A, T, E>>>,
    pub leading: bool,
    pub trailing: bool,
    /// Identity for mirroring; read once at construction.
    pub key: Option<String>,
    pub initial_state: Option<AsyncDebouncerState<A, T>>,
    /// `None`: reject handles only when no `on_error` is configured.
    pub throw_on_error: Option<bool>,
    pub on_success: Option<OnSuccess<A, T, E>>,
    pub on_error: Option<OnError<A, T, E>>,
    pub on_settled: Option<OnSettled<A, T, E>>,
    /// Retry policy for each execution; a single attempt by default.
    pub retry: RetryPolicy,
    /// Read once at construction.
    pub mirror: Option<MirrorHub<AsyncDebouncerState<A, T>>>,
}

impl<A, T, E> Default for AsyncDebouncerOptions<A, T, E> {
    fn default() -> Self {
        Self {
            enabled: Param::Value(true),
            wait: Param::Value(Duration::ZERO),
            max_wait: None,
            leading: false,
            trailing: true,
            key: None,
            initial_state: None,
            throw_on_error: None,
            on_success: None,
            on_error: None,
            on_settled: None,
            retry: RetryPolicy::single_attempt(),
            mirror: None,
        }
    }
}

impl<A: Clone, T: Clone, E> Clone for AsyncDebouncerOptions<A, T, E> {
    fn clone(&self) -> Self {
        Self {
            enabled: self.enabled.clone(),
            wait: self.wait.clone(),
            max_wait: self.max_wait.clone(),
            leading: self.leading,
            trailing: self.trailing,
            key: self.key.clone(),
            initial_state: self.initial_state.clone(),
            throw_on_error: self.throw_on_error,
            on_success: self.on_success.clone(),
            on_error: self.on_error.clone(),
            on_settled: self.on_settled.clone(),
            retry: self.retry.clone(),
            mirror: self.mirror.clone(),
        }
    }
}

impl<A, T, E> fmt::Debug for AsyncDebouncerOptions<A, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncDebouncerOptions")
            .field("enabled", &self.enabled)
            .field("wait", &self.wait)
            .field("max_wait", &self.max_wait)
            .field("leading", &self.leading)
            .field("trailing", &self.trailing)
            .field("key", &self.key)
            .field("throw_on_error", &self.throw_on_error)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl<A, T, E> AsyncDebouncerOptions<A, T, E> {
    #[must_use]
    pub fn with_wait(mut self, wait: impl Into<Param<Duration, AsyncDebouncer<A, T, E>>>) -> Self {
        self.wait = wait.into();
        self
    }

    #[must_use]
    pub fn with_max_wait(
        mut self,
        max_wait: impl Into<Param<Duration, AsyncDebouncer<A, T, E>>>,
    ) -> Self {
        self.max_wait = Some(max_wait.into());
        self
    }

    #[must_use]
    pub fn with_enabled(mut self, enabled: impl Into<Param<bool, AsyncDebouncer<A, T, E>>>) -> Self {
        self.enabled = enabled.into();
        self
    }

    #[must_use]
    pub fn with_leading(mut self, leading: bool) -> Self {
        self.leading = leading;
        self
    }

    #[must_use]
    pub fn with_trailing(mut self, trailing: bool) -> Self {
        self.trailing = trailing;
        self
    }

    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    #[must_use]
    pub fn with_throw_on_error(mut self, throw_on_error: bool) -> Self {
        self.throw_on_error = Some(throw_on_error);
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_mirror(mut self, hub: MirrorHub<AsyncDebouncerState<A, T>>) -> Self {
        self.mirror = Some(hub);
        self
    }

    #[must_use]
    pub fn with_on_success(
        mut self,
        on_success: impl Fn(&T, &A, &AsyncDebouncer<A, T, E>) -> Result<(), E> + Send + Sync + 'static,
    ) -> Self {
        self.on_success = Some(Arc::new(on_success));
        self
    }

    #[must_use]
    pub fn with_on_error(
        mut self,
        on_error: impl Fn(&E, &A, &AsyncDebouncer<A, T, E>) + Send + Sync + 'static,
    ) -> Self {
        self.on_error = Some(Arc::new(on_error));
        self
    }

    #[must_use]
    pub fn with_on_settled(
        mut self,
        on_settled: impl Fn(&A, &AsyncDebouncer<A, T, E>) -> Result<(), E> + Send + Sync + 'static,
    ) -> Self {
        self.on_settled = Some(Arc::new(on_settled));
        self
    }

    /// Resolved throw policy.
    #[must_use]
    pub fn throws(&self) -> bool {
        self.throw_on_error.unwrap_or(self.on_error.is_none())
    }

    fn snapshot(&self) -> OptionsSnapshot {
        OptionsSnapshot {
            enabled: self.enabled.literal().copied(),
            wait: self.wait.literal().copied(),
            max_wait: match &self.max_wait {
                None => Some(None),
                Some(param) => param.literal().map(|d| Some(*d)),
            },
            leading: self.leading,
            trailing: self.trailing,
            throw_on_error: self.throw_on_error,
        }
    }

    fn adopt(&mut self, snapshot: &OptionsSnapshot) {
        if let Some(enabled) = snapshot.enabled {
            self.enabled = Param::Value(enabled);
        }
        if let Some(wait) = snapshot.wait {
            self.wait = Param::Value(wait);
        }
        if let Some(max_wait) = snapshot.max_wait {
            self.max_wait = max_wait.map(Param::Value);
        }
        self.leading = snapshot.leading;
        self.trailing = snapshot.trailing;
        self.throw_on_error = snapshot.throw_on_error;
    }
}

// =============================================================================
// AsyncDebouncer
// =============================================================================

/// Timers plus the handles waiting on the current burst.
struct Scheduler<T, E> {
    timers: BurstTimers,
    waiters: Waiters<T, E>,
}

type RetryerTable<A, T, E> = BTreeMap<u64, Arc<AsyncRetryer<A, T, E>>>;

struct Inner<A, T, E> {
    id: u64,
    key: Option<String>,
    operation: AsyncOperation<A, T, E>,
    options: RwLock<AsyncDebouncerOptions<A, T, E>>,
    store: Store<AsyncDebouncerState<A, T>>,
    /// Scheduler lock; taken before `retryers` when both are needed.
    scheduler: Mutex<Scheduler<T, E>>,
    retryers: Mutex<RetryerTable<A, T, E>>,
    next_execution_id: AtomicU64,
    runtime: Handle,
    mirror: Option<MirrorHub<AsyncDebouncerState<A, T>>>,
    _listener: Option<ListenerGuard>,
}

/// Debounces an async, fallible operation. Cheap to clone; clones share state.
pub struct AsyncDebouncer<A, T, E> {
    inner: Arc<Inner<A, T, E>>,
}

impl<A, T, E> Clone for AsyncDebouncer<A, T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A, T, E> fmt::Debug for AsyncDebouncer<A, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncDebouncer")
            .field("id", &self.inner.id)
            .field("key", &self.inner.key)
            .finish_non_exhaustive()
    }
}

impl<A, T, E> AsyncDebouncer<A, T, E>
where
    A: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    E: fmt::Display + Send + Sync + 'static,
{
    /// Create a debouncer on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn new<F, Fut>(operation: F, options: AsyncDebouncerOptions<A, T, E>) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        Self::new_in(Handle::current(), operation_fn(operation), options)
    }

    /// Create a debouncer whose timers and executions run on `runtime`.
    pub fn new_in(
        runtime: Handle,
        operation: AsyncOperation<A, T, E>,
        options: AsyncDebouncerOptions<A, T, E>,
    ) -> Self {
        let id = mirror::next_instance_id();
        let key = options.key.clone();
        let hub = options.mirror.clone();
        let initial = options.initial_state.clone().unwrap_or_default();

        let inner = Arc::new_cyclic(|weak: &Weak<Inner<A, T, E>>| {
            let listener = match (&key, &hub) {
                (Some(key), Some(hub)) => Some(mirror::spawn_listener(
                    &runtime,
                    hub,
                    key.clone(),
                    id,
                    weak.clone(),
                    |inner: Arc<Inner<A, T, E>>, event: &MirrorEvent<AsyncDebouncerState<A, T>>| {
                        AsyncDebouncer { inner }.adopt(event);
                    },
                )),
                _ => None,
            };
            Inner {
                id,
                key,
                operation,
                options: RwLock::new(options),
                store: Store::new(initial),
                scheduler: Mutex::new(Scheduler {
                    timers: BurstTimers::new(),
                    waiters: Waiters::default(),
                }),
                retryers: Mutex::new(BTreeMap::new()),
                next_execution_id: AtomicU64::new(1),
                runtime,
                mirror: hub,
                _listener: listener,
            }
        });

        let debouncer = Self { inner };
        let enabled = debouncer.options().enabled.resolve(&debouncer);
        debouncer.inner.store.set_state(|s| s.derive_status(enabled));
        debouncer
    }

    // ── accessors ──

    /// Snapshot of the current options.
    pub fn options(&self) -> AsyncDebouncerOptions<A, T, E> {
        match self.inner.options.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> AsyncDebouncerState<A, T> {
        self.inner.store.state()
    }

    pub fn store(&self) -> &Store<AsyncDebouncerState<A, T>> {
        &self.inner.store
    }

    pub fn key(&self) -> Option<&str> {
        self.inner.key.as_deref()
    }

    fn lock_scheduler(&self) -> MutexGuard<'_, Scheduler<T, E>> {
        match self.inner.scheduler.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_retryers(&self) -> MutexGuard<'_, RetryerTable<A, T, E>> {
        match self.inner.retryers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn downgrade(&self) -> Weak<Inner<A, T, E>> {
        Arc::downgrade(&self.inner)
    }

    fn upgrade(weak: &Weak<Inner<A, T, E>>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    fn commit(&self, enabled: bool, update: impl FnOnce(&mut AsyncDebouncerState<A, T>)) {
        self.inner.store.set_state(|s| {
            update(s);
            s.derive_status(enabled);
        });
        self.publish();
    }

    fn publish(&self) {
        if let (Some(key), Some(hub)) = (&self.inner.key, &self.inner.mirror) {
            hub.publish(MirrorEvent {
                origin: self.inner.id,
                key: key.clone(),
                state: self.state(),
                options: self.options().snapshot(),
            });
        }
    }

    fn adopt(&self, event: &MirrorEvent<AsyncDebouncerState<A, T>>) {
        match self.inner.options.write() {
            Ok(mut guard) => guard.adopt(&event.options),
            Err(poisoned) => poisoned.into_inner().adopt(&event.options),
        }
        let enabled = self.options().enabled.resolve(self);
        let _scheduler = self.lock_scheduler();
        self.inner.store.set_state(|s| {
            *s = event.state.clone();
            s.derive_status(enabled);
        });
    }

    // ── scheduling ──

    /// Submit a call and get a handle to its outcome.
    ///
    /// A disabled debouncer resolves the handle with `Ok(None)` right away.
    pub fn maybe_execute(&self, args: A) -> CompletionHandle<T, E> {
        let opts = self.options();
        if !opts.enabled.resolve(self) {
            trace!(key = ?self.inner.key, "call ignored while disabled");
            return CompletionHandle::ready(Ok(None));
        }
        let wait = opts.wait.resolve(self);
        let max_wait = opts.max_wait.as_ref().map(|p| p.resolve(self));
        let owes_later = opts.trailing || max_wait.is_some();

        let (leading_args, handle) = {
            let mut scheduler = self.lock_scheduler();

            if let Some(max_wait) = max_wait {
                if !scheduler.timers.max_wait.is_armed() {
                    let weak = self.downgrade();
                    scheduler.timers.max_wait.arm(&self.inner.runtime, max_wait, move |generation| {
                        if let Some(debouncer) = Self::upgrade(&weak) {
                            debouncer.on_max_wait_elapsed(generation);
                        }
                    });
                }
            }

            let can_lead = self.inner.store.with_state(|s| s.can_leading_execute);
            let leads = admits_leading(opts.leading, can_lead);
            let mut leading_args = None;
            self.commit(true, |s| {
                s.maybe_execute_count += 1;
                if leads {
                    s.can_leading_execute = false;
                    leading_args = Some(args);
                } else {
                    if owes_later {
                        s.last_args = Some(args);
                    }
                    if opts.trailing {
                        s.is_pending = true;
                    }
                }
            });

            let weak = self.downgrade();
            scheduler.timers.wait.arm(&self.inner.runtime, wait, move |generation| {
                if let Some(debouncer) = Self::upgrade(&weak) {
                    debouncer.on_wait_elapsed(generation);
                }
            });

            let handle = if leads {
                None
            } else {
                Some(scheduler.waiters.register())
            };
            (leading_args, handle)
        };

        match (leading_args, handle) {
            (Some(args), _) => {
                debug!(key = ?self.inner.key, "leading edge execution");
                let mut own = Waiters::default();
                let handle = own.register();
                self.dispatch(args, own);
                handle
            }
            (None, Some(handle)) => handle,
            (None, None) => CompletionHandle::ready(Ok(None)),
        }
    }

    fn on_wait_elapsed(&self, generation: u64) {
        let opts = self.options();
        let enabled = opts.enabled.resolve(self);
        let (owed, waiters) = {
            let mut scheduler = self.lock_scheduler();
            if !scheduler.timers.wait.claim(generation) {
                return;
            }
            scheduler.timers.max_wait.cancel();
            let mut owed = None;
            self.commit(enabled, |s| {
                s.can_leading_execute = true;
                s.is_pending = false;
                owed = s.last_args.take();
            });
            (owed, scheduler.waiters.take())
        };

        match owed {
            Some(args) if opts.trailing => {
                debug!(key = ?self.inner.key, "trailing edge execution");
                self.dispatch(args, waiters);
            }
            _ => waiters.settle(&Ok(self.state().last_result)),
        }
    }

    fn on_max_wait_elapsed(&self, generation: u64) {
        let enabled = self.options().enabled.resolve(self);
        let (owed, waiters) = {
            let mut scheduler = self.lock_scheduler();
            if !scheduler.timers.max_wait.claim(generation) {
                return;
            }
            scheduler.timers.wait.cancel();
            let mut owed = None;
            self.commit(enabled, |s| {
                s.can_leading_execute = true;
                s.is_pending = false;
                owed = s.last_args.take();
            });
            (owed, scheduler.waiters.take())
        };

        match owed {
            Some(args) => {
                debug!(key = ?self.inner.key, "max wait reached, forcing execution");
                self.dispatch(args, waiters);
            }
            None => waiters.settle(&Ok(self.state().last_result)),
        }
    }

    /// Start one execution and settle `waiters` with its outcome.
    ///
    /// The first attempt is invoked before this returns; the rest runs on a
    /// spawned task.
    fn dispatch(&self, args: A, waiters: Waiters<T, E>) {
        let opts = self.options();
        let enabled = opts.enabled.resolve(self);
        if !enabled {
            waiters.settle(&Ok(None));
            return;
        }

        let execution_id = self.inner.next_execution_id.fetch_add(1, Ordering::SeqCst);
        let retryer = Arc::new(AsyncRetryer::new(
            Arc::clone(&self.inner.operation),
            opts.retry.clone(),
            execution_id,
        ));
        {
            let _scheduler = self.lock_scheduler();
            self.lock_retryers().insert(execution_id, Arc::clone(&retryer));
            self.commit(enabled, |s| s.is_executing = true);
        }

        debug!(key = ?self.inner.key, execution_id, waiters = waiters.len(), "execution started");
        let attempt = self.inner.runtime.spawn(retryer.execute(args.clone()));
        let this = self.clone();
        self.inner.runtime.spawn(async move {
            // The attempt runs on its own task so a panicking operation still
            // reaches the settle bookkeeping below.
            let outcome = match attempt.await {
                Ok(outcome) => outcome,
                Err(join_error) if join_error.is_panic() => Err(RetryError::Panicked),
                Err(_) => Err(RetryError::Aborted),
            };
            let completion = this.finish_execution(execution_id, &args, outcome);
            waiters.settle(&completion);
        });
    }

    fn finish_execution(
        &self,
        execution_id: u64,
        args: &A,
        outcome: Result<T, RetryError<E>>,
    ) -> Completion<T, E> {
        let opts = self.options();
        let enabled = opts.enabled.resolve(self);

        let completion = match outcome {
            Ok(value) => {
                {
                    let _scheduler = self.lock_scheduler();
                    self.commit(enabled, |s| {
                        s.last_result = Some(value.clone());
                        s.success_count += 1;
                    });
                }
                debug!(key = ?self.inner.key, execution_id, "execution succeeded");
                let callback = opts.on_success.as_ref().map(|cb| cb(&value, args, self));
                match callback {
                    Some(Err(e)) => self.fail(execution_id, e, args, &opts),
                    _ => Ok(Some(value)),
                }
            }
            Err(RetryError::Failed(e)) => self.fail(execution_id, e, args, &opts),
            Err(RetryError::Aborted) => {
                debug!(key = ?self.inner.key, execution_id, "execution aborted");
                Ok(None)
            }
            Err(RetryError::Panicked) => {
                warn!(key = ?self.inner.key, execution_id, "execution panicked");
                Ok(None)
            }
        };

        {
            let _scheduler = self.lock_scheduler();
            let still_running = {
                let mut table = self.lock_retryers();
                table.remove(&execution_id);
                !table.is_empty()
            };
            self.commit(enabled, |s| {
                s.is_executing = still_running;
                s.settle_count += 1;
            });
        }

        if let Some(on_settled) = &opts.on_settled {
            if let Err(e) = on_settled(args, self) {
                self.report(execution_id, &e, args, &opts);
            }
        }
        completion
    }

    fn fail(
        &self,
        execution_id: u64,
        e: E,
        args: &A,
        opts: &AsyncDebouncerOptions<A, T, E>,
    ) -> Completion<T, E> {
        {
            let enabled = opts.enabled.resolve(self);
            let _scheduler = self.lock_scheduler();
            self.commit(enabled, |s| s.error_count += 1);
        }
        self.report(execution_id, &e, args, opts);
        if opts.throws() {
            Err(Arc::new(e))
        } else {
            Ok(None)
        }
    }

    fn report(&self, execution_id: u64, e: &E, args: &A, opts: &AsyncDebouncerOptions<A, T, E>) {
        match &opts.on_error {
            Some(on_error) => {
                debug!(key = ?self.inner.key, execution_id, error = %e, "execution failed");
                on_error(e, args, self);
            }
            None => warn!(key = ?self.inner.key, execution_id, error = %e, "execution failed"),
        }
    }

    /// Start the pending execution now. No-op when nothing is pending.
    pub fn flush(&self) {
        let enabled = self.options().enabled.resolve(self);
        let (owed, waiters) = {
            let mut scheduler = self.lock_scheduler();
            let pending = self
                .inner
                .store
                .with_state(|s| s.is_pending && s.last_args.is_some());
            if !pending {
                return;
            }
            scheduler.timers.clear();
            let mut owed = None;
            self.commit(enabled, |s| {
                s.can_leading_execute = true;
                s.is_pending = false;
                owed = s.last_args.take();
            });
            (owed, scheduler.waiters.take())
        };

        match owed {
            Some(args) => {
                debug!(key = ?self.inner.key, "flushing pending execution");
                self.dispatch(args, waiters);
            }
            None => waiters.settle(&Ok(None)),
        }
    }

    /// Drop scheduled work and resolve waiting handles with `Ok(None)`.
    ///
    /// Executions already started keep running; see [`abort`](Self::abort).
    pub fn cancel(&self) {
        let enabled = self.options().enabled.resolve(self);
        let waiters = {
            let mut scheduler = self.lock_scheduler();
            scheduler.timers.clear();
            self.commit(enabled, |s| {
                s.can_leading_execute = true;
                s.is_pending = false;
                s.last_args = None;
            });
            scheduler.waiters.take()
        };
        if !waiters.is_empty() {
            debug!(key = ?self.inner.key, waiters = waiters.len(), "cancelled pending execution");
        }
        waiters.settle(&Ok(None));
    }

    /// Abort every in-flight execution. Scheduled timers are untouched.
    pub fn abort(&self) {
        let enabled = self.options().enabled.resolve(self);
        let drained = {
            let _scheduler = self.lock_scheduler();
            let drained = std::mem::take(&mut *self.lock_retryers());
            self.commit(enabled, |s| s.is_executing = false);
            drained
        };
        for retryer in drained.values() {
            retryer.abort();
        }
    }

    /// Abort signal of execution `execution_id`, or of the most recent
    /// in-flight execution when `None`.
    pub fn abort_signal(&self, execution_id: Option<u64>) -> Option<AbortSignal> {
        let table = self.lock_retryers();
        let retryer = match execution_id {
            Some(id) => table.get(&id),
            None => table.values().next_back(),
        };
        retryer.map(|r| r.abort_signal())
    }

    /// Cancel, restore default state, and reset tracked retryers.
    ///
    /// Executions already started keep running and stay abortable.
    pub fn reset(&self) {
        let enabled = self.options().enabled.resolve(self);
        let waiters = {
            let mut scheduler = self.lock_scheduler();
            scheduler.timers.clear();
            let still_running = {
                let table = self.lock_retryers();
                for retryer in table.values() {
                    retryer.reset();
                }
                !table.is_empty()
            };
            self.commit(enabled, |s| {
                *s = AsyncDebouncerState::default();
                s.is_executing = still_running;
            });
            scheduler.waiters.take()
        };
        waiters.settle(&Ok(None));
    }

    /// Merge-update the options. Disabling cancels pending work but never
    /// aborts started executions.
    pub fn set_options(&self, update: impl FnOnce(&mut AsyncDebouncerOptions<A, T, E>)) {
        match self.inner.options.write() {
            Ok(mut guard) => update(&mut guard),
            Err(poisoned) => update(&mut poisoned.into_inner()),
        }
        let enabled = self.options().enabled.resolve(self);
        if enabled {
            let _scheduler = self.lock_scheduler();
            self.commit(enabled, |_| {});
        } else {
            self.cancel();
        }
    }
}

/// Wrap `operation` in an async debouncer and return a plain callable.
///
/// # Panics
///
/// Panics when called outside a tokio runtime.
pub fn async_debounce<A, T, E, F, Fut>(
    operation: F,
    options: AsyncDebouncerOptions<A, T, E>,
) -> impl Fn(A) -> CompletionHandle<T, E> + Send + Sync + 'static
where
    A: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    E: fmt::Display + Send + Sync + 'static,
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    let debouncer = AsyncDebouncer::new(operation, options);
    move |args| debouncer.maybe_execute(args)
}

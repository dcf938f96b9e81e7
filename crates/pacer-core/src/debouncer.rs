//! Synchronous debouncer.
//!
//! [`Debouncer`] collapses bursts of [`maybe_execute`](Debouncer::maybe_execute)
//! calls into at most one execution per quiet period:
//!
//! - **wait**: every accepted call restarts the wait timer; when it elapses
//!   the latest arguments run on the trailing edge.
//! - **leading**: the first call of a burst runs inside the call itself.
//! - **max_wait**: a second timer started by the first call of a burst and
//!   never restarted mid-burst forces an execution with the latest arguments
//!   once it elapses, so a continuous stream still makes progress.
//!
//! Whichever timer fires first cancels the other and resolves the burst.
//! Timers run on the tokio runtime the debouncer was created on; the wrapped
//! operation is invoked from the calling thread (leading edge, `flush`) or
//! from a runtime worker (trailing edge, max-wait).
//!
//! # Example
//!
//! ```rust,ignore
//! let debouncer = Debouncer::new(
//!     |query: String| search(&query),
//!     DebouncerOptions::default().with_wait(Duration::from_millis(300)),
//! );
//! debouncer.maybe_execute("r".into());
//! debouncer.maybe_execute("ru".into());
//! debouncer.maybe_execute("rust".into()); // only this one runs, 300ms later
//! ```

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tracing::{debug, trace};

use crate::gate::{Status, admits_leading};
use crate::mirror::{self, ListenerGuard, MirrorEvent, MirrorHub, OptionsSnapshot};
use crate::param::Param;
use crate::store::Store;
use crate::timer::BurstTimers;

/// Callback invoked after each execution with its arguments.
pub type OnExecute<A> = Arc<dyn Fn(&A, &Debouncer<A>) + Send + Sync>;

// =============================================================================
// State
// =============================================================================

/// Observable state of a [`Debouncer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebouncerState<A> {
    /// True when the next call may execute on the leading edge.
    pub can_leading_execute: bool,
    pub execution_count: u64,
    /// A trailing execution is scheduled and has not run yet.
    pub is_pending: bool,
    /// Arguments owed to a trailing or max-wait execution.
    pub last_args: Option<A>,
    pub maybe_execute_count: u64,
    pub status: Status,
}

impl<A> Default for DebouncerState<A> {
    fn default() -> Self {
        Self {
            can_leading_execute: true,
            execution_count: 0,
            is_pending: false,
            last_args: None,
            maybe_execute_count: 0,
            status: Status::Idle,
        }
    }
}

// =============================================================================
// Options
// =============================================================================

/// Configuration for a [`Debouncer`].
pub struct DebouncerOptions<A> {
    pub enabled: Param<bool, Debouncer<A>>,
    pub wait: Param<Duration, Debouncer<A>>,
    pub max_wait: Option<Param<Duration, Debouncer<A>>>,
    pub leading: bool,
    pub trailing: bool,
    /// Identity for mirroring; read once at construction.
    pub key: Option<String>,
    pub initial_state: Option<DebouncerState<A>>,
    pub on_execute: Option<OnExecute<A>>,
    /// Hub shared with peers using the same `key`; read once at construction.
    pub mirror: Option<MirrorHub<DebouncerState<A>>>,
}

impl<A> Default for DebouncerOptions<A> {
    fn default() -> Self {
        Self {
            enabled: Param::Value(true),
            wait: Param::Value(Duration::ZERO),
            max_wait: None,
            leading: false,
            trailing: true,
            key: None,
            initial_state: None,
            on_execute: None,
            mirror: None,
        }
    }
}

impl<A: Clone> Clone for DebouncerOptions<A> {
    fn clone(&self) -> Self {
        Self {
            enabled: self.enabled.clone(),
            wait: self.wait.clone(),
            max_wait: self.max_wait.clone(),
            leading: self.leading,
            trailing: self.trailing,
            key: self.key.clone(),
            initial_state: self.initial_state.clone(),
            on_execute: self.on_execute.clone(),
            mirror: self.mirror.clone(),
        }
    }
}

impl<A> fmt::Debug for DebouncerOptions<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebouncerOptions")
            .field("enabled", &self.enabled)
            .field("wait", &self.wait)
            .field("max_wait", &self.max_wait)
            .field("leading", &self.leading)
            .field("trailing", &self.trailing)
            .field("key", &self.key)
            .field("on_execute", &self.on_execute.is_some())
            .field("mirror", &self.mirror.is_some())
            .finish_non_exhaustive()
    }
}

impl<A> DebouncerOptions<A> {
    #[must_use]
    pub fn with_wait(mut self, wait: impl Into<Param<Duration, Debouncer<A>>>) -> Self {
        self.wait = wait.into();
        self
    }

    #[must_use]
    pub fn with_max_wait(mut self, max_wait: impl Into<Param<Duration, Debouncer<A>>>) -> Self {
        self.max_wait = Some(max_wait.into());
        self
    }

    #[must_use]
    pub fn with_enabled(mut self, enabled: impl Into<Param<bool, Debouncer<A>>>) -> Self {
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
    pub fn with_mirror(mut self, hub: MirrorHub<DebouncerState<A>>) -> Self {
        self.mirror = Some(hub);
        self
    }

    #[must_use]
    pub fn with_on_execute(
        mut self,
        on_execute: impl Fn(&A, &Debouncer<A>) + Send + Sync + 'static,
    ) -> Self {
        self.on_execute = Some(Arc::new(on_execute));
        self
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
            throw_on_error: None,
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
    }
}

// =============================================================================
// Debouncer
// =============================================================================

struct Inner<A> {
    id: u64,
    key: Option<String>,
    operation: Box<dyn Fn(A) + Send + Sync>,
    options: RwLock<DebouncerOptions<A>>,
    store: Store<DebouncerState<A>>,
    /// Scheduler lock: every state transition happens while holding it.
    timers: Mutex<BurstTimers>,
    runtime: Handle,
    mirror: Option<MirrorHub<DebouncerState<A>>>,
    _listener: Option<ListenerGuard>,
}

/// Debounces a synchronous operation. Cheap to clone; clones share state.
///
/// Dropping the last clone aborts any scheduled execution.
pub struct Debouncer<A> {
    inner: Arc<Inner<A>>,
}

impl<A> Clone for Debouncer<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A> fmt::Debug for Debouncer<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Debouncer")
            .field("id", &self.inner.id)
            .field("key", &self.inner.key)
            .finish_non_exhaustive()
    }
}

impl<A> Debouncer<A>
where
    A: Clone + Send + Sync + 'static,
{
    /// Create a debouncer on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime; use [`Debouncer::new_in`]
    /// from plain threads.
    pub fn new(operation: impl Fn(A) + Send + Sync + 'static, options: DebouncerOptions<A>) -> Self {
        Self::new_in(Handle::current(), operation, options)
    }

    /// Create a debouncer whose timers run on `runtime`.
    pub fn new_in(
        runtime: Handle,
        operation: impl Fn(A) + Send + Sync + 'static,
        options: DebouncerOptions<A>,
    ) -> Self {
        let id = mirror::next_instance_id();
        let key = options.key.clone();
        let hub = options.mirror.clone();
        let initial = options.initial_state.clone().unwrap_or_default();

        let inner = Arc::new_cyclic(|weak: &Weak<Inner<A>>| {
            let listener = match (&key, &hub) {
                (Some(key), Some(hub)) => Some(mirror::spawn_listener(
                    &runtime,
                    hub,
                    key.clone(),
                    id,
                    weak.clone(),
                    |inner: Arc<Inner<A>>, event: &MirrorEvent<DebouncerState<A>>| {
                        Debouncer { inner }.adopt(event);
                    },
                )),
                _ => None,
            };
            Inner {
                id,
                key,
                operation: Box::new(operation),
                options: RwLock::new(options),
                store: Store::new(initial),
                timers: Mutex::new(BurstTimers::new()),
                runtime,
                mirror: hub,
                _listener: listener,
            }
        });

        let debouncer = Self { inner };
        let enabled = debouncer.options().enabled.resolve(&debouncer);
        debouncer
            .inner
            .store
            .set_state(|s| s.status = Status::derive(enabled, false, s.is_pending, false));
        debouncer
    }

    // ── accessors ──

    /// Snapshot of the current options.
    pub fn options(&self) -> DebouncerOptions<A> {
        match self.inner.options.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> DebouncerState<A> {
        self.inner.store.state()
    }

    pub fn store(&self) -> &Store<DebouncerState<A>> {
        &self.inner.store
    }

    pub fn key(&self) -> Option<&str> {
        self.inner.key.as_deref()
    }

    fn lock_timers(&self) -> MutexGuard<'_, BurstTimers> {
        match self.inner.timers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn downgrade(&self) -> Weak<Inner<A>> {
        Arc::downgrade(&self.inner)
    }

    fn upgrade(weak: &Weak<Inner<A>>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    /// Apply `update`, derive status, publish to mirrored peers.
    fn commit(&self, enabled: bool, update: impl FnOnce(&mut DebouncerState<A>)) {
        self.inner.store.set_state(|s| {
            update(s);
            s.status = Status::derive(enabled, false, s.is_pending, false);
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

    fn adopt(&self, event: &MirrorEvent<DebouncerState<A>>) {
        match self.inner.options.write() {
            Ok(mut guard) => guard.adopt(&event.options),
            Err(poisoned) => poisoned.into_inner().adopt(&event.options),
        }
        let enabled = self.options().enabled.resolve(self);
        let _timers = self.lock_timers();
        self.inner.store.set_state(|s| {
            *s = event.state.clone();
            s.status = Status::derive(enabled, false, s.is_pending, false);
        });
    }

    // ── scheduling ──

    /// Submit a call. Runs it now (leading edge), later (trailing edge or
    /// max-wait), or not at all, depending on the options.
    ///
    /// Ignored entirely while disabled.
    pub fn maybe_execute(&self, args: A) {
        let opts = self.options();
        if !opts.enabled.resolve(self) {
            trace!(key = ?self.inner.key, "call ignored while disabled");
            return;
        }
        let wait = opts.wait.resolve(self);
        let max_wait = opts.max_wait.as_ref().map(|p| p.resolve(self));
        let owes_later = opts.trailing || max_wait.is_some();

        let leading_args = {
            let mut timers = self.lock_timers();

            if let Some(max_wait) = max_wait {
                if !timers.max_wait.is_armed() {
                    let weak = self.downgrade();
                    timers.max_wait.arm(&self.inner.runtime, max_wait, move |generation| {
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
            timers.wait.arm(&self.inner.runtime, wait, move |generation| {
                if let Some(debouncer) = Self::upgrade(&weak) {
                    debouncer.on_wait_elapsed(generation);
                }
            });
            leading_args
        };

        if let Some(args) = leading_args {
            debug!(key = ?self.inner.key, "leading edge execution");
            self.execute(args);
        }
    }

    fn on_wait_elapsed(&self, generation: u64) {
        let opts = self.options();
        let enabled = opts.enabled.resolve(self);
        let owed = {
            let mut timers = self.lock_timers();
            if !timers.wait.claim(generation) {
                return;
            }
            timers.max_wait.cancel();
            let mut owed = None;
            self.commit(enabled, |s| {
                s.can_leading_execute = true;
                s.is_pending = false;
                owed = s.last_args.take();
            });
            owed
        };

        if opts.trailing {
            if let Some(args) = owed {
                debug!(key = ?self.inner.key, "trailing edge execution");
                self.execute(args);
            }
        }
    }

    fn on_max_wait_elapsed(&self, generation: u64) {
        let enabled = self.options().enabled.resolve(self);
        let owed = {
            let mut timers = self.lock_timers();
            if !timers.max_wait.claim(generation) {
                return;
            }
            timers.wait.cancel();
            let mut owed = None;
            self.commit(enabled, |s| {
                s.can_leading_execute = true;
                s.is_pending = false;
                owed = s.last_args.take();
            });
            owed
        };

        if let Some(args) = owed {
            debug!(key = ?self.inner.key, "max wait reached, forcing execution");
            self.execute(args);
        }
    }

    fn execute(&self, args: A) {
        let opts = self.options();
        let enabled = opts.enabled.resolve(self);
        if !enabled {
            return;
        }
        let callback_args = opts.on_execute.as_ref().map(|_| args.clone());
        (self.inner.operation)(args);
        self.commit(enabled, |s| s.execution_count += 1);
        if let (Some(on_execute), Some(args)) = (&opts.on_execute, callback_args) {
            on_execute(&args, self);
        }
    }

    /// Run the pending trailing execution now. No-op when nothing is pending.
    pub fn flush(&self) {
        let enabled = self.options().enabled.resolve(self);
        let owed = {
            let mut timers = self.lock_timers();
            let pending = self
                .inner
                .store
                .with_state(|s| s.is_pending && s.last_args.is_some());
            if !pending {
                return;
            }
            timers.clear();
            let mut owed = None;
            self.commit(enabled, |s| {
                s.can_leading_execute = true;
                s.is_pending = false;
                owed = s.last_args.take();
            });
            owed
        };

        if let Some(args) = owed {
            debug!(key = ?self.inner.key, "flushing pending execution");
            self.execute(args);
        }
    }

    /// Drop any scheduled execution and end the current burst.
    pub fn cancel(&self) {
        let enabled = self.options().enabled.resolve(self);
        let mut timers = self.lock_timers();
        timers.clear();
        self.commit(enabled, |s| {
            s.can_leading_execute = true;
            s.is_pending = false;
            s.last_args = None;
        });
    }

    /// Cancel and restore default state, counters included.
    pub fn reset(&self) {
        let enabled = self.options().enabled.resolve(self);
        let mut timers = self.lock_timers();
        timers.clear();
        self.commit(enabled, |s| *s = DebouncerState::default());
    }

    /// Merge-update the options. Disabling cancels pending work.
    pub fn set_options(&self, update: impl FnOnce(&mut DebouncerOptions<A>)) {
        match self.inner.options.write() {
            Ok(mut guard) => update(&mut guard),
            Err(poisoned) => update(&mut poisoned.into_inner()),
        }
        let enabled = self.options().enabled.resolve(self);
        if enabled {
            let _timers = self.lock_timers();
            self.commit(enabled, |_| {});
        } else {
            self.cancel();
        }
    }
}

/// Wrap `operation` in a debouncer and return a plain callable.
///
/// # Panics
///
/// Panics when called outside a tokio runtime.
pub fn debounce<A>(
    operation: impl Fn(A) + Send + Sync + 'static,
    options: DebouncerOptions<A>,
) -> impl Fn(A) + Send + Sync + 'static
where
    A: Clone + Send + Sync + 'static,
{
    let debouncer = Debouncer::new(operation, options);
    move |args| debouncer.maybe_execute(args)
}

//! pacer-core: debounce engines for sync and async operations
//!
//! A debouncer collapses a burst of calls into as few executions as its
//! options allow: on the leading edge, on the trailing edge after a quiet
//! period, or forced once `max_wait` has elapsed since the burst began.
//!
//! # Architecture
//!
//! ```text
//! maybe_execute ─→ gate (enabled / leading) ─→ BurstTimers { wait, max_wait }
//!                                                   ↓
//!                       Debouncer: operation(args)    AsyncDebouncer: AsyncRetryer
//!                                   ↓                                 ↓
//!                               Store<State> ─→ MirrorHub      Waiters ─→ CompletionHandle
//! ```
//!
//! # Modules
//!
//! - `debouncer`: synchronous engine
//! - `async_debouncer`: async engine with completion handles, retries and abort
//! - `param`: literal-or-resolver option values
//! - `timer`: cancellable one-shot timer slots
//! - `gate`: status derivation and leading-edge admission
//! - `completion`: completion handles and per-burst waiter sets
//! - `retry`: retry policy, abort handles, async retryer
//! - `store`: observable state cells
//! - `mirror`: keyed state sharing between instances
//! - `config`: TOML configuration
//! - `logging`: tracing subscriber setup
//!
//! # Safety
//!
//! This crate forbids unsafe code.

#![forbid(unsafe_code)]

pub mod async_debouncer;
pub mod completion;
pub mod config;
pub mod debouncer;
pub mod error;
pub mod gate;
pub mod logging;
pub mod mirror;
pub mod param;
pub mod retry;
pub mod store;
pub mod timer;

pub use async_debouncer::{AsyncDebouncer, AsyncDebouncerOptions, AsyncDebouncerState, async_debounce};
pub use completion::{Completion, CompletionHandle};
pub use config::{DebounceConfig, PacerConfig, RetryConfig};
pub use debouncer::{Debouncer, DebouncerOptions, DebouncerState, debounce};
pub use error::{Error, Result};
pub use gate::Status;
pub use mirror::MirrorHub;
pub use param::{Param, coerce_millis};
pub use retry::{AbortController, AbortSignal, RetryError, RetryPolicy};
pub use store::Store;

/// Version of the pacer-core crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

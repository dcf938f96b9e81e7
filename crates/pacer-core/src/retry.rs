//! Retry with exponential backoff, plus abort handles.
//!
//! Every async debounced execution runs inside its own [`AsyncRetryer`]. The
//! retryer invokes the operation, retries failures according to a
//! [`RetryPolicy`], and stops early when its [`AbortSignal`] fires.
//!
//! # Usage
//!
//! ```rust,ignore
//! use pacer_core::retry::{AsyncRetryer, RetryPolicy};
//!
//! let retryer = AsyncRetryer::new(operation, RetryPolicy::default(), 1);
//! let signal = retryer.abort_signal();
//! let result = retryer.execute(args).await;
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Boxed, sendable future used at the operation boundary.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A shared async operation: arguments in, fallible result out.
pub type AsyncOperation<A, T, E> = Arc<dyn Fn(A) -> BoxFuture<'static, Result<T, E>> + Send + Sync>;

/// Wrap an async function as an [`AsyncOperation`].
pub fn operation_fn<A, T, E, F, Fut>(f: F) -> AsyncOperation<A, T, E>
where
    A: 'static,
    T: 'static,
    E: 'static,
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    Arc::new(move |args: A| -> BoxFuture<'static, Result<T, E>> { Box::pin(f(args)) })
}

/// Configuration for retry behavior with exponential backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Initial delay before first retry (default: 100ms).
    pub initial_delay: Duration,
    /// Maximum delay between retries (default: 30s).
    pub max_delay: Duration,
    /// Multiplier applied to delay after each retry (default: 2.0).
    pub backoff_factor: f64,
    /// Random jitter range as percentage (default: 0.1 = ±10%).
    pub jitter_percent: f64,
    /// Maximum number of attempts. None = retry forever (use with caution).
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
            jitter_percent: 0.1,
            max_attempts: Some(3),
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy with the specified parameters.
    #[must_use]
    pub fn new(
        initial_delay: Duration,
        max_delay: Duration,
        backoff_factor: f64,
        jitter_percent: f64,
        max_attempts: Option<u32>,
    ) -> Self {
        Self {
            initial_delay,
            max_delay,
            backoff_factor: backoff_factor.max(1.0),
            jitter_percent: jitter_percent.clamp(0.0, 1.0),
            max_attempts,
        }
    }

    /// No retries: the first failure is final. Default for debounced executions.
    #[must_use]
    pub fn single_attempt() -> Self {
        Self {
            max_attempts: Some(1),
            ..Self::default()
        }
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    #[must_use]
    #[allow(clippy::cast_precision_loss)] // ms values are well within f64 precision for delays
    #[allow(clippy::cast_possible_wrap)] // attempt is capped at 31, safe for i32
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let initial_ms = u64::try_from(self.initial_delay.as_millis()).unwrap_or(u64::MAX);
        let max_ms = u64::try_from(self.max_delay.as_millis()).unwrap_or(u64::MAX);

        // Cap exponent to prevent overflow in powi
        let exp = attempt.min(31) as i32;
        let base_ms = (initial_ms as f64) * self.backoff_factor.powi(exp);
        let base_ms = base_ms.min(max_ms as f64);

        let jitter = if self.jitter_percent > 0.0 && base_ms > 0.0 {
            let mut rng = rand::rng();
            let jitter_range = base_ms * self.jitter_percent;
            rng.random_range(-jitter_range..=jitter_range)
        } else {
            0.0
        };

        let delay_ms = (base_ms + jitter).max(0.0);
        Duration::from_millis(delay_ms as u64)
    }
}

// =============================================================================
// Abort handles
// =============================================================================

/// Owner side of an abort handle.
#[derive(Debug, Clone)]
pub struct AbortController {
    tx: Arc<watch::Sender<bool>>,
}

impl AbortController {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    #[must_use]
    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Idempotent.
    pub fn abort(&self) {
        self.tx.send_replace(true);
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for AbortController {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer side of an abort handle, handed to callers and operations.
#[derive(Debug, Clone)]
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
}

impl AbortSignal {
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the signal is aborted; never resolves if the controller
    /// is dropped without aborting.
    pub async fn aborted(&self) {
        let mut rx = self.rx.clone();
        let closed = rx.wait_for(|aborted| *aborted).await.is_err();
        if closed {
            std::future::pending::<()>().await;
        }
    }
}

// =============================================================================
// Retryer
// =============================================================================

/// Terminal failure of a retried execution.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    #[error("execution aborted")]
    Aborted,
    /// The task driving the execution panicked or was torn down.
    #[error("execution panicked")]
    Panicked,
    #[error("{0}")]
    Failed(E),
}

/// Runs one execution of an [`AsyncOperation`] with retries and an abort handle.
pub struct AsyncRetryer<A, T, E> {
    operation: AsyncOperation<A, T, E>,
    policy: RetryPolicy,
    execution_id: u64,
    controller: Mutex<AbortController>,
    attempts: Arc<AtomicU32>,
}

impl<A, T, E> AsyncRetryer<A, T, E>
where
    A: Clone + Send + 'static,
    T: Send + 'static,
    E: fmt::Display + Send + 'static,
{
    pub fn new(operation: AsyncOperation<A, T, E>, policy: RetryPolicy, execution_id: u64) -> Self {
        Self {
            operation,
            policy,
            execution_id,
            controller: Mutex::new(AbortController::new()),
            attempts: Arc::new(AtomicU32::new(0)),
        }
    }

    #[must_use]
    pub fn execution_id(&self) -> u64 {
        self.execution_id
    }

    /// Number of attempts started by the current execution.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    fn controller(&self) -> AbortController {
        match self.controller.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Signal that fires when this retryer is aborted.
    #[must_use]
    pub fn abort_signal(&self) -> AbortSignal {
        self.controller().signal()
    }

    /// Stop the in-flight execution at its next await point.
    pub fn abort(&self) {
        debug!(execution_id = self.execution_id, "aborting execution");
        self.controller().abort();
    }

    /// Clear the attempt counter.
    ///
    /// A live abort handle is kept so a running execution stays abortable;
    /// only an already aborted handle is replaced.
    pub fn reset(&self) {
        let mut guard = match self.controller.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if guard.is_aborted() {
            *guard = AbortController::new();
        }
        self.attempts.store(0, Ordering::SeqCst);
    }

    /// Start the execution.
    ///
    /// The first attempt is invoked before this returns; the returned future
    /// drives it and any retries to completion.
    pub fn execute(&self, args: A) -> BoxFuture<'static, Result<T, RetryError<E>>> {
        let operation = Arc::clone(&self.operation);
        let policy = self.policy.clone();
        let signal = self.abort_signal();
        let attempts = Arc::clone(&self.attempts);
        let execution_id = self.execution_id;

        attempts.store(1, Ordering::SeqCst);
        let first = operation(args.clone());

        Box::pin(async move {
            let mut pending = first;
            let mut attempt = 0u32;
            loop {
                let outcome = tokio::select! {
                    biased;
                    () = signal.aborted() => return Err(RetryError::Aborted),
                    outcome = &mut pending => outcome,
                };

                let e = match outcome {
                    Ok(value) => {
                        if attempt > 0 {
                            debug!(
                                execution_id,
                                total_attempts = attempt + 1,
                                "Operation succeeded after retries"
                            );
                        }
                        return Ok(value);
                    }
                    Err(e) => e,
                };

                attempt += 1;
                if let Some(max) = policy.max_attempts {
                    if attempt >= max {
                        if max > 1 {
                            warn!(
                                execution_id,
                                attempt,
                                max_attempts = max,
                                error = %e,
                                "Operation failed after all retry attempts"
                            );
                        }
                        return Err(RetryError::Failed(e));
                    }
                }

                let delay = policy.delay_for_attempt(attempt - 1);
                debug!(
                    execution_id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retrying operation after failure"
                );
                tokio::select! {
                    biased;
                    () = signal.aborted() => return Err(RetryError::Aborted),
                    () = tokio::time::sleep(delay) => {}
                }

                attempts.fetch_add(1, Ordering::SeqCst);
                pending = operation(args.clone());
            }
        })
    }
}

impl<A, T, E> fmt::Debug for AsyncRetryer<A, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncRetryer")
            .field("execution_id", &self.execution_id)
            .field("policy", &self.policy)
            .field("attempts", &self.attempts.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

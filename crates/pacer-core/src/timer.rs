//! Timer slots backing the wait and max-wait schedulers.
//!
//! A [`TimerSlot`] owns at most one spawned sleep task. Arming replaces the
//! live task, cancelling aborts it. Every arm or cancel bumps the slot's
//! generation; the fire callback receives the generation it was armed with
//! and must [`claim`](TimerSlot::claim) it under the owner's lock before
//! acting. A task that woke up after being superseded fails the claim and
//! does nothing, even if its abort raced with the wake-up.

use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::trace;

/// One resettable timer.
#[derive(Debug)]
pub struct TimerSlot {
    name: &'static str,
    handle: Option<JoinHandle<()>>,
    generation: u64,
}

impl TimerSlot {
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            handle: None,
            generation: 0,
        }
    }

    /// Replace any live timer with one firing `fire(generation)` after `delay`.
    ///
    /// A zero delay still goes through the runtime, so `fire` never runs
    /// inside this call.
    pub fn arm(
        &mut self,
        runtime: &Handle,
        delay: Duration,
        fire: impl FnOnce(u64) + Send + 'static,
    ) -> u64 {
        self.cancel();
        let generation = self.generation;
        trace!(
            timer = self.name,
            generation,
            delay_ms = delay.as_millis() as u64,
            "timer armed"
        );
        self.handle = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            fire(generation);
        }));
        generation
    }

    /// Abort the live timer, if any. Returns whether one was live.
    pub fn cancel(&mut self) -> bool {
        self.generation = self.generation.wrapping_add(1);
        match self.handle.take() {
            Some(handle) => {
                handle.abort();
                trace!(timer = self.name, "timer cancelled");
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.handle.is_some()
    }

    /// Called from a fire callback: true if `generation` is still current.
    ///
    /// A successful claim disarms the slot without aborting the caller's own
    /// task.
    pub fn claim(&mut self, generation: u64) -> bool {
        if generation != self.generation || self.handle.is_none() {
            trace!(timer = self.name, generation, "stale timer fire ignored");
            return false;
        }
        self.handle = None;
        self.generation = self.generation.wrapping_add(1);
        true
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// The pair of timers governing one burst.
#[derive(Debug)]
pub struct BurstTimers {
    pub wait: TimerSlot,
    pub max_wait: TimerSlot,
}

impl BurstTimers {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            wait: TimerSlot::new("wait"),
            max_wait: TimerSlot::new("max_wait"),
        }
    }

    /// Cancel both timers.
    pub fn clear(&mut self) {
        self.wait.cancel();
        self.max_wait.cancel();
    }
}

impl Default for BurstTimers {
    fn default() -> Self {
        Self::new()
    }
}

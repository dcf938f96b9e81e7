//! Property-based tests for the debounce engines.
//!
//! Invariants tested:
//! 1. A trailing-only burst with gaps shorter than `wait` executes exactly once, with the last args
//! 2. Leading + trailing bursts execute the first args, then the last args when there is more than one call
//! 3. Executions never outnumber accepted calls
//! 4. With `max_wait`, a continuous burst is never starved for longer than `max_wait`
//! 5. A disabled debouncer never executes and never counts calls
//! 6. Status derivation follows disabled > executing > pending > settled > idle
//! 7. `coerce_millis` never panics and maps bad input to zero
//! 8. Every async handle in a trailing burst resolves to the same value

use std::sync::{Arc, Mutex};
use std::time::Duration;

use pacer_core::{
    AsyncDebouncer, AsyncDebouncerOptions, Debouncer, DebouncerOptions, Status, coerce_millis,
};
use proptest::prelude::*;
use tokio::time::Instant;

// ────────────────────────────────────────────────────────────────────
// Helpers
// ────────────────────────────────────────────────────────────────────

fn paused_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .start_paused(true)
        .build()
        .unwrap()
}

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

type Log = Arc<Mutex<Vec<(u32, Duration)>>>;

/// Debouncer recording each executed argument with its offset from `start`.
fn recording(start: Instant, options: DebouncerOptions<u32>) -> (Debouncer<u32>, Log) {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    let debouncer = Debouncer::new(
        move |n: u32| sink.lock().unwrap().push((n, start.elapsed())),
        options,
    );
    (debouncer, log)
}

// ────────────────────────────────────────────────────────────────────
// Strategies
// ────────────────────────────────────────────────────────────────────

fn arb_wait() -> impl Strategy<Value = u64> {
    10u64..500
}

/// Gaps strictly shorter than `wait`, so the calls form one burst.
fn arb_burst(wait: u64) -> impl Strategy<Value = Vec<u64>> {
    prop::collection::vec(0..wait, 1..20)
}

fn arb_millis() -> impl Strategy<Value = f64> {
    prop_oneof![
        Just(f64::NAN),
        Just(f64::INFINITY),
        Just(f64::NEG_INFINITY),
        Just(1e300),
        Just(f64::MAX),
        -1.0e6f64..1.0e6,
        0.0f64..10_000.0,
    ]
}

// ────────────────────────────────────────────────────────────────────
// Properties
// ────────────────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_trailing_burst_executes_once_with_last_args(
        (wait, gaps) in arb_wait().prop_flat_map(|w| (Just(w), arb_burst(w)))
    ) {
        let rt = paused_runtime();
        let (executed, count) = rt.block_on(async {
            let start = Instant::now();
            let (debouncer, log) =
                recording(start, DebouncerOptions::default().with_wait(ms(wait)));
            for (i, gap) in gaps.iter().enumerate() {
                if i > 0 {
                    tokio::time::sleep(ms(*gap)).await;
                }
                debouncer.maybe_execute(u32::try_from(i).unwrap());
            }
            tokio::time::sleep(ms(wait + 1)).await;
            let executed = log.lock().unwrap().clone();
            (executed, debouncer.state().maybe_execute_count)
        });

        prop_assert_eq!(executed.len(), 1);
        prop_assert_eq!(executed[0].0, u32::try_from(gaps.len() - 1).unwrap());
        let last_call: u64 = gaps.iter().skip(1).sum();
        prop_assert!(executed[0].1 >= ms(last_call + wait));
        prop_assert!(executed[0].1 <= ms(last_call + wait + 1));
        prop_assert_eq!(count, gaps.len() as u64);
    }

    #[test]
    fn prop_leading_and_trailing_edges(
        (wait, gaps) in arb_wait().prop_flat_map(|w| (Just(w), arb_burst(w)))
    ) {
        let rt = paused_runtime();
        let executed = rt.block_on(async {
            let (debouncer, log) = recording(
                Instant::now(),
                DebouncerOptions::default().with_wait(ms(wait)).with_leading(true),
            );
            for (i, gap) in gaps.iter().enumerate() {
                if i > 0 {
                    tokio::time::sleep(ms(*gap)).await;
                }
                debouncer.maybe_execute(u32::try_from(i).unwrap());
            }
            tokio::time::sleep(ms(wait + 1)).await;
            let executed: Vec<u32> = log.lock().unwrap().iter().map(|(n, _)| *n).collect();
            executed
        });

        let last = u32::try_from(gaps.len() - 1).unwrap();
        if gaps.len() == 1 {
            prop_assert_eq!(executed, vec![0]);
        } else {
            prop_assert_eq!(executed, vec![0, last]);
        }
    }

    #[test]
    fn prop_executions_never_exceed_calls(
        gaps in prop::collection::vec(0u64..300, 1..30),
        wait in arb_wait(),
        max_wait in prop::option::of(50u64..400),
        leading in any::<bool>(),
        trailing in any::<bool>(),
    ) {
        let rt = paused_runtime();
        let (executions, calls) = rt.block_on(async {
            let mut options = DebouncerOptions::default()
                .with_wait(ms(wait))
                .with_leading(leading)
                .with_trailing(trailing);
            if let Some(max_wait) = max_wait {
                options = options.with_max_wait(ms(max_wait));
            }
            let (debouncer, log) = recording(Instant::now(), options);
            for (i, gap) in gaps.iter().enumerate() {
                tokio::time::sleep(ms(*gap)).await;
                debouncer.maybe_execute(u32::try_from(i).unwrap());
            }
            tokio::time::sleep(ms(wait.max(max_wait.unwrap_or(0)) + 1)).await;
            let executions = log.lock().unwrap().len() as u64;
            (executions, debouncer.state().maybe_execute_count)
        });

        prop_assert!(executions <= calls);
        prop_assert_eq!(calls, gaps.len() as u64);
    }

    #[test]
    fn prop_max_wait_bounds_starvation(
        gap in 1u64..50,
        calls in 10usize..60,
        max_wait in 60u64..300,
    ) {
        // wait always exceeds the gap, so only max-wait can fire mid-stream
        let wait = gap * 4;
        let rt = paused_runtime();
        let executed = rt.block_on(async {
            let (debouncer, log) = recording(
                Instant::now(),
                DebouncerOptions::default()
                    .with_wait(ms(wait))
                    .with_max_wait(ms(max_wait)),
            );
            for i in 0..calls {
                if i > 0 {
                    tokio::time::sleep(ms(gap)).await;
                }
                debouncer.maybe_execute(u32::try_from(i).unwrap());
            }
            let executed = log.lock().unwrap().clone();
            executed
        });

        let stream_end = ms(gap * (calls as u64 - 1));
        let mut previous = Duration::ZERO;
        for (_, at) in &executed {
            prop_assert!(*at - previous <= ms(max_wait + gap));
            previous = *at;
        }
        prop_assert!(stream_end - previous <= ms(max_wait + gap));
    }

    #[test]
    fn prop_disabled_never_executes(
        gaps in prop::collection::vec(0u64..100, 1..15),
        leading in any::<bool>(),
    ) {
        let rt = paused_runtime();
        let (executions, state) = rt.block_on(async {
            let (debouncer, log) = recording(
                Instant::now(),
                DebouncerOptions::default()
                    .with_wait(ms(20))
                    .with_leading(leading)
                    .with_enabled(false),
            );
            for (i, gap) in gaps.iter().enumerate() {
                tokio::time::sleep(ms(*gap)).await;
                debouncer.maybe_execute(u32::try_from(i).unwrap());
            }
            tokio::time::sleep(ms(100)).await;
            let executions = log.lock().unwrap().len();
            (executions, debouncer.state())
        });

        prop_assert_eq!(executions, 0);
        prop_assert_eq!(state.maybe_execute_count, 0);
        prop_assert_eq!(state.status, Status::Disabled);
    }

    #[test]
    fn prop_status_priority(
        enabled in any::<bool>(),
        executing in any::<bool>(),
        pending in any::<bool>(),
        settled in any::<bool>(),
    ) {
        let status = Status::derive(enabled, executing, pending, settled);
        let expected = if !enabled {
            Status::Disabled
        } else if executing {
            Status::Executing
        } else if pending {
            Status::Pending
        } else if settled {
            Status::Settled
        } else {
            Status::Idle
        };
        prop_assert_eq!(status, expected);
    }

    #[test]
    fn prop_coerce_millis_total(value in arb_millis()) {
        let coerced = coerce_millis(value);
        if value.is_finite() && value / 1000.0 >= Duration::MAX.as_secs_f64() {
            prop_assert_eq!(coerced, Duration::MAX);
        } else if value.is_finite() && value > 0.0 {
            let back = coerced.as_secs_f64() * 1000.0;
            prop_assert!((back - value).abs() < 1e-3);
        } else {
            prop_assert_eq!(coerced, Duration::ZERO);
        }
    }

    #[test]
    fn prop_async_burst_handles_share_outcome(
        (wait, gaps) in arb_wait().prop_flat_map(|w| (Just(w), arb_burst(w)))
    ) {
        let rt = paused_runtime();
        let outcomes = rt.block_on(async {
            let debouncer: AsyncDebouncer<u32, u32, String> = AsyncDebouncer::new(
                |n: u32| async move { Ok(n * 10) },
                AsyncDebouncerOptions::default().with_wait(ms(wait)),
            );
            let mut handles = Vec::new();
            for (i, gap) in gaps.iter().enumerate() {
                if i > 0 {
                    tokio::time::sleep(ms(*gap)).await;
                }
                handles.push(debouncer.maybe_execute(u32::try_from(i).unwrap()));
            }
            let mut outcomes = Vec::new();
            for handle in handles {
                outcomes.push(handle.await.unwrap());
            }
            outcomes
        });

        let expected = u32::try_from(gaps.len() - 1).unwrap() * 10;
        for outcome in outcomes {
            prop_assert_eq!(outcome, Some(expected));
        }
    }
}

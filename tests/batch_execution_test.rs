//! Batch Execution Tests
//!
//! Properties of the bounded-concurrency executor: cardinality, order
//! preservation, the concurrency ceiling, fail-fast short-circuiting, and
//! default-concurrency resolution.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;

use bulkflow::batch::{operation, run_batched, BatchExecutor, BatchOptions, Operation, Outcome};
use bulkflow::transport::{ConcurrencySource, TransportConcurrency, TransportProfile};

/// Capture executor logs when RUST_LOG is set; safe to call from every test.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Counters shared by instrumented operations.
#[derive(Default)]
struct Probe {
    invocations: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    settled: AtomicUsize,
}

fn tracked_op(index: usize, delay: Duration, probe: Arc<Probe>) -> Operation<usize, String> {
    operation(move || async move {
        probe.invocations.fetch_add(1, Ordering::SeqCst);
        let now = probe.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        probe.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(delay).await;

        probe.in_flight.fetch_sub(1, Ordering::SeqCst);
        probe.settled.fetch_add(1, Ordering::SeqCst);
        Ok(index)
    })
}

#[tokio::test]
async fn test_cardinality_every_operation_invoked_once() {
    init_tracing();
    let probe = Arc::new(Probe::default());
    let operations = (0..25)
        .map(|i| tracked_op(i, Duration::from_millis(2), probe.clone()))
        .collect();

    let outcomes = BatchExecutor::new()
        .with_concurrency(4)
        .execute(operations)
        .await
        .expect("settle-all run should resolve");

    assert_eq!(outcomes.len(), 25);
    assert_eq!(probe.invocations.load(Ordering::SeqCst), 25);
    assert!(outcomes.iter().all(Outcome::is_fulfilled));
}

#[tokio::test]
async fn test_order_preservation_under_out_of_order_completion() {
    // Earlier indices sleep longer, so completion order inverts dispatch
    // order. Outcomes must still land at their input index.
    let probe = Arc::new(Probe::default());
    let operations = (0..8)
        .map(|i| tracked_op(i, Duration::from_millis(40 - 5 * i as u64), probe.clone()))
        .collect();

    let outcomes = BatchExecutor::new()
        .with_concurrency(8)
        .execute(operations)
        .await
        .expect("settle-all run should resolve");

    for (i, outcome) in outcomes.iter().enumerate() {
        assert_eq!(outcome.value(), Some(&i), "outcome {} misplaced", i);
    }
}

#[tokio::test]
async fn test_concurrency_ceiling_is_respected() {
    let probe = Arc::new(Probe::default());
    let operations = (0..20)
        .map(|i| tracked_op(i, Duration::from_millis(10), probe.clone()))
        .collect();

    BatchExecutor::new()
        .with_concurrency(3)
        .execute(operations)
        .await
        .expect("settle-all run should resolve");

    assert!(
        probe.peak_in_flight.load(Ordering::SeqCst) <= 3,
        "observed {} operations in flight with a ceiling of 3",
        probe.peak_in_flight.load(Ordering::SeqCst)
    );
}

#[tokio::test]
async fn test_empty_input_resolves_immediately() {
    let operations: Vec<Operation<u32, String>> = Vec::new();
    let outcomes = run_batched(operations, BatchOptions::default())
        .await
        .expect("empty batch should resolve");
    assert!(outcomes.is_empty());
}

#[tokio::test]
async fn test_rejections_do_not_stop_sibling_slots() {
    let operations = (0..6)
        .map(|i| {
            operation(move || async move {
                if i % 2 == 0 {
                    Err(format!("op {} failed", i))
                } else {
                    Ok(i)
                }
            })
        })
        .collect();

    let outcomes = BatchExecutor::new()
        .with_concurrency(2)
        .execute(operations)
        .await
        .expect("settle-all run should resolve");

    assert_eq!(outcomes.len(), 6);
    assert_eq!(outcomes.iter().filter(|o| o.is_rejected()).count(), 3);
    assert_eq!(outcomes[3].value(), Some(&3));
    assert_eq!(
        outcomes[4].reason().map(String::as_str),
        Some("op 4 failed")
    );
}

#[tokio::test]
async fn test_fail_fast_short_circuits_before_slow_siblings_settle() {
    let slow = Duration::from_millis(500);
    let operations: Vec<Operation<u32, String>> = vec![
        operation(move || async move {
            tokio::time::sleep(slow).await;
            Ok(0)
        }),
        operation(|| async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Err("first rejection".to_string())
        }),
        operation(move || async move {
            tokio::time::sleep(slow).await;
            Ok(2)
        }),
        operation(move || async move {
            tokio::time::sleep(slow).await;
            Ok(3)
        }),
    ];

    let started = Instant::now();
    let result = BatchExecutor::new()
        .with_concurrency(2)
        .with_fail_fast(true)
        .execute(operations)
        .await;

    assert_eq!(result.unwrap_err(), "first rejection");
    assert!(
        started.elapsed() < Duration::from_millis(400),
        "short-circuit waited for slow siblings: {:?}",
        started.elapsed()
    );
}

#[tokio::test]
async fn test_fail_fast_stops_scheduling_remaining_operations() {
    // With one slot, the failure aborts the run before any later index is
    // pulled off the cursor.
    let probe = Arc::new(Probe::default());
    let mut operations: Vec<Operation<usize, String>> =
        vec![operation(|| async { Err("boom".to_string()) })];
    for i in 1..6 {
        operations.push(tracked_op(i, Duration::from_millis(1), probe.clone()));
    }

    let result = BatchExecutor::new()
        .with_concurrency(1)
        .with_fail_fast(true)
        .execute(operations)
        .await;

    assert_eq!(result.unwrap_err(), "boom");
    assert_eq!(probe.invocations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_fail_fast_lets_launched_siblings_run_to_completion() {
    // The sibling in flight when the failure lands is not cancelled; its
    // result is simply dropped. A second, later rejection is swallowed
    // without surfacing anywhere.
    let probe = Arc::new(Probe::default());
    let sibling_probe = probe.clone();

    let operations: Vec<Operation<usize, String>> = vec![
        operation(|| async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Err("first rejection".to_string())
        }),
        operation(move || async move {
            tokio::time::sleep(Duration::from_millis(80)).await;
            sibling_probe.settled.fetch_add(1, Ordering::SeqCst);
            Err("late rejection".to_string())
        }),
    ];

    let result = BatchExecutor::new()
        .with_concurrency(2)
        .with_fail_fast(true)
        .execute(operations)
        .await;
    assert_eq!(result.unwrap_err(), "first rejection");

    // The sibling task keeps running after the batch future resolved.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(probe.settled.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_fail_fast_resolves_when_every_operation_fulfills() {
    let operations = (0..5)
        .map(|i| operation(move || async move { Ok::<_, String>(i) }))
        .collect();

    let outcomes = run_batched(
        operations,
        BatchOptions {
            concurrency: Some(2),
            fail_fast: true,
        },
    )
    .await
    .expect("all-fulfilled fail-fast run should resolve");

    assert_eq!(outcomes.len(), 5);
    assert!(outcomes.iter().all(Outcome::is_fulfilled));
}

#[test]
fn test_default_concurrency_is_idempotent_for_a_fixed_signal() {
    let legacy = TransportConcurrency::new(TransportProfile::Legacy);
    assert_eq!(legacy.batch_concurrency(), legacy.batch_concurrency());

    let multiplexed = TransportConcurrency::new(TransportProfile::Multiplexed);
    assert_eq!(
        multiplexed.batch_concurrency(),
        multiplexed.batch_concurrency()
    );
    assert!(legacy.batch_concurrency() < multiplexed.batch_concurrency());
}

#[tokio::test]
async fn test_scenario_ten_operations_with_random_latency() {
    // 10 operations, each resolving with its own index after a random
    // 0-50ms delay, concurrency 3: every outcome lands at its index and no
    // more than 3 operations are ever unsettled at once.
    init_tracing();
    let probe = Arc::new(Probe::default());
    let delays: Vec<Duration> = {
        let mut rng = rand::thread_rng();
        (0..10)
            .map(|_| Duration::from_millis(rng.gen_range(0..50)))
            .collect()
    };

    let operations = delays
        .into_iter()
        .enumerate()
        .map(|(i, delay)| tracked_op(i, delay, probe.clone()))
        .collect();

    let outcomes = run_batched(
        operations,
        BatchOptions {
            concurrency: Some(3),
            fail_fast: false,
        },
    )
    .await
    .expect("settle-all run should resolve");

    assert_eq!(outcomes.len(), 10);
    for (i, outcome) in outcomes.iter().enumerate() {
        assert_eq!(outcome.value(), Some(&i));
    }
    assert!(probe.peak_in_flight.load(Ordering::SeqCst) <= 3);
}

#[tokio::test]
async fn test_zero_concurrency_option_defers_to_default_source() {
    // Some(0) means "unset": the run picks up the transport default instead
    // of being serialized onto a single slot.
    init_tracing();
    let probe = Arc::new(Probe::default());
    let operations = (0..8)
        .map(|i| tracked_op(i, Duration::from_millis(100), probe.clone()))
        .collect();

    let outcomes = run_batched(
        operations,
        BatchOptions {
            concurrency: Some(0),
            fail_fast: false,
        },
    )
    .await
    .expect("settle-all run should resolve");

    assert_eq!(outcomes.len(), 8);
    assert!(
        probe.peak_in_flight.load(Ordering::SeqCst) > 1,
        "a zero ceiling must defer to the transport default, not serialize the run"
    );
}

#[tokio::test]
async fn test_progress_callback_reports_every_settlement() {
    let updates = Arc::new(std::sync::Mutex::new(Vec::new()));
    let updates_clone = updates.clone();

    let operations = (0..5)
        .map(|i| operation(move || async move { Ok::<_, String>(i) }))
        .collect();

    BatchExecutor::new()
        .with_concurrency(2)
        .with_progress_callback(move |settled, total| {
            updates_clone.lock().unwrap().push((settled, total));
        })
        .execute(operations)
        .await
        .expect("settle-all run should resolve");

    let updates = updates.lock().unwrap();
    assert_eq!(updates.len(), 5);
    assert!(updates.iter().all(|&(_, total)| total == 5));
    assert_eq!(updates.last(), Some(&(5, 5)));
}

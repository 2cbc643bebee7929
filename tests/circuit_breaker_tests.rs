use circuit_guard::circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, ManualClock,
};
use circuit_guard::CircuitBreakerError;
use futures::future::join_all;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn breaker_with_clock(config: CircuitBreakerConfig) -> (Arc<CircuitBreaker>, ManualClock) {
    let clock = ManualClock::new();
    let breaker =
        CircuitBreaker::with_clock("http://test-backend:8080", config, Arc::new(clock.clone()));
    (Arc::new(breaker), clock)
}

/// Operation that counts its invocations and fails or succeeds on demand
#[derive(Clone, Default)]
struct CountingOperation {
    calls: Arc<AtomicU32>,
}

impl CountingOperation {
    async fn run(
        &self,
        breaker: &CircuitBreaker,
        succeed: bool,
    ) -> Result<u32, CircuitBreakerError<String>> {
        let calls = self.calls.clone();
        breaker
            .execute(|| async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if succeed {
                    Ok(n)
                } else {
                    Err(format!("call {} failed", n))
                }
            })
            .await
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[tokio::test]
async fn test_recovery_walkthrough() {
    let config = CircuitBreakerConfig {
        failure_threshold: 3,
        reset_timeout_ms: 1000,
        half_open_max_attempts: 2,
    };
    let (breaker, clock) = breaker_with_clock(config);
    let op = CountingOperation::default();

    // Three failures open the circuit
    for _ in 0..3 {
        assert!(matches!(
            op.run(&breaker, false).await,
            Err(CircuitBreakerError::Inner(_))
        ));
    }
    assert_eq!(breaker.state().await, CircuitState::Open);
    assert_eq!(op.calls(), 3);

    // Fourth call is refused without touching the dependency
    assert_eq!(op.run(&breaker, true).await, Err(CircuitBreakerError::Open));
    assert_eq!(op.calls(), 3);

    // After the reset timeout the fifth call is a trial
    clock.advance(Duration::from_millis(1000));
    assert_eq!(op.run(&breaker, true).await, Ok(4));
    assert_eq!(breaker.state().await, CircuitState::HalfOpen);
    assert_eq!(breaker.half_open_attempts().await, 1);

    // Sixth success closes it
    assert_eq!(op.run(&breaker, true).await, Ok(5));
    assert_eq!(breaker.state().await, CircuitState::Closed);
    assert_eq!(breaker.failure_count().await, 0);
    assert_eq!(breaker.half_open_attempts().await, 0);

    let metrics = breaker.metrics().await;
    assert_eq!(metrics.total_calls, 5);
    assert_eq!(metrics.rejected_calls, 1);
    assert_eq!(metrics.circuit_opened_count, 1);
    assert_eq!(metrics.circuit_half_opened_count, 1);
    assert_eq!(metrics.circuit_closed_count, 1);
}

#[tokio::test]
async fn test_threshold_trip_for_various_thresholds() {
    for threshold in [1, 2, 5, 10] {
        let config = CircuitBreakerConfig {
            failure_threshold: threshold,
            ..Default::default()
        };
        let (breaker, _) = breaker_with_clock(config);
        let op = CountingOperation::default();

        for _ in 0..threshold - 1 {
            let _ = op.run(&breaker, false).await;
        }
        assert_eq!(breaker.state().await, CircuitState::Closed);

        let _ = op.run(&breaker, false).await;
        assert_eq!(breaker.state().await, CircuitState::Open);
    }
}

#[tokio::test]
async fn test_rejections_until_timeout_elapses() {
    let config = CircuitBreakerConfig {
        failure_threshold: 1,
        reset_timeout_ms: 30_000,
        half_open_max_attempts: 1,
    };
    let (breaker, clock) = breaker_with_clock(config);
    let op = CountingOperation::default();

    let _ = op.run(&breaker, false).await;

    for _ in 0..29 {
        clock.advance(Duration::from_secs(1));
        assert_eq!(op.run(&breaker, true).await, Err(CircuitBreakerError::Open));
    }
    assert_eq!(op.calls(), 1);
    assert_eq!(breaker.metrics().await.rejected_calls, 29);

    clock.advance(Duration::from_secs(1));
    assert!(op.run(&breaker, true).await.is_ok());
    assert_eq!(breaker.state().await, CircuitState::Closed);
}

#[tokio::test]
async fn test_half_open_failure_reopens_circuit() {
    let config = CircuitBreakerConfig {
        failure_threshold: 2,
        reset_timeout_ms: 1000,
        half_open_max_attempts: 3,
    };
    let (breaker, clock) = breaker_with_clock(config);
    let op = CountingOperation::default();

    for _ in 0..2 {
        let _ = op.run(&breaker, false).await;
    }
    clock.advance(Duration::from_secs(2));

    let _ = op.run(&breaker, true).await;
    let _ = op.run(&breaker, true).await;
    assert_eq!(breaker.state().await, CircuitState::HalfOpen);

    let _ = op.run(&breaker, false).await;
    assert_eq!(breaker.state().await, CircuitState::Open);
    assert_eq!(op.run(&breaker, true).await, Err(CircuitBreakerError::Open));
}

#[tokio::test]
async fn test_concurrent_callers_race_through_half_open() {
    let config = CircuitBreakerConfig {
        failure_threshold: 1,
        reset_timeout_ms: 100,
        half_open_max_attempts: 1,
    };
    let (breaker, clock) = breaker_with_clock(config);
    let op = CountingOperation::default();

    let _ = op.run(&breaker, false).await;
    clock.advance(Duration::from_millis(100));

    let tasks = (0..8).map(|_| {
        let breaker = breaker.clone();
        let calls = op.calls.clone();
        tokio::spawn(async move {
            breaker
                .execute(|| async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    // Stay in flight while the other callers try to get in
                    tokio::task::yield_now().await;
                    Ok::<_, String>(())
                })
                .await
        })
    });

    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let admitted = results.iter().filter(|r| r.is_ok()).count();
    let refused = results
        .iter()
        .filter(|r| matches!(r, Err(CircuitBreakerError::Open)))
        .count();

    // Every caller either ran or was refused, and only admitted callers
    // reached the dependency
    assert!(admitted >= 1);
    assert_eq!(admitted + refused, 8);
    assert_eq!(op.calls() - 1, admitted as u32);
    assert_eq!(breaker.state().await, CircuitState::Closed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_failures_open_once() {
    let config = CircuitBreakerConfig {
        failure_threshold: 5,
        ..Default::default()
    };
    let (breaker, _) = breaker_with_clock(config);
    let op = CountingOperation::default();

    let tasks = (0..50).map(|_| {
        let breaker = breaker.clone();
        let op = op.clone();
        tokio::spawn(async move { op.run(&breaker, false).await })
    });
    for result in join_all(tasks).await {
        assert!(result.unwrap().is_err());
    }

    assert_eq!(breaker.state().await, CircuitState::Open);

    let metrics = breaker.metrics().await;
    assert_eq!(metrics.circuit_opened_count, 1);
    assert_eq!(metrics.total_calls + metrics.rejected_calls, 50);
    assert_eq!(op.calls() as u64, metrics.total_calls);
}

#[tokio::test]
async fn test_state_queries_do_not_wait_for_slow_operation() {
    let (breaker, _) = breaker_with_clock(CircuitBreakerConfig::default());
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();

    let slow = tokio::spawn({
        let breaker = breaker.clone();
        async move {
            breaker
                .execute(|| async move {
                    let _ = rx.await;
                    Ok::<_, String>("done")
                })
                .await
        }
    });

    while breaker.metrics().await.total_calls == 0 {
        tokio::task::yield_now().await;
    }

    // The operation is parked, yet state reads and other calls go through
    assert_eq!(breaker.state().await, CircuitState::Closed);
    assert_eq!(
        breaker.execute(|| async { Ok::<_, String>(7) }).await,
        Ok(7)
    );

    tx.send(()).unwrap();
    assert_eq!(slow.await.unwrap(), Ok("done"));
}

#[test]
fn test_cancelled_trials_under_lock_contention_never_leak_slots() {
    use futures::executor::block_on;
    use futures::FutureExt;
    use std::sync::atomic::AtomicBool;

    let config = CircuitBreakerConfig {
        failure_threshold: 1,
        reset_timeout_ms: 100,
        half_open_max_attempts: 1,
    };
    let (breaker, clock) = breaker_with_clock(config);
    let op = CountingOperation::default();

    let _ = block_on(op.run(&breaker, false));
    clock.advance(Duration::from_millis(100));

    // Keep the state lock busy from another thread, outside any tokio runtime
    let stop = Arc::new(AtomicBool::new(false));
    let reader = std::thread::spawn({
        let breaker = breaker.clone();
        let stop = stop.clone();
        move || {
            while !stop.load(Ordering::Relaxed) {
                let _ = block_on(breaker.snapshot());
            }
        }
    });

    for _ in 0..2000 {
        // Admitted as the trial, polled once, then dropped mid-flight
        let cancelled = breaker
            .execute(|| std::future::pending::<Result<(), String>>())
            .now_or_never();
        assert!(cancelled.is_none());
        assert_eq!(block_on(breaker.snapshot()).half_open_in_flight, 0);
    }

    stop.store(true, Ordering::Relaxed);
    reader.join().unwrap();

    assert_eq!(block_on(breaker.state()), CircuitState::HalfOpen);
    assert!(block_on(op.run(&breaker, true)).is_ok());
    assert_eq!(block_on(breaker.state()), CircuitState::Closed);
}

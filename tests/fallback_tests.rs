use futures::future::BoxFuture;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tally::config::FallbackConfig;
use tally::error::LedgerError;
use tally::resilience::{FallbackExecutor, FallbackStrategy};

fn config(caching: bool) -> FallbackConfig {
    FallbackConfig {
        max_retries: 3,
        retry_delay: Duration::from_millis(10),
        timeout: Duration::from_millis(500),
        enable_caching: caching,
        cache_ttl: Duration::from_secs(60),
        enable_degradation: true,
    }
}

fn ok(value: &str) -> BoxFuture<'static, Result<String, LedgerError>> {
    let value = value.to_string();
    Box::pin(async move { Ok(value) })
}

fn fail() -> BoxFuture<'static, Result<String, LedgerError>> {
    Box::pin(async { Err(LedgerError::Internal("down".to_string())) })
}

#[tokio::test]
async fn sequential_returns_first_success() {
    let executor = FallbackExecutor::new(config(false), FallbackStrategy::Sequential);

    let result = executor
        .execute("seq", fail(), vec![fail(), ok("v"), ok("never-reached")])
        .await
        .unwrap();
    assert_eq!(result, "v");
    executor.close();
}

#[tokio::test]
async fn sequential_exhaustion_is_all_fallbacks_failed() {
    let executor = FallbackExecutor::new(config(false), FallbackStrategy::Sequential);

    let result: Result<String, _> = executor.execute("seq", fail(), vec![fail(), fail()]).await;
    assert!(matches!(result, Err(LedgerError::AllFallbacksFailed)));
    executor.close();
}

#[tokio::test]
async fn successful_result_is_cached_and_skips_primary() {
    let executor = FallbackExecutor::new(config(true), FallbackStrategy::Sequential);

    let first = executor.execute("cached", fail(), vec![ok("v")]).await.unwrap();
    assert_eq!(first, "v");

    // second call must come from the cache without touching the primary
    let primary_invoked = Arc::new(AtomicBool::new(false));
    let probe = Arc::clone(&primary_invoked);
    let primary: BoxFuture<'static, Result<String, LedgerError>> = Box::pin(async move {
        probe.store(true, Ordering::SeqCst);
        Ok("fresh".to_string())
    });

    let second = executor.execute("cached", primary, vec![]).await.unwrap();
    assert_eq!(second, "v");
    assert!(!primary_invoked.load(Ordering::SeqCst));
    assert_eq!(executor.stats().cache_size, 1);
    executor.close();
}

#[tokio::test]
async fn expired_cache_entries_are_treated_as_absent() {
    let executor = FallbackExecutor::new(
        FallbackConfig {
            cache_ttl: Duration::from_millis(20),
            ..config(true)
        },
        FallbackStrategy::Sequential,
    );

    executor.execute("ttl", ok("old"), vec![]).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let fresh = executor.execute("ttl", ok("new"), vec![]).await.unwrap();
    assert_eq!(fresh, "new");
    executor.close();
}

#[tokio::test]
async fn parallel_returns_any_success() {
    let executor = FallbackExecutor::new(config(false), FallbackStrategy::Parallel);

    let slow_fail: BoxFuture<'static, Result<String, LedgerError>> = Box::pin(async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        Err(LedgerError::Internal("slow".to_string()))
    });

    let result = executor
        .execute("par", fail(), vec![slow_fail, ok("winner")])
        .await
        .unwrap();
    assert_eq!(result, "winner");
    executor.close();
}

#[tokio::test]
async fn parallel_times_out() {
    let executor = FallbackExecutor::new(
        FallbackConfig {
            timeout: Duration::from_millis(50),
            ..config(false)
        },
        FallbackStrategy::Parallel,
    );

    let hang: BoxFuture<'static, Result<String, LedgerError>> = Box::pin(async {
        tokio::time::sleep(Duration::from_secs(10)).await;
        Ok("too late".to_string())
    });

    let result: Result<String, _> = executor.execute("par", fail(), vec![hang]).await;
    assert!(matches!(result, Err(LedgerError::Timeout)));
    executor.close();
}

#[tokio::test]
async fn parallel_without_fallbacks_propagates_primary_error() {
    let executor = FallbackExecutor::new(config(false), FallbackStrategy::Parallel);
    let result: Result<String, _> = executor.execute("par", fail(), vec![]).await;
    assert!(matches!(result, Err(LedgerError::Internal(_))));
    executor.close();
}

#[tokio::test]
async fn degradation_disabled_propagates_primary_error() {
    let executor = FallbackExecutor::new(
        FallbackConfig {
            enable_degradation: false,
            ..config(false)
        },
        FallbackStrategy::Degradation,
    );

    let result: Result<String, _> = executor.execute("deg", fail(), vec![ok("unused")]).await;
    assert!(matches!(result, Err(LedgerError::Internal(_))));
    executor.close();
}

#[tokio::test]
async fn degradation_serves_reduced_fidelity_result() {
    let executor = FallbackExecutor::new(config(false), FallbackStrategy::Degradation);

    let result = executor
        .execute("deg", fail(), vec![fail(), ok("degraded")])
        .await
        .unwrap();
    assert_eq!(result, "degraded");
    executor.close();
}

#[tokio::test]
async fn sequential_delays_only_between_later_attempts() {
    let executor = FallbackExecutor::new(
        FallbackConfig {
            retry_delay: Duration::from_millis(80),
            ..config(false)
        },
        FallbackStrategy::Sequential,
    );

    let calls = Arc::new(AtomicU32::new(0));
    let probe = Arc::clone(&calls);
    let first_fallback: BoxFuture<'static, Result<String, LedgerError>> = Box::pin(async move {
        probe.fetch_add(1, Ordering::SeqCst);
        Ok("fb1".to_string())
    });

    let started = std::time::Instant::now();
    let result = executor.execute("delay", fail(), vec![first_fallback]).await.unwrap();

    // the first fallback runs immediately, without the retry delay
    assert_eq!(result, "fb1");
    assert!(started.elapsed() < Duration::from_millis(60));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    executor.close();
}

//! End-to-end behaviour of the memoizing cache through its public API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use agenda_cache::{CacheConfig, ManualClock, MemoCache};
use proptest::prelude::*;

fn cache_with_clock() -> (MemoCache<String, String>, ManualClock) {
    let clock = ManualClock::new();
    let cache = MemoCache::with_clock(CacheConfig::default(), Arc::new(clock.clone()));
    (cache, clock)
}

#[test]
fn test_set_then_expire_on_simulated_clock() {
    let clock = ManualClock::new();
    let cache: MemoCache<i64, String> =
        MemoCache::with_clock(CacheConfig::default(), Arc::new(clock.clone()));

    cache.set("a", 42, 1_000);
    assert_eq!(cache.get("a"), Some(42));

    clock.advance(Duration::from_millis(1_100));
    assert_eq!(cache.get("a"), None);
}

#[tokio::test(start_paused = true)]
async fn test_second_request_joins_pending_fetch() {
    let (cache, _) = cache_with_clock();
    let fetch_b2_calls = Arc::new(AtomicUsize::new(0));

    let fetch_b = || async {
        tokio::time::sleep(Duration::from_millis(250)).await;
        Ok::<_, String>("hello".to_string())
    };

    let first = tokio::spawn({
        let cache = cache.clone();
        async move { cache.get_or_compute("b", fetch_b, 5_000).await }
    });

    tokio::time::sleep(Duration::from_millis(10)).await;

    let fetch_b2 = {
        let calls = Arc::clone(&fetch_b2_calls);
        move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, String>("goodbye".to_string())
        }
    };
    let second = cache.get_or_compute("b", fetch_b2, 5_000).await.unwrap();

    assert_eq!(second, "hello");
    assert_eq!(first.await.unwrap().unwrap(), "hello");
    assert_eq!(fetch_b2_calls.load(Ordering::SeqCst), 0);
    assert_eq!(cache.get("b").as_deref(), Some("hello"));
}

#[tokio::test(start_paused = true)]
async fn test_many_tasks_one_fetch() {
    let (cache, _) = cache_with_clock();
    let calls = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..32 {
        let cache = cache.clone();
        let calls = Arc::clone(&calls);
        handles.push(tokio::spawn(async move {
            cache
                .get_or_compute(
                    "booking:77",
                    move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(40)).await;
                        Ok::<_, String>("confirmed".to_string())
                    },
                    5_000,
                )
                .await
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), "confirmed");
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let stats = cache.stats();
    assert_eq!(stats.computed, 1);
    assert_eq!(stats.coalesced + stats.hits, 31);
}

#[tokio::test(start_paused = true)]
async fn test_failed_fetch_is_retried_by_next_caller() {
    let (cache, _) = cache_with_clock();

    let failing = || async {
        tokio::time::sleep(Duration::from_millis(5)).await;
        Err::<String, _>("503".to_string())
    };
    let (a, b) = tokio::join!(
        cache.get_or_compute("k", failing, 1_000),
        cache.get_or_compute("k", || async { Ok::<_, String>("never".to_string()) }, 1_000),
    );
    let (a, b) = (a.unwrap_err(), b.unwrap_err());
    assert_eq!(a.operation_error(), "503");
    assert!(a.same_failure(&b));

    let op2_calls = Arc::new(AtomicUsize::new(0));
    let op2 = {
        let calls = Arc::clone(&op2_calls);
        move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, String>("ok".to_string())
        }
    };
    assert_eq!(cache.get_or_compute("k", op2, 1_000).await.unwrap(), "ok");
    assert_eq!(op2_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_fetch_completes_after_every_waiter_times_out() {
    let (cache, _) = cache_with_clock();
    let calls = Arc::new(AtomicUsize::new(0));

    let mut waiters = Vec::new();
    for _ in 0..3 {
        let cache = cache.clone();
        let calls = Arc::clone(&calls);
        waiters.push(tokio::spawn(async move {
            tokio::time::timeout(
                Duration::from_millis(20),
                cache.get_or_compute(
                    "staff:4",
                    move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(200)).await;
                        Ok::<_, String>("Kim".to_string())
                    },
                    60_000,
                ),
            )
            .await
        }));
    }
    for waiter in waiters {
        assert!(waiter.await.unwrap().is_err());
    }
    assert_eq!(cache.in_flight_len(), 1);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(cache.in_flight_len(), 0);

    let late = cache
        .get_or_compute("staff:4", || async { Ok::<_, String>("stale".to_string()) }, 60_000)
        .await
        .unwrap();
    assert_eq!(late, "Kim");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_prefix_invalidation_leaves_other_namespaces() {
    let (cache, _) = cache_with_clock();
    cache.set("user:1", "u1".to_string(), 60_000);
    cache.set("user:2", "u2".to_string(), 60_000);
    cache.set("order:1", "o1".to_string(), 60_000);

    cache.invalidate(Some("user:"));

    assert_eq!(cache.get("user:1"), None);
    assert_eq!(cache.get("user:2"), None);
    assert_eq!(cache.get("order:1").as_deref(), Some("o1"));
}

#[test]
fn test_invalidate_all_twice() {
    let (cache, _) = cache_with_clock();
    cache.set("user:1", "u1".to_string(), 60_000);

    cache.invalidate(None);
    cache.invalidate(None);

    assert!(cache.is_empty());
    assert_eq!(cache.in_flight_len(), 0);
}

proptest! {
    #[test]
    fn test_fresh_set_is_readable(key in "[a-z]{1,8}:[0-9]{1,4}", value in any::<i32>(), ttl in 1i64..1_000_000) {
        let clock = ManualClock::new();
        let cache: MemoCache<i32, String> =
            MemoCache::with_clock(CacheConfig::default(), Arc::new(clock.clone()));
        cache.set(key.clone(), value, ttl);
        prop_assert_eq!(cache.get(&key), Some(value));

        clock.advance(Duration::from_millis(ttl as u64));
        prop_assert_eq!(cache.get(&key), None);
    }

    #[test]
    fn test_prefix_invalidation_is_exact(
        keys in proptest::collection::hash_set("[a-c]{1,4}", 1..16),
        prefix in "[a-c]{0,2}",
    ) {
        let (cache, _) = cache_with_clock();
        for key in &keys {
            cache.set(key.clone(), key.clone(), 60_000);
        }

        cache.invalidate(Some(prefix.as_str()));

        for key in &keys {
            prop_assert_eq!(cache.get(key).is_some(), !key.starts_with(&prefix));
        }
    }
}

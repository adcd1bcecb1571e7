use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use memoflight::{Cache, CacheConfig};

#[tokio::test(start_paused = true)]
async fn test_concurrent_gets_share_one_production() {
    let cache: Cache<&str, u32> = Cache::new(CacheConfig {
        return_expired: false,
    });
    let calls = Arc::new(AtomicUsize::new(0));

    let mut lookups = Vec::new();
    for _ in 0..200 {
        let calls = Arc::clone(&calls);
        lookups.push(cache.get_with("mykey", Some(Duration::from_millis(100)), move || {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok::<_, std::io::Error>(32)
            }
        }));
    }

    let results = futures::future::join_all(lookups).await;
    for result in results {
        assert_eq!(result.unwrap(), 32);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_spawned_tasks_share_one_production() {
    let cache: Cache<&str, u64> = Cache::default();
    let calls = Arc::new(AtomicUsize::new(0));

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..100 {
        let cache = cache.clone();
        let calls = Arc::clone(&calls);
        tasks.spawn(async move {
            cache
                .get_with("fib", Some(Duration::from_secs(5)), move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok::<_, std::io::Error>(6765)
                })
                .await
                .unwrap()
        });
    }

    while let Some(result) = tasks.join_next().await {
        assert_eq!(result.unwrap(), 6765);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_fresh_value_served_without_rerunning_producer() {
    let cache: Cache<&str, u32> = Cache::default();
    let calls = Arc::new(AtomicUsize::new(0));

    for _ in 0..3 {
        let calls = Arc::clone(&calls);
        let value = cache
            .get_with("mykey", Some(Duration::from_secs(1)), move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, std::io::Error>(32)
            })
            .await
            .unwrap();
        assert_eq!(value, 32);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_get_without_producer_attaches_to_in_flight_generation() {
    let cache: Cache<&str, u32> = Cache::default();

    let worker = cache.clone();
    let handle = tokio::spawn(async move {
        worker
            .get_with("mykey", Some(Duration::from_millis(100)), || async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok::<_, std::io::Error>(32)
            })
            .await
    });
    // Let the generation start before reading without a producer.
    tokio::task::yield_now().await;
    assert!(cache.contains_key(&"mykey"));

    assert_eq!(cache.get(&"mykey").await.unwrap(), 32);
    assert_eq!(handle.await.unwrap().unwrap(), 32);
}

#[tokio::test(start_paused = true)]
async fn test_miss_without_producer_creates_no_entry() {
    let cache: Cache<&str, u32> = Cache::default();

    let err = cache.get(&"absent").await.unwrap_err();
    assert!(err.is_miss());
    assert!(cache.is_empty());
}

#[cfg(feature = "stats")]
#[tokio::test(start_paused = true)]
async fn test_stats_track_hits_misses_and_producer_runs() {
    let cache: Cache<&str, u32> = Cache::default();

    assert!(cache.get(&"mykey").await.is_err());
    cache
        .get_with("mykey", Some(Duration::from_secs(1)), || async {
            Ok::<_, std::io::Error>(1)
        })
        .await
        .unwrap();
    cache.get(&"mykey").await.unwrap();

    let stats = cache.stats();
    assert_eq!(stats.misses(), 2);
    assert_eq!(stats.hits(), 1);
    assert_eq!(stats.producer_runs(), 1);
    assert_eq!(stats.total_accesses(), 3);
}

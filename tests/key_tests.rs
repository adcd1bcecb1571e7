use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use memoflight::Cache;

/// A non-primitive composite key. Keys are compared by value through
/// `Eq + Hash`, so two separately constructed but structurally equal keys
/// name the same entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct UserKey {
    tenant: u32,
    name: String,
}

#[tokio::test(start_paused = true)]
async fn test_structurally_equal_keys_share_an_entry() {
    let cache: Cache<UserKey, u32> = Cache::default();
    let calls = Arc::new(AtomicUsize::new(0));

    let first_key = UserKey {
        tenant: 1,
        name: "ada".to_string(),
    };
    let second_key = UserKey {
        tenant: 1,
        name: "ada".to_string(),
    };

    let counting = Arc::clone(&calls);
    let value = cache
        .get_with(first_key, Some(Duration::from_secs(1)), move || async move {
            counting.fetch_add(1, Ordering::SeqCst);
            Ok::<_, std::io::Error>(32)
        })
        .await
        .unwrap();
    assert_eq!(value, 32);

    // The second, distinct-but-equal key hits the same entry.
    assert_eq!(cache.get(&second_key).await.unwrap(), 32);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_distinct_keys_have_independent_entries() {
    let cache: Cache<UserKey, u32> = Cache::default();
    let calls = Arc::new(AtomicUsize::new(0));

    for tenant in [1u32, 2] {
        let counting = Arc::clone(&calls);
        let key = UserKey {
            tenant,
            name: "ada".to_string(),
        };
        let value = cache
            .get_with(key, Some(Duration::from_secs(1)), move || async move {
                counting.fetch_add(1, Ordering::SeqCst);
                Ok::<_, std::io::Error>(tenant * 10)
            })
            .await
            .unwrap();
        assert_eq!(value, tenant * 10);
    }

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(cache.len(), 2);

    // Removing one leaves the other untouched.
    assert!(cache.remove(&UserKey {
        tenant: 1,
        name: "ada".to_string(),
    }));
    assert_eq!(
        cache
            .get(&UserKey {
                tenant: 2,
                name: "ada".to_string(),
            })
            .await
            .unwrap(),
        20
    );
}

#[tokio::test(start_paused = true)]
async fn test_tuple_keys_are_supported() {
    let cache: Cache<(u64, &str), String> = Cache::default();

    cache.store((7, "profile"), Some(Duration::from_secs(1)), "cached".to_string());
    assert_eq!(cache.get(&(7, "profile")).await.unwrap(), "cached");
    assert!(cache.get(&(8, "profile")).await.unwrap_err().is_miss());
}

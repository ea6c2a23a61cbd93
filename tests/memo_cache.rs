use serde_json::json;
use soundcloud_gateway::cache::{CachePolicy, Memo};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[tokio::test]
async fn ninth_identical_call_recomputes() {
    let memo: Memo<String, u32> = Memo::default();
    let calls = AtomicUsize::new(0);

    for _ in 0..9 {
        let v = memo
            .call("barsuk", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                7
            })
            .await;
        assert_eq!(v, 7);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn entries_expire_after_ttl() {
    let memo: Memo<u32, u32> = Memo::new(CachePolicy::with_ttl_secs(10));
    let calls = AtomicUsize::new(0);
    let compute = || async {
        calls.fetch_add(1, Ordering::SeqCst) as u32
    };

    assert_eq!(memo.call(&1u32, compute).await, 0);
    tokio::time::advance(Duration::from_secs(5)).await;
    assert_eq!(memo.call(&1u32, compute).await, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    tokio::time::advance(Duration::from_secs(11)).await;
    assert_eq!(memo.call(&1u32, compute).await, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn unhashable_arguments_bypass_cache() {
    let memo: Memo<String, u32> = Memo::default();
    let calls = AtomicUsize::new(0);
    let data = json!({"kind": "track", "id": 1});

    for _ in 0..3 {
        memo.call(&data, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            1
        })
        .await;
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(memo.is_empty().await);

    // Scalars are fine as keys.
    memo.call(&json!("13158665"), || async { 1 }).await;
    assert_eq!(memo.len().await, 1);
}

#[tokio::test]
async fn keys_are_independent() {
    let memo: Memo<(String, bool), String> = Memo::default();
    let calls = AtomicUsize::new(0);

    for key in [("a", false), ("b", false), ("a", true), ("a", false)] {
        let args = (key.0.to_string(), key.1);
        memo.call(&args, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            format!("{}-{}", key.0, key.1)
        })
        .await;
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(memo.len().await, 3);
}

#[tokio::test]
async fn unbounded_hits_only_expire_by_age() {
    let memo: Memo<String, u32> = Memo::new(CachePolicy::default().unbounded_hits());
    let calls = AtomicUsize::new(0);
    for _ in 0..50 {
        memo.call("track", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            0
        })
        .await;
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_callers_share_one_computation() {
    let memo: Memo<String, u32> = Memo::default();
    let calls = AtomicUsize::new(0);
    let slow = || async {
        calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(200)).await;
        42
    };

    let (a, b) = futures::join!(memo.call("same", slow), memo.call("same", slow));
    assert_eq!((a, b), (42, 42));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn custom_ceiling_and_clear() {
    let memo: Memo<u32, u32> = Memo::new(CachePolicy::with_ttl_secs(600).max_hits(2));
    assert_eq!(memo.policy().ttl, Duration::from_secs(600));
    let calls = AtomicUsize::new(0);
    for _ in 0..4 {
        memo.call(&5u32, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            5
        })
        .await;
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    memo.clear();
    assert!(memo.is_empty().await);
}

#[tokio::test]
async fn distinct_keys_are_bounded_by_capacity() {
    let memo: Memo<u32, u32> = Memo::new(CachePolicy::with_ttl_secs(1).capacity(100));
    assert_eq!(memo.policy().capacity, 100);
    for chunk in 0..10u32 {
        for i in 0..100u32 {
            let id = chunk * 100 + i;
            memo.call(&id, || async move { id }).await;
        }
        assert!(memo.len().await <= 100);
    }
}

#[tokio::test]
async fn forgotten_entry_is_recomputed() {
    let memo: Memo<String, u32> = Memo::default();
    let calls = AtomicUsize::new(0);
    let compute = || async {
        calls.fetch_add(1, Ordering::SeqCst);
        3
    };

    memo.call("13158665", compute).await;
    memo.call("13158665", compute).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    memo.forget("13158665").await;
    memo.call("13158665", compute).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

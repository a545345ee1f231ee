//! Mutual exclusion under real contention.

use crate::prelude::shared_store;
use rally_core::{Lock, LockConfig, Token};
use rally_store::{StoreAdapter, SystemClock};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn contended_config() -> LockConfig {
    LockConfig::new("critical")
        .with_acquire_timeout(Duration::from_secs(10))
        .with_hold_timeout(Duration::from_secs(10))
        .with_poll_interval(Duration::from_millis(1))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn at_most_one_holder_at_any_instant() {
    let store = shared_store();
    let inside = Arc::new(AtomicU32::new(0));
    let completed = Arc::new(AtomicU32::new(0));

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let store = store.clone();
            let inside = inside.clone();
            let completed = completed.clone();
            tokio::spawn(async move {
                let lock = Lock::new(store, SystemClock, contended_config());
                for _ in 0..5 {
                    let token = lock.acquire().await.unwrap().expect("acquire within timeout");

                    let concurrent = inside.fetch_add(1, Ordering::SeqCst);
                    assert_eq!(concurrent, 0, "second holder inside the critical section");
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    inside.fetch_sub(1, Ordering::SeqCst);

                    assert!(lock.release(&token).await.unwrap());
                    completed.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap();
    }
    assert_eq!(completed.load(Ordering::SeqCst), 40);
}

#[tokio::test]
async fn stale_release_cannot_break_the_current_holder() {
    let store = shared_store();
    let lock = Lock::new(store.clone(), SystemClock, contended_config());

    let holder = lock.acquire().await.unwrap().unwrap();

    // A token from a previous life tries to release.
    assert!(!lock.release(&Token::new("long-gone")).await.unwrap());

    // The true holder is still in place and can still release.
    assert_eq!(
        store.get("lock:critical").await.unwrap().as_deref(),
        Some(holder.as_str())
    );
    assert!(lock.release(&holder).await.unwrap());

    // Releasing twice reports "not held" rather than erroring.
    assert!(!lock.release(&holder).await.unwrap());
}

//! Semaphore bounds and FIFO admission under contention.

use crate::prelude::shared_store;
use rally_core::{FairSemaphore, Semaphore, SemaphoreConfig};
use rally_store::{StoreAdapter, SystemClock};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn contended_config(limit: u32) -> SemaphoreConfig {
    SemaphoreConfig::new("workers", limit)
        .with_lease(Duration::from_secs(30))
        .with_acquire_timeout(Duration::from_secs(10))
        .with_poll_interval(Duration::from_millis(1))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn simple_semaphore_never_exceeds_its_limit() {
    let store = shared_store();
    let inside = Arc::new(AtomicU32::new(0));
    let peak = Arc::new(AtomicU32::new(0));

    let tasks: Vec<_> = (0..10)
        .map(|_| {
            let store = store.clone();
            let inside = inside.clone();
            let peak = peak.clone();
            tokio::spawn(async move {
                let sem = Semaphore::new(store, SystemClock, contended_config(3));
                let token = sem.acquire().await.unwrap().expect("slot within timeout");

                let current = inside.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(current, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                inside.fetch_sub(1, Ordering::SeqCst);

                assert!(sem.release(&token).await.unwrap());
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap();
    }
    assert!(peak.load(Ordering::SeqCst) <= 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn fair_semaphore_never_exceeds_its_limit() {
    let store = shared_store();
    let inside = Arc::new(AtomicU32::new(0));
    let peak = Arc::new(AtomicU32::new(0));

    let tasks: Vec<_> = (0..10)
        .map(|_| {
            let store = store.clone();
            let inside = inside.clone();
            let peak = peak.clone();
            tokio::spawn(async move {
                let sem = FairSemaphore::new(store, SystemClock, contended_config(3));
                let token = sem.acquire().await.unwrap().expect("slot within timeout");

                let current = inside.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(current, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                inside.fetch_sub(1, Ordering::SeqCst);

                assert!(sem.release(&token).await.unwrap());
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap();
    }
    assert!(peak.load(Ordering::SeqCst) <= 3);

    // Everything released: no stragglers in either collection.
    assert_eq!(store.zset_card("workers").await.unwrap(), 0);
    assert_eq!(store.zset_card("workers:owner").await.unwrap(), 0);
}

#[tokio::test]
async fn an_extra_holder_is_rejected_and_leaves_no_trace() {
    let store = shared_store();
    let sem = FairSemaphore::new(store.clone(), SystemClock, contended_config(2));

    let a = sem.try_acquire().await.unwrap().unwrap();
    let b = sem.try_acquire().await.unwrap().unwrap();
    assert!(sem.try_acquire().await.unwrap().is_none());

    assert_eq!(store.zset_card("workers").await.unwrap(), 2);
    assert_eq!(store.zset_card("workers:owner").await.unwrap(), 2);

    sem.release(&a).await.unwrap();
    sem.release(&b).await.unwrap();
    assert_eq!(store.zset_card("workers").await.unwrap(), 0);
    assert_eq!(store.zset_card("workers:owner").await.unwrap(), 0);
}

#[tokio::test]
async fn fair_admission_never_ranks_earlier_tickets_behind_later_ones() {
    let store = shared_store();
    let sem = FairSemaphore::new(store.clone(), SystemClock, contended_config(5));

    let mut tokens = Vec::new();
    for _ in 0..5 {
        tokens.push(sem.try_acquire().await.unwrap().unwrap());
    }

    // Ticket scores strictly increase with acquisition order, and owner
    // ranks agree with ticket order for every live pair.
    let mut previous = f64::NEG_INFINITY;
    for (rank, token) in tokens.iter().enumerate() {
        let ticket = store
            .zset_score("workers:owner", token.as_str())
            .await
            .unwrap()
            .unwrap();
        assert!(ticket > previous);
        previous = ticket;

        assert_eq!(
            store.zset_rank("workers:owner", token.as_str()).await.unwrap(),
            Some(rank as u64)
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn lock_wrapped_admission_stays_bounded_under_contention() {
    let store = shared_store();
    let granted = Arc::new(AtomicU32::new(0));

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let store = store.clone();
            let granted = granted.clone();
            tokio::spawn(async move {
                let sem = FairSemaphore::new(store, SystemClock, contended_config(3));
                // The short admission lock can time out under contention;
                // retry until this task is granted or the limit is full.
                for _ in 0..100 {
                    if sem.acquire_with_lock().await.unwrap().is_some() {
                        granted.fetch_add(1, Ordering::SeqCst);
                        return;
                    }
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap();
    }
    // Nobody releases, so exactly the limit is ever granted.
    assert_eq!(granted.load(Ordering::SeqCst), 3);
}

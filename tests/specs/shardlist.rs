//! Cross-shard ordering and blocking-pop liveness.

use crate::prelude::shared_store;
use rally_core::{ShardedList, ShardedListConfig};
use rally_store::{StoreAdapter, SystemClock};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

fn list_on(store: Arc<rally_store::MemoryStore>, shard_size: u64) -> ShardedList<rally_store::MemoryStore> {
    ShardedList::new(
        store,
        SystemClock,
        ShardedListConfig::new("jobs")
            .with_shard_size(shard_size)
            .with_block_interval(Duration::from_millis(20)),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pipeline_preserves_order_end_to_end() {
    let store = shared_store();
    let items: Vec<String> = (0..100).map(|i| format!("{i}")).collect();

    let producer = {
        let store = store.clone();
        let items = items.clone();
        tokio::spawn(async move {
            let list = list_on(store, 5);
            for chunk in items.chunks(7) {
                let refs: Vec<&str> = chunk.iter().map(String::as_str).collect();
                assert_eq!(list.push_right(&refs).await.unwrap(), refs.len() as u64);
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
    };

    let consumer = {
        let store = store.clone();
        tokio::spawn(async move {
            let list = list_on(store, 5);
            let mut received = Vec::new();
            while received.len() < 100 {
                let item = list
                    .blocking_pop_left(Duration::from_secs(10))
                    .await
                    .unwrap()
                    .expect("producer finishes well within the timeout");
                received.push(item);
            }
            received
        })
    };

    producer.await.unwrap();
    let received = consumer.await.unwrap();
    similar_asserts::assert_eq!(received, items);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_poppers_split_the_items_without_duplication() {
    let store = shared_store();
    let list = list_on(store.clone(), 4);

    let items: Vec<String> = (0..60).map(|i| format!("job-{i:02}")).collect();
    let refs: Vec<&str> = items.iter().map(String::as_str).collect();
    list.push_right(&refs).await.unwrap();

    let poppers: Vec<_> = (0..4)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move {
                let list = list_on(store, 4);
                let mut mine = Vec::new();
                while let Some(item) = list.pop_left().await.unwrap() {
                    mine.push(item);
                }
                mine
            })
        })
        .collect();

    let mut all = Vec::new();
    for popper in poppers {
        all.extend(popper.await.unwrap());
    }

    assert_eq!(all.len(), 60);
    let unique: HashSet<&String> = all.iter().collect();
    assert_eq!(unique.len(), 60, "an item was delivered twice");
    assert_eq!(list.len().await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn blocking_pop_issued_before_the_push_completes_once() {
    let store = shared_store();

    let waiter = {
        let store = store.clone();
        tokio::spawn(async move {
            let list = list_on(store, 4);
            list.blocking_pop_left(Duration::from_secs(5)).await
        })
    };

    // Let the popper block first.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let list = list_on(store, 4);
    list.push_right(&["wake-up"]).await.unwrap();

    let value = waiter.await.unwrap().unwrap();
    assert_eq!(value.as_deref(), Some("wake-up"));
    assert_eq!(list.pop_left().await.unwrap(), None, "delivered exactly once");
}

#[tokio::test]
async fn length_is_computed_not_scanned() {
    let store = shared_store();
    let list = list_on(store.clone(), 3);

    let items: Vec<String> = (0..25).map(|i| format!("{i}")).collect();
    let refs: Vec<&str> = items.iter().map(String::as_str).collect();
    list.push_right(&refs).await.unwrap();

    // Spread across many shards, each capped below the shard size.
    assert_eq!(list.len().await.unwrap(), 25);
    let last = store.get("jobs:last").await.unwrap().unwrap();
    assert!(last.parse::<i64>().unwrap() > 2);

    for _ in 0..10 {
        list.pop_left().await.unwrap();
    }
    assert_eq!(list.len().await.unwrap(), 15);
}

//! Autocomplete correctness and marker hygiene under concurrent searches.

use crate::prelude::shared_store;
use rally_core::PrefixIndex;

#[tokio::test]
async fn returns_exactly_the_prefixed_members_in_order() {
    let store = shared_store();
    let index = PrefixIndex::new(store);

    for member in ["apple", "apply", "banana"] {
        index.add_member("guild", member).await.unwrap();
    }

    similar_asserts::assert_eq!(
        index.autocomplete("guild", "app").await.unwrap(),
        vec!["apple".to_string(), "apply".to_string()]
    );
    assert!(index.autocomplete("guild", "zzz").await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_searches_never_leak_markers() {
    let store = shared_store();
    let members: Vec<String> = (0..30).map(|i| format!("member{i:02}")).collect();

    {
        let index = PrefixIndex::new(store.clone());
        for member in &members {
            index.add_member("guild", member).await.unwrap();
        }
    }

    let searchers: Vec<_> = (0..6)
        .map(|_| {
            let store = store.clone();
            let members = members.clone();
            tokio::spawn(async move {
                let index = PrefixIndex::new(store);
                for _ in 0..25 {
                    let results = index.autocomplete("guild", "member").await.unwrap();
                    for item in &results {
                        assert!(!item.contains('{'), "marker leaked into results: {item}");
                        assert!(members.contains(item), "phantom member: {item}");
                    }
                }
            })
        })
        .collect();

    // Membership churn racing against the searches.
    let churn = {
        let store = store.clone();
        tokio::spawn(async move {
            let index = PrefixIndex::new(store);
            for round in 0..25 {
                let name = format!("member{:02}", round % 30);
                index.remove_member("guild", &name).await.unwrap();
                index.add_member("guild", &name).await.unwrap();
            }
        })
    };

    for task in searchers {
        task.await.unwrap();
    }
    churn.await.unwrap();

    // Once the dust settles, only real members remain in the namespace.
    let index = PrefixIndex::new(store);
    let results = index.autocomplete("guild", "member").await.unwrap();
    assert_eq!(results.len(), 10);
    assert!(results.iter().all(|item| members.contains(item)));
}

#[tokio::test]
async fn search_on_an_untouched_namespace_is_empty() {
    let store = shared_store();
    let index = PrefixIndex::new(store);

    assert!(index.autocomplete("ghost-town", "any").await.unwrap().is_empty());
}

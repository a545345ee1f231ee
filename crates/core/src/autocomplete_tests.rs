use super::*;
use rally_store::MemoryStore;

fn index() -> (Arc<MemoryStore>, PrefixIndex<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    (store.clone(), PrefixIndex::new(store))
}

mod ranges {
    use super::*;
    use yare::parameterized;

    #[parameterized(
        multi_char = { "abc", "abb{", "abc{" },
        single_char = { "a", "`{", "a{" },
        repeated = { "aba", "ab`{", "aba{" },
        high_end = { "z", "y{", "z{" },
        mid_alphabet = { "help", "helo{", "help{" },
    )]
    fn find_prefix_range_brackets_the_prefix(prefix: &str, start: &str, end: &str) {
        assert_eq!(find_prefix_range(prefix), (start.to_string(), end.to_string()));
    }

    #[test]
    fn range_orders_around_members() {
        let (start, end) = find_prefix_range("app");
        assert!(start.as_str() < "apple");
        assert!(end.as_str() > "apply");
        assert!(end.as_str() < "aq");
    }
}

#[tokio::test]
async fn autocomplete_returns_prefixed_members_in_order() {
    let (_, index) = index();

    for member in ["banana", "apply", "apple"] {
        assert!(index.add_member("guild", member).await.unwrap());
    }

    let results = index.autocomplete("guild", "app").await.unwrap();
    assert_eq!(results, vec!["apple", "apply"]);
}

#[tokio::test]
async fn autocomplete_with_no_matches_is_empty() {
    let (_, index) = index();

    index.add_member("guild", "zebra").await.unwrap();

    assert!(index.autocomplete("guild", "app").await.unwrap().is_empty());
}

#[tokio::test]
async fn autocomplete_on_empty_namespace_is_empty() {
    let (_, index) = index();
    assert!(index.autocomplete("nobody", "a").await.unwrap().is_empty());
}

#[tokio::test]
async fn autocomplete_caps_results_at_ten() {
    let (_, index) = index();

    for i in 0..15 {
        index.add_member("guild", &format!("user{i:02}")).await.unwrap();
    }

    let results = index.autocomplete("guild", "user").await.unwrap();
    assert_eq!(results.len(), 10);
    assert_eq!(results[0], "user00");
    assert_eq!(results[9], "user09");
}

#[tokio::test]
async fn autocomplete_cleans_up_its_markers() {
    let (store, index) = index();

    index.add_member("guild", "apple").await.unwrap();
    index.autocomplete("guild", "app").await.unwrap();

    assert_eq!(store.zset_card("members:guild").await.unwrap(), 1);
}

#[tokio::test]
async fn leftover_markers_are_filtered_from_results() {
    let (store, index) = index();

    index.add_member("guild", "apple").await.unwrap();
    // A marker another search would have left mid-flight.
    store
        .zset_add("members:guild", &[("app{dead-beef", 0.0)])
        .await
        .unwrap();

    let results = index.autocomplete("guild", "app").await.unwrap();
    assert_eq!(results, vec!["apple"]);
}

#[tokio::test]
async fn members_can_leave() {
    let (_, index) = index();

    index.add_member("guild", "apple").await.unwrap();
    assert!(index.remove_member("guild", "apple").await.unwrap());
    assert!(!index.remove_member("guild", "apple").await.unwrap());

    assert!(index.autocomplete("guild", "app").await.unwrap().is_empty());
}

#[tokio::test]
async fn add_member_reports_duplicates() {
    let (_, index) = index();

    assert!(index.add_member("guild", "apple").await.unwrap());
    assert!(!index.add_member("guild", "apple").await.unwrap());
}

#[tokio::test]
async fn recent_contacts_order_and_dedupe() {
    let store = Arc::new(MemoryStore::new());
    let contacts = RecentContacts::new(store);

    contacts.touch("u", "alice").await.unwrap();
    contacts.touch("u", "bob").await.unwrap();
    contacts.touch("u", "alice").await.unwrap();

    // Re-touching moves to the front instead of duplicating.
    let all = contacts.suggest("u", "").await.unwrap();
    assert_eq!(all, vec!["alice", "bob"]);
}

#[tokio::test]
async fn recent_contacts_capacity_is_enforced() {
    let store = Arc::new(MemoryStore::new());
    let contacts = RecentContacts::with_capacity(store, 3);

    for name in ["a", "b", "c", "d"] {
        contacts.touch("u", name).await.unwrap();
    }

    let all = contacts.suggest("u", "").await.unwrap();
    assert_eq!(all, vec!["d", "c", "b"]);
}

#[tokio::test]
async fn recent_contacts_prefix_filter_is_case_insensitive() {
    let store = Arc::new(MemoryStore::new());
    let contacts = RecentContacts::new(store);

    contacts.touch("u", "Alice").await.unwrap();
    contacts.touch("u", "albert").await.unwrap();
    contacts.touch("u", "bob").await.unwrap();

    let matches = contacts.suggest("u", "AL").await.unwrap();
    assert_eq!(matches, vec!["albert", "Alice"]);
}

#[tokio::test]
async fn recent_contacts_remove() {
    let store = Arc::new(MemoryStore::new());
    let contacts = RecentContacts::new(store);

    contacts.touch("u", "alice").await.unwrap();
    contacts.remove("u", "alice").await.unwrap();

    assert!(contacts.suggest("u", "a").await.unwrap().is_empty());
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Prefix autocomplete over sorted member namespaces
//!
//! [`PrefixIndex`] keeps one sorted collection per namespace with every
//! member scored 0, so ordering is pure byte order on the member itself.
//! A search brackets the prefix's lexicographic range with two synthetic
//! boundary markers, reads their ranks under `watch`, and removes them in
//! the same commit that fetches the window, so concurrent searches never
//! observe each other's markers as real members.
//!
//! [`RecentContacts`] is the small-list variant: a capped most-recent
//! list per user, filtered client-side.

use crate::retry;
use rally_store::{Batch, Command, Reply, StoreAdapter, StoreError};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// The alphabet members may use, bracketed by the reserved predecessor
/// sentinel `` ` `` and terminator `{` (the bytes on either side of a-z).
const VALID_CHARACTERS: &[u8] = b"`abcdefghijklmnopqrstuvwxyz{";

/// How many completions one search returns at most.
const WINDOW: i64 = 10;

/// Derive the half-open lexicographic range bracketing every member that
/// starts with `prefix`: swap the last character for its predecessor in
/// the alphabet and terminate both ends with `{`.
pub fn find_prefix_range(prefix: &str) -> (String, String) {
    let mut head: Vec<char> = prefix.chars().collect();
    let last = head.pop();

    let position = last.map_or(0, |c| {
        VALID_CHARACTERS
            .iter()
            .position(|&b| b as char >= c)
            .unwrap_or(VALID_CHARACTERS.len())
    });
    let predecessor = VALID_CHARACTERS[position.saturating_sub(1).min(VALID_CHARACTERS.len() - 1)] as char;

    let mut start: String = head.into_iter().collect();
    start.push(predecessor);
    start.push('{');
    (start, format!("{prefix}{{"))
}

/// Autocomplete index over one sorted collection per namespace.
pub struct PrefixIndex<S> {
    store: Arc<S>,
}

impl<S: StoreAdapter> PrefixIndex<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    fn key(namespace: &str) -> String {
        format!("members:{namespace}")
    }

    /// Add a member; false if it was already present.
    pub async fn add_member(&self, namespace: &str, member: &str) -> Result<bool, StoreError> {
        let added = self
            .store
            .zset_add(&Self::key(namespace), &[(member, 0.0)])
            .await?;
        Ok(added > 0)
    }

    /// Remove a member; false if it was not present.
    pub async fn remove_member(&self, namespace: &str, member: &str) -> Result<bool, StoreError> {
        let removed = self
            .store
            .zset_remove(&Self::key(namespace), &[member])
            .await?;
        Ok(removed > 0)
    }

    /// Up to ten members starting with `prefix`, in byte order.
    ///
    /// A prefix matching nothing is an empty result, never an error.
    pub async fn autocomplete(&self, namespace: &str, prefix: &str) -> Result<Vec<String>, StoreError> {
        let (range_start, range_end) = find_prefix_range(prefix);
        // Unique suffixes keep concurrent searches' markers distinct from
        // each other and from any real member.
        let suffix = Uuid::new_v4().to_string();
        let start_marker = format!("{range_start}{suffix}");
        let end_marker = format!("{range_end}{suffix}");
        let key = Self::key(namespace);

        self.store
            .zset_add(&key, &[(&start_marker, 0.0), (&end_marker, 0.0)])
            .await?;

        let items = retry::on_conflict(|| {
            let store = &self.store;
            let key = &key;
            let start_marker = &start_marker;
            let end_marker = &end_marker;
            async move {
                let handle = store.watch(&[key.as_str()]).await?;
                let start_rank = store.zset_rank(key, start_marker).await?;
                let end_rank = store.zset_rank(key, end_marker).await?;

                let mut batch = Batch::new();
                batch.push(Command::ZsetRemove {
                    key: key.clone(),
                    members: vec![start_marker.clone(), end_marker.clone()],
                });

                let Some((start_rank, end_rank)) = start_rank.zip(end_rank) else {
                    // The namespace key vanished under us; nothing to fetch.
                    store.commit(handle, batch).await?;
                    return Ok(Vec::new());
                };

                let start = start_rank as i64;
                let stop = (start + WINDOW - 1).min(end_rank as i64 - 2);
                let fetch = stop >= start;
                if fetch {
                    batch.push(Command::ZsetRange { key: key.clone(), start, stop });
                }

                let mut replies = store.commit(handle, batch).await?;
                if fetch {
                    Ok(replies.pop().map(Reply::into_strings).unwrap_or_default())
                } else {
                    Ok(Vec::new())
                }
            }
        })
        .await?;

        debug!(namespace, prefix, results = items.len(), "autocomplete");
        // Markers from a search caught mid-transition carry the terminator;
        // keep them out of results regardless.
        Ok(items.into_iter().filter(|item| !item.contains('{')).collect())
    }
}

/// Capped most-recent contact list per user, prefix-filtered client-side.
pub struct RecentContacts<S> {
    store: Arc<S>,
    capacity: i64,
}

impl<S: StoreAdapter> RecentContacts<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store, capacity: 100 }
    }

    pub fn with_capacity(store: Arc<S>, capacity: i64) -> Self {
        Self { store, capacity }
    }

    fn key(user: &str) -> String {
        format!("recent:{user}")
    }

    /// Record `contact` as the most recent for `user`, deduplicating and
    /// trimming past the capacity, all in one atomic batch.
    pub async fn touch(&self, user: &str, contact: &str) -> Result<(), StoreError> {
        let key = Self::key(user);
        let mut batch = Batch::new();
        batch.push(Command::ListRemove { key: key.clone(), value: contact.to_string() });
        batch.push(Command::PushLeft { key: key.clone(), items: vec![contact.to_string()] });
        batch.push(Command::ListTrim { key, start: 0, stop: self.capacity - 1 });
        self.store.exec(batch).await?;
        Ok(())
    }

    pub async fn remove(&self, user: &str, contact: &str) -> Result<(), StoreError> {
        self.store.list_remove(&Self::key(user), contact).await?;
        Ok(())
    }

    /// Contacts whose name starts with `prefix`, most recent first,
    /// matched case-insensitively.
    pub async fn suggest(&self, user: &str, prefix: &str) -> Result<Vec<String>, StoreError> {
        let candidates = self.store.list_range(&Self::key(user), 0, -1).await?;
        let prefix = prefix.to_lowercase();
        Ok(candidates
            .into_iter()
            .filter(|candidate| candidate.to_lowercase().starts_with(&prefix))
            .collect())
    }
}

#[cfg(test)]
#[path = "autocomplete_tests.rs"]
mod tests;

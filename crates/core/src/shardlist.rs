// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A logical list sharded across capped physical lists
//!
//! The list `name` is realized as physical shards `name:<index>` plus two
//! pointers `name:first` and `name:last` recording the live boundary
//! shards. Indices grow outward: left-end growth decrements, right-end
//! growth increments, and an index is never reused while its shard is
//! non-empty. Every structural step runs as one atomic op so concurrent
//! pushers and poppers never observe a half-moved boundary, and FIFO/LIFO
//! order across shard boundaries is exactly that of one unsharded list.

use rally_store::{Clock, Reply, StoreAdapter, StoreError, StoreTxn, SystemClock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Largest number of items one atomic push step will move.
const PUSH_BATCH: usize = 64;

/// Reserved filler pushed to wake a popper blocked on a stale shard.
/// The control bytes keep it distinct from any caller-supplied item; it is
/// swallowed before results reach callers.
pub(crate) const DUMMY: &str = "\u{1}rally:dummy\u{1}";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum End {
    Left,
    Right,
}

/// Sharded list configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ShardedListConfig {
    /// Base name for the shard and pointer keys
    pub name: String,
    /// The store's per-shard entry cap. One slot per shard is always left
    /// free for the blocking-pop sentinel, so usable capacity is one less.
    pub shard_size: u64,
    /// Upper bound on one native blocking wait before the boundary
    /// pointers are re-checked
    #[serde(with = "humantime_serde")]
    pub block_interval: Duration,
}

impl ShardedListConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shard_size: 128,
            block_interval: Duration::from_secs(1),
        }
    }

    pub fn with_shard_size(mut self, shard_size: u64) -> Self {
        self.shard_size = shard_size;
        self
    }

    pub fn with_block_interval(mut self, interval: Duration) -> Self {
        self.block_interval = interval;
        self
    }
}

fn parse_shard(value: Option<String>) -> i64 {
    value.and_then(|v| v.parse().ok()).unwrap_or(0)
}

/// A logical unbounded list sharded across capped physical lists.
pub struct ShardedList<S, C = SystemClock> {
    store: Arc<S>,
    clock: C,
    config: ShardedListConfig,
}

impl<S: StoreAdapter, C: Clock> ShardedList<S, C> {
    pub fn new(store: Arc<S>, clock: C, config: ShardedListConfig) -> Self {
        Self { store, clock, config }
    }

    pub fn config(&self) -> &ShardedListConfig {
        &self.config
    }

    fn first_key(&self) -> String {
        format!("{}:first", self.config.name)
    }

    fn last_key(&self) -> String {
        format!("{}:last", self.config.name)
    }

    fn pointer_key(&self, end: End) -> String {
        match end {
            End::Left => self.first_key(),
            End::Right => self.last_key(),
        }
    }

    /// Push items onto the left end; returns how many were pushed.
    pub async fn push_left(&self, items: &[&str]) -> Result<u64, StoreError> {
        self.push(End::Left, items).await
    }

    /// Push items onto the right end; returns how many were pushed.
    pub async fn push_right(&self, items: &[&str]) -> Result<u64, StoreError> {
        self.push(End::Right, items).await
    }

    async fn push(&self, end: End, items: &[&str]) -> Result<u64, StoreError> {
        let mut total = 0u64;
        let mut remaining = items;
        while !remaining.is_empty() {
            let chunk = &remaining[..remaining.len().min(PUSH_BATCH)];
            let pushed = self.push_some(end, chunk).await?;
            if pushed == 0 {
                // A shard cap below 2 leaves no usable capacity at all.
                break;
            }
            total += pushed;
            remaining = &remaining[pushed as usize..];
        }
        debug!(name = %self.config.name, pushed = total, "sharded push");
        Ok(total)
    }

    /// One atomic step: fill the active end shard as far as the cap
    /// allows, allocating the next index outward when it is full.
    async fn push_some(&self, end: End, items: &[&str]) -> Result<u64, StoreError> {
        if self.config.shard_size < 2 || items.is_empty() {
            return Ok(0);
        }
        let base = self.config.name.clone();
        let pointer = self.pointer_key(end);
        let shard_size = self.config.shard_size;
        let step: i64 = match end {
            End::Left => -1,
            End::Right => 1,
        };
        let items: Vec<String> = items.iter().map(|item| item.to_string()).collect();

        let op = |txn: &mut dyn StoreTxn| -> Result<Reply, StoreError> {
            let mut shard = parse_shard(txn.get(&pointer)?);
            loop {
                let key = format!("{base}:{shard}");
                let len = txn.list_len(&key)?;
                let headroom = (shard_size - 1).saturating_sub(len) as usize;
                if headroom > 0 {
                    let take = items.len().min(headroom);
                    let chunk: Vec<&str> = items[..take].iter().map(String::as_str).collect();
                    match end {
                        End::Left => txn.push_left(&key, &chunk)?,
                        End::Right => txn.push_right(&key, &chunk)?,
                    };
                    return Ok(Reply::Int(take as i64));
                }
                shard = txn.increment(&pointer, step)?;
            }
        };
        let reply = self
            .store
            .run_atomic(&[self.first_key().as_str(), self.last_key().as_str()], &op)
            .await?;
        Ok(reply.as_int().unwrap_or(0) as u64)
    }

    /// Pop from the left end without waiting.
    pub async fn pop_left(&self) -> Result<Option<String>, StoreError> {
        self.pop(End::Left).await
    }

    /// Pop from the right end without waiting.
    pub async fn pop_right(&self) -> Result<Option<String>, StoreError> {
        self.pop(End::Right).await
    }

    async fn pop(&self, end: End) -> Result<Option<String>, StoreError> {
        loop {
            match self.pop_once(end).await? {
                // A sentinel meant for a blocked popper; swallow and retry.
                Some(value) if value == DUMMY => continue,
                other => return Ok(other),
            }
        }
    }

    /// One atomic step: pop the active shard, advancing the boundary
    /// pointer when the shard empties and the two ends have not met.
    async fn pop_once(&self, end: End) -> Result<Option<String>, StoreError> {
        let base = self.config.name.clone();
        let pointer = self.pointer_key(end);
        let other_pointer = self.pointer_key(match end {
            End::Left => End::Right,
            End::Right => End::Left,
        });
        // Consuming an end moves its boundary toward the center.
        let step: i64 = match end {
            End::Left => 1,
            End::Right => -1,
        };

        let op = |txn: &mut dyn StoreTxn| -> Result<Reply, StoreError> {
            let shard = parse_shard(txn.get(&pointer)?);
            let key = format!("{base}:{shard}");
            let mut popped = match end {
                End::Left => txn.pop_left(&key)?,
                End::Right => txn.pop_right(&key)?,
            };
            let emptied = txn.list_len(&key)? == 0;

            if popped.is_none() || emptied {
                let other_shard = parse_shard(txn.get(&other_pointer)?);
                // When both pointers coincide the list has simply drained.
                if shard != other_shard {
                    let next = txn.increment(&pointer, step)?;
                    if popped.is_none() {
                        let key = format!("{base}:{next}");
                        popped = match end {
                            End::Left => txn.pop_left(&key)?,
                            End::Right => txn.pop_right(&key)?,
                        };
                    }
                }
            }
            Ok(popped.map_or(Reply::Nil, Reply::Str))
        };
        let reply = self
            .store
            .run_atomic(&[self.first_key().as_str(), self.last_key().as_str()], &op)
            .await?;
        Ok(match reply {
            Reply::Str(value) => Some(value),
            _ => None,
        })
    }

    /// Logical length, computed from the boundary shards' true sizes plus
    /// the interior shard count; never an O(n) scan.
    pub async fn len(&self) -> Result<u64, StoreError> {
        let base = self.config.name.clone();
        let first_key = self.first_key();
        let last_key = self.last_key();
        let shard_size = self.config.shard_size;

        let op = |txn: &mut dyn StoreTxn| -> Result<Reply, StoreError> {
            let first = parse_shard(txn.get(&first_key)?);
            let last = parse_shard(txn.get(&last_key)?);
            let mut total = txn.list_len(&format!("{base}:{first}"))?;
            if first != last {
                total += txn.list_len(&format!("{base}:{last}"))?;
                let interior = (last - first - 1).max(0) as u64;
                total += interior * (shard_size - 1);
            }
            Ok(Reply::Int(total as i64))
        };
        let reply = self.store.run_atomic(&[first_key.as_str(), last_key.as_str()], &op).await?;
        Ok(reply.as_int().unwrap_or(0) as u64)
    }

    pub async fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len().await? == 0)
    }

    /// Pop from the left end, genuinely waiting up to `timeout` for an
    /// item. `Duration::ZERO` waits indefinitely.
    pub async fn blocking_pop_left(&self, timeout: Duration) -> Result<Option<String>, StoreError> {
        self.blocking_pop(End::Left, timeout).await
    }

    /// Pop from the right end, genuinely waiting up to `timeout` for an
    /// item. `Duration::ZERO` waits indefinitely.
    pub async fn blocking_pop_right(&self, timeout: Duration) -> Result<Option<String>, StoreError> {
        self.blocking_pop(End::Right, timeout).await
    }

    async fn blocking_pop(&self, end: End, timeout: Duration) -> Result<Option<String>, StoreError> {
        let deadline = (!timeout.is_zero()).then(|| self.clock.now() + timeout);
        let pointer = self.pointer_key(end);

        loop {
            if let Some(value) = self.pop(end).await? {
                return Ok(Some(value));
            }

            let wait = match deadline {
                None => self.config.block_interval,
                Some(deadline) => {
                    let now = self.clock.now();
                    if now >= deadline {
                        return Ok(None);
                    }
                    self.config.block_interval.min(deadline - now)
                }
            };

            // The shard we are about to block on. A pusher may move the
            // boundary between this read and the native block below; the
            // reconciling op notices and drops a sentinel into the stale
            // shard so the block wakes immediately instead of hanging
            // past the value's arrival.
            let observed = self.store.get(&pointer).await?.unwrap_or_else(|| "0".to_string());

            let base = self.config.name.clone();
            let pointer_key = pointer.clone();
            let stale = observed.clone();
            let reconcile = move |txn: &mut dyn StoreTxn| -> Result<Reply, StoreError> {
                let current = txn.get(&pointer_key)?.unwrap_or_else(|| "0".to_string());
                if current != stale {
                    let key = format!("{base}:{stale}");
                    match end {
                        End::Left => txn.push_left(&key, &[DUMMY])?,
                        End::Right => txn.push_right(&key, &[DUMMY])?,
                    };
                }
                Ok(Reply::Nil)
            };
            self.store.run_atomic(&[pointer.as_str()], &reconcile).await?;

            let shard_key = format!("{}:{}", self.config.name, observed);
            let result = match end {
                End::Left => self.store.blocking_pop_left(&[shard_key.as_str()], wait).await?,
                End::Right => self.store.blocking_pop_right(&[shard_key.as_str()], wait).await?,
            };
            if let Some((_, value)) = result {
                if value != DUMMY {
                    return Ok(Some(value));
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "shardlist_tests.rs"]
mod tests;

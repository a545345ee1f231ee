// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Counting semaphores for multi-holder resource limiting
//!
//! [`Semaphore`] is the simple variant: one atomic batch expires stale
//! holders, inserts the caller, and reads its rank, but a rejected caller
//! removes its own entry in a separate round trip. In that window another
//! acquirer can briefly count the loser against the limit, so under heavy
//! contention the simple variant can admit slightly fewer holders than it
//! could. [`FairSemaphore`] is the prescribed upgrade: a store-resident
//! ticket counter makes admission FIFO among live holders, and
//! [`FairSemaphore::acquire_with_lock`] serializes admission entirely for
//! exact behavior at the cost of a little latency.
//!
//! Holders lease their slot for a fixed window and must `refresh` to keep
//! it; expiry is enforced by score, not by the store's key TTLs.

use crate::lock::{Lock, LockConfig};
use crate::token::Token;
use rally_store::{Batch, Clock, Command, Reply, StoreAdapter, StoreError, StoreTxn, SystemClock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Semaphore configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SemaphoreConfig {
    /// Name identifying this semaphore
    pub name: String,
    /// Maximum number of simultaneous holders
    pub limit: u32,
    /// How long a holder keeps its slot without refreshing
    #[serde(with = "humantime_serde")]
    pub lease: Duration,
    /// How long to keep retrying an acquire before giving up
    #[serde(with = "humantime_serde")]
    pub acquire_timeout: Duration,
    /// Delay between acquire attempts
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
}

impl SemaphoreConfig {
    pub fn new(name: impl Into<String>, limit: u32) -> Self {
        Self {
            name: name.into(),
            limit,
            lease: Duration::from_secs(10),
            acquire_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(1),
        }
    }

    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Simple counting semaphore; see the module docs for its race window.
pub struct Semaphore<S, C = SystemClock> {
    store: Arc<S>,
    clock: C,
    config: SemaphoreConfig,
}

impl<S: StoreAdapter, C: Clock> Semaphore<S, C> {
    pub fn new(store: Arc<S>, clock: C, config: SemaphoreConfig) -> Self {
        Self { store, clock, config }
    }

    pub fn config(&self) -> &SemaphoreConfig {
        &self.config
    }

    /// One admission attempt. Expires stale holders, inserts this caller
    /// scored by the current time, and admits it if its rank is within the
    /// limit; otherwise the just-inserted entry is removed again.
    pub async fn try_acquire(&self) -> Result<Option<Token>, StoreError> {
        let token = Token::fresh();
        let now = self.clock.unix_secs();
        let horizon = now - self.config.lease.as_secs_f64();
        let key = &self.config.name;

        let mut batch = Batch::new();
        batch.push(Command::ZsetRemoveRangeByScore {
            key: key.clone(),
            min: f64::NEG_INFINITY,
            max: horizon,
        });
        batch.push(Command::ZsetAdd {
            key: key.clone(),
            entries: vec![(token.as_str().to_string(), now)],
        });
        batch.push(Command::ZsetRank {
            key: key.clone(),
            member: token.as_str().to_string(),
        });
        let replies = self.store.exec(batch).await?;

        let rank = replies.last().and_then(Reply::as_int);
        if rank.is_some_and(|rank| rank < i64::from(self.config.limit)) {
            debug!(name = %self.config.name, token = %token, "semaphore acquired");
            return Ok(Some(token));
        }

        // Compensating removal is a second round trip; until it lands a
        // concurrent acquirer may count this entry against the limit.
        self.store.zset_remove(key, &[token.as_str()]).await?;
        Ok(None)
    }

    /// Acquire, polling until granted or `acquire_timeout` elapses.
    pub async fn acquire(&self) -> Result<Option<Token>, StoreError> {
        let deadline = self.clock.now() + self.config.acquire_timeout;
        loop {
            if let Some(token) = self.try_acquire().await? {
                return Ok(Some(token));
            }
            if self.clock.now() >= deadline {
                debug!(name = %self.config.name, "semaphore acquire timed out");
                return Ok(None);
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Re-stamp a held slot's lease; false means the slot was already
    /// gone and the caller no longer holds the semaphore.
    pub async fn refresh(&self, token: &Token) -> Result<bool, StoreError> {
        let key = self.config.name.clone();
        let member = token.as_str().to_string();
        let now = self.clock.unix_secs();
        let restamp = move |txn: &mut dyn StoreTxn| -> Result<Reply, StoreError> {
            if txn.zset_score(&key, &member)?.is_some() {
                txn.zset_add(&key, &[(member.as_str(), now)])?;
                return Ok(Reply::Bool(true));
            }
            Ok(Reply::Bool(false))
        };
        let reply = self.store.run_atomic(&[self.config.name.as_str()], &restamp).await?;

        let held = reply == Reply::Bool(true);
        if !held {
            warn!(name = %self.config.name, token = %token, "semaphore lease already gone");
        }
        Ok(held)
    }

    /// Give the slot back; false means it had already expired or been
    /// removed. Releasing twice is safe.
    pub async fn release(&self, token: &Token) -> Result<bool, StoreError> {
        let removed = self.store.zset_remove(&self.config.name, &[token.as_str()]).await?;
        if removed > 0 {
            debug!(name = %self.config.name, token = %token, "semaphore released");
        }
        Ok(removed > 0)
    }
}

/// FIFO counting semaphore backed by a ticket counter.
///
/// Three correlated keys share the semaphore name: the lease zset scored
/// by wall-clock time, an owner zset scored by ticket number, and the
/// counter itself. Lease expiry removes entries only from the lease zset,
/// so admission first intersects the owner zset against the live leases;
/// that intersection is part of the algorithm, not optional cleanup.
pub struct FairSemaphore<S, C = SystemClock> {
    store: Arc<S>,
    clock: C,
    config: SemaphoreConfig,
}

impl<S: StoreAdapter, C: Clock> FairSemaphore<S, C> {
    pub fn new(store: Arc<S>, clock: C, config: SemaphoreConfig) -> Self {
        Self { store, clock, config }
    }

    pub fn config(&self) -> &SemaphoreConfig {
        &self.config
    }

    fn lease_key(&self) -> String {
        self.config.name.clone()
    }

    fn owner_key(&self) -> String {
        format!("{}:owner", self.config.name)
    }

    fn counter_key(&self) -> String {
        format!("{}:counter", self.config.name)
    }

    /// One admission attempt; FIFO by ticket among live holders.
    pub async fn try_acquire(&self) -> Result<Option<Token>, StoreError> {
        let token = Token::fresh();
        let now = self.clock.unix_secs();
        let horizon = now - self.config.lease.as_secs_f64();
        let lease = self.lease_key();
        let owner = self.owner_key();

        // Reap expired leases, drop their owner entries via intersection,
        // and draw this caller's ticket.
        let mut batch = Batch::new();
        batch.push(Command::ZsetRemoveRangeByScore {
            key: lease.clone(),
            min: f64::NEG_INFINITY,
            max: horizon,
        });
        batch.push(Command::ZsetIntersectStore {
            dest: owner.clone(),
            sources: vec![(owner.clone(), 1.0), (lease.clone(), 0.0)],
        });
        batch.push(Command::Increment { key: self.counter_key(), by: 1 });
        let replies = self.store.exec(batch).await?;
        let Some(ticket) = replies.last().and_then(Reply::as_int) else {
            return Ok(None);
        };

        // Enter both collections and read our admission rank.
        let mut batch = Batch::new();
        batch.push(Command::ZsetAdd {
            key: lease.clone(),
            entries: vec![(token.as_str().to_string(), now)],
        });
        batch.push(Command::ZsetAdd {
            key: owner.clone(),
            entries: vec![(token.as_str().to_string(), ticket as f64)],
        });
        batch.push(Command::ZsetRank {
            key: owner.clone(),
            member: token.as_str().to_string(),
        });
        let replies = self.store.exec(batch).await?;

        let rank = replies.last().and_then(Reply::as_int);
        if rank.is_some_and(|rank| rank < i64::from(self.config.limit)) {
            debug!(name = %self.config.name, token = %token, ticket, "fair semaphore acquired");
            return Ok(Some(token));
        }

        // Over the limit: take both entries back out.
        let mut batch = Batch::new();
        batch.push(Command::ZsetRemove {
            key: lease,
            members: vec![token.as_str().to_string()],
        });
        batch.push(Command::ZsetRemove {
            key: owner,
            members: vec![token.as_str().to_string()],
        });
        self.store.exec(batch).await?;
        Ok(None)
    }

    /// Acquire, polling until granted or `acquire_timeout` elapses.
    pub async fn acquire(&self) -> Result<Option<Token>, StoreError> {
        let deadline = self.clock.now() + self.config.acquire_timeout;
        loop {
            if let Some(token) = self.try_acquire().await? {
                return Ok(Some(token));
            }
            if self.clock.now() >= deadline {
                debug!(name = %self.config.name, "fair semaphore acquire timed out");
                return Ok(None);
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// One admission attempt with the whole sequence wrapped in a short
    /// lock, closing the simple variant's race windows at the cost of
    /// serializing admissions.
    pub async fn acquire_with_lock(&self) -> Result<Option<Token>, StoreError> {
        let lock = Lock::new(
            self.store.clone(),
            self.clock.clone(),
            LockConfig::new(&self.config.name).with_acquire_timeout(Duration::from_millis(10)),
        );
        let Some(guard) = lock.acquire().await? else {
            return Ok(None);
        };

        let result = self.try_acquire().await;

        if let Err(e) = lock.release(&guard).await {
            warn!(name = %self.config.name, error = %e, "failed to release admission lock");
        }
        result
    }

    /// Re-stamp a held lease. If the entry had already been reaped the
    /// caller has lost the semaphore: its ghost entries are cleaned up and
    /// false comes back.
    pub async fn refresh(&self, token: &Token) -> Result<bool, StoreError> {
        let now = self.clock.unix_secs();
        // A new insertion here means the lease was reaped out from under us.
        let added = self
            .store
            .zset_add(&self.lease_key(), &[(token.as_str(), now)])
            .await?;
        if added > 0 {
            warn!(name = %self.config.name, token = %token, "fair semaphore lost; cleaning up");
            self.release(token).await?;
            return Ok(false);
        }
        Ok(true)
    }

    /// Remove this holder from both collections; true iff the lease entry
    /// was still present.
    pub async fn release(&self, token: &Token) -> Result<bool, StoreError> {
        let mut batch = Batch::new();
        batch.push(Command::ZsetRemove {
            key: self.lease_key(),
            members: vec![token.as_str().to_string()],
        });
        batch.push(Command::ZsetRemove {
            key: self.owner_key(),
            members: vec![token.as_str().to_string()],
        });
        let replies = self.store.exec(batch).await?;

        let released = replies.first().and_then(Reply::as_int).unwrap_or(0) > 0;
        if released {
            debug!(name = %self.config.name, token = %token, "fair semaphore released");
        }
        Ok(released)
    }
}

#[cfg(test)]
#[path = "semaphore_tests.rs"]
mod tests;

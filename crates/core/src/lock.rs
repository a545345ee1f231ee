// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Distributed lock for exclusive resource access
//!
//! Exclusive, timed mutual exclusion keyed by name. An acquirer writes a
//! fresh random token under `lock:<name>` only if the entry is absent, and
//! arms an expiration so a crashed holder cannot wedge the lock. Only the
//! process holding the matching token can release it; everyone else's
//! release attempts leave the entry intact.

use crate::token::Token;
use rally_store::{Clock, Reply, StoreAdapter, StoreError, StoreTxn, SystemClock, Ttl};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Lock configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LockConfig {
    /// Name identifying this lock
    pub name: String,
    /// How long to keep retrying an acquire before giving up
    #[serde(with = "humantime_serde")]
    pub acquire_timeout: Duration,
    /// How long an acquired lock lives if never released
    #[serde(with = "humantime_serde")]
    pub hold_timeout: Duration,
    /// Delay between acquire attempts
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
}

impl LockConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            acquire_timeout: Duration::from_secs(10),
            hold_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(1),
        }
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn with_hold_timeout(mut self, timeout: Duration) -> Self {
        self.hold_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// A distributed lock handle bound to one store and name
///
/// Handles are cheap and stateless; any number of tasks may hold one for
/// the same name and race through it.
pub struct Lock<S, C = SystemClock> {
    store: Arc<S>,
    clock: C,
    config: LockConfig,
}

impl<S: StoreAdapter, C: Clock> Lock<S, C> {
    pub fn new(store: Arc<S>, clock: C, config: LockConfig) -> Self {
        Self { store, clock, config }
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    fn key(&self) -> String {
        format!("lock:{}", self.config.name)
    }

    /// Acquire the lock, polling until it is granted or `acquire_timeout`
    /// elapses. Timing out is not an error: the token is simply absent.
    pub async fn acquire(&self) -> Result<Option<Token>, StoreError> {
        let token = Token::fresh();
        let deadline = self.clock.now() + self.config.acquire_timeout;
        loop {
            if self.attempt(&token).await? {
                return Ok(Some(token));
            }
            if self.clock.now() >= deadline {
                debug!(name = %self.config.name, "lock acquire timed out");
                return Ok(None);
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Single acquire attempt without waiting.
    pub async fn try_acquire(&self) -> Result<Option<Token>, StoreError> {
        let token = Token::fresh();
        Ok(self.attempt(&token).await?.then_some(token))
    }

    async fn attempt(&self, token: &Token) -> Result<bool, StoreError> {
        let key = self.key();
        if self.store.set_if_absent(&key, token.as_str()).await? {
            self.store.expire(&key, self.config.hold_timeout).await?;
            debug!(name = %self.config.name, token = %token, "lock acquired");
            return Ok(true);
        }
        // A holder that died between creating the entry and arming its
        // expiration leaves it undated; re-arm so the lock cannot wedge.
        if self.store.ttl(&key).await? == Ttl::Persistent {
            warn!(name = %self.config.name, "re-arming expiration on undated lock entry");
            self.store.expire(&key, self.config.hold_timeout).await?;
        }
        Ok(false)
    }

    /// Release the lock if `token` still holds it.
    ///
    /// The check and the delete run as one atomic step, so a lock that
    /// expired and was re-acquired by someone else is never torn down by a
    /// stale holder. Returns false when the token no longer held the lock.
    pub async fn release(&self, token: &Token) -> Result<bool, StoreError> {
        let key = self.key();
        let holder = token.as_str().to_string();
        let check_then_delete = |txn: &mut dyn StoreTxn| -> Result<Reply, StoreError> {
            if txn.get(&key)?.as_deref() == Some(holder.as_str()) {
                txn.delete(&[key.as_str()])?;
                return Ok(Reply::Bool(true));
            }
            Ok(Reply::Bool(false))
        };
        let reply = self.store.run_atomic(&[key.as_str()], &check_then_delete).await?;

        let released = reply == Reply::Bool(true);
        if released {
            debug!(name = %self.config.name, token = %token, "lock released");
        } else {
            debug!(name = %self.config.name, token = %token, "release ignored; lock no longer held");
        }
        Ok(released)
    }
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;

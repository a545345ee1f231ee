// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The store contract consumed by every coordination primitive
//!
//! The store is a black box: reliable, linearizable for single-key
//! operations, and able to run one atomic batch or [`AtomicOp`] to
//! completion without interleaving from other such operations. Nothing in
//! this workspace assumes anything beyond this contract.

use crate::command::{Batch, Reply};
use crate::error::StoreError;
use async_trait::async_trait;
use std::time::Duration;

/// Remaining lifetime of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// The key does not exist.
    Missing,
    /// The key exists and has no expiration set.
    Persistent,
    /// The key expires after this duration.
    Expires(Duration),
}

/// Snapshot of watched-key versions taken by [`StoreAdapter::watch`].
///
/// Consumed by [`StoreAdapter::commit`], which fails with
/// [`StoreError::Conflict`] if any watched key has since changed. Dropping
/// the handle without committing is the unwatch operation.
#[derive(Debug)]
pub struct WatchHandle {
    pub keys: Vec<String>,
    /// Implementation-defined change counters, one per key.
    pub versions: Vec<u64>,
}

/// The synchronous view handed to an [`AtomicOp`] while the store is held
/// exclusively. Mirrors the adapter's primitives minus blocking calls,
/// which cannot appear inside an atomic step.
pub trait StoreTxn {
    fn get(&mut self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;
    fn delete(&mut self, keys: &[&str]) -> Result<u64, StoreError>;
    fn exists(&mut self, key: &str) -> Result<bool, StoreError>;
    fn expire(&mut self, key: &str, ttl: Duration) -> Result<bool, StoreError>;
    fn increment(&mut self, key: &str, by: i64) -> Result<i64, StoreError>;

    fn zset_add(&mut self, key: &str, entries: &[(&str, f64)]) -> Result<u64, StoreError>;
    fn zset_remove(&mut self, key: &str, members: &[&str]) -> Result<u64, StoreError>;
    fn zset_score(&mut self, key: &str, member: &str) -> Result<Option<f64>, StoreError>;
    fn zset_rank(&mut self, key: &str, member: &str) -> Result<Option<u64>, StoreError>;
    fn zset_range(&mut self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, StoreError>;

    fn list_len(&mut self, key: &str) -> Result<u64, StoreError>;
    fn push_left(&mut self, key: &str, items: &[&str]) -> Result<u64, StoreError>;
    fn push_right(&mut self, key: &str, items: &[&str]) -> Result<u64, StoreError>;
    fn pop_left(&mut self, key: &str) -> Result<Option<String>, StoreError>;
    fn pop_right(&mut self, key: &str) -> Result<Option<String>, StoreError>;
}

/// A function executed indivisibly on the store.
///
/// This is the spec's "atomic scripted execution" surface: an
/// implementation may ship it to a remote scripting facility or run it as
/// an in-process critical section, and call sites cannot tell the
/// difference. Any `Fn(&mut dyn StoreTxn) -> Result<Reply, StoreError>`
/// is an [`AtomicOp`].
pub trait AtomicOp: Send + Sync {
    fn apply(&self, txn: &mut dyn StoreTxn) -> Result<Reply, StoreError>;
}

impl<F> AtomicOp for F
where
    F: Fn(&mut dyn StoreTxn) -> Result<Reply, StoreError> + Send + Sync,
{
    fn apply(&self, txn: &mut dyn StoreTxn) -> Result<Reply, StoreError> {
        self(txn)
    }
}

/// Contract over the external store's primitives.
///
/// Every coordination primitive is built only from this trait; the store
/// owns expiration (time-to-live) and the single global serialization
/// point for conflicting operations.
#[async_trait]
pub trait StoreAdapter: Send + Sync + 'static {
    // ---- scalar ----

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    /// Set only if the key does not exist; true when the write happened.
    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool, StoreError>;
    /// Delete keys, returning how many existed.
    async fn delete(&self, keys: &[&str]) -> Result<u64, StoreError>;
    /// Arm or re-arm a key's expiration; false if the key is missing.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;
    async fn ttl(&self, key: &str) -> Result<Ttl, StoreError>;
    /// Atomically add `by` to an integer key, treating a missing key as 0.
    async fn increment(&self, key: &str, by: i64) -> Result<i64, StoreError>;

    // ---- sorted collection ----

    /// Insert or re-score members; returns how many were newly inserted.
    async fn zset_add(&self, key: &str, entries: &[(&str, f64)]) -> Result<u64, StoreError>;
    async fn zset_remove(&self, key: &str, members: &[&str]) -> Result<u64, StoreError>;
    /// Position of a member in ascending (score, member) order.
    async fn zset_rank(&self, key: &str, member: &str) -> Result<Option<u64>, StoreError>;
    async fn zset_score(&self, key: &str, member: &str) -> Result<Option<f64>, StoreError>;
    /// Members between Redis-style indices (negative counts from the end).
    async fn zset_range(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, StoreError>;
    async fn zset_remove_range_by_score(&self, key: &str, min: f64, max: f64) -> Result<u64, StoreError>;
    async fn zset_card(&self, key: &str) -> Result<u64, StoreError>;
    /// Store into `dest` the members present in every source, scores
    /// summed after weighting. Returns the resulting cardinality.
    async fn zset_intersect_store(&self, dest: &str, sources: &[(&str, f64)]) -> Result<u64, StoreError>;

    // ---- set ----

    async fn set_add(&self, key: &str, members: &[&str]) -> Result<u64, StoreError>;
    async fn set_remove(&self, key: &str, members: &[&str]) -> Result<u64, StoreError>;
    async fn set_contains(&self, key: &str, member: &str) -> Result<bool, StoreError>;
    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError>;

    // ---- list ----

    /// Prepend items one at a time; each lands at the head. Returns the
    /// new length.
    async fn push_left(&self, key: &str, items: &[&str]) -> Result<u64, StoreError>;
    async fn push_right(&self, key: &str, items: &[&str]) -> Result<u64, StoreError>;
    async fn pop_left(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn pop_right(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn list_len(&self, key: &str) -> Result<u64, StoreError>;
    /// Remove every occurrence of `value`; returns how many were removed.
    async fn list_remove(&self, key: &str, value: &str) -> Result<u64, StoreError>;
    async fn list_trim(&self, key: &str, start: i64, stop: i64) -> Result<(), StoreError>;
    async fn list_range(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, StoreError>;

    /// Pop from the first non-empty key, genuinely waiting (not polling)
    /// up to `timeout` for one to fill. `Duration::ZERO` waits
    /// indefinitely. Returns the key popped from alongside the value.
    async fn blocking_pop_left(
        &self,
        keys: &[&str],
        timeout: Duration,
    ) -> Result<Option<(String, String)>, StoreError>;
    async fn blocking_pop_right(
        &self,
        keys: &[&str],
        timeout: Duration,
    ) -> Result<Option<(String, String)>, StoreError>;

    // ---- transactions ----

    /// Snapshot the named keys for an optimistic commit.
    async fn watch(&self, keys: &[&str]) -> Result<WatchHandle, StoreError>;
    /// Run a batch atomically with no preconditions.
    async fn exec(&self, batch: Batch) -> Result<Vec<Reply>, StoreError>;
    /// Run a batch atomically iff no watched key changed since `watch`;
    /// otherwise fail with [`StoreError::Conflict`] and apply nothing.
    async fn commit(&self, handle: WatchHandle, batch: Batch) -> Result<Vec<Reply>, StoreError>;

    // ---- atomic scripted execution ----

    /// Execute `op` indivisibly. `keys` names every key the op may touch,
    /// for implementations that route or lock by key.
    async fn run_atomic(&self, keys: &[&str], op: &dyn AtomicOp) -> Result<Reply, StoreError>;
}

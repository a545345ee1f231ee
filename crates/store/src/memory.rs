// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory reference implementation of the store contract
//!
//! Backs every test in the workspace. Clones share one underlying state,
//! so handing a clone to each task models independent connections to the
//! same server. Expirations are applied lazily against the injected
//! [`Clock`]; per-key version counters back the optimistic `watch`/`commit`
//! protocol; a [`Notify`] wakes blocked poppers after each write.

use crate::adapter::{AtomicOp, StoreAdapter, StoreTxn, Ttl, WatchHandle};
use crate::clock::{Clock, SystemClock};
use crate::command::{Batch, Command, Reply};
use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::trace;

#[derive(Debug, Clone)]
enum Entry {
    Scalar(String),
    Zset(HashMap<String, f64>),
    Set(HashSet<String>),
    List(VecDeque<String>),
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::WrongType { key: key.to_string() }
}

/// Map Redis-style inclusive indices onto `0..len`; negative indices count
/// from the end. `None` means the selection is empty.
fn normalize_range(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    if len == 0 {
        return None;
    }
    let n = len as i64;
    let start = if start < 0 { (n + start).max(0) } else { start };
    let stop = if stop < 0 { n + stop } else { stop };
    let stop = stop.min(n - 1);
    if start > stop || start >= n || stop < 0 {
        return None;
    }
    Some((start as usize, stop as usize))
}

#[derive(Default)]
struct State {
    entries: HashMap<String, Entry>,
    deadlines: HashMap<String, Instant>,
    versions: HashMap<String, u64>,
}

impl State {
    fn bump(&mut self, key: &str) {
        *self.versions.entry(key.to_string()).or_insert(0) += 1;
    }

    fn version(&self, key: &str) -> u64 {
        self.versions.get(key).copied().unwrap_or(0)
    }

    /// Lazily expire a key whose deadline has passed. Counts as a change
    /// for watch purposes, exactly like a server-side eviction.
    fn purge(&mut self, key: &str, now: Instant) {
        if self.deadlines.get(key).is_some_and(|deadline| *deadline <= now) {
            self.entries.remove(key);
            self.deadlines.remove(key);
            self.bump(key);
        }
    }

    /// Collections never linger empty; the key disappears with its last
    /// member, as the contract's `exists` semantics require.
    fn drop_if_empty(&mut self, key: &str) {
        let empty = match self.entries.get(key) {
            Some(Entry::Zset(members)) => members.is_empty(),
            Some(Entry::Set(members)) => members.is_empty(),
            Some(Entry::List(items)) => items.is_empty(),
            _ => false,
        };
        if empty {
            self.entries.remove(key);
            self.deadlines.remove(key);
        }
    }

    // ---- scalar ----

    fn get(&mut self, key: &str, now: Instant) -> Result<Option<String>, StoreError> {
        self.purge(key, now);
        match self.entries.get(key) {
            None => Ok(None),
            Some(Entry::Scalar(value)) => Ok(Some(value.clone())),
            Some(_) => Err(wrong_type(key)),
        }
    }

    fn set(&mut self, key: &str, value: &str, now: Instant) -> Result<(), StoreError> {
        self.purge(key, now);
        self.entries.insert(key.to_string(), Entry::Scalar(value.to_string()));
        self.deadlines.remove(key);
        self.bump(key);
        Ok(())
    }

    fn set_if_absent(&mut self, key: &str, value: &str, now: Instant) -> Result<bool, StoreError> {
        self.purge(key, now);
        if self.entries.contains_key(key) {
            return Ok(false);
        }
        self.entries.insert(key.to_string(), Entry::Scalar(value.to_string()));
        self.bump(key);
        Ok(true)
    }

    fn delete(&mut self, keys: &[&str], now: Instant) -> Result<u64, StoreError> {
        let mut removed = 0;
        for key in keys {
            self.purge(key, now);
            if self.entries.remove(*key).is_some() {
                self.deadlines.remove(*key);
                self.bump(key);
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn exists(&mut self, key: &str, now: Instant) -> Result<bool, StoreError> {
        self.purge(key, now);
        Ok(self.entries.contains_key(key))
    }

    fn expire(&mut self, key: &str, ttl: Duration, now: Instant) -> Result<bool, StoreError> {
        self.purge(key, now);
        if !self.entries.contains_key(key) {
            return Ok(false);
        }
        self.deadlines.insert(key.to_string(), now + ttl);
        self.bump(key);
        Ok(true)
    }

    fn ttl(&mut self, key: &str, now: Instant) -> Result<Ttl, StoreError> {
        self.purge(key, now);
        if !self.entries.contains_key(key) {
            return Ok(Ttl::Missing);
        }
        match self.deadlines.get(key) {
            None => Ok(Ttl::Persistent),
            Some(deadline) => Ok(Ttl::Expires(deadline.saturating_duration_since(now))),
        }
    }

    fn increment(&mut self, key: &str, by: i64, now: Instant) -> Result<i64, StoreError> {
        self.purge(key, now);
        let current = match self.entries.get(key) {
            None => 0,
            Some(Entry::Scalar(value)) => value.parse::<i64>().map_err(|_| wrong_type(key))?,
            Some(_) => return Err(wrong_type(key)),
        };
        let next = current + by;
        self.entries.insert(key.to_string(), Entry::Scalar(next.to_string()));
        self.bump(key);
        Ok(next)
    }

    // ---- sorted collection ----

    fn zset(&mut self, key: &str, now: Instant) -> Result<Option<&HashMap<String, f64>>, StoreError> {
        self.purge(key, now);
        match self.entries.get(key) {
            None => Ok(None),
            Some(Entry::Zset(members)) => Ok(Some(members)),
            Some(_) => Err(wrong_type(key)),
        }
    }

    /// Members in ascending (score, member) order.
    fn zset_sorted(&mut self, key: &str, now: Instant) -> Result<Vec<String>, StoreError> {
        let Some(members) = self.zset(key, now)? else {
            return Ok(Vec::new());
        };
        let mut pairs: Vec<(&String, f64)> = members.iter().map(|(m, s)| (m, *s)).collect();
        pairs.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(b.0)));
        Ok(pairs.into_iter().map(|(member, _)| member.clone()).collect())
    }

    fn zset_add(&mut self, key: &str, entries: &[(&str, f64)], now: Instant) -> Result<u64, StoreError> {
        self.purge(key, now);
        let slot = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::Zset(HashMap::new()));
        let Entry::Zset(members) = slot else {
            return Err(wrong_type(key));
        };
        let mut added = 0;
        for (member, score) in entries {
            if members.insert(member.to_string(), *score).is_none() {
                added += 1;
            }
        }
        self.bump(key);
        Ok(added)
    }

    fn zset_remove(&mut self, key: &str, members: &[&str], now: Instant) -> Result<u64, StoreError> {
        self.purge(key, now);
        let mut removed = 0;
        match self.entries.get_mut(key) {
            None => {}
            Some(Entry::Zset(existing)) => {
                for member in members {
                    if existing.remove(*member).is_some() {
                        removed += 1;
                    }
                }
            }
            Some(_) => return Err(wrong_type(key)),
        }
        if removed > 0 {
            self.drop_if_empty(key);
            self.bump(key);
        }
        Ok(removed)
    }

    fn zset_score(&mut self, key: &str, member: &str, now: Instant) -> Result<Option<f64>, StoreError> {
        Ok(self.zset(key, now)?.and_then(|members| members.get(member).copied()))
    }

    fn zset_rank(&mut self, key: &str, member: &str, now: Instant) -> Result<Option<u64>, StoreError> {
        let sorted = self.zset_sorted(key, now)?;
        Ok(sorted.iter().position(|m| m == member).map(|rank| rank as u64))
    }

    fn zset_range(&mut self, key: &str, start: i64, stop: i64, now: Instant) -> Result<Vec<String>, StoreError> {
        let sorted = self.zset_sorted(key, now)?;
        match normalize_range(sorted.len(), start, stop) {
            None => Ok(Vec::new()),
            Some((start, stop)) => Ok(sorted[start..=stop].to_vec()),
        }
    }

    fn zset_remove_range_by_score(
        &mut self,
        key: &str,
        min: f64,
        max: f64,
        now: Instant,
    ) -> Result<u64, StoreError> {
        self.purge(key, now);
        let mut removed = 0;
        match self.entries.get_mut(key) {
            None => {}
            Some(Entry::Zset(members)) => {
                let before = members.len();
                members.retain(|_, score| *score < min || *score > max);
                removed = (before - members.len()) as u64;
            }
            Some(_) => return Err(wrong_type(key)),
        }
        if removed > 0 {
            self.drop_if_empty(key);
            self.bump(key);
        }
        Ok(removed)
    }

    fn zset_card(&mut self, key: &str, now: Instant) -> Result<u64, StoreError> {
        Ok(self.zset(key, now)?.map_or(0, |members| members.len() as u64))
    }

    fn zset_intersect_store(
        &mut self,
        dest: &str,
        sources: &[(&str, f64)],
        now: Instant,
    ) -> Result<u64, StoreError> {
        let mut maps = Vec::with_capacity(sources.len());
        for (key, weight) in sources {
            let members = self.zset(key, now)?.cloned().unwrap_or_default();
            maps.push((members, *weight));
        }

        let mut result: HashMap<String, f64> = HashMap::new();
        if let Some((first, first_weight)) = maps.first() {
            'member: for (member, score) in first {
                let mut total = score * first_weight;
                for (other, weight) in &maps[1..] {
                    match other.get(member) {
                        Some(other_score) => total += other_score * weight,
                        None => continue 'member,
                    }
                }
                result.insert(member.clone(), total);
            }
        }

        self.purge(dest, now);
        let count = result.len() as u64;
        if result.is_empty() {
            self.entries.remove(dest);
            self.deadlines.remove(dest);
        } else {
            self.entries.insert(dest.to_string(), Entry::Zset(result));
        }
        self.bump(dest);
        Ok(count)
    }

    // ---- set ----

    fn set_add(&mut self, key: &str, members: &[&str], now: Instant) -> Result<u64, StoreError> {
        self.purge(key, now);
        let slot = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::Set(HashSet::new()));
        let Entry::Set(existing) = slot else {
            return Err(wrong_type(key));
        };
        let mut added = 0;
        for member in members {
            if existing.insert(member.to_string()) {
                added += 1;
            }
        }
        self.bump(key);
        Ok(added)
    }

    fn set_remove(&mut self, key: &str, members: &[&str], now: Instant) -> Result<u64, StoreError> {
        self.purge(key, now);
        let mut removed = 0;
        match self.entries.get_mut(key) {
            None => {}
            Some(Entry::Set(existing)) => {
                for member in members {
                    if existing.remove(*member) {
                        removed += 1;
                    }
                }
            }
            Some(_) => return Err(wrong_type(key)),
        }
        if removed > 0 {
            self.drop_if_empty(key);
            self.bump(key);
        }
        Ok(removed)
    }

    fn set_contains(&mut self, key: &str, member: &str, now: Instant) -> Result<bool, StoreError> {
        self.purge(key, now);
        match self.entries.get(key) {
            None => Ok(false),
            Some(Entry::Set(members)) => Ok(members.contains(member)),
            Some(_) => Err(wrong_type(key)),
        }
    }

    fn set_members(&mut self, key: &str, now: Instant) -> Result<Vec<String>, StoreError> {
        self.purge(key, now);
        match self.entries.get(key) {
            None => Ok(Vec::new()),
            Some(Entry::Set(members)) => {
                let mut all: Vec<String> = members.iter().cloned().collect();
                all.sort();
                Ok(all)
            }
            Some(_) => Err(wrong_type(key)),
        }
    }

    // ---- list ----

    fn list(&mut self, key: &str, now: Instant) -> Result<Option<&mut VecDeque<String>>, StoreError> {
        self.purge(key, now);
        match self.entries.get_mut(key) {
            None => Ok(None),
            Some(Entry::List(items)) => Ok(Some(items)),
            Some(_) => Err(wrong_type(key)),
        }
    }

    fn push_left(&mut self, key: &str, items: &[&str], now: Instant) -> Result<u64, StoreError> {
        self.purge(key, now);
        let slot = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::List(VecDeque::new()));
        let Entry::List(list) = slot else {
            return Err(wrong_type(key));
        };
        for item in items {
            list.push_front(item.to_string());
        }
        let len = list.len() as u64;
        self.bump(key);
        Ok(len)
    }

    fn push_right(&mut self, key: &str, items: &[&str], now: Instant) -> Result<u64, StoreError> {
        self.purge(key, now);
        let slot = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::List(VecDeque::new()));
        let Entry::List(list) = slot else {
            return Err(wrong_type(key));
        };
        for item in items {
            list.push_back(item.to_string());
        }
        let len = list.len() as u64;
        self.bump(key);
        Ok(len)
    }

    fn pop_left(&mut self, key: &str, now: Instant) -> Result<Option<String>, StoreError> {
        let popped = match self.list(key, now)? {
            None => None,
            Some(list) => list.pop_front(),
        };
        if popped.is_some() {
            self.drop_if_empty(key);
            self.bump(key);
        }
        Ok(popped)
    }

    fn pop_right(&mut self, key: &str, now: Instant) -> Result<Option<String>, StoreError> {
        let popped = match self.list(key, now)? {
            None => None,
            Some(list) => list.pop_back(),
        };
        if popped.is_some() {
            self.drop_if_empty(key);
            self.bump(key);
        }
        Ok(popped)
    }

    fn list_len(&mut self, key: &str, now: Instant) -> Result<u64, StoreError> {
        Ok(self.list(key, now)?.map_or(0, |list| list.len() as u64))
    }

    fn list_remove(&mut self, key: &str, value: &str, now: Instant) -> Result<u64, StoreError> {
        let removed = match self.list(key, now)? {
            None => 0,
            Some(list) => {
                let before = list.len();
                list.retain(|item| item != value);
                (before - list.len()) as u64
            }
        };
        if removed > 0 {
            self.drop_if_empty(key);
            self.bump(key);
        }
        Ok(removed)
    }

    fn list_trim(&mut self, key: &str, start: i64, stop: i64, now: Instant) -> Result<(), StoreError> {
        let Some(list) = self.list(key, now)? else {
            return Ok(());
        };
        match normalize_range(list.len(), start, stop) {
            None => list.clear(),
            Some((start, stop)) => {
                list.truncate(stop + 1);
                for _ in 0..start {
                    list.pop_front();
                }
            }
        }
        self.drop_if_empty(key);
        self.bump(key);
        Ok(())
    }

    fn list_range(&mut self, key: &str, start: i64, stop: i64, now: Instant) -> Result<Vec<String>, StoreError> {
        match self.list(key, now)? {
            None => Ok(Vec::new()),
            Some(list) => match normalize_range(list.len(), start, stop) {
                None => Ok(Vec::new()),
                Some((start, stop)) => Ok(list.iter().skip(start).take(stop - start + 1).cloned().collect()),
            },
        }
    }

    // ---- batches ----

    fn apply(&mut self, command: &Command, now: Instant) -> Result<Reply, StoreError> {
        match command {
            Command::Get { key } => Ok(self.get(key, now)?.map_or(Reply::Nil, Reply::Str)),
            Command::Set { key, value } => {
                self.set(key, value, now)?;
                Ok(Reply::Bool(true))
            }
            Command::Delete { keys } => {
                let refs: Vec<&str> = keys.iter().map(String::as_str).collect();
                Ok(Reply::Int(self.delete(&refs, now)? as i64))
            }
            Command::Increment { key, by } => Ok(Reply::Int(self.increment(key, *by, now)?)),
            Command::ZsetAdd { key, entries } => {
                let refs: Vec<(&str, f64)> = entries.iter().map(|(m, s)| (m.as_str(), *s)).collect();
                Ok(Reply::Int(self.zset_add(key, &refs, now)? as i64))
            }
            Command::ZsetRemove { key, members } => {
                let refs: Vec<&str> = members.iter().map(String::as_str).collect();
                Ok(Reply::Int(self.zset_remove(key, &refs, now)? as i64))
            }
            Command::ZsetRank { key, member } => Ok(self
                .zset_rank(key, member, now)?
                .map_or(Reply::Nil, |rank| Reply::Int(rank as i64))),
            Command::ZsetRange { key, start, stop } => {
                let members = self.zset_range(key, *start, *stop, now)?;
                Ok(Reply::Array(members.into_iter().map(Reply::Str).collect()))
            }
            Command::ZsetRemoveRangeByScore { key, min, max } => {
                Ok(Reply::Int(self.zset_remove_range_by_score(key, *min, *max, now)? as i64))
            }
            Command::ZsetIntersectStore { dest, sources } => {
                let refs: Vec<(&str, f64)> = sources.iter().map(|(k, w)| (k.as_str(), *w)).collect();
                Ok(Reply::Int(self.zset_intersect_store(dest, &refs, now)? as i64))
            }
            Command::ZsetCard { key } => Ok(Reply::Int(self.zset_card(key, now)? as i64)),
            Command::SetAdd { key, members } => {
                let refs: Vec<&str> = members.iter().map(String::as_str).collect();
                Ok(Reply::Int(self.set_add(key, &refs, now)? as i64))
            }
            Command::SetRemove { key, members } => {
                let refs: Vec<&str> = members.iter().map(String::as_str).collect();
                Ok(Reply::Int(self.set_remove(key, &refs, now)? as i64))
            }
            Command::PushLeft { key, items } => {
                let refs: Vec<&str> = items.iter().map(String::as_str).collect();
                Ok(Reply::Int(self.push_left(key, &refs, now)? as i64))
            }
            Command::PushRight { key, items } => {
                let refs: Vec<&str> = items.iter().map(String::as_str).collect();
                Ok(Reply::Int(self.push_right(key, &refs, now)? as i64))
            }
            Command::ListRemove { key, value } => {
                Ok(Reply::Int(self.list_remove(key, value, now)? as i64))
            }
            Command::ListTrim { key, start, stop } => {
                self.list_trim(key, *start, *stop, now)?;
                Ok(Reply::Bool(true))
            }
            Command::ListRange { key, start, stop } => {
                let items = self.list_range(key, *start, *stop, now)?;
                Ok(Reply::Array(items.into_iter().map(Reply::Str).collect()))
            }
        }
    }
}

/// Synchronous transaction view over the frozen state.
struct TxnView<'a> {
    state: &'a mut State,
    now: Instant,
}

impl StoreTxn for TxnView<'_> {
    fn get(&mut self, key: &str) -> Result<Option<String>, StoreError> {
        self.state.get(key, self.now)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.state.set(key, value, self.now)
    }

    fn delete(&mut self, keys: &[&str]) -> Result<u64, StoreError> {
        self.state.delete(keys, self.now)
    }

    fn exists(&mut self, key: &str) -> Result<bool, StoreError> {
        self.state.exists(key, self.now)
    }

    fn expire(&mut self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.state.expire(key, ttl, self.now)
    }

    fn increment(&mut self, key: &str, by: i64) -> Result<i64, StoreError> {
        self.state.increment(key, by, self.now)
    }

    fn zset_add(&mut self, key: &str, entries: &[(&str, f64)]) -> Result<u64, StoreError> {
        self.state.zset_add(key, entries, self.now)
    }

    fn zset_remove(&mut self, key: &str, members: &[&str]) -> Result<u64, StoreError> {
        self.state.zset_remove(key, members, self.now)
    }

    fn zset_score(&mut self, key: &str, member: &str) -> Result<Option<f64>, StoreError> {
        self.state.zset_score(key, member, self.now)
    }

    fn zset_rank(&mut self, key: &str, member: &str) -> Result<Option<u64>, StoreError> {
        self.state.zset_rank(key, member, self.now)
    }

    fn zset_range(&mut self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, StoreError> {
        self.state.zset_range(key, start, stop, self.now)
    }

    fn list_len(&mut self, key: &str) -> Result<u64, StoreError> {
        self.state.list_len(key, self.now)
    }

    fn push_left(&mut self, key: &str, items: &[&str]) -> Result<u64, StoreError> {
        self.state.push_left(key, items, self.now)
    }

    fn push_right(&mut self, key: &str, items: &[&str]) -> Result<u64, StoreError> {
        self.state.push_right(key, items, self.now)
    }

    fn pop_left(&mut self, key: &str) -> Result<Option<String>, StoreError> {
        self.state.pop_left(key, self.now)
    }

    fn pop_right(&mut self, key: &str) -> Result<Option<String>, StoreError> {
        self.state.pop_right(key, self.now)
    }
}

/// In-memory store; see module docs.
#[derive(Clone)]
pub struct MemoryStore<C: Clock = SystemClock> {
    state: Arc<Mutex<State>>,
    writes: Arc<Notify>,
    clock: C,
}

impl MemoryStore<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for MemoryStore<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> MemoryStore<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            writes: Arc::new(Notify::new()),
            clock,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn notify_writes(&self) {
        self.writes.notify_waiters();
    }

    async fn blocking_pop(
        &self,
        keys: &[&str],
        timeout: Duration,
        left: bool,
    ) -> Result<Option<(String, String)>, StoreError> {
        let deadline = (!timeout.is_zero()).then(|| self.clock.now() + timeout);
        loop {
            // Register interest before checking, so a push landing between
            // the check and the await still wakes us.
            let notified = self.writes.notified();
            {
                let now = self.clock.now();
                let mut state = self.lock_state();
                for key in keys {
                    let popped = if left {
                        state.pop_left(key, now)?
                    } else {
                        state.pop_right(key, now)?
                    };
                    if let Some(value) = popped {
                        return Ok(Some((key.to_string(), value)));
                    }
                }
            }
            match deadline {
                None => notified.await,
                Some(deadline) => {
                    let now = self.clock.now();
                    if now >= deadline {
                        return Ok(None);
                    }
                    if tokio::time::timeout(deadline - now, notified).await.is_err() {
                        return Ok(None);
                    }
                }
            }
        }
    }
}

#[async_trait]
impl<C: Clock> StoreAdapter for MemoryStore<C> {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = self.clock.now();
        self.lock_state().get(key, now)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let now = self.clock.now();
        let result = self.lock_state().set(key, value, now);
        self.notify_writes();
        result
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        let now = self.clock.now();
        let result = self.lock_state().set_if_absent(key, value, now);
        self.notify_writes();
        result
    }

    async fn delete(&self, keys: &[&str]) -> Result<u64, StoreError> {
        let now = self.clock.now();
        let result = self.lock_state().delete(keys, now);
        self.notify_writes();
        result
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let now = self.clock.now();
        let result = self.lock_state().expire(key, ttl, now);
        self.notify_writes();
        result
    }

    async fn ttl(&self, key: &str) -> Result<Ttl, StoreError> {
        let now = self.clock.now();
        self.lock_state().ttl(key, now)
    }

    async fn increment(&self, key: &str, by: i64) -> Result<i64, StoreError> {
        let now = self.clock.now();
        let result = self.lock_state().increment(key, by, now);
        self.notify_writes();
        result
    }

    async fn zset_add(&self, key: &str, entries: &[(&str, f64)]) -> Result<u64, StoreError> {
        let now = self.clock.now();
        let result = self.lock_state().zset_add(key, entries, now);
        self.notify_writes();
        result
    }

    async fn zset_remove(&self, key: &str, members: &[&str]) -> Result<u64, StoreError> {
        let now = self.clock.now();
        let result = self.lock_state().zset_remove(key, members, now);
        self.notify_writes();
        result
    }

    async fn zset_rank(&self, key: &str, member: &str) -> Result<Option<u64>, StoreError> {
        let now = self.clock.now();
        self.lock_state().zset_rank(key, member, now)
    }

    async fn zset_score(&self, key: &str, member: &str) -> Result<Option<f64>, StoreError> {
        let now = self.clock.now();
        self.lock_state().zset_score(key, member, now)
    }

    async fn zset_range(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, StoreError> {
        let now = self.clock.now();
        self.lock_state().zset_range(key, start, stop, now)
    }

    async fn zset_remove_range_by_score(&self, key: &str, min: f64, max: f64) -> Result<u64, StoreError> {
        let now = self.clock.now();
        let result = self.lock_state().zset_remove_range_by_score(key, min, max, now);
        self.notify_writes();
        result
    }

    async fn zset_card(&self, key: &str) -> Result<u64, StoreError> {
        let now = self.clock.now();
        self.lock_state().zset_card(key, now)
    }

    async fn zset_intersect_store(&self, dest: &str, sources: &[(&str, f64)]) -> Result<u64, StoreError> {
        let now = self.clock.now();
        let result = self.lock_state().zset_intersect_store(dest, sources, now);
        self.notify_writes();
        result
    }

    async fn set_add(&self, key: &str, members: &[&str]) -> Result<u64, StoreError> {
        let now = self.clock.now();
        let result = self.lock_state().set_add(key, members, now);
        self.notify_writes();
        result
    }

    async fn set_remove(&self, key: &str, members: &[&str]) -> Result<u64, StoreError> {
        let now = self.clock.now();
        let result = self.lock_state().set_remove(key, members, now);
        self.notify_writes();
        result
    }

    async fn set_contains(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let now = self.clock.now();
        self.lock_state().set_contains(key, member, now)
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let now = self.clock.now();
        self.lock_state().set_members(key, now)
    }

    async fn push_left(&self, key: &str, items: &[&str]) -> Result<u64, StoreError> {
        let now = self.clock.now();
        let result = self.lock_state().push_left(key, items, now);
        self.notify_writes();
        result
    }

    async fn push_right(&self, key: &str, items: &[&str]) -> Result<u64, StoreError> {
        let now = self.clock.now();
        let result = self.lock_state().push_right(key, items, now);
        self.notify_writes();
        result
    }

    async fn pop_left(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = self.clock.now();
        let result = self.lock_state().pop_left(key, now);
        self.notify_writes();
        result
    }

    async fn pop_right(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = self.clock.now();
        let result = self.lock_state().pop_right(key, now);
        self.notify_writes();
        result
    }

    async fn list_len(&self, key: &str) -> Result<u64, StoreError> {
        let now = self.clock.now();
        self.lock_state().list_len(key, now)
    }

    async fn list_remove(&self, key: &str, value: &str) -> Result<u64, StoreError> {
        let now = self.clock.now();
        let result = self.lock_state().list_remove(key, value, now);
        self.notify_writes();
        result
    }

    async fn list_trim(&self, key: &str, start: i64, stop: i64) -> Result<(), StoreError> {
        let now = self.clock.now();
        let result = self.lock_state().list_trim(key, start, stop, now);
        self.notify_writes();
        result
    }

    async fn list_range(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, StoreError> {
        let now = self.clock.now();
        self.lock_state().list_range(key, start, stop, now)
    }

    async fn blocking_pop_left(
        &self,
        keys: &[&str],
        timeout: Duration,
    ) -> Result<Option<(String, String)>, StoreError> {
        self.blocking_pop(keys, timeout, true).await
    }

    async fn blocking_pop_right(
        &self,
        keys: &[&str],
        timeout: Duration,
    ) -> Result<Option<(String, String)>, StoreError> {
        self.blocking_pop(keys, timeout, false).await
    }

    async fn watch(&self, keys: &[&str]) -> Result<WatchHandle, StoreError> {
        let now = self.clock.now();
        let mut state = self.lock_state();
        let mut versions = Vec::with_capacity(keys.len());
        for key in keys {
            state.purge(key, now);
            versions.push(state.version(key));
        }
        Ok(WatchHandle {
            keys: keys.iter().map(|k| k.to_string()).collect(),
            versions,
        })
    }

    async fn exec(&self, batch: Batch) -> Result<Vec<Reply>, StoreError> {
        let now = self.clock.now();
        let result = {
            let mut state = self.lock_state();
            let mut replies = Vec::with_capacity(batch.len());
            for command in batch.into_commands() {
                replies.push(state.apply(&command, now)?);
            }
            Ok(replies)
        };
        self.notify_writes();
        result
    }

    async fn commit(&self, handle: WatchHandle, batch: Batch) -> Result<Vec<Reply>, StoreError> {
        let now = self.clock.now();
        let result = {
            let mut state = self.lock_state();
            for (key, version) in handle.keys.iter().zip(handle.versions.iter()) {
                state.purge(key, now);
                if state.version(key) != *version {
                    trace!(key = %key, "watched key changed; rejecting commit");
                    return Err(StoreError::Conflict { key: key.clone() });
                }
            }
            let mut replies = Vec::with_capacity(batch.len());
            for command in batch.into_commands() {
                replies.push(state.apply(&command, now)?);
            }
            Ok(replies)
        };
        self.notify_writes();
        result
    }

    async fn run_atomic(&self, _keys: &[&str], op: &dyn AtomicOp) -> Result<Reply, StoreError> {
        let now = self.clock.now();
        let result = {
            let mut state = self.lock_state();
            let mut view = TxnView { state: &mut state, now };
            op.apply(&mut view)
        };
        self.notify_writes();
        result
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

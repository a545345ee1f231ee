// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! rally-core: distributed coordination primitives over a shared store
//!
//! This crate provides:
//! - **Lock** - exclusive, timed mutual exclusion keyed by name
//! - **Semaphore** / **FairSemaphore** - bounded concurrent-holder
//!   counting, with a FIFO ticket-ordered variant
//! - **PrefixIndex** / **RecentContacts** - autocomplete over sorted
//!   member namespaces
//! - **ShardedList** - a logical unbounded list split across capped
//!   physical shards, with blocking pop across shard boundaries
//!
//! Every primitive is built only against the `rally-store` adapter
//! contract and assumes adversarial interleaving from concurrent callers:
//! all synchronization is mediated by the store's atomic batches, atomic
//! ops, and optimistic transactions.

pub mod autocomplete;
pub mod lock;
pub mod retry;
pub mod semaphore;
pub mod shardlist;
pub mod token;

// Re-exports
pub use autocomplete::{find_prefix_range, PrefixIndex, RecentContacts};
pub use lock::{Lock, LockConfig};
pub use semaphore::{FairSemaphore, Semaphore, SemaphoreConfig};
pub use shardlist::{ShardedList, ShardedListConfig};
pub use token::Token;

// Re-export the store contract alongside the primitives that consume it
pub use rally_store::{Clock, FakeClock, MemoryStore, StoreAdapter, StoreError, SystemClock};

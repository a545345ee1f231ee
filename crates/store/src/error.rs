// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for store operations

use thiserror::Error;

/// Errors surfaced by a store adapter.
///
/// Capacity exhaustion (a lock or semaphore that cannot be granted) is not
/// an error; primitives report it as an absent token. Conflicts are retried
/// inside each primitive's own bounded loop; unavailability always
/// propagates to the caller unmodified.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A watched key changed between `watch` and `commit`.
    #[error("transaction conflict: watched key changed: {key}")]
    Conflict { key: String },

    /// The key holds a different kind of value than the operation expects.
    #[error("wrong kind of value at key: {key}")]
    WrongType { key: String },

    /// The store cannot be reached or refused the request.
    #[error("store unavailable: {reason}")]
    Unavailable { reason: String },
}

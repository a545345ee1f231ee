// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Conflict retry loop for optimistic transactions
//!
//! Every compound operation that reads under `watch` and then `commit`s can
//! lose the race to a concurrent writer; the store reports that as
//! [`StoreError::Conflict`] and the operation simply runs again. This
//! helper owns that loop so call sites stay declarative.

use rally_store::{Clock, StoreError};
use std::future::Future;
use std::time::Duration;

/// Re-run `attempt` until it returns anything other than a conflict.
///
/// Other errors and successful results pass straight through.
pub async fn on_conflict<T, F, Fut>(mut attempt: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    loop {
        match attempt().await {
            Err(StoreError::Conflict { .. }) => continue,
            other => return other,
        }
    }
}

/// Like [`on_conflict`], but bounded: gives up with `Ok(None)` once
/// `timeout` has elapsed on the supplied clock.
pub async fn on_conflict_deadline<T, F, Fut>(
    clock: &impl Clock,
    timeout: Duration,
    mut attempt: F,
) -> Result<Option<T>, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let deadline = clock.now() + timeout;
    while clock.now() < deadline {
        match attempt().await {
            Err(StoreError::Conflict { .. }) => continue,
            Ok(value) => return Ok(Some(value)),
            Err(e) => return Err(e),
        }
    }
    Ok(None)
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;

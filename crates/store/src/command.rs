// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command vocabulary for atomic batches
//!
//! A [`Batch`] is an ordered list of [`Command`]s executed indivisibly by
//! the store, either as a plain pipeline (`exec`) or under an optimistic
//! watch (`commit`). Each command produces one [`Reply`] in order.
//!
//! The vocabulary is serializable so a networked adapter can ship whole
//! batches to the store in one round trip.

use serde::{Deserialize, Serialize};

/// A single read or mutation queued into a [`Batch`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    Get { key: String },
    Set { key: String, value: String },
    Delete { keys: Vec<String> },
    Increment { key: String, by: i64 },

    ZsetAdd { key: String, entries: Vec<(String, f64)> },
    ZsetRemove { key: String, members: Vec<String> },
    ZsetRank { key: String, member: String },
    ZsetRange { key: String, start: i64, stop: i64 },
    ZsetRemoveRangeByScore { key: String, min: f64, max: f64 },
    ZsetIntersectStore { dest: String, sources: Vec<(String, f64)> },
    ZsetCard { key: String },

    SetAdd { key: String, members: Vec<String> },
    SetRemove { key: String, members: Vec<String> },

    PushLeft { key: String, items: Vec<String> },
    PushRight { key: String, items: Vec<String> },
    ListRemove { key: String, value: String },
    ListTrim { key: String, start: i64, stop: i64 },
    ListRange { key: String, start: i64, stop: i64 },
}

/// An ordered batch of commands executed atomically.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Batch {
    commands: Vec<Command>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a command; commands execute in insertion order.
    pub fn push(&mut self, command: Command) -> &mut Self {
        self.commands.push(command);
        self
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn into_commands(self) -> Vec<Command> {
        self.commands
    }
}

/// A typed result from the store: nil, boolean, integer, string, or an
/// array thereof.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Reply {
    Nil,
    Bool(bool),
    Int(i64),
    Str(String),
    Array(Vec<Reply>),
}

impl Reply {
    pub fn is_nil(&self) -> bool {
        matches!(self, Reply::Nil)
    }

    /// Integer payload, if this reply is an integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Reply::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Reply::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Flatten an array reply into its string elements; anything else is
    /// an empty vec.
    pub fn into_strings(self) -> Vec<String> {
        match self {
            Reply::Array(items) => items
                .into_iter()
                .filter_map(|item| match item {
                    Reply::Str(s) => Some(s),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

// Copyright (c) The retry-harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Result attachments published for other collaborators.
//!
//! At a case's terminal state the attempt loop writes three values into the
//! case's stash, under process-wide typed keys: the final attempt count, the
//! final outcome, and the aggregated duration. Other host-side hooks read
//! them from there.

use crate::runner::FinalOutcome;
use std::{collections::HashMap, marker::PhantomData, time::Duration};

/// Typed key under which a value is published on a case's [`Stash`].
#[derive(Debug)]
pub struct StashKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> StashKey<T> {
    const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    /// The key's name.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Final attempt count for the case. Zero for cases exempt from retry
/// handling (skip, expected failure, unexpected pass).
pub const ATTEMPTS_KEY: StashKey<usize> = StashKey::new("retry.attempts");

/// Final outcome for the case.
pub const OUTCOME_KEY: StashKey<FinalOutcome> = StashKey::new("retry.outcome");

/// Aggregated duration for the case, per its timing mode.
pub const DURATION_KEY: StashKey<Duration> = StashKey::new("retry.duration");

#[doc(hidden)]
#[derive(Copy, Clone, Debug)]
pub enum StashValue {
    Attempts(usize),
    Outcome(FinalOutcome),
    Duration(Duration),
}

/// Conversion between a stash value and its typed representation.
///
/// Sealed in practice: implemented for exactly the types the published keys
/// carry.
pub trait StashValueKind: Copy {
    #[doc(hidden)]
    fn into_value(self) -> StashValue;
    #[doc(hidden)]
    fn from_value(value: StashValue) -> Option<Self>;
}

impl StashValueKind for usize {
    fn into_value(self) -> StashValue {
        StashValue::Attempts(self)
    }

    fn from_value(value: StashValue) -> Option<Self> {
        match value {
            StashValue::Attempts(v) => Some(v),
            _ => None,
        }
    }
}

impl StashValueKind for FinalOutcome {
    fn into_value(self) -> StashValue {
        StashValue::Outcome(self)
    }

    fn from_value(value: StashValue) -> Option<Self> {
        match value {
            StashValue::Outcome(v) => Some(v),
            _ => None,
        }
    }
}

impl StashValueKind for Duration {
    fn into_value(self) -> StashValue {
        StashValue::Duration(self)
    }

    fn from_value(value: StashValue) -> Option<Self> {
        match value {
            StashValue::Duration(v) => Some(v),
            _ => None,
        }
    }
}

/// Per-case key-value store for result attachments.
#[derive(Debug, Default)]
pub struct Stash {
    values: HashMap<&'static str, StashValue>,
}

impl Stash {
    /// Creates an empty stash.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn insert<T: StashValueKind>(&mut self, key: &StashKey<T>, value: T) {
        self.values.insert(key.name, value.into_value());
    }

    /// Reads the value stored under `key`.
    pub fn get<T: StashValueKind>(&self, key: &StashKey<T>) -> Option<T> {
        self.values.get(key.name).and_then(|&v| T::from_value(v))
    }
}

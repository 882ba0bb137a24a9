// Copyright (c) The retry-harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by retry-harness.

use crate::config::TimingMode;
use thiserror::Error;

/// The scope at which conflicting exception filters were specified.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FilterScope {
    /// The global filter hooks supplied at session start.
    Hooks,

    /// A per-test retry mark.
    Mark,
}

impl FilterScope {
    pub(crate) fn to_static_str(self) -> &'static str {
        match self {
            FilterScope::Hooks => "by the global filter hooks",
            FilterScope::Mark => "on a retry mark",
        }
    }
}

/// Both `only_on` and `exclude` were specified at the same scope.
///
/// The two filter lists are mutually exclusive. This error surfaces at
/// session start (for the global hooks) or at collection time (for a mark),
/// never while a test is executing.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("`only_on` and `exclude` are mutually exclusive, but both were specified {}", .scope.to_static_str())]
pub struct FilterConflictError {
    scope: FilterScope,
}

impl FilterConflictError {
    pub(crate) fn new(scope: FilterScope) -> Self {
        Self { scope }
    }

    /// The scope at which the conflict occurred.
    pub fn scope(&self) -> FilterScope {
        self.scope
    }
}

/// Error returned while parsing a [`TimingMode`] value from a string.
#[derive(Clone, Debug, Error)]
#[error(
    "unrecognized value for timing-mode: {input}\n(known values: {})",
    TimingMode::variants().join(", "),
)]
pub struct TimingModeParseError {
    input: String,
}

impl TimingModeParseError {
    pub(crate) fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }
}

// Copyright (c) The retry-harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Exception snapshots and the retry filter predicate.

use smol_str::SmolStr;
use std::{collections::BTreeSet, fmt};

/// Identifier for an exception type, as registered by the host framework.
///
/// Subclass relationships are honored through the type lineage carried on
/// each [`Exception`] snapshot, not through runtime introspection: the host
/// lists every type the raised exception is an instance of, most-derived
/// first.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ExceptionTypeId(SmolStr);

impl ExceptionTypeId {
    /// Creates a new type identifier.
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(SmolStr::new(id))
    }

    /// Returns the identifier as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExceptionTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ExceptionTypeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ExceptionTypeId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

/// Snapshot of an exception raised by a test phase.
///
/// The core never rewrites or suppresses the exception itself; it captures
/// type identity and diagnostic text, and only decides whether to re-attempt.
#[derive(Clone, Debug)]
pub struct Exception {
    /// Most-derived type first, base types after. Never empty.
    type_chain: Vec<ExceptionTypeId>,
    message: String,
    traceback: Option<String>,
}

impl Exception {
    /// Creates a snapshot for an exception of the given type.
    pub fn new(type_id: impl Into<ExceptionTypeId>, message: impl Into<String>) -> Self {
        Self {
            type_chain: vec![type_id.into()],
            message: message.into(),
            traceback: None,
        }
    }

    /// Appends a base type to the lineage.
    pub fn with_base(mut self, type_id: impl Into<ExceptionTypeId>) -> Self {
        self.type_chain.push(type_id.into());
        self
    }

    /// Attaches formatted traceback text.
    pub fn with_traceback(mut self, traceback: impl Into<String>) -> Self {
        self.traceback = Some(traceback.into());
        self
    }

    /// The most-derived type of this exception.
    pub fn type_id(&self) -> &ExceptionTypeId {
        &self.type_chain[0]
    }

    /// The exception message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Formatted traceback text, if the host captured one.
    pub fn traceback(&self) -> Option<&str> {
        self.traceback.as_deref()
    }

    /// Returns true if this exception is an instance of `type_id`, i.e. the
    /// identifier appears anywhere in its type lineage.
    pub fn is_instance_of(&self, type_id: &ExceptionTypeId) -> bool {
        self.type_chain.contains(type_id)
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.type_id(), self.message)
    }
}

/// Decides whether a failed attempt is eligible for retry.
///
/// Built from at most one of "only retry on these types" or "never retry on
/// these types"; mutual exclusion is enforced where the filter is configured
/// ([`FilterHooks`](crate::config::FilterHooks) and
/// [`RetryMark`](crate::config::RetryMark)), so a constructed filter is
/// always valid.
#[derive(Clone, Debug, Default)]
pub struct ExceptionFilter {
    mode: FilterMode,
}

#[derive(Clone, Debug, Default)]
enum FilterMode {
    #[default]
    None,
    OnlyOn(BTreeSet<ExceptionTypeId>),
    Exclude(BTreeSet<ExceptionTypeId>),
}

impl ExceptionFilter {
    /// A filter that permits every retry.
    pub fn none() -> Self {
        Self::default()
    }

    /// Permits retries only for exceptions matching one of `types`.
    pub fn only_on(types: impl IntoIterator<Item = ExceptionTypeId>) -> Self {
        Self {
            mode: FilterMode::OnlyOn(types.into_iter().collect()),
        }
    }

    /// Permits retries except for exceptions matching one of `types`.
    pub fn exclude(types: impl IntoIterator<Item = ExceptionTypeId>) -> Self {
        Self {
            mode: FilterMode::Exclude(types.into_iter().collect()),
        }
    }

    /// Returns true if a retry is permitted for this exception.
    ///
    /// Pure predicate: no side effects, and the attempt loop evaluates it
    /// fresh after every failed attempt, so a change in exception type across
    /// attempts is re-evaluated rather than decided once.
    pub fn permits(&self, exception: &Exception) -> bool {
        match &self.mode {
            FilterMode::None => true,
            FilterMode::OnlyOn(types) => types.iter().any(|ty| exception.is_instance_of(ty)),
            FilterMode::Exclude(types) => !types.iter().any(|ty| exception.is_instance_of(ty)),
        }
    }
}

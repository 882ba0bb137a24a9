// Copyright (c) The retry-harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The host-facing execution interface.
//!
//! The host framework owns collection, fixture resolution, and scheduling.
//! For every test case it hands the attempt loop an implementation of
//! [`TestCase`], exposing the setup/call/teardown entry points the host would
//! otherwise invoke directly. The attempt loop decorates these phases; it
//! never calls back into host scheduling.

use crate::{filter::Exception, stash::Stash};
use smol_str::SmolStr;
use std::fmt;

/// Identity of a test case, stable across attempts and for the rest of the
/// session.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct CaseId(SmolStr);

impl CaseId {
    /// Creates a new case identity.
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(SmolStr::new(id))
    }

    /// Returns the identity as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CaseId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Outcome of a setup phase, as reported by the host.
#[derive(Clone, Debug)]
pub enum SetupOutcome {
    /// Fixtures were created; the call phase can run.
    Ready,

    /// The test was skipped during setup. Exempt from retry handling.
    Skipped,

    /// A fixture raised. Setup failures are never retried.
    Errored(Exception),
}

/// Outcome of a call phase, as reported by the host.
#[derive(Clone, Debug)]
pub enum CallOutcome {
    /// The test body ran to completion.
    Passed,

    /// The test body raised.
    Failed(Exception),

    /// The test was skipped during the call phase. Exempt from retry
    /// handling.
    Skipped,

    /// The test failed and was expected to fail. Exempt from retry handling.
    ExpectedFailure,

    /// The test passed but was expected to fail. Exempt from retry handling.
    UnexpectedPass,
}

/// A single test case's execution entry points, implemented by the host.
///
/// `teardown` must unwind every fixture the preceding `setup` created,
/// including class- and module-scoped ones, so that a retried attempt starts
/// from a clean slate. Re-running expensive shared fixtures is the accepted
/// cost of attempt isolation.
pub trait TestCase {
    /// The case's identity.
    fn id(&self) -> &CaseId;

    /// Runs the setup phase (fixture creation).
    fn setup(&mut self) -> SetupOutcome;

    /// Runs the call phase (the test body).
    fn call(&mut self) -> CallOutcome;

    /// Runs the teardown phase (fixture finalization).
    fn teardown(&mut self) -> Result<(), Exception>;

    /// The case's result-attachment stash, readable by other collaborators
    /// after the case reaches its terminal state.
    fn stash(&mut self) -> &mut Stash;
}

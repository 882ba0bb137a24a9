// Copyright (c) The retry-harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A scripted host-side test case for driving the attempt loop.

use retry_harness::{
    case::{CallOutcome, CaseId, SetupOutcome, TestCase},
    filter::Exception,
    stash::Stash,
};
use std::{thread, time::Duration};

/// Scripted behavior for a [`ScriptedCase`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum CaseBehavior {
    /// Passes on every attempt.
    Pass,

    /// Fails on every attempt.
    Fail,

    /// Fails until `pass_attempt`, then passes.
    Flaky { pass_attempt: usize },

    /// Setup raises on every attempt.
    SetupFails,

    /// Skipped during setup.
    SkippedAtSetup,

    /// Skipped during the call phase.
    SkippedAtCall,

    /// Fails as expected.
    ExpectedFailure,

    /// Passes unexpectedly.
    UnexpectedPass,

    /// The call phase fails on every attempt, and the `on_invocation`-th
    /// teardown raises.
    TeardownFails { on_invocation: usize },
}

#[derive(Debug)]
pub(crate) struct ScriptedCase {
    id: CaseId,
    behavior: CaseBehavior,
    exceptions: Vec<Exception>,
    call_sleeps: Vec<Duration>,
    failing_teardown: Option<usize>,
    pub(crate) setup_count: usize,
    pub(crate) call_count: usize,
    pub(crate) teardown_count: usize,
    stash: Stash,
}

impl ScriptedCase {
    pub(crate) fn new(id: &str, behavior: CaseBehavior) -> Self {
        Self {
            id: CaseId::new(id),
            behavior,
            exceptions: vec![Exception::new("FlakyError", "boom").with_base("Exception")],
            call_sleeps: Vec::new(),
            failing_teardown: None,
            setup_count: 0,
            call_count: 0,
            teardown_count: 0,
            stash: Stash::new(),
        }
    }

    /// Raises `exceptions[attempt - 1]` on each failing attempt, reusing the
    /// last entry once the script runs out.
    pub(crate) fn with_exceptions(mut self, exceptions: Vec<Exception>) -> Self {
        assert!(!exceptions.is_empty(), "at least one exception required");
        self.exceptions = exceptions;
        self
    }

    /// Sleeps `call_sleeps[attempt - 1]` during each call phase.
    pub(crate) fn with_call_sleeps(mut self, call_sleeps: Vec<Duration>) -> Self {
        self.call_sleeps = call_sleeps;
        self
    }

    /// Makes the `on_invocation`-th teardown raise, independent of the
    /// scripted call behavior.
    pub(crate) fn with_failing_teardown(mut self, on_invocation: usize) -> Self {
        self.failing_teardown = Some(on_invocation);
        self
    }

    pub(crate) fn published_stash(&self) -> &Stash {
        &self.stash
    }

    fn current_exception(&self) -> Exception {
        let index = (self.call_count - 1).min(self.exceptions.len() - 1);
        self.exceptions[index].clone()
    }
}

impl TestCase for ScriptedCase {
    fn id(&self) -> &CaseId {
        &self.id
    }

    fn setup(&mut self) -> SetupOutcome {
        self.setup_count += 1;
        match self.behavior {
            CaseBehavior::SetupFails => SetupOutcome::Errored(
                Exception::new("FixtureError", "setup blew up").with_base("Exception"),
            ),
            CaseBehavior::SkippedAtSetup => SetupOutcome::Skipped,
            _ => SetupOutcome::Ready,
        }
    }

    fn call(&mut self) -> CallOutcome {
        self.call_count += 1;
        if let Some(sleep) = self.call_sleeps.get(self.call_count - 1) {
            thread::sleep(*sleep);
        }
        match self.behavior {
            CaseBehavior::Pass => CallOutcome::Passed,
            CaseBehavior::Fail | CaseBehavior::TeardownFails { .. } => {
                CallOutcome::Failed(self.current_exception())
            }
            CaseBehavior::Flaky { pass_attempt } => {
                if self.call_count >= pass_attempt {
                    CallOutcome::Passed
                } else {
                    CallOutcome::Failed(self.current_exception())
                }
            }
            CaseBehavior::SkippedAtCall => CallOutcome::Skipped,
            CaseBehavior::ExpectedFailure => CallOutcome::ExpectedFailure,
            CaseBehavior::UnexpectedPass => CallOutcome::UnexpectedPass,
            CaseBehavior::SetupFails | CaseBehavior::SkippedAtSetup => {
                unreachable!("call phase must not run after setup failure or skip")
            }
        }
    }

    fn teardown(&mut self) -> Result<(), Exception> {
        self.teardown_count += 1;
        let failing = match self.behavior {
            CaseBehavior::TeardownFails { on_invocation } => Some(on_invocation),
            _ => self.failing_teardown,
        };
        if failing == Some(self.teardown_count) {
            return Err(Exception::new("OsError", "cleanup failed").with_base("Exception"));
        }
        Ok(())
    }

    fn stash(&mut self) -> &mut Stash {
        &mut self.stash
    }
}

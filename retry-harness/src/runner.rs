// Copyright (c) The retry-harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The attempt loop for test cases.
//!
//! [`RetrySession`] is the session-scoped entry point: the host calls
//! [`RetrySession::run_case`] once per test case, at the point it would
//! normally execute the case's setup/call/teardown phases. The session runs
//! up to `max_retries + 1` attempts, replaying teardown between attempts,
//! and accumulates the retry report and run statistics as it goes.

use crate::{
    case::{CallOutcome, SetupOutcome, TestCase},
    config::{FilterHooks, PolicyResolver, RetryConfig, RetryMark, RetryPolicy, TimingMode},
    errors::FilterConflictError,
    filter::Exception,
    reporter::RetryReport,
    stash::{ATTEMPTS_KEY, DURATION_KEY, OUTCOME_KEY},
    timing::{timed, PhaseTimings},
};
use std::{fmt, thread, time::Duration};
use tracing::{debug, warn};

/// The result of running a single attempt.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AttemptResult {
    /// The call phase completed without raising.
    Pass,

    /// The call phase raised.
    Fail,

    /// A setup or teardown phase raised.
    Errored,
}

impl AttemptResult {
    /// Returns true if the attempt passed.
    pub fn is_success(self) -> bool {
        matches!(self, AttemptResult::Pass)
    }
}

impl fmt::Display for AttemptResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptResult::Pass => write!(f, "passed"),
            AttemptResult::Fail => write!(f, "failed"),
            AttemptResult::Errored => write!(f, "errored"),
        }
    }
}

/// Information about a single attempt of a test case.
///
/// Appended for every attempt, immutable once appended; the full ordered
/// sequence persists for the remainder of the session.
#[derive(Clone, Debug)]
pub struct AttemptStatus {
    /// The current attempt. In the range `[1, total_attempts]`.
    pub attempt: usize,

    /// The attempt ceiling for this case. Equal to `1 + max_retries`.
    pub total_attempts: usize,

    /// The result of this attempt.
    pub result: AttemptResult,

    /// The exception raised by the setup or call phase, if either failed.
    pub exception: Option<Exception>,

    /// The exception raised by this attempt's teardown, if it failed.
    ///
    /// Teardown can fail on its own after a passing call, or on top of a
    /// setup or call failure; both are recorded here so the host reports the
    /// teardown error just as it would natively.
    pub teardown_exception: Option<Exception>,

    /// Wall-clock durations of the three phases of this attempt.
    pub timings: PhaseTimings,
}

/// Information about executions of a test case, including retries.
#[derive(Clone, Debug)]
pub struct ExecutionStatuses {
    /// This is guaranteed to be non-empty.
    statuses: Vec<AttemptStatus>,
}

#[allow(clippy::len_without_is_empty)] // ExecutionStatuses is never empty
impl ExecutionStatuses {
    fn new(statuses: Vec<AttemptStatus>) -> Self {
        debug_assert!(!statuses.is_empty(), "at least one attempt was run");
        Self { statuses }
    }

    /// Returns the last attempt's status.
    ///
    /// This status determines the final result.
    pub fn last_status(&self) -> &AttemptStatus {
        self.statuses
            .last()
            .expect("execution statuses is non-empty")
    }

    /// Iterates over all the statuses.
    pub fn iter(&self) -> impl Iterator<Item = &'_ AttemptStatus> + DoubleEndedIterator + '_ {
        self.statuses.iter()
    }

    /// Returns the number of times the case was executed.
    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    /// The final pass/fail outcome, determined by the last attempt.
    pub fn final_outcome(&self) -> FinalOutcome {
        if self.last_status().result.is_success() {
            FinalOutcome::Passed
        } else {
            FinalOutcome::Failed
        }
    }

    /// The reported duration, folded across attempts per `mode`.
    pub fn aggregate_duration(&self, mode: TimingMode) -> Duration {
        match mode {
            TimingMode::Overwrite => self.last_status().timings.total(),
            TimingMode::Cumulative => self.statuses.iter().map(|s| s.timings.total()).sum(),
        }
    }

    /// Returns a description of self.
    pub fn describe(&self) -> ExecutionDescription<'_> {
        let last_status = self.last_status();
        if last_status.result.is_success() {
            if self.statuses.len() > 1 {
                ExecutionDescription::Flaky {
                    last_status,
                    prior_statuses: &self.statuses[..self.statuses.len() - 1],
                }
            } else {
                ExecutionDescription::Success {
                    single_status: last_status,
                }
            }
        } else {
            let first_status = self
                .statuses
                .first()
                .expect("execution statuses is non-empty");
            let retries = &self.statuses[1..];
            ExecutionDescription::Failure {
                first_status,
                last_status,
                retries,
            }
        }
    }
}

/// A description of test case executions obtained from [`ExecutionStatuses`].
///
/// This can be used to quickly determine whether a case passed, failed or was
/// flaky.
#[derive(Copy, Clone, Debug)]
pub enum ExecutionDescription<'a> {
    /// The case was run once and was successful.
    Success {
        /// The status of the case.
        single_status: &'a AttemptStatus,
    },

    /// The case was run more than once. The final result was successful.
    Flaky {
        /// The last, successful status.
        last_status: &'a AttemptStatus,

        /// Previous statuses, none of which are successes.
        prior_statuses: &'a [AttemptStatus],
    },

    /// The case was run once, or possibly multiple times. All runs failed.
    Failure {
        /// The first, failing status.
        first_status: &'a AttemptStatus,

        /// The last, failing status. Same as the first status if no retries
        /// were performed.
        last_status: &'a AttemptStatus,

        /// Any retries that were performed. All of these runs failed.
        ///
        /// May be empty.
        retries: &'a [AttemptStatus],
    },
}

/// The final outcome of a test case, as published to its stash.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FinalOutcome {
    /// The case passed (possibly after retries).
    Passed,

    /// The case failed (possibly after retries), or a setup or teardown
    /// phase raised.
    Failed,

    /// The case was skipped, or failed as expected.
    Skipped,
}

impl fmt::Display for FinalOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinalOutcome::Passed => write!(f, "passed"),
            FinalOutcome::Failed => write!(f, "failed"),
            FinalOutcome::Skipped => write!(f, "skipped"),
        }
    }
}

/// A case whose outcome exempts it from retry handling: skip, expected
/// failure, or unexpected pass.
///
/// These cases never enter the retry report or the retried count, regardless
/// of policy.
#[derive(Clone, Debug)]
pub struct ExcludedStatus {
    /// The outcome of the single execution, before teardown.
    pub outcome: FinalOutcome,

    /// The exception raised by teardown, if it failed.
    pub teardown_exception: Option<Exception>,

    /// Phase durations of the single execution.
    pub timings: PhaseTimings,
}

impl ExcludedStatus {
    /// The final outcome: a failed teardown turns the case into a failure,
    /// just as the host would report the teardown error natively.
    pub fn final_outcome(&self) -> FinalOutcome {
        if self.teardown_exception.is_some() {
            FinalOutcome::Failed
        } else {
            self.outcome
        }
    }
}

/// Terminal state of the attempt loop for one test case.
#[derive(Clone, Debug)]
pub enum CaseStatus {
    /// The case ran at least one full attempt.
    Run(ExecutionStatuses),

    /// The case's outcome exempts it from retry handling.
    Excluded(ExcludedStatus),
}

impl CaseStatus {
    /// Returns true if the case was retried at least once.
    pub fn retried(&self) -> bool {
        match self {
            CaseStatus::Run(statuses) => statuses.len() > 1,
            CaseStatus::Excluded(_) => false,
        }
    }

    /// The final outcome published to the case's stash.
    pub fn final_outcome(&self) -> FinalOutcome {
        match self {
            CaseStatus::Run(statuses) => statuses.final_outcome(),
            CaseStatus::Excluded(excluded) => excluded.final_outcome(),
        }
    }
}

/// Statistics for a test session.
#[derive(Copy, Clone, Default, Debug, Eq, PartialEq)]
pub struct RunStats {
    /// The total number of cases that finished running.
    pub finished_count: usize,

    /// The number of cases that passed. Includes cases that passed on retry.
    pub passed: usize,

    /// The number of cases that were retried at least once, whatever their
    /// final outcome.
    pub retried: usize,

    /// The number of cases that failed, including setup and teardown errors.
    pub failed: usize,

    /// The number of cases that were skipped or failed as expected.
    pub skipped: usize,
}

impl RunStats {
    /// Returns true if no case failed.
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    fn on_case_finished(&mut self, status: &CaseStatus) {
        self.finished_count += 1;
        if status.retried() {
            self.retried += 1;
        }
        match status.final_outcome() {
            FinalOutcome::Passed => self.passed += 1,
            FinalOutcome::Failed => self.failed += 1,
            FinalOutcome::Skipped => self.skipped += 1,
        }
    }
}

/// Session-scoped retry controller.
///
/// One per process (or per host worker process under parallel execution;
/// reports are not merged across processes). Construction validates the
/// global configuration sources, so conflicting filter hooks halt the
/// session before any test executes.
#[derive(Debug)]
pub struct RetrySession {
    resolver: PolicyResolver,
    report: RetryReport,
    stats: RunStats,
}

impl RetrySession {
    /// Creates a session from the CLI-equivalent defaults and the global
    /// filter hook results.
    pub fn new(config: RetryConfig, hooks: &FilterHooks) -> Result<Self, FilterConflictError> {
        Ok(Self {
            resolver: PolicyResolver::new(config, hooks)?,
            report: RetryReport::new(),
            stats: RunStats::default(),
        })
    }

    /// Resolves the effective policy for one test case.
    ///
    /// Call this at collection time: a mark populating both `only_on` and
    /// `exclude` errors here, not while the test runs.
    pub fn resolve_policy(
        &self,
        mark: Option<&RetryMark>,
    ) -> Result<RetryPolicy, FilterConflictError> {
        self.resolver.resolve(mark)
    }

    /// Runs all attempts of one test case.
    ///
    /// The host calls this at the point it would normally execute the case's
    /// setup/call/teardown phases. The inter-attempt delay is a blocking wait
    /// on the calling thread.
    pub fn run_case(&mut self, case: &mut dyn TestCase, policy: &RetryPolicy) -> CaseStatus {
        let total_attempts = policy.total_attempts();
        let mut statuses = Vec::with_capacity(1);
        let mut attempt = 1;

        let excluded = loop {
            debug!(case = %case.id(), attempt, total_attempts, "starting attempt");
            let mut timings = PhaseTimings::default();

            let (setup_outcome, setup_time) = timed(|| case.setup());
            timings.setup = setup_time;
            match setup_outcome {
                SetupOutcome::Ready => {}
                SetupOutcome::Skipped => {
                    let (teardown_time, teardown_exception) = self.unwind(case, attempt);
                    timings.teardown = teardown_time;
                    break Some(ExcludedStatus {
                        outcome: FinalOutcome::Skipped,
                        teardown_exception,
                        timings,
                    });
                }
                SetupOutcome::Errored(exception) => {
                    // Setup failures are never retried, regardless of policy.
                    // Teardown still runs to unwind partial fixture state.
                    let (teardown_time, teardown_exception) = self.unwind(case, attempt);
                    timings.teardown = teardown_time;
                    statuses.push(AttemptStatus {
                        attempt,
                        total_attempts,
                        result: AttemptResult::Errored,
                        exception: Some(exception),
                        teardown_exception,
                        timings,
                    });
                    break None;
                }
            }

            let (call_outcome, call_time) = timed(|| case.call());
            timings.call = call_time;
            let exception = match call_outcome {
                CallOutcome::Passed => {
                    let (teardown_result, teardown_time) = timed(|| case.teardown());
                    timings.teardown = teardown_time;
                    // A failed final teardown propagates exactly as the host
                    // would report it without this controller installed.
                    let (result, teardown_exception) = match teardown_result {
                        Ok(()) => (AttemptResult::Pass, None),
                        Err(td_exception) => (AttemptResult::Errored, Some(td_exception)),
                    };
                    statuses.push(AttemptStatus {
                        attempt,
                        total_attempts,
                        result,
                        exception: None,
                        teardown_exception,
                        timings,
                    });
                    break None;
                }
                CallOutcome::Skipped | CallOutcome::ExpectedFailure => {
                    let (teardown_time, teardown_exception) = self.unwind(case, attempt);
                    timings.teardown = teardown_time;
                    break Some(ExcludedStatus {
                        outcome: FinalOutcome::Skipped,
                        teardown_exception,
                        timings,
                    });
                }
                CallOutcome::UnexpectedPass => {
                    let (teardown_time, teardown_exception) = self.unwind(case, attempt);
                    timings.teardown = teardown_time;
                    break Some(ExcludedStatus {
                        outcome: FinalOutcome::Passed,
                        teardown_exception,
                        timings,
                    });
                }
                CallOutcome::Failed(exception) => exception,
            };

            let eligible = if !policy.condition() {
                debug!(case = %case.id(), "retry condition is false, not retrying");
                false
            } else if !policy.filter().permits(&exception) {
                debug!(
                    case = %case.id(),
                    exception_type = %exception.type_id(),
                    "exception filtered out, not retrying"
                );
                false
            } else {
                attempt < total_attempts
            };

            if !eligible {
                // Out of attempts, or the failure is not retryable. Run the
                // final teardown normally.
                let (teardown_time, teardown_exception) = self.unwind(case, attempt);
                timings.teardown = teardown_time;
                if attempt > 1 {
                    self.report.log_exhausted(case.id().clone(), attempt, &exception);
                }
                statuses.push(AttemptStatus {
                    attempt,
                    total_attempts,
                    result: AttemptResult::Fail,
                    exception: Some(exception),
                    teardown_exception,
                    timings,
                });
                break None;
            }

            // Tear down as if the test had passed, resetting fixture state
            // (including class- and module-scoped fixtures) before the next
            // attempt.
            let (teardown_result, teardown_time) = timed(|| case.teardown());
            timings.teardown = teardown_time;
            let teardown_exception = teardown_result.err();
            statuses.push(AttemptStatus {
                attempt,
                total_attempts,
                result: AttemptResult::Fail,
                exception: Some(exception.clone()),
                teardown_exception: teardown_exception.clone(),
                timings,
            });

            if let Some(td_exception) = teardown_exception {
                // A failed between-attempt teardown is fatal: stop
                // immediately, never mask it behind the remaining budget.
                warn!(
                    case = %case.id(),
                    error = %td_exception,
                    "teardown failed between attempts, not retrying"
                );
                self.report
                    .log_teardown_failed(case.id().clone(), attempt, &td_exception);
                break None;
            }

            self.report
                .log_will_retry(case.id().clone(), attempt, &exception);
            if !policy.delay().is_zero() {
                thread::sleep(policy.delay());
            }
            attempt += 1;
        };

        let status = match excluded {
            Some(excluded) => CaseStatus::Excluded(excluded),
            None => CaseStatus::Run(ExecutionStatuses::new(statuses)),
        };
        let (attempts, duration) = match &status {
            CaseStatus::Run(statuses) => (
                statuses.len(),
                statuses.aggregate_duration(policy.timing_mode()),
            ),
            CaseStatus::Excluded(excluded) => (0, excluded.timings.total()),
        };
        self.publish(case, attempts, status.final_outcome(), duration);
        self.stats.on_case_finished(&status);
        status
    }

    /// Runs teardown where its own failure is not the headline: after a
    /// setup failure, a skip, or a final failed attempt. The exception, if
    /// any, is returned so the terminal status carries it.
    fn unwind(
        &mut self,
        case: &mut dyn TestCase,
        attempt: usize,
    ) -> (Duration, Option<Exception>) {
        let (teardown_result, teardown_time) = timed(|| case.teardown());
        let teardown_exception = teardown_result.err();
        if let Some(td_exception) = &teardown_exception {
            warn!(
                case = %case.id(),
                attempt,
                error = %td_exception,
                "teardown failed",
            );
        }
        (teardown_time, teardown_exception)
    }

    fn publish(
        &mut self,
        case: &mut dyn TestCase,
        attempts: usize,
        outcome: FinalOutcome,
        duration: Duration,
    ) {
        let stash = case.stash();
        stash.insert(&ATTEMPTS_KEY, attempts);
        stash.insert(&OUTCOME_KEY, outcome);
        stash.insert(&DURATION_KEY, duration);
    }

    /// Current statistics for the session.
    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    /// The session's retry report.
    pub fn report(&self) -> &RetryReport {
        &self.report
    }

    /// Mutable access to the retry report, e.g. to lift the traceback length
    /// cap in verbose mode.
    pub fn report_mut(&mut self) -> &mut RetryReport {
        &mut self.report
    }
}

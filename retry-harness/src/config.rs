// Copyright (c) The retry-harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retry configuration: session defaults, per-test marks, global filter
//! hooks, and policy resolution.
//!
//! Four sources feed the effective policy for a test case, with a fixed
//! precedence order (highest last):
//!
//! 1. [`RetryConfig`] — the CLI-equivalent session defaults.
//! 2. [`FilterHooks`] — at most one hook-provided default exception filter.
//! 3. [`RetryMark`] — per-test overrides; any field a mark sets replaces the
//!    corresponding default entirely, including a mark-supplied filter
//!    replacing the hook-provided one.
//! 4. The mark's `condition` gate.
//!
//! [`PolicyResolver`] folds these into one [`RetryPolicy`] per test case
//! before its first attempt begins.

use crate::{
    errors::{FilterConflictError, FilterScope, TimingModeParseError},
    filter::{ExceptionFilter, ExceptionTypeId},
};
use serde::Deserialize;
use std::{fmt, str::FromStr, time::Duration};

/// How per-attempt durations fold into the one reported duration.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimingMode {
    /// Report the phase durations of the last attempt only.
    ///
    /// This is the default. Prior attempts' durations are discarded from the
    /// reported total, though still visible in the retry report's
    /// per-attempt detail.
    #[default]
    Overwrite,

    /// Sum phase durations across all attempts, failed and final.
    Cumulative,
}

impl TimingMode {
    /// String representations of all known variants.
    pub fn variants() -> &'static [&'static str] {
        &["overwrite", "cumulative"]
    }
}

impl FromStr for TimingMode {
    type Err = TimingModeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let val = match s {
            "overwrite" => TimingMode::Overwrite,
            "cumulative" => TimingMode::Cumulative,
            other => return Err(TimingModeParseError::new(other)),
        };
        Ok(val)
    }
}

impl fmt::Display for TimingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimingMode::Overwrite => write!(f, "overwrite"),
            TimingMode::Cumulative => write!(f, "cumulative"),
        }
    }
}

/// CLI-equivalent session defaults, before per-test overrides.
///
/// Deserializable from the host's own configuration surface.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RetryConfig {
    /// Number of times to retry failed tests.
    ///
    /// Absent means no blanket retry: unmarked tests are never retried, and
    /// a bare mark falls back to a single retry.
    #[serde(default)]
    pub retries: Option<u32>,

    /// Delay between attempts.
    #[serde(default, with = "humantime_serde")]
    pub retry_delay: Duration,

    /// How attempt durations fold into the reported duration.
    #[serde(default)]
    pub timing_mode: TimingMode,
}

/// Results of the two global filter extension points.
///
/// The host gathers these from its own hook mechanism at session start and
/// passes them in by value; the core reads no hidden global state during
/// execution. Defining both hooks simultaneously is a configuration error,
/// surfaced by [`PolicyResolver::new`] before any test executes.
#[derive(Clone, Debug, Default)]
pub struct FilterHooks {
    only_on: Vec<ExceptionTypeId>,
    exclude: Vec<ExceptionTypeId>,
}

impl FilterHooks {
    /// No hooks defined.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the result of the "only retry on these types" hook.
    pub fn with_only_on(
        mut self,
        types: impl IntoIterator<Item = impl Into<ExceptionTypeId>>,
    ) -> Self {
        self.only_on = types.into_iter().map(Into::into).collect();
        self
    }

    /// Records the result of the "never retry on these types" hook.
    pub fn with_exclude(
        mut self,
        types: impl IntoIterator<Item = impl Into<ExceptionTypeId>>,
    ) -> Self {
        self.exclude = types.into_iter().map(Into::into).collect();
        self
    }

    fn resolve(&self) -> Result<ExceptionFilter, FilterConflictError> {
        match (self.only_on.is_empty(), self.exclude.is_empty()) {
            (true, true) => Ok(ExceptionFilter::none()),
            (false, true) => Ok(ExceptionFilter::only_on(self.only_on.iter().cloned())),
            (true, false) => Ok(ExceptionFilter::exclude(self.exclude.iter().cloned())),
            (false, false) => Err(FilterConflictError::new(FilterScope::Hooks)),
        }
    }
}

/// Per-test override record, the equivalent of a `flaky` mark.
///
/// Fields left unset fall back to the session defaults; fields that are set
/// override them entirely, with no merging. Populating both `only_on` and
/// `exclude` is a configuration error, surfaced when the mark's policy is
/// resolved at collection time.
#[derive(Clone, Debug, Default)]
pub struct RetryMark {
    retries: Option<u32>,
    delay: Option<Duration>,
    only_on: Vec<ExceptionTypeId>,
    exclude: Vec<ExceptionTypeId>,
    condition: Option<bool>,
    timing: Option<TimingMode>,
}

impl RetryMark {
    /// A mark with no arguments. Requests at least one retry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the retry count for this test.
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    /// Sets the inter-attempt delay for this test.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Retries this test only on the listed exception types.
    pub fn only_on(mut self, types: impl IntoIterator<Item = impl Into<ExceptionTypeId>>) -> Self {
        self.only_on = types.into_iter().map(Into::into).collect();
        self
    }

    /// Never retries this test on the listed exception types.
    pub fn exclude(mut self, types: impl IntoIterator<Item = impl Into<ExceptionTypeId>>) -> Self {
        self.exclude = types.into_iter().map(Into::into).collect();
        self
    }

    /// Gates retrying on a precomputed condition.
    pub fn condition(mut self, condition: bool) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Sets the timing mode for this test.
    pub fn timing(mut self, timing: TimingMode) -> Self {
        self.timing = Some(timing);
        self
    }

    /// The mark's own filter, if it specifies one.
    fn filter(&self) -> Result<Option<ExceptionFilter>, FilterConflictError> {
        match (self.only_on.is_empty(), self.exclude.is_empty()) {
            (true, true) => Ok(None),
            (false, true) => Ok(Some(ExceptionFilter::only_on(self.only_on.iter().cloned()))),
            (true, false) => Ok(Some(ExceptionFilter::exclude(self.exclude.iter().cloned()))),
            (false, false) => Err(FilterConflictError::new(FilterScope::Mark)),
        }
    }
}

/// Effective retry policy for a single test case.
///
/// Fully resolved before the first attempt begins; immutable once attempts
/// begin.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    max_retries: u32,
    delay: Duration,
    timing_mode: TimingMode,
    filter: ExceptionFilter,
    condition: bool,
}

impl RetryPolicy {
    /// The maximum number of retries. Total attempts are bounded by
    /// `max_retries + 1`.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// The total attempt ceiling, `max_retries + 1`.
    pub fn total_attempts(&self) -> usize {
        self.max_retries as usize + 1
    }

    /// The blocking delay between attempts.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// How attempt durations fold into the reported duration.
    pub fn timing_mode(&self) -> TimingMode {
        self.timing_mode
    }

    /// The exception filter consulted after each failed attempt.
    pub fn filter(&self) -> &ExceptionFilter {
        &self.filter
    }

    /// The boolean gating condition. If false, the test is never retried.
    pub fn condition(&self) -> bool {
        self.condition
    }
}

/// Resolves the effective [`RetryPolicy`] for each test case.
///
/// Constructed once per session; construction validates the global sources so
/// configuration errors halt the session before any test executes.
#[derive(Clone, Debug)]
pub struct PolicyResolver {
    config: RetryConfig,
    default_filter: ExceptionFilter,
}

impl PolicyResolver {
    /// Creates a resolver from the session defaults and the global filter
    /// hook results.
    ///
    /// Errors if both global hooks are defined.
    pub fn new(config: RetryConfig, hooks: &FilterHooks) -> Result<Self, FilterConflictError> {
        let default_filter = hooks.resolve()?;
        Ok(Self {
            config,
            default_filter,
        })
    }

    /// Resolves the policy for one test case.
    ///
    /// Errors if the mark populates both `only_on` and `exclude`. Call this
    /// at collection time so the error never surfaces mid-run.
    pub fn resolve(&self, mark: Option<&RetryMark>) -> Result<RetryPolicy, FilterConflictError> {
        let Some(mark) = mark else {
            return Ok(RetryPolicy {
                max_retries: self.config.retries.unwrap_or(0),
                delay: self.config.retry_delay,
                timing_mode: self.config.timing_mode,
                filter: self.default_filter.clone(),
                condition: true,
            });
        };

        let filter = match mark.filter()? {
            Some(filter) => filter,
            None => self.default_filter.clone(),
        };
        Ok(RetryPolicy {
            // A bare mark asks for at least one retry.
            max_retries: mark.retries.or(self.config.retries).unwrap_or(1),
            delay: mark.delay.unwrap_or(self.config.retry_delay),
            timing_mode: mark.timing.unwrap_or(self.config.timing_mode),
            filter,
            condition: mark.condition.unwrap_or(true),
        })
    }
}

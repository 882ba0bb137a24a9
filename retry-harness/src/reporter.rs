// Copyright (c) The retry-harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The end-of-session retry report and summary line.
//!
//! The retry report is a section distinct from the host's native output: one
//! entry per retried test, listing each failed attempt's exception text. The
//! summary line extends the host's pass/fail/skip counts with a retried
//! count.

use crate::{
    case::CaseId,
    filter::Exception,
    runner::{CaseStatus, RunStats},
};
use indexmap::IndexMap;
use owo_colors::{OwoColorize, Style};
use std::io::{self, Write};

/// The character appended to live per-test output when a test was retried at
/// least once.
pub const RETRY_STATUS_CHAR: char = 'R';

/// Returns the live-output status character for a finished case, if its
/// execution warrants one.
pub fn status_char(status: &CaseStatus) -> Option<char> {
    status.retried().then_some(RETRY_STATUS_CHAR)
}

/// Why a failed attempt was logged.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AttemptLogKind {
    /// The attempt failed and a retry followed.
    WillRetry,

    /// The attempt failed and retrying stopped: the budget was exhausted, or
    /// the failure was no longer eligible for retry.
    Exhausted,

    /// The between-attempt teardown failed; retrying stopped immediately.
    TeardownFailed,
}

/// One logged failed attempt of a retried test.
#[derive(Clone, Debug)]
pub struct AttemptLog {
    /// The attempt that failed, 1-based.
    pub attempt: usize,

    /// Why this attempt was logged.
    pub kind: AttemptLogKind,

    /// The captured exception.
    pub exception: Exception,
}

/// Session-scoped store of failed-attempt records for retried tests.
///
/// One per process; under a host that parallelizes across worker processes
/// each process holds an independent report with no cross-process merge. Not
/// reset between sessions within one process invocation.
#[derive(Debug)]
pub struct RetryReport {
    entries: IndexMap<CaseId, Vec<AttemptLog>>,
    trace_limit: Option<usize>,
    styles: Styles,
}

impl Default for RetryReport {
    fn default() -> Self {
        Self {
            entries: IndexMap::new(),
            trace_limit: Some(DEFAULT_TRACE_LIMIT),
            styles: Styles::default(),
        }
    }
}

impl RetryReport {
    /// Creates an empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps the number of traceback lines shown per attempt, keeping the
    /// innermost lines. The default cap keeps the last
    /// [`DEFAULT_TRACE_LIMIT`] lines; pass `None` to show full tracebacks,
    /// as verbose output does.
    pub fn set_trace_limit(&mut self, trace_limit: Option<usize>) {
        self.trace_limit = trace_limit;
    }

    /// Colorizes report output.
    pub fn colorize(&mut self) {
        self.styles.colorize();
    }

    /// Returns true if no test was retried.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over retried tests in insertion order, with their ordered
    /// failed-attempt logs.
    pub fn iter(&self) -> impl Iterator<Item = (&CaseId, &[AttemptLog])> + '_ {
        self.entries.iter().map(|(id, logs)| (id, logs.as_slice()))
    }

    pub(crate) fn log_will_retry(&mut self, case_id: CaseId, attempt: usize, exception: &Exception) {
        self.log(case_id, attempt, AttemptLogKind::WillRetry, exception);
    }

    pub(crate) fn log_exhausted(&mut self, case_id: CaseId, attempt: usize, exception: &Exception) {
        self.log(case_id, attempt, AttemptLogKind::Exhausted, exception);
    }

    pub(crate) fn log_teardown_failed(
        &mut self,
        case_id: CaseId,
        attempt: usize,
        exception: &Exception,
    ) {
        self.log(case_id, attempt, AttemptLogKind::TeardownFailed, exception);
    }

    fn log(&mut self, case_id: CaseId, attempt: usize, kind: AttemptLogKind, exception: &Exception) {
        self.entries.entry(case_id).or_default().push(AttemptLog {
            attempt,
            kind,
            exception: exception.clone(),
        });
    }

    /// Writes the end-of-session retry report.
    ///
    /// Writes nothing if no test was retried.
    pub fn write_report(&self, mut writer: impl Write) -> io::Result<()> {
        if self.entries.is_empty() {
            return Ok(());
        }

        writeln!(writer)?;
        self.write_section("the following tests were retried", &mut writer)?;
        for (case_id, logs) in &self.entries {
            for log in logs {
                let message = match log.kind {
                    AttemptLogKind::WillRetry => {
                        format!("failed on attempt {}! Retrying!", log.attempt)
                    }
                    AttemptLogKind::Exhausted => {
                        format!("failed after {} attempts!", log.attempt)
                    }
                    AttemptLogKind::TeardownFailed => {
                        format!("teardown failed on attempt {}! Exiting immediately!", log.attempt)
                    }
                };
                writeln!(
                    writer,
                    "\t{} {}",
                    case_id.style(self.styles.case_id),
                    message
                )?;
                self.write_exception(&log.exception, &mut writer)?;
                writeln!(writer)?;
            }
        }
        self.write_section("end of test retry report", &mut writer)?;
        writeln!(writer)
    }

    fn write_exception(&self, exception: &Exception, writer: &mut impl Write) -> io::Result<()> {
        let text = match exception.traceback() {
            Some(traceback) => traceback.to_owned(),
            None => exception.to_string(),
        };
        let lines: Vec<&str> = text.lines().collect();
        // The tail holds the innermost frame and the exception line, so the
        // cap trims from the top.
        let start = match self.trace_limit {
            Some(limit) => lines.len().saturating_sub(limit),
            None => 0,
        };
        if start > 0 {
            writeln!(writer, "\t...")?;
        }
        for line in &lines[start..] {
            writeln!(writer, "\t{}", line.style(self.styles.exception))?;
        }
        Ok(())
    }

    fn write_section(&self, title: &str, writer: &mut impl Write) -> io::Result<()> {
        // 80 columns, `=` fill, title centered with one space on each side.
        let fill = SECTION_WIDTH.saturating_sub(title.len() + 2);
        let left = fill / 2;
        let right = fill - left;
        writeln!(
            writer,
            "{}",
            format!("{} {} {}", "=".repeat(left), title, "=".repeat(right))
                .style(self.styles.section)
        )
    }
}

const SECTION_WIDTH: usize = 80;

/// Traceback lines shown per attempt unless the cap is changed: enough for
/// the innermost frame and the exception line.
pub const DEFAULT_TRACE_LIMIT: usize = 3;

/// Writes the session summary line, with the retried count alongside
/// passed/failed/skipped.
pub fn write_summary(stats: &RunStats, colorize: bool, mut writer: impl Write) -> io::Result<()> {
    let mut styles = Styles::default();
    if colorize {
        styles.colorize();
    }
    let summary_style = if stats.failed > 0 {
        styles.fail
    } else {
        styles.pass
    };
    write!(writer, "{:>12} ", "Summary".style(summary_style))?;
    write!(
        writer,
        "{} tests run: {} {}",
        stats.finished_count.style(styles.count),
        stats.passed.style(styles.count),
        "passed".style(styles.pass),
    )?;
    if stats.retried > 0 {
        write!(
            writer,
            " ({} {})",
            stats.retried.style(styles.count),
            "retried".style(styles.retry),
        )?;
    }
    if stats.failed > 0 {
        write!(
            writer,
            ", {} {}",
            stats.failed.style(styles.count),
            "failed".style(styles.fail),
        )?;
    }
    write!(
        writer,
        ", {} {}",
        stats.skipped.style(styles.count),
        "skipped".style(styles.skip),
    )?;
    writeln!(writer)
}

#[derive(Clone, Debug, Default)]
struct Styles {
    count: Style,
    pass: Style,
    retry: Style,
    fail: Style,
    skip: Style,
    section: Style,
    case_id: Style,
    exception: Style,
}

impl Styles {
    fn colorize(&mut self) {
        self.count = Style::new().bold();
        self.pass = Style::new().green().bold();
        self.retry = Style::new().magenta().bold();
        self.fail = Style::new().red().bold();
        self.skip = Style::new().yellow().bold();
        self.section = Style::new().yellow().bold();
        self.case_id = Style::new().bold();
        self.exception = Style::new().red();
    }
}

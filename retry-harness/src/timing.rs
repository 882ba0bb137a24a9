// Copyright (c) The retry-harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Phase timing capture.
//!
//! Phases are measured with the monotonic clock; aggregation across attempts
//! lives on [`ExecutionStatuses`](crate::runner::ExecutionStatuses), selected
//! by the resolved policy's timing mode.

use std::time::{Duration, Instant};

/// Wall-clock durations of the three phases of one attempt.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct PhaseTimings {
    /// Duration of the setup phase.
    pub setup: Duration,

    /// Duration of the call phase.
    pub call: Duration,

    /// Duration of the teardown phase.
    pub teardown: Duration,
}

impl PhaseTimings {
    /// Total duration across the three phases.
    pub fn total(&self) -> Duration {
        self.setup + self.call + self.teardown
    }
}

/// Runs `f`, returning its result and its elapsed duration.
pub(crate) fn timed<T>(f: impl FnOnce() -> T) -> (T, Duration) {
    let start = Instant::now();
    let value = f();
    (value, start.elapsed())
}

// Copyright (c) The retry-harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Retry controller for flaky tests, embeddable in a host test framework.
//!
//! retry-harness does not discover tests, resolve fixtures, or own
//! scheduling. The host invokes [`runner::RetrySession::run_case`] at the
//! point it would normally execute a test's setup/call/teardown phases, and
//! the session decides after each failed attempt whether to re-execute the
//! test, replaying teardown between attempts so each attempt starts from a
//! clean slate.
//!
//! The pieces, in the order they come into play:
//!
//! * [`config`] — CLI-equivalent defaults, per-test marks, global filter
//!   hooks, and the resolver that folds them into one [`config::RetryPolicy`]
//!   per test case.
//! * [`case`] — the interface the host implements per test case.
//! * [`runner`] — the attempt loop and per-session statistics.
//! * [`reporter`] — the end-of-session retry report and summary line.

pub mod case;
pub mod config;
pub mod errors;
pub mod filter;
pub mod reporter;
pub mod runner;
pub mod stash;
mod timing;

pub use timing::PhaseTimings;

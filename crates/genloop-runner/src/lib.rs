//! genloop runner
//!
//! Test Execution Runner: starts the external test runner for one test file
//! and reports a [`BuildOutcome`](genloop_core::BuildOutcome)-shaped result.
//!
//! - a `"status":404` line aborts immediately, nothing is archived
//! - an `Error: ... already used` line aborts immediately
//! - a missing-baseline line allows exactly one rerun with snapshot refresh

#![allow(missing_docs)]

mod error;
mod runner;
mod signature;

pub use error::RunnerError;
pub use runner::{RunRequest, TestRunOutcome, TestRunner, MAX_INVOCATIONS, RUNNER_BUCKET};
pub use signature::{classify_line, LineSignal, SNAPSHOT_MISSING};

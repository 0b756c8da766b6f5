//! Reduced test-run results
//!
//! A suite is a file-level grouping of specs. Aggregates are always derived
//! from the spec list through [`TestSuiteResult::from_specs`], so
//! `ok + ng == total == specs.len()` holds for every value built here.

use serde::{Deserialize, Serialize};

/// One test case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSpecResult {
    pub title: String,
    #[serde(rename = "result")]
    pub passed: bool,
    pub error_summary: Option<String>,
    pub error_message: Option<String>,
    pub error_stack: Option<String>,
}

impl TestSpecResult {
    /// Passing spec
    pub fn passed(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            passed: true,
            error_summary: None,
            error_message: None,
            error_stack: None,
        }
    }

    /// Failing spec with extracted error details
    pub fn failed(
        title: impl Into<String>,
        summary: Option<String>,
        message: Option<String>,
        stack: Option<String>,
    ) -> Self {
        Self {
            title: title.into(),
            passed: false,
            error_summary: summary,
            error_message: message,
            error_stack: stack,
        }
    }
}

/// A file-level suite with aggregate counts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSuiteResult {
    pub name: String,
    pub file: String,
    #[serde(rename = "result")]
    pub passed: bool,
    pub total: usize,
    pub ok: usize,
    pub ng: usize,
    pub specs: Vec<TestSpecResult>,
}

impl TestSuiteResult {
    /// Aggregate a spec list
    pub fn from_specs(
        name: impl Into<String>,
        file: impl Into<String>,
        specs: Vec<TestSpecResult>,
    ) -> Self {
        let ok = specs.iter().filter(|s| s.passed).count();
        let total = specs.len();
        Self {
            name: name.into(),
            file: file.into(),
            passed: ok == total,
            total,
            ok,
            ng: total - ok,
            specs,
        }
    }

    /// Check the aggregate against the spec list
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.ok + self.ng == self.total
            && self.total == self.specs.len()
            && self.passed == self.specs.iter().all(|s| s.passed)
    }
}

/// Payload of a `test_result` event
///
/// Either a reduced suite, or `result = false` with a `detail` explaining why
/// no suite could be produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResultPayload {
    pub name: String,
    pub file: String,
    pub result: bool,
    pub detail: String,
    pub total: usize,
    pub ok: usize,
    pub ng: usize,
    pub specs: Vec<TestSpecResult>,
}

impl TestResultPayload {
    pub fn from_suite(suite: &TestSuiteResult) -> Self {
        Self {
            name: suite.name.clone(),
            file: suite.file.clone(),
            result: suite.passed,
            detail: String::new(),
            total: suite.total,
            ok: suite.ok,
            ng: suite.ng,
            specs: suite.specs.clone(),
        }
    }

    pub fn from_failure(detail: impl Into<String>) -> Self {
        Self {
            result: false,
            detail: detail.into(),
            ..Self::default()
        }
    }
}

//! Subset of the Playwright JSON reporter schema this crate reads
//!
//! Only the fields needed for reduction are modelled; everything else in the
//! report is ignored.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawReport {
    #[serde(default)]
    pub(crate) suites: Vec<RawSuite>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawSuite {
    #[serde(default)]
    pub(crate) title: String,
    #[serde(default)]
    pub(crate) file: String,
    #[serde(default)]
    pub(crate) suites: Vec<RawSuite>,
    #[serde(default)]
    pub(crate) specs: Vec<RawSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawSpec {
    pub(crate) title: String,
    pub(crate) ok: bool,
    #[serde(default)]
    pub(crate) tests: Vec<RawTest>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawTest {
    #[serde(default)]
    pub(crate) results: Vec<RawResult>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawResult {
    pub(crate) error: Option<RawError>,
    #[serde(default)]
    pub(crate) errors: Vec<RawError>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct RawError {
    pub(crate) message: Option<String>,
    pub(crate) stack: Option<String>,
}

impl RawReport {
    /// First top-level suite holding exactly one nested suite, and that nested suite
    pub(crate) fn spec_suite(&self) -> Option<&RawSuite> {
        self.suites
            .iter()
            .find(|s| s.suites.len() == 1)
            .and_then(|s| s.suites.first())
    }
}

impl RawSpec {
    /// First attempt of the first test
    pub(crate) fn first_result(&self) -> Option<&RawResult> {
        self.tests.first().and_then(|t| t.results.first())
    }
}

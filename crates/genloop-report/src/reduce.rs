//! Report reduction: wait, parse, extract, aggregate, persist

use crate::ansi::strip_ansi;
use crate::error::ReportError;
use crate::extract::{error_summary, is_timeout, waiting_for_fragment};
use crate::schema::{RawReport, RawSpec};
use crate::stability::{wait_for_stable, StabilityPolicy};
use genloop_archive::Workspace;
use genloop_core::{TestSpecResult, TestSuiteResult};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Archive bucket for report files inside the session directory
pub const REPORT_BUCKET: &str = "playwright";

/// A reduced and persisted report
#[derive(Debug, Clone, PartialEq)]
pub struct Reduction {
    pub suite: TestSuiteResult,
    pub summary_path: PathBuf,
    pub archived_path: PathBuf,
}

/// Turns raw runner reports into [`TestSuiteResult`]s
#[derive(Debug, Clone, Default)]
pub struct ReportReducer {
    policy: StabilityPolicy,
}

impl ReportReducer {
    pub fn new(policy: StabilityPolicy) -> Self {
        Self { policy }
    }

    #[inline]
    #[must_use]
    pub fn policy(&self) -> StabilityPolicy {
        self.policy
    }

    /// Wait for a fresh, stable report and parse it
    pub async fn reduce(
        &self,
        report_path: &Path,
        prior_mtime: Option<SystemTime>,
    ) -> Result<TestSuiteResult, ReportError> {
        wait_for_stable(report_path, prior_mtime, self.policy).await?;
        parse_report_file(report_path)
    }

    /// [`reduce`](Self::reduce), then write the summary next to the report
    /// and archive it into the session's report bucket
    pub async fn reduce_and_persist(
        &self,
        report_path: &Path,
        prior_mtime: Option<SystemTime>,
        workspace: &Workspace,
    ) -> Result<Reduction, ReportError> {
        let suite = self.reduce(report_path, prior_mtime).await?;
        let summary_path = write_summary(&suite, report_path)?;
        let archived_path = workspace.archive_into(&summary_path, REPORT_BUCKET)?;

        tracing::info!(
            suite = %suite.name,
            total = suite.total,
            ok = suite.ok,
            ng = suite.ng,
            summary = %summary_path.display(),
            "report reduced"
        );
        Ok(Reduction {
            suite,
            summary_path,
            archived_path,
        })
    }
}

/// Parse a report file without waiting
pub fn parse_report_file(path: &Path) -> Result<TestSuiteResult, ReportError> {
    let text = fs::read_to_string(path).map_err(|e| ReportError::io(path, e))?;
    parse_report(&text, path)
}

/// Parse report JSON; `origin` is only used in error values
pub fn parse_report(text: &str, origin: &Path) -> Result<TestSuiteResult, ReportError> {
    let raw: RawReport =
        serde_json::from_str(text).map_err(|e| ReportError::malformed(origin, e.to_string()))?;
    let suite = raw
        .spec_suite()
        .ok_or_else(|| ReportError::malformed(origin, "no suite with a single nested suite"))?;

    let specs = suite.specs.iter().map(reduce_spec).collect();
    Ok(TestSuiteResult::from_specs(
        suite.title.clone(),
        suite.file.clone(),
        specs,
    ))
}

fn reduce_spec(spec: &RawSpec) -> TestSpecResult {
    if spec.ok {
        return TestSpecResult::passed(spec.title.clone());
    }

    let Some(result) = spec.first_result() else {
        return TestSpecResult::failed(spec.title.clone(), None, None, None);
    };
    let Some(error) = result.error.as_ref() else {
        return TestSpecResult::failed(spec.title.clone(), None, None, None);
    };

    let mut message = error.message.as_deref().map(strip_ansi);
    let summary = message.as_deref().and_then(error_summary);
    let stack = error.stack.as_deref().map(strip_ansi);

    if message.as_deref().is_some_and(is_timeout) {
        if let Some(fragment) = waiting_for_fragment(&result.errors) {
            message = Some(fragment);
        }
    }

    TestSpecResult::failed(spec.title.clone(), summary, message, stack)
}

/// `{stem}_summary{ext}` next to the report
#[must_use]
pub fn summary_path_for(report_path: &Path) -> PathBuf {
    let stem = report_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match report_path.extension() {
        Some(ext) => format!("{stem}_summary.{}", ext.to_string_lossy()),
        None => format!("{stem}_summary"),
    };
    report_path.with_file_name(name)
}

/// Write the suite as pretty JSON to the summary path
pub fn write_summary(suite: &TestSuiteResult, report_path: &Path) -> Result<PathBuf, ReportError> {
    let path = summary_path_for(report_path);
    let json = serde_json::to_string_pretty(suite)
        .map_err(|e| ReportError::malformed(&path, e.to_string()))?;
    fs::write(&path, json).map_err(|e| ReportError::io(&path, e))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn report(specs: serde_json::Value) -> String {
        json!({
            "config": {},
            "suites": [{
                "title": "home.spec.ts",
                "file": "home.spec.ts",
                "specs": [],
                "suites": [{
                    "title": "Home page",
                    "file": "home.spec.ts",
                    "specs": specs
                }]
            }],
            "errors": []
        })
        .to_string()
    }

    #[test]
    fn parses_mixed_suite() {
        let text = report(json!([
            {"title": "shows hero", "ok": true, "tests": [{"results": [{}]}]},
            {"title": "opens menu", "ok": false, "tests": [{"results": [{
                "error": {
                    "message": "\u{1b}[31mError: expect(locator).toBeVisible()\u{1b}[39m\nReceived: hidden",
                    "stack": "\u{1b}[2mat home.spec.ts:12\u{1b}[22m"
                }
            }]}]}
        ]));

        let suite = parse_report(&text, Path::new("r.json")).unwrap();

        assert_eq!(suite.name, "Home page");
        assert_eq!((suite.total, suite.ok, suite.ng), (2, 1, 1));
        assert!(!suite.passed);
        let failed = &suite.specs[1];
        assert_eq!(
            failed.error_summary.as_deref(),
            Some("Error: expect(locator).toBeVisible()")
        );
        assert_eq!(failed.error_stack.as_deref(), Some("at home.spec.ts:12"));
    }

    #[test]
    fn timeout_prefers_waiting_for_line() {
        let text = report(json!([
            {"title": "books room", "ok": false, "tests": [{"results": [{
                "error": {"message": "Test timeout of 30000ms exceeded."},
                "errors": [
                    {"message": "Test timeout of 30000ms exceeded."},
                    {"message": "Error: locator.fill: Test timeout of 30000ms exceeded.\nCall log:\n  - waiting for getByTestId('checkin')\n"}
                ]
            }]}]}
        ]));

        let suite = parse_report(&text, Path::new("r.json")).unwrap();
        let spec = &suite.specs[0];

        assert_eq!(
            spec.error_message.as_deref(),
            Some("waiting for getByTestId('checkin')")
        );
        // summary is computed from the original message
        assert_eq!(
            spec.error_summary.as_deref(),
            Some("Test timeout of 30000ms exceeded.")
        );
    }

    #[test]
    fn failing_spec_without_results_has_no_details() {
        let text = report(json!([{"title": "t", "ok": false, "tests": []}]));
        let suite = parse_report(&text, Path::new("r.json")).unwrap();
        assert_eq!(suite.specs[0], TestSpecResult::failed("t", None, None, None));
    }

    #[test]
    fn missing_nested_suite_is_malformed() {
        let text = json!({"suites": [{"title": "x", "suites": []}]}).to_string();
        assert!(matches!(
            parse_report(&text, Path::new("r.json")),
            Err(ReportError::Malformed { .. })
        ));
    }

    #[test]
    fn truncated_json_is_malformed() {
        assert!(matches!(
            parse_report("{\"suites\": [", Path::new("r.json")),
            Err(ReportError::Malformed { .. })
        ));
    }

    #[test]
    fn skips_suites_with_several_children() {
        let text = json!({"suites": [
            {"title": "multi", "suites": [{"title": "a"}, {"title": "b"}]},
            {"title": "single", "suites": [{"title": "picked", "file": "p.spec.ts", "specs": []}]}
        ]})
        .to_string();
        let suite = parse_report(&text, Path::new("r.json")).unwrap();
        assert_eq!(suite.name, "picked");
    }

    #[test]
    fn summary_name_keeps_extension() {
        assert_eq!(
            summary_path_for(Path::new("/out/results/playwright_report.json")),
            PathBuf::from("/out/results/playwright_report_summary.json")
        );
    }
}

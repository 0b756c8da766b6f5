//! Build through an external command

use super::process::run_command;
use async_trait::async_trait;
use genloop_core::{BuildOutcome, Builder, CommandSpec, PipelineContext};
use genloop_report::strip_ansi;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

const DIAGNOSTIC_TAIL_CHARS: usize = 4000;
const PACKAGE_JSON: &str = "package.json";
const NO_ARGS: [&str; 0] = [];

#[derive(Debug, Deserialize)]
struct BuildLog {
    #[serde(default)]
    summary: BuildLogSummary,
    #[serde(default)]
    records: Vec<BuildLogRecord>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuildLogSummary {
    #[serde(default)]
    error_count: u64,
}

#[derive(Debug, Deserialize)]
struct BuildLogRecord {
    #[serde(default)]
    stream: String,
    #[serde(default)]
    message: String,
}

/// `stderr` records of a structured build log, one per line.
///
/// `None` when the log reports no errors or cannot be parsed.
#[must_use]
pub fn diagnostic_from_build_log(text: &str) -> Option<String> {
    let log: BuildLog = serde_json::from_str(text).ok()?;
    if log.summary.error_count == 0 {
        return None;
    }
    Some(
        log.records
            .iter()
            .filter(|r| r.stream == "stderr")
            .map(|r| format!("{}\n", r.message))
            .collect(),
    )
}

fn tail(text: &str, max_chars: usize) -> &str {
    let count = text.chars().count();
    if count <= max_chars {
        return text;
    }
    let start = text
        .char_indices()
        .nth(count - max_chars)
        .map_or(0, |(i, _)| i);
    &text[start..]
}

/// Runs the build command in the output root
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    spec: CommandSpec,
    command_line: String,
    build_log: Option<String>,
    timeout: Duration,
}

impl CommandBuilder {
    pub fn new(spec: CommandSpec, timeout: Duration) -> Self {
        Self {
            command_line: spec.display(),
            spec,
            build_log: None,
            timeout,
        }
    }

    /// Read the diagnostic from a structured log, relative to the output root
    #[inline]
    #[must_use]
    pub fn with_build_log(mut self, build_log: Option<String>) -> Self {
        self.build_log = build_log;
        self
    }

    async fn diagnostic(&self, root: &Path, combined: &str) -> String {
        if let Some(log) = &self.build_log {
            match tokio::fs::read_to_string(root.join(log)).await {
                Ok(text) => {
                    if let Some(diagnostic) = diagnostic_from_build_log(&text) {
                        return diagnostic;
                    }
                }
                Err(err) => tracing::warn!(log = %log, error = %err, "build log unreadable"),
            }
        }
        tail(&strip_ansi(combined), DIAGNOSTIC_TAIL_CHARS).to_owned()
    }
}

#[async_trait]
impl Builder for CommandBuilder {
    fn command(&self) -> &str {
        &self.command_line
    }

    async fn build(&self, ctx: &PipelineContext) -> BuildOutcome {
        let root = ctx.output_root();
        if !root.is_dir() {
            return BuildOutcome::FatalAbort(format!("output directory not found: {}", root.display()));
        }
        if !root.join(PACKAGE_JSON).is_file() {
            return BuildOutcome::FatalAbort(format!(
                "{PACKAGE_JSON} not found in {}",
                root.display()
            ));
        }

        let output = match run_command(&self.spec, NO_ARGS, Some(root), None, self.timeout).await {
            Ok(output) => output,
            Err(err) => {
                tracing::error!(error = %err, "build could not run");
                return BuildOutcome::FatalAbort(err.to_string());
            }
        };

        if output.status.success() {
            tracing::info!("build succeeded");
            return BuildOutcome::Success;
        }
        let diagnostic = self.diagnostic(root, &output.combined()).await;
        tracing::warn!(code = ?output.code(), "build failed");
        BuildOutcome::RetryableFailure(diagnostic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn build_log_concatenates_stderr_records() {
        let log = r#"{"summary":{"errorCount":2},"records":[
            {"stream":"stdout","message":"Creating an optimized production build"},
            {"stream":"stderr","message":"Type error: x is not defined"},
            {"stream":"stderr","message":"Failed to compile."}
        ]}"#;
        assert_eq!(
            diagnostic_from_build_log(log).as_deref(),
            Some("Type error: x is not defined\nFailed to compile.\n")
        );
    }

    #[test]
    fn build_log_without_errors_is_ignored() {
        assert_eq!(
            diagnostic_from_build_log(r#"{"summary":{"errorCount":0},"records":[]}"#),
            None
        );
        assert_eq!(diagnostic_from_build_log("not json"), None);
    }

    #[test]
    fn tail_keeps_the_end() {
        assert_eq!(tail("abcdef", 3), "def");
        assert_eq!(tail("ab", 3), "ab");
        assert_eq!(tail("äöüß", 2), "üß");
    }

    #[test]
    fn command_line_is_the_rule_id() {
        let builder = CommandBuilder::new(CommandSpec::new("npm", ["run", "build"]), Duration::from_secs(1));
        assert_eq!(builder.command(), "npm run build");
    }
}

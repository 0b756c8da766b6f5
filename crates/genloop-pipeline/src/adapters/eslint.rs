//! ESLint as the static checker

use super::process::run_command;
use async_trait::async_trait;
use genloop_core::{CapabilityError, CheckIssue, CheckReport, CommandSpec, StaticChecker};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct FileResult {
    #[serde(default)]
    messages: Vec<Message>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Message {
    #[serde(default)]
    rule_id: Option<String>,
    #[serde(default)]
    message: String,
    #[serde(default)]
    rules_meta: HashMap<String, RuleMeta>,
}

#[derive(Debug, Default, Deserialize)]
struct RuleMeta {
    #[serde(default)]
    docs: RuleDocs,
}

#[derive(Debug, Default, Deserialize)]
struct RuleDocs {
    #[serde(default)]
    description: String,
}

/// Rule messages may carry `{message, instruction}` as JSON text
#[derive(Debug, Deserialize)]
struct Embedded {
    message: Option<String>,
    #[serde(default)]
    instruction: String,
}

fn flatten_message(raw: &str) -> String {
    match serde_json::from_str::<Embedded>(raw) {
        Ok(embedded) => {
            let message = embedded.message.unwrap_or_else(|| raw.to_owned());
            if embedded.instruction.is_empty() {
                message
            } else {
                format!("{message} ({})", embedded.instruction)
            }
        }
        Err(_) => raw.to_owned(),
    }
}

/// Parse ESLint JSON output into a check report
pub fn parse_eslint_output(text: &str) -> Result<CheckReport, serde_json::Error> {
    let files: Vec<FileResult> = serde_json::from_str(text)?;
    let issues = files
        .into_iter()
        .flat_map(|file| file.messages)
        .map(|msg| {
            let rule_id = msg.rule_id.unwrap_or_default();
            let description = msg
                .rules_meta
                .get(&rule_id)
                .map(|meta| meta.docs.description.clone())
                .unwrap_or_default();
            CheckIssue {
                message: flatten_message(&msg.message),
                rule_id,
                description,
            }
        })
        .collect();
    Ok(CheckReport::from_issues(issues))
}

/// Runs ESLint with a JSON formatter against one file
#[derive(Debug, Clone)]
pub struct EslintChecker {
    spec: CommandSpec,
    cwd: PathBuf,
    timeout: Duration,
}

impl EslintChecker {
    pub fn new(spec: CommandSpec, cwd: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            spec,
            cwd: cwd.into(),
            timeout,
        }
    }
}

#[async_trait]
impl StaticChecker for EslintChecker {
    async fn check(&self, artifact_path: &Path) -> Result<CheckReport, CapabilityError> {
        let output = run_command(
            &self.spec,
            [artifact_path],
            Some(&self.cwd),
            None,
            self.timeout,
        )
        .await?;

        // 0: clean, 1: lint errors; anything else means ESLint itself failed
        match output.code() {
            Some(0 | 1) => {}
            code => {
                return Err(CapabilityError::Fatal(format!(
                    "eslint exited with {code:?}: {}",
                    output.stderr.trim()
                )))
            }
        }

        let report = parse_eslint_output(&output.stdout)
            .map_err(|e| CapabilityError::Fatal(format!("unreadable eslint output: {e}")))?;
        if let CheckReport::Issues(issues) = &report {
            tracing::debug!(path = %artifact_path.display(), issues = issues.len(), "eslint issues");
        }
        Ok(report)
    }
}

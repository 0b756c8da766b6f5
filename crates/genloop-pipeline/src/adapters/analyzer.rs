//! Build error analysis through an external command

use super::process::run_command;
use crate::prompt::analyzer_prompt;
use async_trait::async_trait;
use genloop_core::{
    AnalysisResult, Analyzer, CapabilityError, CommandSpec, PipelineContext, PromptTemplates,
};
use std::time::Duration;

/// Analyzer prompt on stdin, JSON [`AnalysisResult`] on stdout
#[derive(Debug, Clone)]
pub struct CommandAnalyzer {
    spec: CommandSpec,
    templates: PromptTemplates,
    timeout: Duration,
}

impl CommandAnalyzer {
    pub fn new(spec: CommandSpec, templates: PromptTemplates, timeout: Duration) -> Self {
        Self {
            spec,
            templates,
            timeout,
        }
    }
}

#[async_trait]
impl Analyzer for CommandAnalyzer {
    async fn analyze(
        &self,
        diagnostic: &str,
        ctx: &PipelineContext,
    ) -> Result<Option<AnalysisResult>, CapabilityError> {
        let prompt = analyzer_prompt(&self.templates, diagnostic);
        let output = run_command(
            &self.spec,
            ["--max-turns".to_owned(), ctx.max_turns.to_string()],
            Some(ctx.output_root()),
            Some(&prompt),
            self.timeout,
        )
        .await?;

        if !output.status.success() {
            return Err(CapabilityError::Transient(format!(
                "analyzer exited with {:?}: {}",
                output.code(),
                output.stderr.trim()
            )));
        }
        if output.stdout.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&output.stdout)
            .map(Some)
            .map_err(|e| CapabilityError::Fatal(format!("unreadable analysis: {e}")))
    }
}

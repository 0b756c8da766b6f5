//! Repair through an external command

use super::process::run_command;
use crate::prompt::fixer_prompt;
use async_trait::async_trait;
use genloop_core::{
    AgentResult, AnalysisResult, CapabilityError, CommandSpec, Fixer, PromptTemplates, Workspace,
};
use serde::Deserialize;
use std::time::Duration;

/// Archive bucket for files overwritten by a fix
pub const FIX_BUCKET: &str = "fix_code";

const NO_ARGS: [&str; 0] = [];

/// One file the fixer wants written
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FixedFile {
    pub path: String,
    pub content: String,
}

/// JSON reply of the fixer command
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FixReply {
    pub result: bool,
    #[serde(default)]
    pub error_detail: String,
    #[serde(default)]
    pub files: Vec<FixedFile>,
}

impl FixReply {
    /// Write every file through the workspace, archiving prior versions
    pub fn apply(self, workspace: &Workspace) -> Result<AgentResult, CapabilityError> {
        for file in &self.files {
            let record = workspace.write_file(&file.path, &file.content, FIX_BUCKET)?;
            tracing::info!(
                path = %record.path.display(),
                archived = record.backup.is_some(),
                "fix applied"
            );
        }
        Ok(AgentResult {
            result: self.result,
            error_detail: self.error_detail,
        })
    }
}

/// Fixer prompt on stdin, [`FixReply`] on stdout
#[derive(Debug, Clone)]
pub struct CommandFixer {
    spec: CommandSpec,
    templates: PromptTemplates,
    timeout: Duration,
}

impl CommandFixer {
    pub fn new(spec: CommandSpec, templates: PromptTemplates, timeout: Duration) -> Self {
        Self {
            spec,
            templates,
            timeout,
        }
    }
}

#[async_trait]
impl Fixer for CommandFixer {
    async fn fix(
        &self,
        analysis: &AnalysisResult,
        workspace: &Workspace,
    ) -> Result<AgentResult, CapabilityError> {
        let prompt = fixer_prompt(&self.templates, analysis);
        let output = run_command(
            &self.spec,
            NO_ARGS,
            Some(workspace.root()),
            Some(&prompt),
            self.timeout,
        )
        .await?;

        if !output.status.success() {
            return Ok(AgentResult::failed(format!(
                "fixer exited with {:?}: {}",
                output.code(),
                output.stderr.trim()
            )));
        }
        let reply: FixReply = serde_json::from_str(&output.stdout)
            .map_err(|e| CapabilityError::Fatal(format!("unreadable fix reply: {e}")))?;
        reply.apply(workspace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn reply_writes_files_and_archives_old_versions() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("out");
        std::fs::create_dir_all(root.join("app")).unwrap();
        std::fs::write(root.join("app/page.tsx"), "old").unwrap();
        let ws = Workspace::new(&root, dir.path().join("step"));

        let reply: FixReply = serde_json::from_str(
            r#"{"result":true,"files":[{"path":"app/page.tsx","content":"new"}]}"#,
        )
        .unwrap();
        let result = reply.apply(&ws).unwrap();

        assert!(result.result);
        assert_eq!(std::fs::read_to_string(root.join("app/page.tsx")).unwrap(), "new");
        let archived: Vec<_> = std::fs::read_dir(dir.path().join("step/fix_code/app"))
            .unwrap()
            .collect();
        assert_eq!(archived.len(), 1);
    }

    #[test]
    fn writes_outside_the_workspace_are_refused() {
        let dir = TempDir::new().unwrap();
        let ws = Workspace::new(dir.path().join("out"), dir.path().join("step"));
        let reply = FixReply {
            result: true,
            error_detail: String::new(),
            files: vec![FixedFile {
                path: "../escape.txt".into(),
                content: "x".into(),
            }],
        };
        let err = reply.apply(&ws).unwrap_err();
        assert!(!err.is_retryable());
        assert!(!dir.path().join("escape.txt").exists());
    }
}

//! Generation through an external command

use super::process::run_command;
use async_trait::async_trait;
use genloop_core::{CapabilityError, CommandSpec, GeneratedCode, Generator, PipelineContext};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Structured generator reply; bare stdout is treated as file content
#[derive(Debug, Deserialize)]
struct Reply {
    file_path: PathBuf,
    code: String,
    #[serde(default)]
    language: Option<String>,
}

/// Prompt on stdin, artifact on stdout
///
/// Non-zero exit or empty output is a transient fault; a command that cannot
/// be started is fatal.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    spec: CommandSpec,
    default_path: PathBuf,
    timeout: Duration,
}

impl CommandGenerator {
    pub fn new(spec: CommandSpec, default_path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            spec,
            default_path: default_path.into(),
            timeout,
        }
    }

    fn interpret(&self, stdout: &str) -> Result<GeneratedCode, CapabilityError> {
        if stdout.trim().is_empty() {
            return Err(CapabilityError::Transient("generator produced no output".to_owned()));
        }
        let code = match serde_json::from_str::<Reply>(stdout) {
            Ok(reply) => {
                let language = reply
                    .language
                    .unwrap_or_else(|| language_of(&reply.file_path));
                GeneratedCode::new(reply.file_path, reply.code, language)
            }
            Err(_) => GeneratedCode::new(
                self.default_path.clone(),
                stdout,
                language_of(&self.default_path),
            ),
        };
        Ok(code)
    }
}

fn language_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[async_trait]
impl Generator for CommandGenerator {
    fn name(&self) -> &str {
        "CodeGenerator"
    }

    async fn generate(
        &self,
        prompt: &str,
        ctx: &PipelineContext,
    ) -> Result<GeneratedCode, CapabilityError> {
        let output = run_command(
            &self.spec,
            ["--category", ctx.category.as_str()],
            Some(ctx.output_root()),
            Some(prompt),
            self.timeout,
        )
        .await?;

        if !output.status.success() {
            return Err(CapabilityError::Transient(format!(
                "generator exited with {:?}: {}",
                output.code(),
                output.stderr.trim()
            )));
        }
        self.interpret(&output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn generator() -> CommandGenerator {
        CommandGenerator::new(
            CommandSpec::new("true", Vec::<String>::new()),
            "app/page.tsx",
            Duration::from_secs(1),
        )
    }

    #[test]
    fn bare_output_goes_to_default_path() {
        let code = generator().interpret("export default function Page() {}\n").unwrap();
        assert_eq!(code.relative_path, PathBuf::from("app/page.tsx"));
        assert_eq!(code.language, "tsx");
    }

    #[test]
    fn structured_output_names_its_file() {
        let code = generator()
            .interpret(r#"{"file_path":"components/Nav.jsx","code":"x"}"#)
            .unwrap();
        assert_eq!(code, GeneratedCode::new("components/Nav.jsx", "x", "jsx"));
    }

    #[test]
    fn empty_output_is_transient() {
        assert!(generator().interpret("  \n").unwrap_err().is_retryable());
    }
}

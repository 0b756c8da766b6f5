//! genloop configuration
//!
//! Loaded once per process from a TOML file. Every section has defaults, so
//! an empty file (or no file) yields a usable configuration.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "genloop.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenloopConfig {
    pub pipeline: PipelineConfig,
    pub workspace: WorkspaceConfig,
    pub results: ResultsLayout,
    pub runner: RunnerConfig,
    pub commands: CommandsConfig,
    pub prompts: PromptTemplates,
    pub logging: LoggingConfig,
}

impl GenloopConfig {
    /// Load from `path`, or defaults when `path` is `None`
    pub fn load(path: Option<&Path>) -> Result<Self, CoreError> {
        let config = match path {
            Some(path) => {
                let text = fs::read_to_string(path).map_err(|e| CoreError::io(path, e))?;
                Self::from_toml_str(&text)?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self, CoreError> {
        Ok(toml::from_str(text)?)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.pipeline.retry_limit == 0 {
            return Err(CoreError::Config("pipeline.retry_limit must be >= 1".into()));
        }
        if self.runner.stability_interval_ms == 0 {
            return Err(CoreError::Config(
                "runner.stability_interval_ms must be > 0".into(),
            ));
        }
        if self.runner.stability_interval_ms > self.runner.stability_timeout_ms {
            return Err(CoreError::Config(
                "runner.stability_interval_ms must not exceed stability_timeout_ms".into(),
            ));
        }
        if self.runner.program.is_empty() {
            return Err(CoreError::Config("runner.program must not be empty".into()));
        }
        Ok(())
    }
}

/// What to do after a retryable build failure
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildFailureStrategy {
    /// Replace the base prompt and regenerate
    #[default]
    Reprompt,
    /// Run analyze, fix and rebuild once
    Repair,
}

/// `[pipeline]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub retry_limit: u32,
    pub build_failure_strategy: BuildFailureStrategy,
    pub debug_checkpoints: bool,
    pub heartbeat_secs: u64,
    pub max_turns: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            retry_limit: 3,
            build_failure_strategy: BuildFailureStrategy::Reprompt,
            debug_checkpoints: false,
            heartbeat_secs: 15,
            max_turns: 10,
        }
    }
}

/// `[workspace]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    pub output_dir: PathBuf,
    pub archive_dir: PathBuf,
    /// Optional JSON file inside `output_dir` overriding `[results]`
    pub results_layout_file: String,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            archive_dir: PathBuf::from("archive"),
            results_layout_file: "genloop.results.json".to_owned(),
        }
    }
}

/// Where the test runner leaves its files, relative to the output root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultsLayout {
    pub results_dir: String,
    pub info_file: String,
    pub report_file: String,
    pub screenshot_dir: String,
}

impl Default for ResultsLayout {
    fn default() -> Self {
        Self {
            results_dir: "results".to_owned(),
            info_file: "playwright_info.json".to_owned(),
            report_file: "playwright_report.json".to_owned(),
            screenshot_dir: "screenshots".to_owned(),
        }
    }
}

impl ResultsLayout {
    /// Load a layout file, falling back to `fallback` if it does not exist
    pub fn load_or(path: &Path, fallback: &ResultsLayout) -> Result<Self, CoreError> {
        if !path.is_file() {
            tracing::debug!(path = %path.display(), "no results layout file, using defaults");
            return Ok(fallback.clone());
        }
        let text = fs::read_to_string(path).map_err(|e| CoreError::io(path, e))?;
        serde_json::from_str(&text).map_err(|source| CoreError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    #[must_use]
    pub fn results_path(&self, root: &Path) -> PathBuf {
        root.join(&self.results_dir)
    }

    #[must_use]
    pub fn report_path(&self, root: &Path) -> PathBuf {
        self.results_path(root).join(&self.report_file)
    }

    #[must_use]
    pub fn info_path(&self, root: &Path) -> PathBuf {
        self.results_path(root).join(&self.info_file)
    }

    #[must_use]
    pub fn screenshot_path(&self, root: &Path) -> PathBuf {
        self.results_path(root).join(&self.screenshot_dir)
    }
}

/// `[runner]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub program: String,
    pub args: Vec<String>,
    pub update_snapshots_flag: String,
    /// Directory of test files, relative to the output root
    pub test_dir: String,
    pub project: Option<String>,
    /// Whole-run limit; the process is killed when it is exceeded
    pub timeout_secs: u64,
    pub stability_timeout_ms: u64,
    pub stability_interval_ms: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            program: "npx".to_owned(),
            args: vec!["playwright".to_owned(), "test".to_owned()],
            update_snapshots_flag: "--update-snapshots".to_owned(),
            test_dir: "tests".to_owned(),
            project: None,
            timeout_secs: 900,
            stability_timeout_ms: 10_000,
            stability_interval_ms: 500,
        }
    }
}

/// An external command line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Display form for logs and `check_result` rule ids
    #[must_use]
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// `[commands]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandsConfig {
    pub generator: CommandSpec,
    pub static_check: CommandSpec,
    pub build: CommandSpec,
    pub analyzer: CommandSpec,
    pub fixer: CommandSpec,
    /// Artifact path used when the generator prints bare content
    pub artifact_path: String,
    /// Structured build log written by the build command, relative to the output root
    pub build_log: Option<String>,
    pub timeout_secs: u64,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            generator: CommandSpec::new("genloop-agent", ["generate"]),
            static_check: CommandSpec::new("npx", ["eslint", "--format", "json"]),
            build: CommandSpec::new("npm", ["run", "build"]),
            analyzer: CommandSpec::new("genloop-agent", ["analyze"]),
            fixer: CommandSpec::new("genloop-agent", ["fix"]),
            artifact_path: "app/page.tsx".to_owned(),
            build_log: None,
            timeout_secs: 600,
        }
    }
}

/// `[prompts]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptTemplates {
    /// Uses `{{source_code}}` and `{{error_message}}`
    pub build_error: String,
    /// Uses `{{build_error_log}}`
    pub analyzer: String,
    /// Uses `{{summary}}`, `{{root_cause}}`, `{{files_to_fix}}`, `{{fix_policy}}`
    pub fixer: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            build_error: "The following code failed to build.\n\n\
                ```\n{{source_code}}\n```\n\n\
                Build output:\n\n```\n{{error_message}}\n```\n\n\
                Fix the code so that it builds and return the full file."
                .to_owned(),
            analyzer: "Analyze this build log. Report summary, root_cause, files_to_fix, \
                fix_policy and confidence as JSON.\n\n{{build_error_log}}"
                .to_owned(),
            fixer: "Fix the build error.\n\nSummary: {{summary}}\nRoot cause: {{root_cause}}\n\
                Files to fix: {{files_to_fix}}\nFix policy: {{fix_policy}}"
                .to_owned(),
        }
    }
}

/// `[logging]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let config = GenloopConfig::from_toml_str("").unwrap();
        assert_eq!(config, GenloopConfig::default());
        assert_eq!(config.pipeline.retry_limit, 3);
        assert_eq!(config.runner.stability_timeout_ms, 10_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_sections_merge_with_defaults() {
        let config = GenloopConfig::from_toml_str(
            r#"
            [pipeline]
            retry_limit = 5
            build_failure_strategy = "repair"

            [runner]
            project = "chromium"
            "#,
        )
        .unwrap();
        assert_eq!(config.pipeline.retry_limit, 5);
        assert_eq!(
            config.pipeline.build_failure_strategy,
            BuildFailureStrategy::Repair
        );
        assert_eq!(config.pipeline.heartbeat_secs, 15);
        assert_eq!(config.runner.project.as_deref(), Some("chromium"));
        assert_eq!(config.runner.program, "npx");
    }

    #[test]
    fn zero_retry_limit_is_rejected() {
        let config = GenloopConfig::from_toml_str("[pipeline]\nretry_limit = 0").unwrap();
        assert!(matches!(config.validate(), Err(CoreError::Config(_))));
    }

    #[test]
    fn interval_longer_than_timeout_is_rejected() {
        let config = GenloopConfig::from_toml_str(
            "[runner]\nstability_timeout_ms = 100\nstability_interval_ms = 500",
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn command_display_joins_args() {
        assert_eq!(CommandsConfig::default().build.display(), "npm run build");
    }
}

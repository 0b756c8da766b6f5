//! Prompt composition
//!
//! - [`compose_prompt`]: base prompt plus accumulated guidance bullets
//! - [`render_template`]: `{{key}}` substitution for configured templates
//! - [`ParsedRequest`]: `# Header` / `# Body` request parsing
//! - [`expand_file_placeholders`]: inline `{{file:path}}` references

use crate::error::PipelineError;
use genloop_archive::Workspace;
use genloop_core::{AnalysisResult, PromptTemplates};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::path::Path;

static HEADER_SECTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)#\s*Header(.*?)(?:#\s*Body|\z)").expect("valid header pattern")
});
static BODY_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)#\s*Body").expect("valid body pattern"));
static HEADER_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\w+)\s*:\s*(.+)$").expect("valid field pattern"));
static FILE_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{file:(.+?)\}\}").expect("valid placeholder pattern"));

/// Append each fragment to the base prompt as a bullet line
#[must_use]
pub fn compose_prompt(base: &str, fragments: &[String]) -> String {
    fragments
        .iter()
        .fold(base.to_owned(), |acc, fragment| format!("{acc}\n- {fragment}\n"))
}

/// Replace every `{{key}}` with its value
#[must_use]
pub fn render_template(template: &str, values: &[(&str, &str)]) -> String {
    values.iter().fold(template.to_owned(), |acc, (key, value)| {
        acc.replace(&format!("{{{{{key}}}}}"), value)
    })
}

/// Reprompt after a retryable build failure
#[must_use]
pub fn build_error_prompt(templates: &PromptTemplates, source: &str, diagnostic: &str) -> String {
    render_template(
        &templates.build_error,
        &[("source_code", source), ("error_message", diagnostic)],
    )
}

/// Analyzer input for a build diagnostic
#[must_use]
pub fn analyzer_prompt(templates: &PromptTemplates, diagnostic: &str) -> String {
    render_template(&templates.analyzer, &[("build_error_log", diagnostic)])
}

/// Fixer input for an analysis result; list fields are rendered as JSON arrays
#[must_use]
pub fn fixer_prompt(templates: &PromptTemplates, analysis: &AnalysisResult) -> String {
    let files = serde_json::to_string(&analysis.files_to_fix).unwrap_or_default();
    let policy = serde_json::to_string(&analysis.fix_policy).unwrap_or_default();
    render_template(
        &templates.fixer,
        &[
            ("summary", &analysis.summary),
            ("root_cause", &analysis.root_cause),
            ("files_to_fix", &files),
            ("fix_policy", &policy),
        ],
    )
}

/// Header fields and body of an incoming request prompt
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedRequest {
    pub fields: BTreeMap<String, String>,
    /// Text after `# Body`, or the whole prompt when there is no header
    pub body: String,
}

impl ParsedRequest {
    /// Parse `# Header` `Key: Value` lines up to `# Body`
    #[must_use]
    pub fn parse(prompt: &str) -> Self {
        let Some(section) = HEADER_SECTION.captures(prompt) else {
            return Self {
                fields: BTreeMap::new(),
                body: prompt.to_owned(),
            };
        };

        let fields = section
            .get(1)
            .map(|m| m.as_str())
            .unwrap_or_default()
            .lines()
            .filter_map(|line| {
                let line = line.trim_matches(|c: char| c == '-' || c.is_whitespace());
                HEADER_FIELD
                    .captures(line)
                    .map(|c| (c[1].trim().to_owned(), c[2].trim().to_owned()))
            })
            .collect();

        let body = BODY_MARKER
            .find(prompt)
            .map(|m| prompt[m.end()..].trim_start_matches(['\r', '\n']).to_owned())
            .unwrap_or_default();

        Self { fields, body }
    }

    #[must_use]
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// `Category` header, if present
    #[must_use]
    pub fn category(&self) -> Option<&str> {
        self.field("Category")
    }

    /// `BuildCheck: on` enables build verification; anything else disables it
    #[must_use]
    pub fn build_check(&self) -> bool {
        self.field("BuildCheck")
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("on"))
    }
}

/// Replace each `{{file:path}}` with a fenced block of that workspace file
pub fn expand_file_placeholders(prompt: &str, workspace: &Workspace) -> Result<String, PipelineError> {
    let mut missing = None;
    let expanded = FILE_PLACEHOLDER.replace_all(prompt, |caps: &Captures<'_>| {
        let rel = caps[1].trim();
        match workspace.read_to_string(rel) {
            Ok(content) => {
                let lang = Path::new(rel)
                    .extension()
                    .map(|e| e.to_string_lossy().into_owned())
                    .unwrap_or_default();
                format!("[{rel}]\n```{lang}\n{content}\n```")
            }
            Err(_) => {
                missing.get_or_insert_with(|| workspace.root().join(rel));
                String::new()
            }
        }
    });

    match missing {
        Some(path) => Err(PipelineError::MissingPromptFile(path)),
        None => Ok(expanded.into_owned()),
    }
}

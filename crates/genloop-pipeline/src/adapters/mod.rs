//! Command-backed capabilities
//!
//! Each adapter shells out to a configured [`CommandSpec`] and maps the
//! result onto one capability trait. The binary builds them once from
//! [`CommandsConfig`]; tests use scripted doubles instead.
//!
//! [`CommandSpec`]: genloop_core::CommandSpec
//! [`CommandsConfig`]: genloop_core::CommandsConfig

mod analyzer;
mod builder;
mod eslint;
mod fixer;
mod generator;
mod process;

pub use analyzer::CommandAnalyzer;
pub use builder::{diagnostic_from_build_log, CommandBuilder};
pub use eslint::{parse_eslint_output, EslintChecker};
pub use fixer::{CommandFixer, FixReply, FixedFile, FIX_BUCKET};
pub use generator::CommandGenerator;
pub use process::{run_command, ProcessError, ProcessOutput};

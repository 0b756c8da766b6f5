//! genloop report
//!
//! Report Reduction Engine. Takes the JSON report a test runner leaves
//! behind and turns it into a [`TestSuiteResult`](genloop_core::TestSuiteResult):
//!
//! 1. wait until the file is fresh and no longer growing ([`wait_for_stable`])
//! 2. locate the spec suite and extract per-spec errors
//! 3. aggregate pass/fail counts
//! 4. write `{stem}_summary{ext}` and archive it

#![allow(missing_docs)]

mod ansi;
mod error;
mod extract;
mod reduce;
mod schema;
mod stability;

pub use ansi::strip_ansi;
pub use error::ReportError;
pub use extract::{error_summary, is_timeout};
pub use reduce::{
    parse_report, parse_report_file, summary_path_for, write_summary, Reduction, ReportReducer,
    REPORT_BUCKET,
};
pub use stability::{wait_for_stable, StabilityPolicy, StableFile};

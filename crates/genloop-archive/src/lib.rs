//! genloop archive
//!
//! Versioned file snapshots and workspace-confined file access.
//!
//! - [`archive()`]: copy a file into a directory, keeping the displaced copy
//!   under a name derived from its modification time
//! - [`Workspace`]: root-relative reads and archive-before-write

#![allow(missing_docs)]

mod archive;
mod error;
mod workspace;

pub use archive::{archive, rotate, versioned_name, TIMESTAMP_FORMAT};
pub use error::ArchiveError;
pub use workspace::{Workspace, WriteRecord};

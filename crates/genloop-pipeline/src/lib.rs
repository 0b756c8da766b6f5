//! genloop pipeline
//!
//! The generate, verify and repair loop and everything it drives:
//! - [`Orchestrator`]: retry state machine over the capability traits
//! - [`RepairPipeline`]: one analyze, fix and rebuild cycle per build failure
//! - [`TestSession`]: runner, report reduction and screenshots for one test file
//! - [`TelemetrySink`]: ordered event delivery plus a [`Heartbeat`] side channel
//! - [`adapters`]: command-backed capability implementations
//! - [`checkpoint`]: interactive development checkpoints

#![allow(missing_docs)]

pub mod adapters;
pub mod checkpoint;
mod error;
mod orchestrator;
pub mod prompt;
mod repair;
mod session;
mod steps;
mod telemetry;

pub use checkpoint::{
    Checkpoint, CheckpointCommand, CheckpointControl, ConsoleCheckpoint, ScriptedCheckpoint,
};
pub use error::PipelineError;
pub use orchestrator::Orchestrator;
pub use prompt::{compose_prompt, expand_file_placeholders, ParsedRequest};
pub use repair::{RepairCycle, RepairPipeline};
pub use session::{screenshots, TestSession, TEST_RUNNER_AGENT};
pub use steps::{build_step, check_step, generate_step, BuildFollowUp, Iteration, GEN_CODE_BUCKET};
pub use telemetry::{ChannelSink, CollectingSink, Frame, Heartbeat, HeartbeatFrame, TelemetrySink};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for wiring a pipeline
    pub use crate::{
        ChannelSink, CollectingSink, Orchestrator, RepairPipeline, TelemetrySink, TestSession,
    };
    pub use genloop_core::prelude::*;
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

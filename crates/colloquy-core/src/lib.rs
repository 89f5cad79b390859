/// Core library for the Colloquy dialog workflow engine.
///
/// This crate contains the workflow state machine, step handlers,
/// durable persistence, job queue, broadcast bus, completion services,
/// registry, and configuration management used by the `colloquy` binary.
pub mod broadcast;
pub mod config;
pub mod dialog;
pub mod error;
pub mod jobs;
pub mod llm;
pub mod registry;
pub mod startup;
pub mod storage;
pub mod template;
pub mod workflow;

pub use error::*;

/// Returns the version of the colloquy-core library.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

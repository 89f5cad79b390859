//! Workflow runtime: the engine, step handlers, and service facade.
//!
//! A dialog advances through its template's enabled steps one
//! committed transition at a time. Handlers signal suspension through a
//! typed readiness result; only the engine mutates dialog status, and
//! every advance path persists before returning, which is what makes
//! re-delivery of a workflow job idempotent.

pub mod engine;
pub mod graph;
pub mod handlers;
pub mod invokables;
pub mod requirements;
pub mod service;
pub mod step_result;


use uuid::Uuid;

use crate::error::{LlmError, RegistryError, StorageError};
use crate::registry::InvokeError;

pub use engine::{PlannedTransition, TransitionPlan, WorkflowEngine};
pub use service::{UserInput, WorkflowService};
pub use step_result::{Readiness, StepResult, TransitionResult};

/// Errors from workflow operations.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// Registry lookup or prompt rendering failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Persistence failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Completion service failed.
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// An invokable callable failed.
    #[error("invoke error: {0}")]
    Invoke(#[from] InvokeError),

    /// A handler was dispatched a step variant it does not implement.
    #[error("handler expected a {expected} step but got {actual}")]
    WrongStepType {
        /// The variant the handler implements.
        expected: &'static str,
        /// The variant it received.
        actual: &'static str,
    },

    /// A dialog id resolved to nothing.
    #[error("dialog {id} not found")]
    DialogNotFound {
        /// The id that was looked up.
        id: Uuid,
    },

    /// The template failed validation at dialog creation.
    #[error("invalid template: {message}")]
    InvalidTemplate {
        /// The collected validation failures.
        message: String,
    },
}

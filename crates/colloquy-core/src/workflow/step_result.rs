//! Result types shared by handlers and the engine.

use serde::Serialize;
use serde_json::Value;

/// Whether a step's inputs are satisfied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// The handler can run.
    Ready,
    /// The handler is waiting on the named variables (declaration
    /// order). Only the engine acts on this: it suspends the dialog.
    Missing(Vec<String>),
}

/// What a handler produced. Failure is signaled by returning an error,
/// not by a flag here.
#[derive(Debug, Clone, Default)]
pub struct StepResult {
    /// Optional human-readable note.
    pub message: Option<String>,
    /// Free-form result document merged into
    /// `workflow_data.step_results[step]`.
    pub data: serde_json::Map<String, Value>,
}

impl StepResult {
    /// Empty success.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a data entry.
    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Attach a note.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Result of one engine transition, returned to callers of
/// `execute_next_step` and `run_workflow`. Callers are never
/// exception-raised for handler failures; they receive this.
#[derive(Debug, Clone, Serialize)]
pub struct TransitionResult {
    /// Whether the transition fired and the step succeeded.
    pub success: bool,
    /// The dialog's state label after the transition.
    pub state: String,
    /// Human-readable outcome.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Whether the dialog suspended awaiting input.
    pub waiting_for_input: bool,
    /// The variables the dialog is waiting on, when suspended.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub required_variables: Vec<String>,
}

impl TransitionResult {
    /// A fired transition with a successful step.
    pub fn success(state: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: true,
            state: state.into(),
            message: Some(message.into()),
            waiting_for_input: false,
            required_variables: Vec::new(),
        }
    }

    /// A failed transition.
    pub fn failure(state: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            state: state.into(),
            message: Some(message.into()),
            waiting_for_input: false,
            required_variables: Vec::new(),
        }
    }

    /// A suspension awaiting the named variables.
    pub fn waiting(state: impl Into<String>, required_variables: Vec<String>) -> Self {
        Self {
            success: false,
            state: state.into(),
            message: Some(format!("waiting for input: {required_variables:?}")),
            waiting_for_input: true,
            required_variables,
        }
    }

    /// The advance found no step left to run.
    pub fn no_more_steps(state: impl Into<String>) -> Self {
        Self {
            success: false,
            state: state.into(),
            message: Some("no more steps to execute".to_string()),
            waiting_for_input: false,
            required_variables: Vec::new(),
        }
    }

    /// Whether this is the "no more steps" outcome.
    pub fn is_no_more_steps(&self) -> bool {
        self.message.as_deref() == Some("no more steps to execute")
    }
}

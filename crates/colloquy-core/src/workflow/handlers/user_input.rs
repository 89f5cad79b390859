//! Handler for user_input steps: consume the human-supplied variable,
//! append it as a user message, and optionally request a follow-on
//! completion.

use std::sync::Arc;

use serde_json::{json, Value};

use super::StepHandler;
use crate::broadcast::Broadcaster;
use crate::dialog::{Dialog, MessageStatus};
use crate::llm::CompletionService;
use crate::template::{MessageRole, Step};
use crate::workflow::step_result::{Readiness, StepResult};
use crate::workflow::WorkflowError;

/// Consumes `variables.user_input` once a human has provided it.
pub struct UserInputStepHandler {
    completion: Arc<dyn CompletionService>,
    broadcaster: Arc<Broadcaster>,
}

impl UserInputStepHandler {
    /// Create the handler.
    pub fn new(completion: Arc<dyn CompletionService>, broadcaster: Arc<Broadcaster>) -> Self {
        Self {
            completion,
            broadcaster,
        }
    }
}

#[async_trait::async_trait]
impl StepHandler for UserInputStepHandler {
    async fn can_handle(&self, dialog: &Dialog, step: &Step) -> Result<Readiness, WorkflowError> {
        let Step::UserInput(_) = step else {
            return Err(WorkflowError::WrongStepType {
                expected: "user_input",
                actual: step.kind(),
            });
        };

        // The absent variable is the suspension sentinel; the engine
        // does not record it in missing_variables.
        if dialog.workflow_data.variables.contains_key("user_input") {
            Ok(Readiness::Ready)
        } else {
            Ok(Readiness::Missing(vec!["user_input".to_string()]))
        }
    }

    async fn handle(&self, dialog: &mut Dialog, step: &Step) -> Result<StepResult, WorkflowError> {
        let Step::UserInput(input_step) = step else {
            return Err(WorkflowError::WrongStepType {
                expected: "user_input",
                actual: step.kind(),
            });
        };

        let raw = dialog
            .workflow_data
            .variables
            .remove("user_input")
            .unwrap_or(Value::String(String::new()));

        let text = match raw {
            Value::String(s) => s,
            other => other.to_string(),
        };
        // The popped value stays available to later steps through the
        // scratch copy; a later user_input step still suspends because
        // it checks the variable, not the scratch.
        dialog.workflow_data.user_input = Some(text.clone());

        let message_id =
            dialog.append_message(MessageRole::User, text.clone(), None, MessageStatus::Created);

        tracing::debug!(
            dialog_id = %dialog.id,
            step = %input_step.name,
            chars = text.len(),
            "recorded user input",
        );

        let mut result = StepResult::new()
            .with_data("message_id", json!(message_id))
            .with_data("user_input", json!(text));

        // A follow-on model call is configured by a `model` key in
        // config_extra.
        if input_step.config_extra.contains_key("model") {
            let model = input_step
                .config_extra
                .get("model")
                .and_then(Value::as_str)
                .map(String::from)
                .unwrap_or_else(|| dialog.template.model.clone());

            let response_id =
                dialog.append_message(MessageRole::Assistant, "", Some(model), MessageStatus::Pending);

            let broadcaster = Arc::clone(&self.broadcaster);
            let on_update = move |message: &crate::dialog::Message| {
                broadcaster.message_update(message);
            };
            self.completion.complete(dialog, Some(&on_update)).await?;

            result = result.with_data("response_message_id", json!(response_id));
        }

        Ok(result)
    }
}

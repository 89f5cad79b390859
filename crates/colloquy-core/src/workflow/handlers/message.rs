//! Handler for message steps: append a fixed-role message to the
//! dialog.

use std::sync::Arc;

use serde_json::json;

use super::{resolve_content, StepHandler};
use crate::dialog::{Dialog, MessageStatus};
use crate::registry::Registry;
use crate::template::Step;
use crate::workflow::step_result::{Readiness, StepResult};
use crate::workflow::WorkflowError;

/// Appends a message with the step's role and resolved content.
pub struct MessageStepHandler {
    registry: Arc<Registry>,
}

impl MessageStepHandler {
    /// Create the handler.
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }
}

#[async_trait::async_trait]
impl StepHandler for MessageStepHandler {
    async fn can_handle(&self, _dialog: &Dialog, _step: &Step) -> Result<Readiness, WorkflowError> {
        Ok(Readiness::Ready)
    }

    async fn handle(&self, dialog: &mut Dialog, step: &Step) -> Result<StepResult, WorkflowError> {
        let Step::Message(message_step) = step else {
            return Err(WorkflowError::WrongStepType {
                expected: "message",
                actual: step.kind(),
            });
        };

        let content = resolve_content(
            &self.registry,
            dialog,
            step,
            message_step.content.as_deref(),
        )?;

        let message_id = dialog.append_message(
            message_step.role,
            content.clone(),
            None,
            MessageStatus::Created,
        );

        tracing::debug!(
            dialog_id = %dialog.id,
            step = %message_step.name,
            role = message_step.role.as_str(),
            "appended message",
        );

        Ok(StepResult::new()
            .with_data("message_id", json!(message_id))
            .with_data("content", json!(content)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Prompt, RegistryBuilder};
    use crate::template::{DialogTemplate, MessageRole};

    fn registry_with_greet() -> Arc<Registry> {
        let mut builder = RegistryBuilder::new();
        builder.add_prompt(Prompt::new("core/greet", "Hello {{ name }}!").expect("prompt"));
        Arc::new(builder.build())
    }

    fn dialog_from(yaml: &str) -> Dialog {
        let template: DialogTemplate = serde_yaml::from_str(yaml).expect("template");
        Dialog::from_template(&template, None, None, None)
    }

    #[tokio::test]
    async fn literal_content_is_used_verbatim() {
        let handler = MessageStepHandler::new(registry_with_greet());
        let mut dialog = dialog_from(
            "name: t\nmodel: m\nsteps:\n  - name: sys\n    type: message\n    role: system\n    content: hi there\n",
        );
        let step = dialog.template.steps[0].clone();

        let result = handler.handle(&mut dialog, &step).await.expect("handle");

        assert_eq!(dialog.messages.len(), 1);
        assert_eq!(dialog.messages[0].text, "hi there");
        assert_eq!(dialog.messages[0].role, MessageRole::System);
        assert_eq!(dialog.messages[0].status, MessageStatus::Created);
        assert_eq!(result.data["content"], "hi there");
    }

    #[tokio::test]
    async fn template_content_renders_with_variables() {
        let handler = MessageStepHandler::new(registry_with_greet());
        let mut dialog = dialog_from(
            "name: t\nmodel: m\nsteps:\n  - name: greet\n    type: message\n    role: user\n    template: core/greet\n",
        );
        dialog
            .workflow_data
            .variables
            .insert("name".into(), serde_json::json!("Ada"));
        let step = dialog.template.steps[0].clone();

        handler.handle(&mut dialog, &step).await.expect("handle");
        assert_eq!(dialog.messages[0].text, "Hello Ada!");
    }

    #[tokio::test]
    async fn missing_prompt_is_an_error() {
        let handler = MessageStepHandler::new(Arc::new(RegistryBuilder::new().build()));
        let mut dialog = dialog_from(
            "name: t\nmodel: m\nsteps:\n  - name: greet\n    type: message\n    role: user\n    template: core/greet\n",
        );
        let step = dialog.template.steps[0].clone();

        let err = handler.handle(&mut dialog, &step).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Registry(_)));
    }
}

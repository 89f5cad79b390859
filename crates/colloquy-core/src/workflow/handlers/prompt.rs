//! Handler for prompt steps: render the prompt, append the user turn
//! and an assistant stub, and drive the completion service.

use std::sync::Arc;

use serde_json::json;

use super::{merged_variables, resolve_content, StepHandler};
use crate::broadcast::Broadcaster;
use crate::dialog::{Dialog, MessageStatus};
use crate::llm::CompletionService;
use crate::registry::Registry;
use crate::template::{MessageRole, Step};
use crate::workflow::step_result::{Readiness, StepResult};
use crate::workflow::WorkflowError;

/// Renders a prompt and requests an LLM completion for it.
pub struct PromptStepHandler {
    registry: Arc<Registry>,
    completion: Arc<dyn CompletionService>,
    broadcaster: Arc<Broadcaster>,
}

impl PromptStepHandler {
    /// Create the handler.
    pub fn new(
        registry: Arc<Registry>,
        completion: Arc<dyn CompletionService>,
        broadcaster: Arc<Broadcaster>,
    ) -> Self {
        Self {
            registry,
            completion,
            broadcaster,
        }
    }
}

#[async_trait::async_trait]
impl StepHandler for PromptStepHandler {
    async fn can_handle(&self, dialog: &Dialog, step: &Step) -> Result<Readiness, WorkflowError> {
        let Step::Prompt(prompt_step) = step else {
            return Err(WorkflowError::WrongStepType {
                expected: "prompt",
                actual: step.kind(),
            });
        };

        // Literal content needs no variables.
        let Some(template) = &prompt_step.template else {
            return Ok(Readiness::Ready);
        };

        let prompt = self.registry.get_prompt(template)?;
        let template_args = prompt_step.template_args.clone().unwrap_or_default();
        let variables = merged_variables(dialog, step);

        // Declaration order, minus what template_args already pins.
        let missing: Vec<String> = prompt
            .arguments
            .iter()
            .filter(|arg| !template_args.contains_key(arg.as_str()))
            .filter(|arg| !variables.contains_key(arg.as_str()))
            .cloned()
            .collect();

        if missing.is_empty() {
            Ok(Readiness::Ready)
        } else {
            Ok(Readiness::Missing(missing))
        }
    }

    async fn handle(&self, dialog: &mut Dialog, step: &Step) -> Result<StepResult, WorkflowError> {
        let Step::Prompt(prompt_step) = step else {
            return Err(WorkflowError::WrongStepType {
                expected: "prompt",
                actual: step.kind(),
            });
        };

        let content = resolve_content(
            &self.registry,
            dialog,
            step,
            prompt_step.content.as_deref(),
        )?;

        let prompt_message_id =
            dialog.append_message(MessageRole::User, content, None, MessageStatus::Pending);

        let model = prompt_step
            .model
            .clone()
            .or_else(|| {
                prompt_step
                    .config_extra
                    .get("model")
                    .and_then(serde_json::Value::as_str)
                    .map(String::from)
            })
            .unwrap_or_else(|| dialog.template.model.clone());

        let response_message_id =
            dialog.append_message(MessageRole::Assistant, "", Some(model), MessageStatus::Pending);
        if !prompt_step.config_extra.is_empty() {
            if let Some(stub) = dialog.messages.last_mut() {
                stub.extra = Some(json!(prompt_step.config_extra));
            }
        }

        tracing::debug!(
            dialog_id = %dialog.id,
            step = %prompt_step.name,
            "requesting completion",
        );

        let broadcaster = Arc::clone(&self.broadcaster);
        let on_update = move |message: &crate::dialog::Message| {
            broadcaster.message_update(message);
        };
        self.completion
            .complete(dialog, Some(&on_update))
            .await?;

        Ok(StepResult::new()
            .with_data("prompt_message_id", json!(prompt_message_id))
            .with_data("response_message_id", json!(response_message_id))
            .with_data(
                "result",
                json!(dialog
                    .messages
                    .iter()
                    .find(|m| m.id == response_message_id)
                    .map(|m| m.text.clone())),
            ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::fake::FakeCompletionService;
    use crate::registry::{Prompt, RegistryBuilder};
    use crate::template::DialogTemplate;

    fn handler_with(responses: Vec<String>) -> PromptStepHandler {
        let mut builder = RegistryBuilder::new();
        builder.add_prompt(
            Prompt::new("core/greet", "Hello {{ name }} from {{ place }}!").expect("prompt"),
        );
        PromptStepHandler::new(
            Arc::new(builder.build()),
            Arc::new(FakeCompletionService::new(responses)),
            Arc::new(Broadcaster::new()),
        )
    }

    fn dialog() -> Dialog {
        let template: DialogTemplate = serde_yaml::from_str(
            "name: t\nmodel: default-model\nsteps:\n  - name: ask\n    type: prompt\n    template: core/greet\n",
        )
        .expect("template");
        Dialog::from_template(&template, None, None, None)
    }

    #[tokio::test]
    async fn missing_arguments_suspend_in_declaration_order() {
        let handler = handler_with(Vec::new());
        let dialog = dialog();
        let step = dialog.template.steps[0].clone();

        let readiness = handler.can_handle(&dialog, &step).await.expect("gate");
        assert_eq!(
            readiness,
            Readiness::Missing(vec!["name".to_string(), "place".to_string()])
        );
    }

    #[tokio::test]
    async fn template_args_reduce_required_arguments() {
        let handler = handler_with(Vec::new());
        let mut dialog = dialog();
        if let Step::Prompt(p) = &mut dialog.template.steps[0] {
            p.template_args = Some(
                [("place".to_string(), serde_json::json!("Earth"))]
                    .into_iter()
                    .collect(),
            );
        }
        let step = dialog.template.steps[0].clone();

        let readiness = handler.can_handle(&dialog, &step).await.expect("gate");
        assert_eq!(readiness, Readiness::Missing(vec!["name".to_string()]));
    }

    #[tokio::test]
    async fn handle_appends_user_turn_and_delivered_stub() {
        let handler = handler_with(vec!["the answer".to_string()]);
        let mut dialog = dialog();
        dialog
            .workflow_data
            .variables
            .insert("name".into(), serde_json::json!("Ada"));
        dialog
            .workflow_data
            .variables
            .insert("place".into(), serde_json::json!("Earth"));
        let step = dialog.template.steps[0].clone();

        let result = handler.handle(&mut dialog, &step).await.expect("handle");

        assert_eq!(dialog.messages.len(), 2);
        assert_eq!(dialog.messages[0].role, MessageRole::User);
        assert_eq!(dialog.messages[0].text, "Hello Ada from Earth!");
        assert_eq!(dialog.messages[0].status, MessageStatus::Pending);
        assert_eq!(dialog.messages[1].role, MessageRole::Assistant);
        assert_eq!(dialog.messages[1].text, "the answer");
        assert_eq!(dialog.messages[1].status, MessageStatus::Delivered);
        assert_eq!(dialog.messages[1].model.as_deref(), Some("default-model"));
        assert_eq!(result.data["result"], "the answer");
    }

    #[tokio::test]
    async fn literal_prompt_needs_no_variables() {
        let handler = handler_with(vec!["ok".to_string()]);
        let mut dialog = dialog();
        if let Step::Prompt(p) = &mut dialog.template.steps[0] {
            p.template = None;
            p.content = Some("just answer".to_string());
        }
        let step = dialog.template.steps[0].clone();

        let readiness = handler.can_handle(&dialog, &step).await.expect("gate");
        assert_eq!(readiness, Readiness::Ready);

        handler.handle(&mut dialog, &step).await.expect("handle");
        assert_eq!(dialog.messages[0].text, "just answer");
    }
}

//! Step handlers: the four pluggable behaviors behind the engine.
//!
//! A handler answers two questions: can this step run now
//! ([`StepHandler::can_handle`], returning a typed [`Readiness`] so only
//! the engine mutates dialog status), and what happens when it runs
//! ([`StepHandler::handle`]). Failure is an error return; suspension is
//! `Readiness::Missing`.

pub mod invoke;
pub mod message;
pub mod prompt;
pub mod user_input;

use std::sync::Arc;

use serde_json::Value;

use crate::broadcast::Broadcaster;
use crate::dialog::Dialog;
use crate::llm::CompletionService;
use crate::registry::Registry;
use crate::template::Step;
use crate::workflow::step_result::{Readiness, StepResult};
use crate::workflow::WorkflowError;

/// Contract between the engine and a step behavior.
#[async_trait::async_trait]
pub trait StepHandler: Send + Sync {
    /// Gate checked before the transition fires. `Missing` suspends the
    /// dialog; an error fails the step.
    async fn can_handle(&self, dialog: &Dialog, step: &Step) -> Result<Readiness, WorkflowError>;

    /// Execute the step. Appended messages and variable mutations are
    /// committed by the engine's save after the transition.
    async fn handle(&self, dialog: &mut Dialog, step: &Step) -> Result<StepResult, WorkflowError>;
}

/// The handler for each step variant.
pub struct HandlerSet {
    message: Arc<dyn StepHandler>,
    prompt: Arc<dyn StepHandler>,
    user_input: Arc<dyn StepHandler>,
    invoke: Arc<dyn StepHandler>,
}

impl HandlerSet {
    /// Wire the four built-in handlers.
    pub fn new(
        registry: Arc<Registry>,
        completion: Arc<dyn CompletionService>,
        broadcaster: Arc<Broadcaster>,
    ) -> Self {
        Self {
            message: Arc::new(message::MessageStepHandler::new(Arc::clone(&registry))),
            prompt: Arc::new(prompt::PromptStepHandler::new(
                Arc::clone(&registry),
                Arc::clone(&completion),
                Arc::clone(&broadcaster),
            )),
            user_input: Arc::new(user_input::UserInputStepHandler::new(
                completion,
                broadcaster,
            )),
            invoke: Arc::new(invoke::InvokeStepHandler::new(registry)),
        }
    }

    /// Resolve the handler for a step by its variant.
    pub fn for_step(&self, step: &Step) -> &Arc<dyn StepHandler> {
        match step {
            Step::Message(_) => &self.message,
            Step::Prompt(_) => &self.prompt,
            Step::UserInput(_) => &self.user_input,
            Step::Invoke(_) => &self.invoke,
        }
    }
}

/// Variable precedence used by every handler: start from
/// `workflow_data.variables`, overlay the step's `template_args`.
/// `template_args` wins.
///
/// A consumed `user_input` (popped by its step, kept in the scratch
/// copy) stays visible to later steps at the lowest precedence.
pub fn merged_variables(dialog: &Dialog, step: &Step) -> serde_json::Map<String, Value> {
    let mut variables = dialog.workflow_data.variables.clone();
    if !variables.contains_key("user_input") {
        if let Some(scratch) = &dialog.workflow_data.user_input {
            variables.insert("user_input".to_string(), Value::String(scratch.clone()));
        }
    }
    if let Some(args) = step.template_args() {
        for (key, value) in args {
            variables.insert(key.clone(), value.clone());
        }
    }
    variables
}

/// Resolve a step's text: literal `content` verbatim, otherwise the
/// referenced prompt rendered with the precedence-merged variables.
pub fn resolve_content(
    registry: &Registry,
    dialog: &Dialog,
    step: &Step,
    content: Option<&str>,
) -> Result<String, WorkflowError> {
    if let Some(content) = content {
        return Ok(content.to_string());
    }
    if let Some(template) = step.template_ref() {
        let prompt = registry.get_prompt(template)?;
        let args = merged_variables(dialog, step);
        return Ok(prompt.render(&args)?);
    }
    Ok(String::new())
}

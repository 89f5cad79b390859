//! Workflow facade: dialog creation, the run-to-suspension loop, user
//! input resume, and the job entry points.

use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use crate::broadcast::Broadcaster;
use crate::dialog::{Dialog, DialogStatus};
use crate::llm::CompletionService;
use crate::registry::Registry;
use crate::storage::store::DialogStore;
use crate::template::DialogTemplate;
use crate::workflow::engine::WorkflowEngine;
use crate::workflow::handlers::HandlerSet;
use crate::workflow::step_result::TransitionResult;
use crate::workflow::WorkflowError;

/// Input supplied to a waiting dialog: a raw string for user_input
/// steps, or a variable map for prompt-variable suspensions.
#[derive(Debug, Clone)]
pub enum UserInput {
    /// Raw text.
    Text(String),
    /// Named variable values.
    Variables(serde_json::Map<String, Value>),
}

/// Service facade over the engine, store, and broadcast bus.
pub struct WorkflowService {
    engine: WorkflowEngine,
    store: Arc<DialogStore>,
    registry: Arc<Registry>,
    completion: Arc<dyn CompletionService>,
    broadcaster: Arc<Broadcaster>,
}

impl WorkflowService {
    /// Wire the service from its collaborators.
    pub fn new(
        store: Arc<DialogStore>,
        registry: Arc<Registry>,
        completion: Arc<dyn CompletionService>,
        broadcaster: Arc<Broadcaster>,
    ) -> Self {
        let handlers = HandlerSet::new(
            Arc::clone(&registry),
            Arc::clone(&completion),
            Arc::clone(&broadcaster),
        );
        let engine = WorkflowEngine::new(Arc::clone(&store), handlers);
        Self {
            engine,
            store,
            registry,
            completion,
            broadcaster,
        }
    }

    /// The registry this service resolves templates against.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// The underlying engine, for single-step advances.
    pub fn engine(&self) -> &WorkflowEngine {
        &self.engine
    }

    /// Create a dialog from a template: new id, embedded template
    /// snapshot, `initial_data` seeded into variables, status `pending`,
    /// state `start`; persisted before return.
    pub async fn create_dialog_from_template(
        &self,
        template: &DialogTemplate,
        description: Option<String>,
        goal: Option<String>,
        initial_data: Option<serde_json::Map<String, Value>>,
    ) -> Result<Dialog, WorkflowError> {
        template
            .validate()
            .map_err(|errors| WorkflowError::InvalidTemplate {
                message: errors
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; "),
            })?;

        let mut dialog = Dialog::from_template(template, description, goal, initial_data);
        self.store.create_dialog(&mut dialog).await?;
        Ok(dialog)
    }

    /// Load a dialog by id.
    pub async fn get_dialog(&self, id: Uuid) -> Result<Option<Dialog>, WorkflowError> {
        Ok(self.store.load_dialog(id).await?)
    }

    /// Run the dialog until completion, failure, or suspension.
    ///
    /// Each iteration broadcasts the dialog, advances one step,
    /// broadcasts every message the step appended (in append order),
    /// then broadcasts the dialog again.
    pub async fn run_workflow(
        &self,
        dialog: &mut Dialog,
    ) -> Result<TransitionResult, WorkflowError> {
        loop {
            if dialog.status == DialogStatus::Pending {
                dialog.status = DialogStatus::Running;
            }
            self.broadcaster.dialog_update(dialog);

            let seen = dialog.messages.len();
            let result = self.engine.execute_next_step(dialog).await?;

            for message in &dialog.messages[seen..] {
                self.broadcaster.message_update(message);
            }
            self.broadcaster.dialog_update(dialog);

            if !result.success || dialog.status == DialogStatus::WaitingForInput {
                return Ok(result);
            }
        }
    }

    /// Load and run a dialog; entry point for the
    /// `dialog_run_workflow` job.
    pub async fn run_workflow_by_id(
        &self,
        dialog_id: Uuid,
    ) -> Result<TransitionResult, WorkflowError> {
        let Some(mut dialog) = self.store.load_dialog(dialog_id).await? else {
            return Ok(TransitionResult::failure(
                "unknown",
                format!("dialog {dialog_id} not found"),
            ));
        };
        self.run_workflow(&mut dialog).await
    }

    /// Provide input to a waiting dialog, then advance one step.
    ///
    /// A suspension with recorded `missing_variables` takes a variable
    /// map merged into `workflow_data.variables`; a user_input-step
    /// suspension stores the raw input under `variables.user_input`.
    pub async fn provide_user_input(
        &self,
        dialog_id: Uuid,
        input: UserInput,
    ) -> Result<TransitionResult, WorkflowError> {
        let Some(mut dialog) = self.store.load_dialog(dialog_id).await? else {
            return Ok(TransitionResult::failure(
                "unknown",
                format!("dialog {dialog_id} not found"),
            ));
        };

        if dialog.status != DialogStatus::WaitingForInput {
            return Ok(TransitionResult::failure(
                dialog.current_state.clone(),
                "dialog is not waiting for input",
            ));
        }

        if dialog.workflow_data.missing_variables.is_empty() {
            // user_input step: store the raw input.
            let value = match input {
                UserInput::Text(text) => {
                    dialog.workflow_data.user_input = Some(text.clone());
                    Value::String(text)
                }
                UserInput::Variables(map) => Value::Object(map),
            };
            dialog
                .workflow_data
                .variables
                .insert("user_input".to_string(), value);
        } else {
            // Prompt-variable suspension: merge the map.
            let UserInput::Variables(map) = input else {
                return Ok(TransitionResult::failure(
                    dialog.current_state.clone(),
                    "expected a variable map for missing prompt variables",
                ));
            };
            for (key, value) in map {
                dialog.workflow_data.variables.insert(key, value);
            }
            dialog.workflow_data.missing_variables.clear();
        }

        self.store.save_dialog(&mut dialog).await?;
        let result = self.engine.execute_next_step(&mut dialog).await?;
        self.broadcaster.dialog_update(&dialog);
        Ok(result)
    }

    /// Complete the dialog's pending assistant message; entry point for
    /// the `process_message` job.
    pub async fn process_message(&self, dialog_id: Uuid) -> Result<(), WorkflowError> {
        let Some(mut dialog) = self.store.load_dialog(dialog_id).await? else {
            return Err(WorkflowError::DialogNotFound { id: dialog_id });
        };

        let broadcaster = Arc::clone(&self.broadcaster);
        let on_update = move |message: &crate::dialog::Message| {
            broadcaster.message_update(message);
        };

        let outcome = self.completion.complete(&mut dialog, Some(&on_update)).await;
        // Persist the stub regardless of outcome: delivered text or the
        // failed status both need to survive.
        self.store.save_dialog(&mut dialog).await?;
        self.broadcaster.dialog_update(&dialog);
        outcome?;
        Ok(())
    }
}

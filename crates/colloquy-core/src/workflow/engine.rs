//! The workflow engine: transition-plan construction and the guarded
//! advance algorithm.
//!
//! The state machine is a plain loop over planned transitions rather
//! than a state-machine library: states are `start`, `step_0 ..
//! step_{N-1}` (indices over enabled steps only), and `end`; trigger
//! `run_step_i` moves `step_{i-1}` (or `start`) to `step_i`, guarded by
//! the handler's readiness check; `finalize` moves the last step state
//! to `end`. The dialog's `current_state` mirrors the machine state
//! after every change, and every advance path saves the dialog.

use std::sync::Arc;

use serde_json::json;

use crate::dialog::{Dialog, DialogStatus};
use crate::storage::store::DialogStore;
use crate::template::{DialogTemplate, ErrorHandling, ErrorStrategy, Step};
use crate::workflow::handlers::HandlerSet;
use crate::workflow::step_result::{Readiness, StepResult, TransitionResult};
use crate::workflow::WorkflowError;

/// One planned transition of a dialog's state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedTransition {
    /// Trigger name (`run_step_i` or `finalize`).
    pub trigger: String,
    /// Source state label.
    pub source: String,
    /// Destination state label.
    pub dest: String,
}

/// The full state/transition plan derived from a template.
#[derive(Debug, Clone)]
pub struct TransitionPlan {
    /// State labels in order: `start`, `step_i ...`, `end`.
    pub states: Vec<String>,
    /// Planned transitions in firing order.
    pub transitions: Vec<PlannedTransition>,
}

impl TransitionPlan {
    /// Build the plan for a template. Indices are assigned over enabled
    /// steps only, in declaration order.
    pub fn for_template(template: &DialogTemplate) -> Self {
        let enabled = template.enabled_steps();
        let mut states = vec!["start".to_string()];
        let mut transitions = Vec::new();

        for i in 0..enabled.len() {
            let state = format!("step_{i}");
            let source = if i == 0 {
                "start".to_string()
            } else {
                format!("step_{}", i - 1)
            };
            transitions.push(PlannedTransition {
                trigger: format!("run_step_{i}"),
                source,
                dest: state.clone(),
            });
            states.push(state);
        }

        let last = states
            .last()
            .cloned()
            .unwrap_or_else(|| "start".to_string());
        transitions.push(PlannedTransition {
            trigger: "finalize".to_string(),
            source: last,
            dest: "end".to_string(),
        });
        states.push("end".to_string());

        Self {
            states,
            transitions,
        }
    }

    /// The transition fired by `trigger`, if planned.
    pub fn transition_for(&self, trigger: &str) -> Option<&PlannedTransition> {
        self.transitions.iter().find(|t| t.trigger == trigger)
    }
}

/// State-machine runtime advancing dialogs through their steps.
pub struct WorkflowEngine {
    store: Arc<DialogStore>,
    handlers: HandlerSet,
}

impl WorkflowEngine {
    /// Create an engine over a store and handler set.
    pub fn new(store: Arc<DialogStore>, handlers: HandlerSet) -> Self {
        Self { store, handlers }
    }

    /// The store this engine persists through.
    pub fn store(&self) -> &Arc<DialogStore> {
        &self.store
    }

    /// Execute the next enabled step of the dialog.
    ///
    /// Persists the dialog on every path. Handler failures become
    /// failure results, not errors; only persistence failures are
    /// returned as `Err`.
    pub async fn execute_next_step(
        &self,
        dialog: &mut Dialog,
    ) -> Result<TransitionResult, WorkflowError> {
        let Some(step) = dialog.current_step().cloned() else {
            return self.finalize(dialog).await;
        };

        let index = dialog.workflow_data.current_step_index;
        let plan = TransitionPlan::for_template(&dialog.template);
        let trigger = format!("run_step_{index}");

        // Defensive: the trigger must exist and be valid from the
        // dialog's current state, otherwise report without mutating.
        let valid_source = plan
            .transition_for(&trigger)
            .is_some_and(|t| t.source == dialog.current_state);
        if !valid_source {
            tracing::warn!(
                dialog_id = %dialog.id,
                trigger = %trigger,
                state = %dialog.current_state,
                "trigger not found for current state",
            );
            self.store.save_dialog(dialog).await?;
            return Ok(TransitionResult::failure(
                dialog.current_state.clone(),
                format!("trigger {trigger} not found"),
            ));
        }

        // Guard: ask the handler whether the step can run now.
        let handler = Arc::clone(self.handlers.for_step(&step));
        match handler.can_handle(dialog, &step).await {
            Ok(Readiness::Ready) => {}
            Ok(Readiness::Missing(names)) => {
                dialog.status = DialogStatus::WaitingForInput;
                // For prompt steps the names are recorded on the dialog;
                // a user_input step's sentinel is the absent variable
                // itself, which is how the resume path tells the two
                // apart.
                if !matches!(step, Step::UserInput(_)) {
                    dialog.workflow_data.missing_variables = names.clone();
                }
                tracing::info!(
                    dialog_id = %dialog.id,
                    step = %step.name(),
                    missing = ?names,
                    "dialog suspended awaiting input",
                );
                self.store.save_dialog(dialog).await?;
                return Ok(TransitionResult::waiting(
                    dialog.current_state.clone(),
                    names,
                ));
            }
            Err(e) => {
                return self.fail_step(dialog, &e.to_string()).await;
            }
        }

        dialog.status = DialogStatus::Running;
        self.run_with_policy(dialog, &step, index).await
    }

    /// No step left: transition to `end` and mark completed (idempotent
    /// when already terminal).
    async fn finalize(&self, dialog: &mut Dialog) -> Result<TransitionResult, WorkflowError> {
        if !dialog.is_terminal() {
            dialog.current_state = "end".to_string();
            dialog.status = DialogStatus::Completed;
            tracing::info!(dialog_id = %dialog.id, "workflow completed");
        }
        self.store.save_dialog(dialog).await?;
        Ok(TransitionResult::no_more_steps(dialog.current_state.clone()))
    }

    /// Run the step's handler under its error-handling policy.
    async fn run_with_policy(
        &self,
        dialog: &mut Dialog,
        step: &Step,
        index: usize,
    ) -> Result<TransitionResult, WorkflowError> {
        let policy: ErrorHandling = step
            .error_handling()
            .or(dialog.template.error_handling.as_ref())
            .cloned()
            .unwrap_or_default();

        let max_retries = match policy.strategy {
            ErrorStrategy::Retry => policy.max_retries.unwrap_or(1),
            _ => 0,
        };

        let handler = Arc::clone(self.handlers.for_step(step));
        let mut attempt = 0;
        loop {
            match handler.handle(dialog, step).await {
                Ok(result) => {
                    return self.commit_step(dialog, step, index, result).await;
                }
                Err(e) if attempt < max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        dialog_id = %dialog.id,
                        step = %step.name(),
                        attempt,
                        error = %e,
                        "step failed, retrying",
                    );
                    dialog
                        .workflow_data
                        .errors
                        .push(format!("{} (attempt {attempt}): {e}", step.name()));
                }
                Err(e) => {
                    return self.apply_failure_policy(dialog, step, index, &policy, &e).await;
                }
            }
        }
    }

    /// Success: record the result, advance the cursor, mirror the state
    /// label, save.
    async fn commit_step(
        &self,
        dialog: &mut Dialog,
        step: &Step,
        index: usize,
        result: StepResult,
    ) -> Result<TransitionResult, WorkflowError> {
        dialog.workflow_data.current_step_index = index + 1;

        let mut record = serde_json::Map::new();
        record.insert("completed".to_string(), json!(true));
        for (key, value) in result.data {
            record.insert(key, value);
        }
        dialog
            .workflow_data
            .step_results
            .insert(step.name().to_string(), serde_json::Value::Object(record));

        dialog.current_state = format!("step_{index}");
        self.store.save_dialog(dialog).await?;

        tracing::debug!(
            dialog_id = %dialog.id,
            step = %step.name(),
            state = %dialog.current_state,
            "step executed",
        );

        Ok(TransitionResult::success(
            dialog.current_state.clone(),
            "step executed successfully",
        ))
    }

    /// Exhausted failure: apply continue/fallback/fail.
    async fn apply_failure_policy(
        &self,
        dialog: &mut Dialog,
        step: &Step,
        index: usize,
        policy: &ErrorHandling,
        error: &WorkflowError,
    ) -> Result<TransitionResult, WorkflowError> {
        let message = format!("{}: {error}", step.name());
        dialog.workflow_data.errors.push(message.clone());

        match policy.strategy {
            ErrorStrategy::Continue => {
                dialog.workflow_data.current_step_index = index + 1;
                dialog.workflow_data.step_results.insert(
                    step.name().to_string(),
                    json!({"completed": false, "error": error.to_string()}),
                );
                dialog.current_state = format!("step_{index}");
                self.store.save_dialog(dialog).await?;
                tracing::warn!(
                    dialog_id = %dialog.id,
                    step = %step.name(),
                    error = %error,
                    "step failed, continuing per policy",
                );
                Ok(TransitionResult::success(
                    dialog.current_state.clone(),
                    format!("continued past failed step {}", step.name()),
                ))
            }
            ErrorStrategy::Fallback => {
                let Some(target) = policy
                    .fallback_step
                    .as_deref()
                    .and_then(|name| fallback_index(&dialog.template, name))
                else {
                    // Validation rejects dangling references at load; a
                    // disabled fallback target still lands here.
                    return self.fail_step(dialog, &message).await;
                };

                dialog.workflow_data.current_step_index = target;
                dialog.current_state = if target == 0 {
                    "start".to_string()
                } else {
                    format!("step_{}", target - 1)
                };
                self.store.save_dialog(dialog).await?;
                tracing::warn!(
                    dialog_id = %dialog.id,
                    step = %step.name(),
                    fallback_index = target,
                    "step failed, jumping to fallback step",
                );
                Ok(TransitionResult::success(
                    dialog.current_state.clone(),
                    format!("fell back after failed step {}", step.name()),
                ))
            }
            ErrorStrategy::Fail | ErrorStrategy::Retry => self.fail_step(dialog, &message).await,
        }
    }

    /// Terminal failure: record the error, mark failed, save.
    async fn fail_step(
        &self,
        dialog: &mut Dialog,
        message: &str,
    ) -> Result<TransitionResult, WorkflowError> {
        if dialog.workflow_data.errors.last().map(String::as_str) != Some(message) {
            dialog.workflow_data.errors.push(message.to_string());
        }
        dialog.status = DialogStatus::Failed;
        dialog.error = Some(message.to_string());
        self.store.save_dialog(dialog).await?;

        tracing::error!(dialog_id = %dialog.id, error = %message, "step failed");

        Ok(TransitionResult::failure(
            dialog.current_state.clone(),
            message,
        ))
    }
}

/// Enabled-step index of a named fallback step.
fn fallback_index(template: &DialogTemplate, name: &str) -> Option<usize> {
    template
        .enabled_steps()
        .iter()
        .position(|s| s.name() == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(yaml_steps: &str) -> DialogTemplate {
        serde_yaml::from_str(&format!("name: t\nmodel: m\nsteps:\n{yaml_steps}"))
            .expect("template")
    }

    #[test]
    fn plan_covers_enabled_steps_only() {
        let template = template(
            "  - name: a\n    type: message\n    role: user\n    content: a\n\
               - name: off\n    type: message\n    role: user\n    content: x\n    enabled: false\n\
               - name: b\n    type: message\n    role: user\n    content: b\n",
        );
        let plan = TransitionPlan::for_template(&template);

        assert_eq!(plan.states, vec!["start", "step_0", "step_1", "end"]);
        assert_eq!(plan.transitions.len(), 3);
        assert_eq!(plan.transitions[0].trigger, "run_step_0");
        assert_eq!(plan.transitions[0].source, "start");
        assert_eq!(plan.transitions[1].source, "step_0");
        assert_eq!(plan.transitions[2].trigger, "finalize");
        assert_eq!(plan.transitions[2].source, "step_1");
        assert_eq!(plan.transitions[2].dest, "end");
    }

    #[test]
    fn plan_for_empty_template_goes_straight_to_end() {
        let template = template("  []\n");
        let plan = TransitionPlan::for_template(&template);

        assert_eq!(plan.states, vec!["start", "end"]);
        assert_eq!(plan.transitions.len(), 1);
        assert_eq!(plan.transitions[0].trigger, "finalize");
        assert_eq!(plan.transitions[0].source, "start");
    }

    #[test]
    fn transition_lookup_by_trigger() {
        let template = template("  - name: a\n    type: message\n    role: user\n    content: a\n");
        let plan = TransitionPlan::for_template(&template);

        assert!(plan.transition_for("run_step_0").is_some());
        assert!(plan.transition_for("run_step_1").is_none());
    }
}

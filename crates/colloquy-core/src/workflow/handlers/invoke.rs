//! Handler for invoke steps: resolve the callable from the registry and
//! call it with the precedence-merged argument map.

use std::sync::Arc;

use serde_json::json;

use super::{merged_variables, StepHandler};
use crate::dialog::Dialog;
use crate::registry::Registry;
use crate::template::Step;
use crate::workflow::step_result::{Readiness, StepResult};
use crate::workflow::WorkflowError;

/// Invokes a registered callable by dotted name.
pub struct InvokeStepHandler {
    registry: Arc<Registry>,
}

impl InvokeStepHandler {
    /// Create the handler.
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }
}

#[async_trait::async_trait]
impl StepHandler for InvokeStepHandler {
    async fn can_handle(&self, _dialog: &Dialog, step: &Step) -> Result<Readiness, WorkflowError> {
        // Argument validation is deferred to handle.
        match step {
            Step::Invoke(_) => Ok(Readiness::Ready),
            other => Err(WorkflowError::WrongStepType {
                expected: "invoke",
                actual: other.kind(),
            }),
        }
    }

    async fn handle(&self, dialog: &mut Dialog, step: &Step) -> Result<StepResult, WorkflowError> {
        let Step::Invoke(invoke_step) = step else {
            return Err(WorkflowError::WrongStepType {
                expected: "invoke",
                actual: step.kind(),
            });
        };

        let invokable = self.registry.get_invokable(&invoke_step.callable)?;
        let args = merged_variables(dialog, step);

        tracing::debug!(
            dialog_id = %dialog.id,
            step = %invoke_step.name,
            callable = %invoke_step.callable,
            "invoking callable",
        );

        let value = invokable.call(args, dialog).await?;

        Ok(StepResult::new().with_data("result", json!(value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{InvokeError, Invokable, RegistryBuilder};
    use crate::template::DialogTemplate;

    #[derive(Debug)]
    struct Doubler;

    #[async_trait::async_trait]
    impl Invokable for Doubler {
        async fn call(
            &self,
            args: serde_json::Map<String, serde_json::Value>,
            _dialog: &Dialog,
        ) -> Result<serde_json::Value, InvokeError> {
            let n = args
                .get("n")
                .and_then(serde_json::Value::as_i64)
                .ok_or_else(|| InvokeError::new("missing argument 'n'"))?;
            Ok(json!(n * 2))
        }
    }

    fn dialog(callable: &str) -> Dialog {
        let template: DialogTemplate = serde_yaml::from_str(&format!(
            "name: t\nmodel: m\nsteps:\n  - name: calc\n    type: invoke\n    callable: {callable}\n"
        ))
        .expect("template");
        Dialog::from_template(&template, None, None, None)
    }

    fn registry() -> Arc<Registry> {
        let mut builder = RegistryBuilder::new();
        builder.add_invokable("math.double", Arc::new(Doubler));
        Arc::new(builder.build())
    }

    #[tokio::test]
    async fn invokes_with_merged_variables() {
        let handler = InvokeStepHandler::new(registry());
        let mut dialog = dialog("math.double");
        dialog.workflow_data.variables.insert("n".into(), json!(21));
        let step = dialog.template.steps[0].clone();

        let result = handler.handle(&mut dialog, &step).await.expect("handle");
        assert_eq!(result.data["result"], 42);
    }

    #[tokio::test]
    async fn unknown_callable_is_an_error() {
        let handler = InvokeStepHandler::new(registry());
        let mut dialog = dialog("math.missing");
        let step = dialog.template.steps[0].clone();

        let err = handler.handle(&mut dialog, &step).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Registry(_)));
    }

    #[tokio::test]
    async fn callable_failure_propagates_as_error() {
        let handler = InvokeStepHandler::new(registry());
        let mut dialog = dialog("math.double");
        // No 'n' variable: the callable rejects its arguments.
        let step = dialog.template.steps[0].clone();

        let err = handler.handle(&mut dialog, &step).await.unwrap_err();
        assert!(err.to_string().contains("missing argument 'n'"));
    }
}

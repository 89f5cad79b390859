//! Static pre-flight analysis of a template's variable flow.
//!
//! Walks steps in order collecting what each requires (prompt arguments,
//! `template_args`) and what each provides (`result` for prompt/invoke
//! steps, `user_input` for user_input steps). An input is missing when
//! it is required and no earlier step provides it; the report backs a
//! pre-run form.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::registry::Registry;
use crate::template::{DialogTemplate, Step};

/// One required input of a step.
#[derive(Debug, Clone, Serialize)]
pub struct InputRequirement {
    /// What the input is for.
    pub description: String,
    /// Whether a value must be supplied before the step runs.
    pub required: bool,
}

/// One output a step provides to later steps.
#[derive(Debug, Clone, Serialize)]
pub struct OutputProvision {
    /// What the output carries.
    pub description: String,
    /// The providing step.
    pub source_step: String,
}

/// The full dependency report for a template.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DependencyReport {
    /// Step name -> its required inputs.
    pub required_inputs: BTreeMap<String, BTreeMap<String, InputRequirement>>,
    /// Step name -> its provided outputs.
    pub provided_outputs: BTreeMap<String, BTreeMap<String, OutputProvision>>,
    /// Step name -> inputs no earlier step provides.
    pub missing_inputs: BTreeMap<String, BTreeMap<String, InputRequirement>>,
}

/// Analyze a template's inputs and outputs.
pub fn analyze(registry: &Registry, template: &DialogTemplate) -> DependencyReport {
    let mut report = DependencyReport::default();
    let mut provided_so_far: Vec<String> = Vec::new();

    for step in &template.steps {
        let inputs = step_inputs(registry, step);
        if !inputs.is_empty() {
            let unsatisfied: BTreeMap<String, InputRequirement> = inputs
                .iter()
                .filter(|(name, req)| req.required && !provided_so_far.contains(name))
                .map(|(name, req)| (name.clone(), req.clone()))
                .collect();
            if !unsatisfied.is_empty() {
                report
                    .missing_inputs
                    .insert(step.name().to_string(), unsatisfied);
            }
            report.required_inputs.insert(step.name().to_string(), inputs);
        }

        let outputs = step_outputs(step);
        if !outputs.is_empty() {
            provided_so_far.extend(outputs.keys().cloned());
            report
                .provided_outputs
                .insert(step.name().to_string(), outputs);
        }
    }

    report
}

fn step_inputs(registry: &Registry, step: &Step) -> BTreeMap<String, InputRequirement> {
    let mut inputs = BTreeMap::new();

    match step {
        Step::Prompt(prompt_step) => {
            if let Some(template) = &prompt_step.template {
                if let Ok(prompt) = registry.get_prompt(template) {
                    for arg in &prompt.arguments {
                        inputs.insert(
                            arg.clone(),
                            InputRequirement {
                                description: format!("prompt argument: {arg}"),
                                required: true,
                            },
                        );
                    }
                }
            }
            if let Some(args) = &prompt_step.template_args {
                for name in args.keys() {
                    if let Some(requirement) = inputs.get_mut(name) {
                        requirement.description.push_str(" (superseded by template_args)");
                        requirement.required = false;
                    }
                }
            }
        }
        Step::Message(message_step) => {
            if let Some(args) = &message_step.template_args {
                for name in args.keys() {
                    inputs.insert(
                        name.clone(),
                        InputRequirement {
                            description: format!("message template argument: {name}"),
                            required: true,
                        },
                    );
                }
            }
        }
        // user_input steps provide rather than require; invoke argument
        // validation is deferred to the callable.
        Step::UserInput(_) | Step::Invoke(_) => {}
    }

    inputs
}

fn step_outputs(step: &Step) -> BTreeMap<String, OutputProvision> {
    let mut outputs = BTreeMap::new();

    match step {
        Step::Prompt(_) | Step::Invoke(_) => {
            outputs.insert(
                "result".to_string(),
                OutputProvision {
                    description: format!("output from step: {}", step.name()),
                    source_step: step.name().to_string(),
                },
            );
        }
        Step::UserInput(_) => {
            outputs.insert(
                "user_input".to_string(),
                OutputProvision {
                    description: format!("user-provided input from step: {}", step.name()),
                    source_step: step.name().to_string(),
                },
            );
        }
        Step::Message(_) => {}
    }

    outputs
}

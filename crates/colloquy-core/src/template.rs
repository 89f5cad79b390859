//! Dialog template types: the declarative recipe a dialog runs.
//!
//! A template is an ordered list of steps plus defaults. Templates are
//! loaded from YAML at startup, validated, registered, and never mutated
//! at runtime; each dialog embeds a snapshot of the template it was
//! created from so edits at rest cannot alter running dialogs.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Role of a message within a dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System-level instruction.
    System,
    /// Human turn.
    User,
    /// Model turn.
    Assistant,
}

impl MessageRole {
    /// Wire-format name of the role.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::str::FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Self::System),
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(format!("unknown message role '{other}'")),
        }
    }
}

/// What to do when a step's handler fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorStrategy {
    /// Mark the dialog failed (default).
    #[default]
    Fail,
    /// Re-run the handler up to `max_retries` times before failing.
    Retry,
    /// Record the error and advance to the next step.
    Continue,
    /// Jump to the named fallback step.
    Fallback,
}

/// Per-step (or template-default) error-handling policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorHandling {
    /// Strategy to apply when the handler errors.
    #[serde(default)]
    pub strategy: ErrorStrategy,
    /// Maximum retry attempts for the `retry` strategy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    /// Step name to jump to for the `fallback` strategy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_step: Option<String>,
}

fn default_enabled() -> bool {
    true
}

/// Step that appends a message with a fixed role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageStep {
    /// Name, unique within the template.
    pub name: String,
    /// Detailed purpose of the step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether the step is active.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Error-handling override for this step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_handling: Option<ErrorHandling>,
    /// Role of the appended message.
    pub role: MessageRole,
    /// Literal text content. Exactly one of `content` or `template`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Registered prompt name to render instead of literal content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    /// Arguments for the prompt; only valid with `template`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_args: Option<HashMap<String, serde_json::Value>>,
}

/// Step that renders a prompt and requests an LLM completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptStep {
    /// Name, unique within the template.
    pub name: String,
    /// Detailed purpose of the step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether the step is active.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Error-handling override for this step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_handling: Option<ErrorHandling>,
    /// Literal prompt text. Exactly one of `content` or `template`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Registered prompt name to render instead of literal content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    /// Arguments for the prompt; only valid with `template`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_args: Option<HashMap<String, serde_json::Value>>,
    /// Schema name to validate the completion against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<String>,
    /// Model override for this step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Step-specific generation overrides (temperature, max_tokens, ...).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub config_extra: HashMap<String, serde_json::Value>,
}

/// Step that pauses the dialog until a human supplies input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInputStep {
    /// Name, unique within the template.
    pub name: String,
    /// Detailed purpose of the step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether the step is active.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Error-handling override for this step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_handling: Option<ErrorHandling>,
    /// Instructions shown to the user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    /// Short prompt text displayed when requesting input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// Optional prompt name used to format the input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    /// Arguments for the formatting prompt; only valid with `template`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_args: Option<HashMap<String, serde_json::Value>>,
    /// Schema name to validate the processed input against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<String>,
    /// Follow-on generation config; a `model` key triggers a completion
    /// after the input is recorded.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub config_extra: HashMap<String, serde_json::Value>,
}

/// Step that invokes a registered callable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvokeStep {
    /// Name, unique within the template.
    pub name: String,
    /// Detailed purpose of the step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether the step is active.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Error-handling override for this step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_handling: Option<ErrorHandling>,
    /// Fully-qualified callable name (dotted path).
    pub callable: String,
    /// Schema name to validate the result against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<String>,
}

/// One unit of work in a template. Tagged union discriminated on `type`;
/// unknown tags are rejected at load time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Step {
    /// Append a message with a fixed role.
    Message(MessageStep),
    /// Render a prompt and request a completion.
    Prompt(PromptStep),
    /// Pause until the user supplies input.
    UserInput(UserInputStep),
    /// Invoke a registered callable.
    Invoke(InvokeStep),
}

impl Step {
    /// Name of the step, unique within its template.
    pub fn name(&self) -> &str {
        match self {
            Self::Message(s) => &s.name,
            Self::Prompt(s) => &s.name,
            Self::UserInput(s) => &s.name,
            Self::Invoke(s) => &s.name,
        }
    }

    /// Whether the step participates in the state machine.
    pub fn enabled(&self) -> bool {
        match self {
            Self::Message(s) => s.enabled,
            Self::Prompt(s) => s.enabled,
            Self::UserInput(s) => s.enabled,
            Self::Invoke(s) => s.enabled,
        }
    }

    /// Per-step error-handling override, if configured.
    pub fn error_handling(&self) -> Option<&ErrorHandling> {
        match self {
            Self::Message(s) => s.error_handling.as_ref(),
            Self::Prompt(s) => s.error_handling.as_ref(),
            Self::UserInput(s) => s.error_handling.as_ref(),
            Self::Invoke(s) => s.error_handling.as_ref(),
        }
    }

    /// Wire-format name of the step type.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::Prompt(_) => "prompt",
            Self::UserInput(_) => "user_input",
            Self::Invoke(_) => "invoke",
        }
    }

    /// Prompt reference and args, for the variants that can carry one.
    pub fn template_ref(&self) -> Option<&str> {
        match self {
            Self::Message(s) => s.template.as_deref(),
            Self::Prompt(s) => s.template.as_deref(),
            Self::UserInput(s) => s.template.as_deref(),
            Self::Invoke(_) => None,
        }
    }

    /// The step's `template_args` map, if any.
    pub fn template_args(&self) -> Option<&HashMap<String, serde_json::Value>> {
        match self {
            Self::Message(s) => s.template_args.as_ref(),
            Self::Prompt(s) => s.template_args.as_ref(),
            Self::UserInput(s) => s.template_args.as_ref(),
            Self::Invoke(_) => None,
        }
    }
}

/// Declarative, immutable recipe for a dialog: an ordered list of steps
/// plus defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogTemplate {
    /// Unique template name.
    pub name: String,
    /// Default LLM model identifier.
    pub model: String,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// What a run of this template is meant to achieve.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    /// Template-default error-handling policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_handling: Option<ErrorHandling>,
    /// Schema name for the final output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<String>,
    /// Default tool identifiers surfaced to handlers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<String>,
    /// Default resource identifiers surfaced to handlers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<String>,
    /// Default filesystem root identifiers surfaced to handlers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roots: Vec<String>,
    /// Ordered step list.
    pub steps: Vec<Step>,
}

impl DialogTemplate {
    /// The enabled steps, in declaration order. State-machine indices are
    /// assigned over this slice only.
    pub fn enabled_steps(&self) -> Vec<&Step> {
        self.steps.iter().filter(|s| s.enabled()).collect()
    }

    /// Validate the template structure, returning all errors found.
    ///
    /// Checks: unique step names; `content` XOR `template` on message and
    /// prompt steps; `template_args` only with `template`; every
    /// `fallback_step` reference names another step in this template.
    pub fn validate(&self) -> Result<(), Vec<ConfigError>> {
        let mut errors = Vec::new();
        let invalid = |message: String| ConfigError::InvalidTemplate {
            template: self.name.clone(),
            message,
        };

        if self.steps.is_empty() {
            // A template with zero steps is legal (it completes
            // immediately); only warn the operator.
            tracing::warn!(template = %self.name, "template has no steps");
        }

        let mut seen = std::collections::HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.name()) {
                errors.push(invalid(format!("duplicate step name '{}'", step.name())));
            }
        }

        for step in &self.steps {
            let (content, template, args): (
                Option<&String>,
                Option<&String>,
                Option<&HashMap<String, serde_json::Value>>,
            ) = match step {
                Step::Message(s) => (s.content.as_ref(), s.template.as_ref(), s.template_args.as_ref()),
                Step::Prompt(s) => (s.content.as_ref(), s.template.as_ref(), s.template_args.as_ref()),
                Step::UserInput(s) => (None, s.template.as_ref(), s.template_args.as_ref()),
                Step::Invoke(s) => {
                    if s.callable.is_empty() {
                        errors.push(invalid(format!(
                            "step '{}': 'callable' must not be empty",
                            s.name
                        )));
                    }
                    (None, None, None)
                }
            };

            if matches!(step, Step::Message(_) | Step::Prompt(_)) {
                match (content, template) {
                    (Some(_), Some(_)) => errors.push(invalid(format!(
                        "step '{}': only one of 'content' or 'template' may be set",
                        step.name()
                    ))),
                    (None, None) => errors.push(invalid(format!(
                        "step '{}': either 'content' or 'template' must be set",
                        step.name()
                    ))),
                    _ => {}
                }
            }

            if args.is_some() && template.is_none() {
                errors.push(invalid(format!(
                    "step '{}': 'template_args' requires 'template'",
                    step.name()
                )));
            }

            if let Some(handling) = step.error_handling() {
                if let Some(fallback) = &handling.fallback_step {
                    if !self.steps.iter().any(|s| s.name() == fallback) {
                        errors.push(invalid(format!(
                            "step '{}': fallback_step '{fallback}' names no step in this template",
                            step.name()
                        )));
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

//! Domain model: dialogs, their message log, and per-dialog workflow data.
//!
//! A `Dialog` is one durable, resumable instance of a `DialogTemplate`.
//! The embedded template snapshot and the `WorkflowData` document are
//! serialized as JSON into the dialog row; messages live in their own
//! table and are loaded ordered by timestamp.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::StorageError;
use crate::template::{DialogTemplate, MessageRole, Step};

/// Lifecycle status of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Created in memory; not yet durably complete.
    Created,
    /// Complete (or awaiting completion) but not delivered.
    Pending,
    /// Delivered to its consumer.
    Delivered,
    /// An error occurred; the message is incomplete.
    Failed,
}

impl MessageStatus {
    /// Wire-format name of the status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Pending => "pending",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for MessageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "pending" => Ok(Self::Pending),
            "delivered" => Ok(Self::Delivered),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown message status '{other}'")),
        }
    }
}

/// Lifecycle status of a dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogStatus {
    /// Created, not yet advanced.
    Pending,
    /// Actively advancing through steps.
    Running,
    /// Suspended by an operator.
    Paused,
    /// All enabled steps ran; terminal.
    Completed,
    /// A step failed; terminal until explicitly re-run.
    Failed,
    /// Suspended awaiting a human-supplied variable.
    WaitingForInput,
}

impl DialogStatus {
    /// Wire-format name of the status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::WaitingForInput => "waiting_for_input",
        }
    }
}

impl std::str::FromStr for DialogStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "waiting_for_input" => Ok(Self::WaitingForInput),
            other => Err(format!("unknown dialog status '{other}'")),
        }
    }
}

/// Per-dialog mutable document: the step cursor, accumulated results,
/// and variable bindings. Embedded as JSON in the dialog row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowData {
    /// Index of the next enabled step to run.
    #[serde(default)]
    pub current_step_index: usize,
    /// Step name -> result document, recorded on success.
    #[serde(default)]
    pub step_results: serde_json::Map<String, Value>,
    /// Variable bindings read by handlers.
    #[serde(default)]
    pub variables: serde_json::Map<String, Value>,
    /// Accumulated handler error messages.
    #[serde(default)]
    pub errors: Vec<String>,
    /// Variables a suspended prompt step is waiting on, declaration order.
    #[serde(default)]
    pub missing_variables: Vec<String>,
    /// Scratch copy of the most recent raw user input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_input: Option<String>,
}

/// One message in a dialog's log.
///
/// Messages are append-mostly: the only mutations are status transitions
/// and text extension while a completion streams in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message id.
    pub id: Uuid,
    /// Previous message in the chain, fixed at save time.
    pub parent_id: Option<Uuid>,
    /// Owning dialog.
    pub dialog_id: Uuid,
    /// Speaker role.
    pub role: MessageRole,
    /// Producing model; required for assistant messages.
    pub model: Option<String>,
    /// Text payload.
    pub text: String,
    /// Lifecycle status.
    pub status: MessageStatus,
    /// MIME type of the payload.
    pub mime_type: String,
    /// Creation time, UTC.
    pub timestamp: DateTime<Utc>,
    /// Free-form metadata (generation params, error details, ...).
    pub extra: Option<Value>,
}

impl Message {
    /// Create a message for a dialog. Assistant messages must carry a
    /// model; construction does not enforce it so partially-built stubs
    /// can exist in memory, but [`validate`](Self::validate) and the
    /// storage layer do.
    pub fn new(
        dialog_id: Uuid,
        role: MessageRole,
        text: impl Into<String>,
        model: Option<String>,
        status: MessageStatus,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent_id: None,
            dialog_id,
            role,
            model,
            text: text.into(),
            status,
            mime_type: "text/plain".to_string(),
            timestamp: Utc::now(),
            extra: None,
        }
    }

    /// Check invariants before persisting.
    pub fn validate(&self) -> Result<(), StorageError> {
        if self.role == MessageRole::Assistant
            && self.model.as_deref().unwrap_or("").is_empty()
        {
            return Err(StorageError::Validation {
                message: format!("assistant message {} has no model", self.id),
            });
        }
        Ok(())
    }
}

/// One running or completed instance of a template.
///
/// The in-memory transition plan is rebuilt from the embedded template on
/// each load; it is never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dialog {
    /// Dialog id.
    pub id: Uuid,
    /// Human-readable description.
    pub description: Option<String>,
    /// What this run is meant to achieve.
    pub goal: Option<String>,
    /// Lifecycle status.
    pub status: DialogStatus,
    /// State-machine state label, mirrored after every change.
    pub current_state: String,
    /// The mutable workflow document.
    pub workflow_data: WorkflowData,
    /// Snapshot of the template this dialog was created from.
    pub template: DialogTemplate,
    /// Terminal error description, when failed.
    pub error: Option<String>,
    /// Row creation time.
    pub created_at: Option<DateTime<Utc>>,
    /// Last row update time.
    pub updated_at: Option<DateTime<Utc>>,
    /// Message log, ordered by timestamp ascending.
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Dialog {
    /// Create a fresh dialog from a template snapshot.
    ///
    /// `initial_data` seeds `workflow_data.variables`; description and
    /// goal default to the template's.
    pub fn from_template(
        template: &DialogTemplate,
        description: Option<String>,
        goal: Option<String>,
        initial_data: Option<serde_json::Map<String, Value>>,
    ) -> Self {
        let mut workflow_data = WorkflowData::default();
        if let Some(vars) = initial_data {
            workflow_data.variables = vars;
        }

        Self {
            id: Uuid::new_v4(),
            description: description.or_else(|| template.description.clone()),
            goal: goal.or_else(|| template.goal.clone()),
            status: DialogStatus::Pending,
            current_state: "start".to_string(),
            workflow_data,
            template: template.clone(),
            error: None,
            created_at: None,
            updated_at: None,
            messages: Vec::new(),
        }
    }

    /// The enabled step at `workflow_data.current_step_index`, or `None`
    /// past the end.
    pub fn current_step(&self) -> Option<&Step> {
        self.template
            .enabled_steps()
            .into_iter()
            .nth(self.workflow_data.current_step_index)
    }

    /// Append a message and return its id.
    pub fn append_message(
        &mut self,
        role: MessageRole,
        text: impl Into<String>,
        model: Option<String>,
        status: MessageStatus,
    ) -> Uuid {
        let message = Message::new(self.id, role, text, model, status);
        let id = message.id;
        self.messages.push(message);
        id
    }

    /// Whether the dialog is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, DialogStatus::Completed | DialogStatus::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template_with_steps(yaml_steps: &str) -> DialogTemplate {
        serde_yaml::from_str(&format!("name: t\nmodel: m\nsteps:\n{yaml_steps}"))
            .expect("parse template")
    }

    #[test]
    fn from_template_seeds_variables_and_defaults() {
        let mut template = template_with_steps(
            "  - name: a\n    type: message\n    role: user\n    content: hi\n",
        );
        template.description = Some("described".into());

        let mut vars = serde_json::Map::new();
        vars.insert("k".into(), Value::String("v".into()));

        let dialog = Dialog::from_template(&template, None, None, Some(vars));
        assert_eq!(dialog.status, DialogStatus::Pending);
        assert_eq!(dialog.current_state, "start");
        assert_eq!(dialog.workflow_data.current_step_index, 0);
        assert_eq!(dialog.workflow_data.variables["k"], "v");
        assert_eq!(dialog.description.as_deref(), Some("described"));
        assert_eq!(dialog.template, template);
    }

    #[test]
    fn current_step_honors_enabled_filter_and_cursor() {
        let template = template_with_steps(
            "  - name: a\n    type: message\n    role: user\n    content: a\n\
               - name: off\n    type: message\n    role: user\n    content: x\n    enabled: false\n\
               - name: b\n    type: message\n    role: user\n    content: b\n",
        );
        let mut dialog = Dialog::from_template(&template, None, None, None);

        assert_eq!(dialog.current_step().map(Step::name), Some("a"));
        dialog.workflow_data.current_step_index = 1;
        assert_eq!(dialog.current_step().map(Step::name), Some("b"));
        dialog.workflow_data.current_step_index = 2;
        assert!(dialog.current_step().is_none());
    }

    #[test]
    fn assistant_message_requires_model() {
        let id = Uuid::new_v4();
        let stub = Message::new(id, MessageRole::Assistant, "", None, MessageStatus::Pending);
        assert!(stub.validate().is_err());

        let ok = Message::new(
            id,
            MessageRole::Assistant,
            "",
            Some("claude-sonnet-4-5".into()),
            MessageStatus::Pending,
        );
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn workflow_data_round_trips_with_defaults() {
        let data: WorkflowData = serde_json::from_str("{}").expect("defaults");
        assert_eq!(data.current_step_index, 0);
        assert!(data.variables.is_empty());

        let json = serde_json::to_value(&data).expect("serialize");
        assert!(json.get("user_input").is_none());
    }
}

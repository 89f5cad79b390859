//! Per-type broadcast strategies.
//!
//! A strategy decides whether an updated entity should broadcast and
//! which `(event, payload)` pairs it emits. Messages broadcast for every
//! status except `created`; dialogs always broadcast.

use serde_json::{json, Value};

use super::events;
use crate::dialog::{Dialog, DialogStatus, Message, MessageStatus};
use crate::template::{MessageRole, Step};

/// Events a message update implies.
pub fn message_events(message: &Message) -> Vec<(&'static str, Value)> {
    if message.status == MessageStatus::Created {
        return Vec::new();
    }

    let mut events = vec![(
        events::MESSAGE_UPDATE,
        json!({
            "id": message.id,
            "dialog_id": message.dialog_id,
            "status": message.status.as_str(),
            "role": message.role.as_str(),
            "text": message.text,
            "timestamp": message.timestamp.to_rfc3339(),
        }),
    )];

    match message.status {
        MessageStatus::Delivered if message.role == MessageRole::Assistant => {
            events.push((
                events::COMPLETION_FINISHED,
                json!({
                    "message_id": message.id,
                    "dialog_id": message.dialog_id,
                }),
            ));
        }
        MessageStatus::Failed => {
            let error = message
                .extra
                .as_ref()
                .and_then(|e| e.get("error"))
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            events.push((
                events::MESSAGE_ERROR,
                json!({
                    "message_id": message.id,
                    "dialog_id": message.dialog_id,
                    "error": error,
                }),
            ));
        }
        _ => {}
    }

    events
}

/// Events a dialog update implies.
pub fn dialog_events(dialog: &Dialog) -> Vec<(&'static str, Value)> {
    let mut events = vec![(
        events::SESSION_UPDATE,
        json!({
            "id": dialog.id,
            "status": dialog.status.as_str(),
            "current_state": dialog.current_state,
            "description": dialog.description,
            "created_at": dialog.created_at.map(|t| t.to_rfc3339()),
        }),
    )];

    match dialog.status {
        DialogStatus::WaitingForInput => {
            let prompt = dialog
                .current_step()
                .and_then(|step| match step {
                    Step::UserInput(s) => s.prompt.clone().or_else(|| s.instructions.clone()),
                    _ => None,
                })
                .unwrap_or_else(|| "Input required".to_string());
            events.push((
                events::USER_INPUT_REQUIRED,
                json!({
                    "dialog_id": dialog.id,
                    "prompt": prompt,
                    "missing_variables": dialog.workflow_data.missing_variables,
                }),
            ));
        }
        DialogStatus::Completed => {
            events.push((
                events::SESSION_COMPLETED,
                json!({"dialog_id": dialog.id}),
            ));
        }
        DialogStatus::Failed => {
            events.push((
                events::SESSION_ERROR,
                json!({
                    "dialog_id": dialog.id,
                    "error": dialog.error.as_deref().unwrap_or("unknown error"),
                }),
            ));
        }
        _ => {}
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::DialogTemplate;

    fn dialog() -> Dialog {
        let template: DialogTemplate = serde_yaml::from_str(
            "name: t\nmodel: m\nsteps:\n  - name: pick\n    type: user_input\n    prompt: choose\n",
        )
        .expect("template");
        Dialog::from_template(&template, None, None, None)
    }

    #[test]
    fn created_messages_do_not_broadcast() {
        let mut dialog = dialog();
        dialog.append_message(MessageRole::User, "hi", None, MessageStatus::Created);
        assert!(message_events(&dialog.messages[0]).is_empty());
    }

    #[test]
    fn delivered_assistant_emits_completion_finished() {
        let mut dialog = dialog();
        dialog.append_message(
            MessageRole::Assistant,
            "done",
            Some("m".into()),
            MessageStatus::Delivered,
        );

        let events: Vec<&str> = message_events(&dialog.messages[0])
            .iter()
            .map(|(e, _)| *e)
            .collect();
        assert_eq!(events, vec!["message_update", "completion_finished"]);
    }

    #[test]
    fn failed_message_emits_message_error_with_cause() {
        let mut dialog = dialog();
        dialog.append_message(MessageRole::Assistant, "", Some("m".into()), MessageStatus::Failed);
        dialog.messages[0].extra = Some(json!({"error": "rate limited"}));

        let events = message_events(&dialog.messages[0]);
        assert_eq!(events[1].0, "message_error");
        assert_eq!(events[1].1["error"], "rate limited");
    }

    #[test]
    fn waiting_dialog_emits_user_input_required_with_prompt() {
        let mut dialog = dialog();
        dialog.status = DialogStatus::WaitingForInput;

        let events = dialog_events(&dialog);
        assert_eq!(events[0].0, "session_update");
        assert_eq!(events[1].0, "user_input_required");
        assert_eq!(events[1].1["prompt"], "choose");
    }

    #[test]
    fn terminal_statuses_emit_their_events() {
        let mut dialog = dialog();
        dialog.status = DialogStatus::Completed;
        let events = dialog_events(&dialog);
        assert_eq!(events[1].0, "session_completed");

        dialog.status = DialogStatus::Failed;
        dialog.error = Some("step blew up".into());
        let events = dialog_events(&dialog);
        assert_eq!(events[1].0, "session_error");
        assert_eq!(events[1].1["error"], "step blew up");
    }
}

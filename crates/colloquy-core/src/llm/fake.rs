//! Deterministic completion service for tests.
//!
//! Pops scripted responses in order; once the script is exhausted it
//! answers with a fixed fallback so workflows always run to completion.

use std::collections::VecDeque;
use std::sync::Mutex;

use uuid::Uuid;

use super::{completion_target, CompletionService, OnUpdate};
use crate::dialog::{Dialog, MessageStatus};
use crate::error::LlmError;

/// Scripted completion service.
pub struct FakeCompletionService {
    responses: Mutex<VecDeque<String>>,
    fallback: String,
}

impl Default for FakeCompletionService {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl FakeCompletionService {
    /// Create with a response script, consumed in order.
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            fallback: "scripted completion".to_string(),
        }
    }

    /// Override the text used once the script runs out.
    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = fallback.into();
        self
    }

    fn next_text(&self) -> String {
        match self.responses.lock() {
            Ok(mut guard) => guard.pop_front().unwrap_or_else(|| self.fallback.clone()),
            Err(_) => self.fallback.clone(),
        }
    }
}

#[async_trait::async_trait]
impl CompletionService for FakeCompletionService {
    fn supports(&self, dialog: &Dialog) -> bool {
        completion_target(dialog).is_some()
    }

    async fn complete(
        &self,
        dialog: &mut Dialog,
        on_update: Option<&OnUpdate>,
    ) -> Result<Uuid, LlmError> {
        let (stub_index, model) =
            completion_target(dialog).ok_or(LlmError::NoPendingMessage)?;

        let stub = &mut dialog.messages[stub_index];
        stub.text = self.next_text();
        stub.status = MessageStatus::Delivered;
        if stub.model.is_none() {
            stub.model = Some(model);
        }
        let id = stub.id;

        if let Some(callback) = on_update {
            callback(&dialog.messages[stub_index]);
        }

        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{DialogTemplate, MessageRole};

    #[tokio::test]
    async fn consumes_script_then_falls_back() {
        let service =
            FakeCompletionService::new(vec!["first".to_string()]).with_fallback("later");
        let template: DialogTemplate =
            serde_yaml::from_str("name: t\nmodel: m\nsteps: []").expect("template");

        for expected in ["first", "later"] {
            let mut dialog = Dialog::from_template(&template, None, None, None);
            dialog.append_message(MessageRole::User, "q", None, MessageStatus::Pending);
            dialog.append_message(
                MessageRole::Assistant,
                "",
                Some("m".to_string()),
                MessageStatus::Pending,
            );

            service.complete(&mut dialog, None).await.expect("complete");
            assert_eq!(dialog.messages[1].text, expected);
            assert_eq!(dialog.messages[1].status, MessageStatus::Delivered);
        }
    }
}

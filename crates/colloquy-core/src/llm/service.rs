//! Dialog-level completion over an HTTP provider.
//!
//! `ProviderCompletionService` builds the provider conversation from the
//! dialog history (everything before the assistant stub), invokes the
//! provider, and drives the stub `pending -> delivered` or `failed`.

use std::sync::Arc;

use uuid::Uuid;

use super::{completion_target, ChatTurn, CompletionService, GenerationParams, LlmProvider, OnUpdate};
use crate::dialog::{Dialog, MessageStatus};
use crate::error::LlmError;
use crate::storage::{llm_usage, DbPool};

/// Completion service delegating to one HTTP provider.
pub struct ProviderCompletionService {
    provider: Arc<dyn LlmProvider>,
    /// Model-id prefixes this service claims; empty claims everything.
    model_prefixes: Vec<String>,
    /// Pool for token accounting; `None` disables it.
    pool: Option<DbPool>,
}

impl ProviderCompletionService {
    /// Create a service claiming models matching any of the prefixes.
    pub fn new(provider: Arc<dyn LlmProvider>, model_prefixes: Vec<String>) -> Self {
        Self {
            provider,
            model_prefixes,
            pool: None,
        }
    }

    /// Enable token usage accounting against the given pool.
    pub fn with_usage_accounting(mut self, pool: DbPool) -> Self {
        self.pool = Some(pool);
        self
    }
}

#[async_trait::async_trait]
impl CompletionService for ProviderCompletionService {
    fn supports(&self, dialog: &Dialog) -> bool {
        let Some((_, model)) = completion_target(dialog) else {
            return false;
        };
        self.model_prefixes.is_empty()
            || self.model_prefixes.iter().any(|p| model.starts_with(p.as_str()))
    }

    async fn complete(
        &self,
        dialog: &mut Dialog,
        on_update: Option<&OnUpdate>,
    ) -> Result<Uuid, LlmError> {
        let (stub_index, model) =
            completion_target(dialog).ok_or(LlmError::NoPendingMessage)?;

        let turns: Vec<ChatTurn> = dialog.messages[..stub_index]
            .iter()
            .map(|m| ChatTurn {
                role: m.role,
                content: m.text.clone(),
            })
            .collect();

        let params = GenerationParams::from_extra(dialog.messages[stub_index].extra.as_ref());

        match self.provider.complete(&model, &turns, &params).await {
            Ok(response) => {
                let stub = &mut dialog.messages[stub_index];
                stub.text = response.text;
                stub.status = MessageStatus::Delivered;
                if stub.model.is_none() {
                    stub.model = Some(model.clone());
                }
                let id = stub.id;

                if let Some(callback) = on_update {
                    callback(&dialog.messages[stub_index]);
                }

                if let Some(pool) = &self.pool {
                    if let Err(e) = llm_usage::record(
                        pool,
                        dialog.id,
                        &model,
                        response.usage.input_tokens,
                        response.usage.output_tokens,
                    )
                    .await
                    {
                        tracing::warn!(error = %e, "failed to record LLM usage");
                    }
                }

                Ok(id)
            }
            Err(e) => {
                let stub = &mut dialog.messages[stub_index];
                stub.status = MessageStatus::Failed;
                stub.extra = Some(serde_json::json!({"error": e.to_string()}));
                if let Some(callback) = on_update {
                    callback(&dialog.messages[stub_index]);
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::llm::{LlmResponse, TokenUsage};
    use crate::template::{DialogTemplate, MessageRole};

    struct StaticProvider {
        text: &'static str,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl LlmProvider for StaticProvider {
        fn name(&self) -> &str {
            "static"
        }

        async fn complete(
            &self,
            model: &str,
            turns: &[ChatTurn],
            _params: &GenerationParams,
        ) -> Result<LlmResponse, LlmError> {
            if self.fail {
                return Err(LlmError::Api {
                    status: 500,
                    message: "upstream down".to_string(),
                });
            }
            // History never includes the stub itself.
            assert!(turns.iter().all(|t| !t.content.is_empty()));
            Ok(LlmResponse {
                text: self.text.to_string(),
                usage: TokenUsage {
                    input_tokens: 3,
                    output_tokens: 2,
                },
                model: model.to_string(),
            })
        }

        async fn health_check(&self) -> Result<(), LlmError> {
            Ok(())
        }
    }

    fn dialog_with_stub(model: &str) -> Dialog {
        let template: DialogTemplate =
            serde_yaml::from_str("name: t\nmodel: m\nsteps: []").expect("template");
        let mut dialog = Dialog::from_template(&template, None, None, None);
        dialog.append_message(MessageRole::User, "question", None, MessageStatus::Pending);
        dialog.append_message(
            MessageRole::Assistant,
            "",
            Some(model.to_string()),
            MessageStatus::Pending,
        );
        dialog
    }

    #[tokio::test]
    async fn delivers_stub_and_invokes_callback() {
        let service = ProviderCompletionService::new(
            Arc::new(StaticProvider {
                text: "answer",
                fail: false,
            }),
            Vec::new(),
        );
        let mut dialog = dialog_with_stub("m");

        let updates = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen = Arc::clone(&updates);
        let on_update = move |m: &crate::dialog::Message| {
            if let Ok(mut guard) = seen.lock() {
                guard.push((m.text.clone(), m.status));
            }
        };

        let id = service
            .complete(&mut dialog, Some(&on_update))
            .await
            .expect("complete");

        let stub = &dialog.messages[1];
        assert_eq!(stub.id, id);
        assert_eq!(stub.text, "answer");
        assert_eq!(stub.status, MessageStatus::Delivered);

        let updates = updates.lock().expect("lock");
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0], ("answer".to_string(), MessageStatus::Delivered));
    }

    #[tokio::test]
    async fn provider_failure_marks_stub_failed() {
        let service = ProviderCompletionService::new(
            Arc::new(StaticProvider {
                text: "",
                fail: true,
            }),
            Vec::new(),
        );
        let mut dialog = dialog_with_stub("m");

        let err = service.complete(&mut dialog, None).await.unwrap_err();
        assert!(matches!(err, LlmError::Api { status: 500, .. }));

        let stub = &dialog.messages[1];
        assert_eq!(stub.status, MessageStatus::Failed);
        assert!(stub.extra.as_ref().and_then(|e| e.get("error")).is_some());
    }

    #[tokio::test]
    async fn supports_respects_model_prefixes() {
        let service = ProviderCompletionService::new(
            Arc::new(StaticProvider {
                text: "",
                fail: false,
            }),
            vec!["claude".to_string()],
        );

        assert!(service.supports(&dialog_with_stub("claude-sonnet-4-5")));
        assert!(!service.supports(&dialog_with_stub("gpt-test")));
    }

    #[tokio::test]
    async fn no_stub_is_an_error() {
        let service = ProviderCompletionService::new(
            Arc::new(StaticProvider {
                text: "",
                fail: false,
            }),
            Vec::new(),
        );
        let template: DialogTemplate =
            serde_yaml::from_str("name: t\nmodel: m\nsteps: []").expect("template");
        let mut dialog = Dialog::from_template(&template, None, None, None);

        let err = service.complete(&mut dialog, None).await.unwrap_err();
        assert!(matches!(err, LlmError::NoPendingMessage));
    }
}

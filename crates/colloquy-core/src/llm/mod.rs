//! LLM provider abstraction and the dialog-level completion service.
//!
//! Two layers: [`LlmProvider`] is the HTTP-level contract (Anthropic,
//! OpenAI-compatible endpoints), taking a conversation and returning a
//! typed response with token usage. [`CompletionService`] works on a
//! whole dialog: it selects the assistant stub awaiting completion,
//! drives it `pending -> delivered` (or `failed`), and reports
//! incremental updates through a best-effort callback.

pub mod anthropic;
pub mod openai_compat;
pub mod service;

#[cfg(any(test, feature = "test-helpers"))]
pub mod fake;

use uuid::Uuid;

use crate::dialog::{Dialog, Message, MessageStatus};
use crate::error::LlmError;
use crate::template::MessageRole;

/// Token usage information from an LLM completion.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct TokenUsage {
    /// Number of tokens in the input/prompt.
    pub input_tokens: u32,
    /// Number of tokens in the output/completion.
    pub output_tokens: u32,
}

/// Response from an LLM completion request.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// The generated text content.
    pub text: String,
    /// Token usage for this completion.
    pub usage: TokenUsage,
    /// The model that produced this response.
    pub model: String,
}

/// One conversation turn sent to a provider.
#[derive(Debug, Clone)]
pub struct ChatTurn {
    /// Speaker role.
    pub role: MessageRole,
    /// Turn text.
    pub content: String,
}

/// Parameters controlling LLM generation behavior.
#[derive(Debug, Clone)]
pub struct GenerationParams {
    /// Maximum number of tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature (0.0 = deterministic, 1.0+ = creative).
    pub temperature: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 0.7,
        }
    }
}

impl GenerationParams {
    /// Overlay `max_tokens`/`temperature` keys from a step's
    /// `config_extra`-style document onto the defaults.
    pub fn from_extra(extra: Option<&serde_json::Value>) -> Self {
        let mut params = Self::default();
        let Some(extra) = extra else {
            return params;
        };
        if let Some(max_tokens) = extra.get("max_tokens").and_then(serde_json::Value::as_u64) {
            params.max_tokens = u32::try_from(max_tokens).unwrap_or(u32::MAX);
        }
        if let Some(temperature) = extra.get("temperature").and_then(serde_json::Value::as_f64) {
            #[allow(clippy::cast_possible_truncation)]
            {
                params.temperature = temperature as f32;
            }
        }
        params
    }
}

/// Trait abstracting HTTP-level LLM provider operations.
///
/// Implementations include [`openai_compat::OpenAiCompatProvider`] (for
/// OpenAI and Ollama) and [`anthropic::AnthropicProvider`]. The trait is
/// object-safe for use as `Arc<dyn LlmProvider>`.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Returns the display name of this provider (e.g., "anthropic").
    fn name(&self) -> &str;

    /// Send a conversation to the LLM and return its completion.
    async fn complete(
        &self,
        model: &str,
        turns: &[ChatTurn],
        params: &GenerationParams,
    ) -> Result<LlmResponse, LlmError>;

    /// Check if the provider is reachable and configured correctly.
    async fn health_check(&self) -> Result<(), LlmError>;
}

/// Best-effort incremental update callback, invoked after each text
/// extension of the assistant stub. Implementations must not block.
pub type OnUpdate = dyn Fn(&Message) + Send + Sync;

/// Dialog-level completion contract.
#[async_trait::async_trait]
pub trait CompletionService: Send + Sync {
    /// Whether this service will handle this dialog, usually keyed off
    /// the model on the assistant stub or the template default.
    fn supports(&self, dialog: &Dialog) -> bool;

    /// Produce the completion, mutating the assistant stub in place and
    /// transitioning it `pending -> delivered` (or `failed`). Returns
    /// the completed message id.
    async fn complete(
        &self,
        dialog: &mut Dialog,
        on_update: Option<&OnUpdate>,
    ) -> Result<Uuid, LlmError>;
}

/// The assistant stub a completion would target: index of the last
/// pending assistant message plus the model that should produce it.
pub fn completion_target(dialog: &Dialog) -> Option<(usize, String)> {
    let index = dialog
        .messages
        .iter()
        .rposition(|m| m.role == MessageRole::Assistant && m.status == MessageStatus::Pending)?;
    let model = dialog.messages[index]
        .model
        .clone()
        .unwrap_or_else(|| dialog.template.model.clone());
    Some((index, model))
}

/// A completion service that chains multiple services together and uses
/// the first one whose `supports` returns true.
pub struct ChainedCompletionService {
    services: Vec<std::sync::Arc<dyn CompletionService>>,
}

impl ChainedCompletionService {
    /// Chain services in delegation order.
    pub fn new(services: Vec<std::sync::Arc<dyn CompletionService>>) -> Self {
        Self { services }
    }
}

#[async_trait::async_trait]
impl CompletionService for ChainedCompletionService {
    fn supports(&self, dialog: &Dialog) -> bool {
        self.services.iter().any(|s| s.supports(dialog))
    }

    async fn complete(
        &self,
        dialog: &mut Dialog,
        on_update: Option<&OnUpdate>,
    ) -> Result<Uuid, LlmError> {
        for service in &self.services {
            if service.supports(dialog) {
                return service.complete(dialog, on_update).await;
            }
        }
        Err(LlmError::NoProvider)
    }
}

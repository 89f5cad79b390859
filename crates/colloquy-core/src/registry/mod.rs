//! Process-wide registry: templates, prompts, schemas, invokables,
//! models, and external tool servers.
//!
//! The registry is populated once at boot through [`RegistryBuilder`]
//! and frozen by [`RegistryBuilder::build`]; lookups after that are
//! lock-free reads on shared immutable state. Duplicate registration
//! logs a warning and keeps the first entry.

pub mod loader;
pub mod prompt;

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dialog::Dialog;
use crate::error::RegistryError;
use crate::template::DialogTemplate;

pub use prompt::Prompt;

/// A named JSON schema document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    /// Schema name.
    pub name: String,
    /// The JSON schema document.
    pub json_schema: Value,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Identifier of the type the schema was derived from.
    #[serde(default)]
    pub source_class: String,
}

/// A model known to the system. Opaque to the core; surfaced to
/// handlers on demand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Model identifier.
    pub name: String,
    /// Provider hint (anthropic, openai, ollama, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Launch declaration for an external tool server. Opaque to the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    /// Executable to launch.
    pub command: String,
    /// Arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment overrides.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// Error raised by an invokable callable.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct InvokeError {
    /// What went wrong.
    pub message: String,
}

impl InvokeError {
    /// Build from anything printable.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A callable registered under a dotted name. Receives the
/// precedence-merged argument map and the dialog for context.
#[async_trait::async_trait]
pub trait Invokable: Send + Sync + std::fmt::Debug {
    /// Invoke the callable.
    async fn call(
        &self,
        args: serde_json::Map<String, Value>,
        dialog: &Dialog,
    ) -> Result<Value, InvokeError>;
}

/// Mutable registry under construction. Frozen by [`build`](Self::build).
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    templates: HashMap<String, DialogTemplate>,
    prompts: HashMap<String, Prompt>,
    schemas: HashMap<String, Schema>,
    invokables: HashMap<String, Arc<dyn Invokable>>,
    models: HashMap<String, ModelInfo>,
    mcp_servers: HashMap<String, McpServerConfig>,
}

impl RegistryBuilder {
    /// New empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dialog template. First writer wins.
    pub fn add_template(&mut self, template: DialogTemplate) -> &DialogTemplate {
        add_entry(&mut self.templates, template.name.clone(), template, "template")
    }

    /// Register a prompt. First writer wins.
    pub fn add_prompt(&mut self, prompt: Prompt) -> &Prompt {
        add_entry(&mut self.prompts, prompt.name.clone(), prompt, "prompt")
    }

    /// Register a schema. First writer wins.
    pub fn add_schema(&mut self, schema: Schema) -> &Schema {
        add_entry(&mut self.schemas, schema.name.clone(), schema, "schema")
    }

    /// Register an invokable under a dotted name. First writer wins.
    pub fn add_invokable(&mut self, name: impl Into<String>, invokable: Arc<dyn Invokable>) {
        let name = name.into();
        add_entry(&mut self.invokables, name.clone(), invokable, "invokable");
    }

    /// Register a model. First writer wins.
    pub fn add_model(&mut self, model: ModelInfo) -> &ModelInfo {
        add_entry(&mut self.models, model.name.clone(), model, "model")
    }

    /// Register an external tool server declaration. First writer wins.
    pub fn add_mcp_server(&mut self, name: impl Into<String>, server: McpServerConfig) {
        let name = name.into();
        add_entry(&mut self.mcp_servers, name.clone(), server, "mcp server");
    }

    /// Freeze the builder into an immutable registry.
    pub fn build(self) -> Registry {
        Registry {
            templates: self.templates,
            prompts: self.prompts,
            schemas: self.schemas,
            invokables: self.invokables,
            models: self.models,
            mcp_servers: self.mcp_servers,
        }
    }
}

fn add_entry<'a, T>(
    map: &'a mut HashMap<String, T>,
    name: String,
    value: T,
    kind: &'static str,
) -> &'a T {
    match map.entry(name) {
        std::collections::hash_map::Entry::Occupied(existing) => {
            tracing::warn!(kind, name = %existing.key(), "duplicate registration ignored");
            existing.into_mut()
        }
        std::collections::hash_map::Entry::Vacant(slot) => slot.insert(value),
    }
}

/// Immutable, process-wide lookup populated at boot.
pub struct Registry {
    templates: HashMap<String, DialogTemplate>,
    prompts: HashMap<String, Prompt>,
    schemas: HashMap<String, Schema>,
    invokables: HashMap<String, Arc<dyn Invokable>>,
    models: HashMap<String, ModelInfo>,
    mcp_servers: HashMap<String, McpServerConfig>,
}

impl Registry {
    /// Look up a dialog template by name.
    pub fn get_template(&self, name: &str) -> Result<&DialogTemplate, RegistryError> {
        self.templates.get(name).ok_or_else(|| not_found("template", name))
    }

    /// Look up a prompt by qualified name.
    pub fn get_prompt(&self, name: &str) -> Result<&Prompt, RegistryError> {
        self.prompts.get(name).ok_or_else(|| not_found("prompt", name))
    }

    /// Look up a schema by name.
    pub fn get_schema(&self, name: &str) -> Result<&Schema, RegistryError> {
        self.schemas.get(name).ok_or_else(|| not_found("schema", name))
    }

    /// Resolve an invokable by dotted name.
    pub fn get_invokable(&self, name: &str) -> Result<Arc<dyn Invokable>, RegistryError> {
        self.invokables
            .get(name)
            .cloned()
            .ok_or_else(|| not_found("invokable", name))
    }

    /// Look up a model by identifier.
    pub fn get_model(&self, name: &str) -> Result<&ModelInfo, RegistryError> {
        self.models.get(name).ok_or_else(|| not_found("model", name))
    }

    /// Look up an external tool server declaration.
    pub fn get_mcp_server(&self, name: &str) -> Result<&McpServerConfig, RegistryError> {
        self.mcp_servers
            .get(name)
            .ok_or_else(|| not_found("mcp server", name))
    }

    /// All registered templates, sorted by name.
    pub fn list_templates(&self) -> Vec<&DialogTemplate> {
        let mut templates: Vec<_> = self.templates.values().collect();
        templates.sort_by(|a, b| a.name.cmp(&b.name));
        templates
    }

    /// All registered prompts, sorted by name.
    pub fn list_prompts(&self) -> Vec<&Prompt> {
        let mut prompts: Vec<_> = self.prompts.values().collect();
        prompts.sort_by(|a, b| a.name.cmp(&b.name));
        prompts
    }

    /// All registered schemas, sorted by name.
    pub fn list_schemas(&self) -> Vec<&Schema> {
        let mut schemas: Vec<_> = self.schemas.values().collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }
}

fn not_found(kind: &'static str, name: &str) -> RegistryError {
    RegistryError::NotFound {
        kind,
        name: name.to_string(),
    }
}

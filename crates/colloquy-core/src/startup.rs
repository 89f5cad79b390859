//! Boot wiring: configuration to a ready application context.
//!
//! Builds, in order: the database pool (with migrations), the frozen
//! registry (YAML config plus built-in invokables), the completion
//! chain for the configured provider, the broadcast bus, and the
//! workflow service. The CLI and worker both start from here.

use std::path::Path;
use std::sync::Arc;

use crate::broadcast::Broadcaster;
use crate::config::Config;
use crate::error::{ConfigError, StorageError};
use crate::jobs::JobQueue;
use crate::llm::anthropic::AnthropicProvider;
use crate::llm::openai_compat::OpenAiCompatProvider;
use crate::llm::service::ProviderCompletionService;
use crate::llm::{ChainedCompletionService, CompletionService, LlmProvider};
use crate::registry::{loader, Registry, RegistryBuilder};
use crate::storage::store::DialogStore;
use crate::storage::{expand_tilde, init_db, DbPool};
use crate::workflow::invokables::register_builtins;
use crate::workflow::WorkflowService;

/// Errors that abort boot.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// The database could not be initialized.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Everything a running process needs, wired once at boot.
pub struct AppContext {
    /// The loaded configuration.
    pub config: Config,
    /// Shared connection pool.
    pub pool: DbPool,
    /// Frozen registry.
    pub registry: Arc<Registry>,
    /// Dialog persistence.
    pub store: Arc<DialogStore>,
    /// Event fan-out.
    pub broadcaster: Arc<Broadcaster>,
    /// Job queue client.
    pub queue: JobQueue,
    /// Workflow facade.
    pub service: Arc<WorkflowService>,
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext").finish_non_exhaustive()
    }
}

impl AppContext {
    /// Initialize the application from a loaded configuration.
    pub async fn init(config: Config) -> Result<Self, StartupError> {
        if let Err(errors) = config.validate() {
            let message = errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(StartupError::ConfigInvalid(message));
        }

        let pool = init_db(&config.storage.db_path).await?;
        let registry = Arc::new(build_registry(&config)?);
        let store = Arc::new(DialogStore::new(pool.clone()));
        let broadcaster = Arc::new(Broadcaster::new());
        let completion = build_completion_chain(&config, &pool);
        let queue = JobQueue::new(pool.clone(), config.queue.job_timeout_secs);

        let service = Arc::new(WorkflowService::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            completion,
            Arc::clone(&broadcaster),
        ));

        tracing::info!(
            templates = registry.list_templates().len(),
            prompts = registry.list_prompts().len(),
            provider = %config.llm.provider,
            "application context initialized",
        );

        Ok(Self {
            config,
            pool,
            registry,
            store,
            broadcaster,
            queue,
            service,
        })
    }

    /// Graceful stop: announce shutdown to observers and close the pool.
    pub async fn shutdown(&self) {
        self.broadcaster.shutdown();
        self.pool.close().await;
        tracing::info!("application context shut down");
    }
}

/// Load the YAML registry config and add the built-ins. A missing
/// registry file yields a builtins-only registry; a malformed one
/// aborts boot.
fn build_registry(config: &Config) -> Result<Registry, ConfigError> {
    let path = expand_tilde(&config.registry.config_path);

    let mut builder = if Path::new(&path).exists() {
        loader::load_registry(Path::new(&path))?
    } else {
        tracing::warn!(path = %path, "registry config not found, starting with built-ins only");
        RegistryBuilder::new()
    };

    register_builtins(&mut builder);
    Ok(builder.build())
}

/// Build the completion chain for the configured provider.
fn build_completion_chain(config: &Config, pool: &DbPool) -> Arc<dyn CompletionService> {
    let api_key = config.llm.api_key.clone().unwrap_or_default();
    let model = config.llm.model.clone();

    let provider: Option<Arc<dyn LlmProvider>> = match config.llm.provider.as_str() {
        "anthropic" => Some(Arc::new(AnthropicProvider::new(api_key, model))),
        "openai" => Some(Arc::new(OpenAiCompatProvider::new(
            config
                .llm
                .base_url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            api_key,
            model,
            "openai".to_string(),
        ))),
        "ollama" => Some(Arc::new(OpenAiCompatProvider::new(
            config
                .llm
                .base_url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434/v1".to_string()),
            api_key,
            model,
            "ollama".to_string(),
        ))),
        "" => None,
        other => {
            // Validation rejects this earlier; stay defensive.
            tracing::error!(provider = %other, "unknown LLM provider, completions disabled");
            None
        }
    };

    let services: Vec<Arc<dyn CompletionService>> = provider
        .map(|p| {
            let service = ProviderCompletionService::new(p, Vec::new())
                .with_usage_accounting(pool.clone());
            vec![Arc::new(service) as Arc<dyn CompletionService>]
        })
        .unwrap_or_default();

    Arc::new(ChainedCompletionService::new(services))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn init_with_defaults_and_temp_storage() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = Config::default();
        config.storage.db_path = dir
            .path()
            .join("colloquy.db")
            .to_string_lossy()
            .to_string();
        config.registry.config_path = dir
            .path()
            .join("missing-registry.yaml")
            .to_string_lossy()
            .to_string();

        let ctx = AppContext::init(config).await.expect("init");

        // Built-ins are present even without a registry file.
        assert!(ctx.registry.get_invokable("builtins.echo").is_ok());
        assert!(ctx.registry.list_templates().is_empty());

        ctx.shutdown().await;
    }

    #[tokio::test]
    async fn invalid_config_aborts_init() {
        let mut config = Config::default();
        config.llm.provider = "anthropic".to_string(); // no api key, no model

        let err = AppContext::init(config).await.unwrap_err();
        assert!(matches!(err, StartupError::ConfigInvalid(_)));
    }
}

//! Configuration management for Colloquy.
//!
//! Supports three-layer configuration loading:
//! 1. Built-in defaults
//! 2. TOML config file (`~/.colloquy/config.toml`)
//! 3. Environment variable overrides (`COLLOQUY_` prefix)
//!
//! CLI flag overrides are applied by the binary crate after loading.

mod validation;

use std::env;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

fn default_db_path() -> String {
    "~/.colloquy/colloquy.db".to_string()
}

fn default_registry_path() -> String {
    "~/.colloquy/registry.yaml".to_string()
}

fn default_job_timeout_secs() -> u64 {
    300
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Top-level configuration for the Colloquy engine.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Data storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,

    /// LLM provider configuration.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Registry bootstrap configuration.
    #[serde(default)]
    pub registry: RegistrySection,

    /// Job queue tuning.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Logging and observability settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Data storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

/// LLM provider configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LlmConfig {
    /// Provider name: anthropic, openai, or ollama. Empty disables
    /// completions (dialogs with prompt steps will fail to run).
    #[serde(default)]
    pub provider: String,
    /// API key for hosted providers.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Default model identifier when a template omits one.
    #[serde(default)]
    pub model: String,
    /// Base URL override (Ollama, proxies, tests).
    #[serde(default)]
    pub base_url: Option<String>,
}

/// Registry bootstrap configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RegistrySection {
    /// Path to the YAML registry config file.
    #[serde(default = "default_registry_path")]
    pub config_path: String,
}

impl Default for RegistrySection {
    fn default() -> Self {
        Self {
            config_path: default_registry_path(),
        }
    }
}

/// Job queue tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    /// Per-job execution timeout.
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,
    /// Worker poll interval when the queue is empty.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            job_timeout_secs: default_job_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Logging and observability settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Default tracing level when RUST_LOG is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, then apply environment
    /// overrides. A missing file yields defaults plus overrides.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let expanded = crate::storage::expand_tilde(path);

        let mut config = match std::fs::read_to_string(&expanded) {
            Ok(raw) => {
                toml::from_str(&raw).map_err(|source| ConfigError::ParseError { source })?
            }
            Err(_) => {
                tracing::debug!(path = %expanded, "config file not found, using defaults");
                Self::default()
            }
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply `COLLOQUY_`-prefixed environment overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = env::var("COLLOQUY_DB_PATH") {
            self.storage.db_path = v;
        }
        if let Ok(v) = env::var("COLLOQUY_LLM_PROVIDER") {
            self.llm.provider = v;
        }
        if let Ok(v) = env::var("COLLOQUY_LLM_API_KEY") {
            self.llm.api_key = Some(v);
        }
        if let Ok(v) = env::var("COLLOQUY_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Ok(v) = env::var("COLLOQUY_LLM_BASE_URL") {
            self.llm.base_url = Some(v);
        }
        if let Ok(v) = env::var("COLLOQUY_REGISTRY_CONFIG") {
            self.registry.config_path = v;
        }
        if let Ok(v) = env::var("COLLOQUY_JOB_TIMEOUT_SECS") {
            if let Ok(parsed) = v.parse() {
                self.queue.job_timeout_secs = parsed;
            }
        }
        if let Ok(v) = env::var("COLLOQUY_LOG_LEVEL") {
            self.logging.level = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.queue.job_timeout_secs, 300);
        assert_eq!(config.queue.poll_interval_ms, 500);
        assert_eq!(config.logging.level, "info");
        assert!(config.storage.db_path.ends_with("colloquy.db"));
    }

    #[test]
    fn parses_partial_toml() {
        let config: Config = toml::from_str(
            r#"
[llm]
provider = "anthropic"
api_key = "sk-test"
model = "claude-sonnet-4-5"

[queue]
job_timeout_secs = 60
"#,
        )
        .expect("parse config");

        assert_eq!(config.llm.provider, "anthropic");
        assert_eq!(config.queue.job_timeout_secs, 60);
        // Untouched sections keep defaults.
        assert_eq!(config.queue.poll_interval_ms, 500);
    }
}

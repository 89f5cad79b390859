//! Configuration validation logic.

use super::Config;
use crate::error::ConfigError;

impl Config {
    /// Validate the configuration, returning all errors found (not just
    /// the first).
    pub fn validate(&self) -> Result<(), Vec<ConfigError>> {
        let mut errors = Vec::new();

        if self.storage.db_path.is_empty() {
            errors.push(ConfigError::MissingField {
                field: "storage.db_path".to_string(),
            });
        }

        if !self.llm.provider.is_empty() {
            match self.llm.provider.as_str() {
                "anthropic" | "openai" | "ollama" => {}
                _ => {
                    errors.push(ConfigError::InvalidValue {
                        field: "llm.provider".to_string(),
                        message: "must be anthropic, openai, or ollama".to_string(),
                    });
                }
            }

            if matches!(self.llm.provider.as_str(), "anthropic" | "openai") {
                match &self.llm.api_key {
                    Some(key) if !key.is_empty() => {}
                    _ => {
                        errors.push(ConfigError::MissingField {
                            field: format!(
                                "llm.api_key (required for {} provider)",
                                self.llm.provider
                            ),
                        });
                    }
                }
            }

            if self.llm.model.is_empty() {
                errors.push(ConfigError::MissingField {
                    field: "llm.model".to_string(),
                });
            }
        }

        if self.queue.job_timeout_secs == 0 {
            errors.push(ConfigError::InvalidValue {
                field: "queue.job_timeout_secs".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

//! Error types for the Colloquy core library.
//!
//! Each module has its own error enum to provide clear error boundaries.
//! The library uses `thiserror` for structured, typed errors.

/// Errors related to configuration loading, parsing, and validation.
///
/// Raised at load time and surfaced to the operator; dialogs using a
/// malformed template cannot be created.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required configuration field is absent.
    #[error("missing required config field: {field}")]
    MissingField {
        /// The name of the missing field.
        field: String,
    },

    /// A configuration field has an unacceptable value.
    #[error("invalid value for config field '{field}': {message}")]
    InvalidValue {
        /// The name of the invalid field.
        field: String,
        /// A description of why the value is invalid.
        message: String,
    },

    /// The configuration file does not exist at the specified path.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// The path that was searched.
        path: String,
    },

    /// TOML deserialization failed.
    #[error("failed to parse config file: {source}")]
    ParseError {
        /// The underlying TOML parse error.
        #[source]
        source: toml::de::Error,
    },

    /// A YAML registry or template file could not be parsed.
    #[error("failed to parse {path}: {message}")]
    YamlError {
        /// The file that failed to parse.
        path: String,
        /// A description of the parse failure.
        message: String,
    },

    /// A dialog template failed structural validation.
    #[error("invalid template '{template}': {message}")]
    InvalidTemplate {
        /// The template name.
        template: String,
        /// What is wrong with it.
        message: String,
    },
}

/// Errors from the process-wide registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Lookup failed: no entry under the given name.
    #[error("{kind} not found in registry: {name}")]
    NotFound {
        /// The entry kind (template, prompt, schema, invokable, model).
        kind: &'static str,
        /// The name that was looked up.
        name: String,
    },

    /// A prompt template failed to compile or render.
    #[error("failed to render prompt '{name}': {message}")]
    Render {
        /// The prompt name.
        name: String,
        /// The rendering failure.
        message: String,
    },
}

/// Errors from the SQLite storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Failed to open or configure the database.
    #[error("database connection failed: {source}")]
    Connection {
        /// The underlying sqlx error.
        #[source]
        source: sqlx::Error,
    },

    /// Embedded migrations failed to run.
    #[error("database migration failed: {source}")]
    Migration {
        /// The underlying migration error.
        #[source]
        source: sqlx::migrate::MigrateError,
    },

    /// A query failed.
    #[error("database query failed: {source}")]
    Query {
        /// The underlying sqlx error.
        #[source]
        source: sqlx::Error,
    },

    /// A stored row could not be decoded into its domain type.
    #[error("failed to decode stored row: {message}")]
    Decode {
        /// What failed to decode.
        message: String,
    },

    /// Domain validation failed before write (e.g. assistant message
    /// without a model).
    #[error("validation failed: {message}")]
    Validation {
        /// What is invalid.
        message: String,
    },
}

/// Errors from interacting with LLM providers.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// HTTP request to the LLM endpoint failed.
    #[error("LLM HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// LLM API returned an error response.
    #[error("LLM API error (status {status}): {message}")]
    Api {
        /// The HTTP status code.
        status: u16,
        /// The error message from the API.
        message: String,
    },

    /// LLM provider rate limit hit.
    #[error("LLM rate limited, retry after {retry_after_secs} seconds")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// LLM response could not be parsed.
    #[error("failed to parse LLM response: {0}")]
    Parse(String),

    /// No configured completion service supports the dialog.
    #[error("no completion service supports this dialog")]
    NoProvider,

    /// The dialog has no assistant stub awaiting completion.
    #[error("dialog has no pending assistant message to complete")]
    NoPendingMessage,
}

/// Errors from the durable job queue.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// Queue storage failed.
    #[error("job storage error: {source}")]
    Storage {
        /// The underlying storage error.
        #[source]
        source: StorageError,
    },

    /// A job row carried an unknown name or malformed arguments.
    #[error("malformed job {id}: {message}")]
    Malformed {
        /// The job id.
        id: String,
        /// What is malformed.
        message: String,
    },

    /// Job execution exceeded its timeout.
    #[error("job {id} timed out after {timeout_secs}s")]
    Timeout {
        /// The job id.
        id: String,
        /// The configured timeout.
        timeout_secs: u64,
    },
}

impl From<StorageError> for JobError {
    fn from(source: StorageError) -> Self {
        Self::Storage { source }
    }
}

/// CLI subcommand argument definitions and implementations for Colloquy.
///
/// Each subcommand struct defines its flags and arguments
/// matching the CLI interface contract.
pub mod graph;
pub mod input;
pub mod list;
pub mod run;
pub mod show;
pub mod templates;
pub mod worker;

use clap::Args;

/// Arguments for the `templates` subcommand.
#[derive(Debug, Args)]
pub struct TemplatesArgs {
    /// Also print each template's dependency analysis
    #[arg(long)]
    pub analyze: bool,
}

/// Arguments for the `run` subcommand.
#[derive(Debug, Args)]
pub struct RunArgs {
    /// Template name to instantiate
    pub template: String,

    /// Initial variables as key=value pairs
    #[arg(long = "var", value_name = "KEY=VALUE")]
    pub vars: Vec<String>,

    /// Dialog description override
    #[arg(long)]
    pub description: Option<String>,

    /// Enqueue the run instead of executing inline
    #[arg(long)]
    pub detach: bool,
}

/// Arguments for the `list` subcommand.
#[derive(Debug, Args)]
pub struct ListArgs {
    /// Only dialogs in these statuses (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub status: Vec<String>,

    /// Maximum dialogs to show
    #[arg(long, default_value = "20")]
    pub limit: i64,
}

/// Arguments for the `show` subcommand.
#[derive(Debug, Args)]
pub struct ShowArgs {
    /// Dialog id
    pub dialog_id: uuid::Uuid,
}

/// Arguments for the `input` subcommand.
#[derive(Debug, Args)]
pub struct InputArgs {
    /// Dialog id
    pub dialog_id: uuid::Uuid,

    /// Raw input text (for user_input steps)
    pub text: Option<String>,

    /// Variable values as key=value pairs (for missing prompt variables)
    #[arg(long = "var", value_name = "KEY=VALUE")]
    pub vars: Vec<String>,
}

/// Arguments for the `worker` subcommand.
#[derive(Debug, Args)]
pub struct WorkerArgs {
    /// Exit after draining the queue once
    #[arg(long)]
    pub once: bool,
}

/// Arguments for the `graph` subcommand.
#[derive(Debug, Args)]
pub struct GraphArgs {
    /// Dialog id
    pub dialog_id: uuid::Uuid,
}

/// Parse `key=value` pairs into a JSON variable map.
pub(crate) fn parse_vars(
    pairs: &[String],
) -> anyhow::Result<serde_json::Map<String, serde_json::Value>> {
    let mut map = serde_json::Map::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            anyhow::bail!("invalid --var '{pair}', expected KEY=VALUE");
        };
        map.insert(
            key.to_string(),
            serde_json::Value::String(value.to_string()),
        );
    }
    Ok(map)
}

/// Colloquy CLI - dialog workflow engine.
///
/// Entry point for the colloquy binary. Parses CLI arguments,
/// initializes logging, and dispatches to subcommand handlers.
mod commands;

use clap::Parser;
use colloquy_core::config::Config;
use tracing_subscriber::EnvFilter;

/// Dialog workflow engine
#[derive(Parser)]
#[command(name = "colloquy")]
#[command(version)]
#[command(about = "Run declarative, resumable dialog workflows")]
#[command(after_help = "\
Quick start:
  1. colloquy templates           — list loaded dialog templates
  2. colloquy run <template>      — create a dialog and run it
  3. colloquy input <id> <text>   — resume a waiting dialog
  4. colloquy worker              — drain the job queue")]
struct Cli {
    /// Path to config.toml
    #[arg(
        short = 'c',
        long,
        global = true,
        default_value = "~/.colloquy/config.toml"
    )]
    config: String,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// List loaded dialog templates
    Templates(commands::TemplatesArgs),
    /// Create a dialog from a template and run it
    Run(commands::RunArgs),
    /// List recent dialogs
    List(commands::ListArgs),
    /// Show a dialog's transcript and state
    Show(commands::ShowArgs),
    /// Provide input to a waiting dialog
    Input(commands::InputArgs),
    /// Run the job queue worker
    Worker(commands::WorkerArgs),
    /// Print a dialog's state machine as DOT
    Graph(commands::GraphArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Priority: RUST_LOG env var > --verbose/--quiet flags > default.
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("colloquy=debug,colloquy_core=debug,info")
    } else if cli.quiet {
        EnvFilter::new("error")
    } else {
        EnvFilter::new("colloquy=info,colloquy_core=info,warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Templates(args) => commands::templates::execute(config, args).await,
        Commands::Run(args) => commands::run::execute(config, args).await,
        Commands::List(args) => commands::list::execute(config, args).await,
        Commands::Show(args) => commands::show::execute(config, args).await,
        Commands::Input(args) => commands::input::execute(config, args).await,
        Commands::Worker(args) => commands::worker::execute(config, args).await,
        Commands::Graph(args) => commands::graph::execute(config, args).await,
    }
}

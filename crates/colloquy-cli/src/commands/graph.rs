//! Implementation of the `colloquy graph` command.

use colloquy_core::config::Config;
use colloquy_core::startup::AppContext;
use colloquy_core::workflow::graph;

use super::GraphArgs;

/// Execute the `colloquy graph` command. Prints DOT to stdout for
/// piping into a renderer.
pub async fn execute(config: Config, args: GraphArgs) -> anyhow::Result<()> {
    let ctx = AppContext::init(config).await?;

    let Some(dialog) = ctx.service.get_dialog(args.dialog_id).await? else {
        eprintln!("Dialog {} not found.", args.dialog_id);
        ctx.shutdown().await;
        return Ok(());
    };

    println!("{}", graph::to_dot(&dialog));

    ctx.shutdown().await;
    Ok(())
}

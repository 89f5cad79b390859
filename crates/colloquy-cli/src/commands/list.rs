//! Implementation of the `colloquy list` command.

use std::str::FromStr;

use colloquy_core::config::Config;
use colloquy_core::dialog::DialogStatus;
use colloquy_core::startup::AppContext;
use colloquy_core::storage::dialogs;

use super::ListArgs;

/// Execute the `colloquy list` command.
pub async fn execute(config: Config, args: ListArgs) -> anyhow::Result<()> {
    let ctx = AppContext::init(config).await?;

    let found = if args.status.is_empty() {
        dialogs::get_recent(&ctx.pool, args.limit).await?
    } else {
        let statuses: Vec<DialogStatus> = args
            .status
            .iter()
            .map(|s| DialogStatus::from_str(s).map_err(|e| anyhow::anyhow!(e)))
            .collect::<anyhow::Result<_>>()?;
        dialogs::filter_by_status(&ctx.pool, &statuses).await?
    };

    if found.is_empty() {
        eprintln!("No dialogs.");
    }
    for dialog in found {
        eprintln!(
            "{} | {:<17} | {:<8} | {} | {}",
            dialog.id,
            dialog.status.as_str(),
            dialog.current_state,
            dialog.template.name,
            dialog.description.as_deref().unwrap_or("-"),
        );
    }

    ctx.shutdown().await;
    Ok(())
}

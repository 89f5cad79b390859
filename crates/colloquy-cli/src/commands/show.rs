//! Implementation of the `colloquy show` command.

use colloquy_core::config::Config;
use colloquy_core::startup::AppContext;
use colloquy_core::storage::llm_usage;

use super::ShowArgs;

/// Execute the `colloquy show` command.
pub async fn execute(config: Config, args: ShowArgs) -> anyhow::Result<()> {
    let ctx = AppContext::init(config).await?;

    let Some(dialog) = ctx.service.get_dialog(args.dialog_id).await? else {
        eprintln!("Dialog {} not found.", args.dialog_id);
        ctx.shutdown().await;
        return Ok(());
    };

    eprintln!("Dialog:   {}", dialog.id);
    eprintln!("Template: {}", dialog.template.name);
    eprintln!("Status:   {}", dialog.status.as_str());
    eprintln!("State:    {}", dialog.current_state);
    eprintln!("Step:     {}", dialog.workflow_data.current_step_index);
    if let Some(error) = &dialog.error {
        eprintln!("Error:    {error}");
    }
    if !dialog.workflow_data.missing_variables.is_empty() {
        eprintln!("Missing:  {:?}", dialog.workflow_data.missing_variables);
    }

    eprintln!();
    for message in &dialog.messages {
        eprintln!(
            "[{} | {}] {}",
            message.role.as_str(),
            message.status.as_str(),
            message.text,
        );
    }

    let usage = llm_usage::totals_for_dialog(&ctx.pool, dialog.id).await?;
    if usage.input_tokens > 0 || usage.output_tokens > 0 {
        eprintln!();
        eprintln!(
            "Tokens: {} in / {} out",
            usage.input_tokens, usage.output_tokens
        );
    }

    ctx.shutdown().await;
    Ok(())
}

//! Implementation of the `colloquy input` command.
//!
//! Provides input to a waiting dialog, then continues the run inline.

use colloquy_core::config::Config;
use colloquy_core::startup::AppContext;
use colloquy_core::workflow::UserInput;

use super::{parse_vars, InputArgs};

/// Execute the `colloquy input` command.
pub async fn execute(config: Config, args: InputArgs) -> anyhow::Result<()> {
    let ctx = AppContext::init(config).await?;

    let input = if args.vars.is_empty() {
        UserInput::Text(args.text.unwrap_or_default())
    } else {
        UserInput::Variables(parse_vars(&args.vars)?)
    };

    let result = ctx.service.provide_user_input(args.dialog_id, input).await?;
    if !result.success && !result.waiting_for_input {
        eprintln!(
            "Input rejected: {}",
            result.message.as_deref().unwrap_or("unknown reason")
        );
        ctx.shutdown().await;
        return Ok(());
    }

    // Continue to the next suspension or completion.
    let outcome = ctx.service.run_workflow_by_id(args.dialog_id).await?;

    if let Some(dialog) = ctx.service.get_dialog(args.dialog_id).await? {
        eprintln!("Status: {}", dialog.status.as_str());
        eprintln!("State:  {}", dialog.current_state);
        if outcome.waiting_for_input {
            eprintln!("Still waiting for: {:?}", dialog.workflow_data.missing_variables);
        }
    }

    ctx.shutdown().await;
    Ok(())
}

//! Implementation of the `colloquy run` command.
//!
//! Creates a dialog from a named template and either runs it inline,
//! printing the outcome, or enqueues it for the worker.

use colloquy_core::config::Config;
use colloquy_core::startup::AppContext;

use super::{parse_vars, RunArgs};

/// Execute the `colloquy run` command.
pub async fn execute(config: Config, args: RunArgs) -> anyhow::Result<()> {
    let ctx = AppContext::init(config).await?;

    let template = ctx.registry.get_template(&args.template)?.clone();
    let initial_data = parse_vars(&args.vars)?;

    let mut dialog = ctx
        .service
        .create_dialog_from_template(
            &template,
            args.description,
            None,
            if initial_data.is_empty() {
                None
            } else {
                Some(initial_data)
            },
        )
        .await?;

    eprintln!("Created dialog {} from template '{}'", dialog.id, template.name);

    if args.detach {
        let job_id = ctx.queue.enqueue_run_workflow(dialog.id).await?;
        eprintln!("Enqueued job {job_id}; run `colloquy worker` to execute.");
        ctx.shutdown().await;
        return Ok(());
    }

    let result = ctx.service.run_workflow(&mut dialog).await?;

    eprintln!();
    eprintln!("Status: {}", dialog.status.as_str());
    eprintln!("State:  {}", dialog.current_state);
    if result.waiting_for_input {
        eprintln!(
            "Waiting for input: {:?}",
            if result.required_variables.is_empty() {
                dialog.workflow_data.missing_variables.clone()
            } else {
                result.required_variables.clone()
            }
        );
        eprintln!("Resume with: colloquy input {} ...", dialog.id);
    }
    for message in &dialog.messages {
        eprintln!("[{}] {}", message.role.as_str(), message.text);
    }
    if let Some(error) = &dialog.error {
        eprintln!("Error: {error}");
    }

    ctx.shutdown().await;
    Ok(())
}

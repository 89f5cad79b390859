//! Implementation of the `colloquy templates` command.

use colloquy_core::config::Config;
use colloquy_core::startup::AppContext;
use colloquy_core::workflow::requirements;

use super::TemplatesArgs;

/// Execute the `colloquy templates` command.
pub async fn execute(config: Config, args: TemplatesArgs) -> anyhow::Result<()> {
    let ctx = AppContext::init(config).await?;

    let templates = ctx.registry.list_templates();
    if templates.is_empty() {
        eprintln!("No templates loaded. Check [registry] config_path.");
    }

    for template in templates {
        eprintln!(
            "{:<24} | {:<24} | {} step(s) | {}",
            template.name,
            template.model,
            template.enabled_steps().len(),
            template.description.as_deref().unwrap_or("-"),
        );

        if args.analyze {
            let report = requirements::analyze(&ctx.registry, template);
            if report.missing_inputs.is_empty() {
                eprintln!("    all step inputs satisfied");
            }
            for (step, inputs) in &report.missing_inputs {
                let names: Vec<&str> = inputs.keys().map(String::as_str).collect();
                eprintln!("    {step}: needs {names:?} before run");
            }
        }
    }

    ctx.shutdown().await;
    Ok(())
}

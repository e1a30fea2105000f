use anyhow::Result;
use clap::Subcommand;

use crate::cli::output::{OutputFormat, OutputOptions};
use crate::cli::Context;
use tierprice::core::remote::SettingsClient;

#[derive(Subcommand, Debug)]
pub enum SyncAction {
    /// Download the remote tier pricing and overwrite the local snapshot
    Pull,
    /// Upload the local snapshot, replacing the remote tier pricing
    Push,
}

pub async fn run(ctx: &Context, action: &SyncAction, opts: &OutputOptions) -> Result<()> {
    let client = SettingsClient::from_config(&ctx.app.remote)?;
    match action {
        SyncAction::Pull => {
            let pulled = client.pull().await?;
            for issue in pulled.validate() {
                tracing::warn!("{}", issue);
            }
            ctx.save_snapshot(&pulled)?;
            match opts.format {
                OutputFormat::Text => println!(
                    "Pulled {} tier config{} into {}",
                    pulled.model_configs.len(),
                    if pulled.model_configs.len() == 1 { "" } else { "s" },
                    ctx.pricing_path.display()
                ),
                OutputFormat::Json => opts.print_json(&pulled)?,
            }
        }
        SyncAction::Push => {
            let local = ctx.snapshot()?;
            let issues = local.validate();
            if !issues.is_empty() {
                eprintln!("Refusing to push, tier pricing has issues:");
                for issue in &issues {
                    eprintln!("  - {}", issue);
                }
                std::process::exit(1);
            }
            client.push(&local).await?;
            if opts.format == OutputFormat::Text {
                println!(
                    "Pushed {} tier config{} from {}",
                    local.model_configs.len(),
                    if local.model_configs.len() == 1 { "" } else { "s" },
                    ctx.pricing_path.display()
                );
            } else {
                opts.print_json(&local)?;
            }
        }
    }
    Ok(())
}

mod cli;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::Level;

use cli::convert_cmd::ConvertAction;
use cli::price_cmd::QueryArgs;
use cli::sync_cmd::SyncAction;
use cli::tier_cmd::{RuleAction, TierConfigAction};
use tierprice::core::pricing::units::TokenUnit;

#[derive(Parser)]
#[command(name = "tierprice", about = "Tiered token pricing CLI", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(short, long, global = true)]
    format: Option<String>,

    /// Shorthand for --format json
    #[arg(short = 'j', long = "json", global = true)]
    json: bool,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,

    /// Disable ANSI colors
    #[arg(long, global = true)]
    no_color: bool,

    /// Verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (default: $XDG_CONFIG_HOME/tierprice/config.toml)
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_file: Option<PathBuf>,

    /// Tier pricing snapshot (default: pricing.file or pricing.json next to the config)
    #[arg(long, global = true, value_name = "PATH")]
    pricing: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show a model's effective price for a group
    Price(QueryArgs),
    /// Show the tier rules that apply to a model
    Tiers {
        model: String,
        /// Display unit (K or M)
        #[arg(short, long)]
        unit: Option<TokenUnit>,
    },
    /// Show a model's price for every group
    Groups(QueryArgs),
    /// Compute the quota charged for a request under its tier rule
    Cost(QueryArgs),
    /// Convert between ratios and USD prices
    Convert {
        #[command(subcommand)]
        action: ConvertAction,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Manage tier configs
    TierConfig {
        #[command(subcommand)]
        action: TierConfigAction,
    },
    /// Manage the rules of a tier config
    Rule {
        #[command(subcommand)]
        action: RuleAction,
    },
    /// Pull or push tier pricing through the gateway settings API
    Sync {
        #[command(subcommand)]
        action: SyncAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Generate default config file
    Init,
    /// Validate the config file and the tier pricing snapshot
    Check,
    /// Print the effective config
    Show,
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let loaded = cli::Context::load(cli.config_file.as_deref(), cli.pricing.as_deref());
    let settings = loaded
        .as_ref()
        .map(|ctx| ctx.app.settings.clone())
        .unwrap_or_default();
    let output_opts = cli::output::OutputOptions::resolve(
        cli.format.as_deref(),
        cli.json,
        cli.pretty,
        cli.no_color,
        cli.verbose,
        &settings,
    );

    // `config check` reports a config that fails to load instead of aborting.
    let ctx = match loaded {
        Ok(ctx) => ctx,
        Err(_)
            if matches!(
                cli.command,
                Commands::Config {
                    action: ConfigAction::Check
                }
            ) =>
        {
            return cli::config_cmd::check(
                cli.config_file.as_deref(),
                cli.pricing.as_deref(),
                &output_opts,
            );
        }
        Err(e) => return Err(e),
    };

    match &cli.command {
        Commands::Price(args) => cli::price_cmd::price(&ctx, args, &output_opts)?,
        Commands::Tiers { model, unit } => {
            cli::price_cmd::tiers(&ctx, model, *unit, &output_opts)?
        }
        Commands::Groups(args) => cli::price_cmd::groups(&ctx, args, &output_opts)?,
        Commands::Cost(args) => cli::price_cmd::cost(&ctx, args, &output_opts)?,
        Commands::Convert { action } => cli::convert_cmd::run(&ctx, action, &output_opts)?,
        Commands::Config { action } => match action {
            ConfigAction::Init => cli::config_cmd::init(&ctx, &output_opts)?,
            ConfigAction::Check => cli::config_cmd::check(
                cli.config_file.as_deref(),
                cli.pricing.as_deref(),
                &output_opts,
            )?,
            ConfigAction::Show => cli::config_cmd::show(&ctx, &output_opts)?,
        },
        Commands::TierConfig { action } => {
            cli::tier_cmd::run_config(&ctx, action, &output_opts)?
        }
        Commands::Rule { action } => cli::tier_cmd::run_rule(&ctx, action, &output_opts)?,
        Commands::Sync { action } => cli::sync_cmd::run(&ctx, action, &output_opts).await?,
    }

    Ok(())
}

use anyhow::{Context as _, Result};
use clap::{Args, Subcommand, ValueEnum};
use tracing::warn;

use crate::cli::output::{OutputFormat, OutputOptions};
use crate::cli::renderer;
use crate::cli::Context;
use tierprice::core::editor::{DraftPricing, MoveDirection, RuleDraft};
use tierprice::core::models::tier::{TokenBounds, TokenTierPricingConfig};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Switch {
    On,
    Off,
}

#[derive(Subcommand, Debug)]
pub enum TierConfigAction {
    /// List tier configs, highest priority first
    List,
    /// Show one config's rules with token ranges and equivalent prices
    Show { name: String },
    /// Add a config with the default four-tier rules
    Add {
        name: String,
        /// Comma-separated model patterns; a trailing `*` matches a prefix
        #[arg(short, long)]
        models: String,
        /// Start without rules instead of the default template
        #[arg(long)]
        empty: bool,
    },
    /// Copy a config to `<name>_copy` with a higher priority
    Copy { name: String },
    /// Delete a config
    Remove { name: String },
    /// Enable a config
    Enable { name: String },
    /// Disable a config
    Disable { name: String },
    /// Set a config's priority (larger is tried first)
    Priority {
        name: String,
        #[arg(allow_negative_numbers = true)]
        priority: i64,
    },
    /// Replace a config's model patterns
    Models { name: String, models: String },
    /// Turn tiered pricing on or off globally
    Global {
        #[arg(value_enum)]
        state: Switch,
    },
}

/// Rule fields. Unset fields keep their current value when editing.
#[derive(Args, Debug, Default)]
pub struct RuleArgs {
    /// Rule name, unique within the config
    #[arg(long)]
    pub name: Option<String>,
    /// Minimum input tokens (0 = no minimum)
    #[arg(long)]
    pub min_input: Option<u64>,
    /// Maximum input tokens (0 = no maximum)
    #[arg(long)]
    pub max_input: Option<u64>,
    /// Minimum output tokens (0 = no minimum)
    #[arg(long)]
    pub min_output: Option<u64>,
    /// Maximum output tokens (0 = no maximum)
    #[arg(long)]
    pub max_output: Option<u64>,
    /// Input ratio
    #[arg(long, conflicts_with_all = ["input_price", "output_price"])]
    pub ratio: Option<f64>,
    /// Completion ratio (output = input ratio x completion)
    #[arg(long, conflicts_with_all = ["input_price", "output_price"])]
    pub completion: Option<f64>,
    /// Output ratio, overriding input ratio x completion
    #[arg(long, conflicts_with_all = ["input_price", "output_price"])]
    pub output_ratio: Option<f64>,
    /// Input price in USD per 1M tokens
    #[arg(long)]
    pub input_price: Option<f64>,
    /// Output price in USD per 1M tokens
    #[arg(long)]
    pub output_price: Option<f64>,
    /// Store the given prices as the equivalent ratios
    #[arg(long, requires = "input_price")]
    pub as_ratio: bool,
}

impl RuleArgs {
    /// Apply the given fields on top of `draft`.
    fn apply(&self, draft: RuleDraft) -> RuleDraft {
        let bounds = TokenBounds {
            min_input: self.min_input.unwrap_or(draft.bounds.min_input),
            max_input: self.max_input.unwrap_or(draft.bounds.max_input),
            min_output: self.min_output.unwrap_or(draft.bounds.min_output),
            max_output: self.max_output.unwrap_or(draft.bounds.max_output),
        };

        let pricing = if self.input_price.is_some() || self.output_price.is_some() {
            let (input_price, output_price) = match draft.pricing {
                DraftPricing::Price {
                    input_price,
                    output_price,
                    ..
                } => (input_price, output_price),
                DraftPricing::Ratio { .. } => (0.0, 0.0),
            };
            DraftPricing::Price {
                input_price: self.input_price.unwrap_or(input_price),
                output_price: self.output_price.unwrap_or(output_price),
                store_as_ratio: self.as_ratio,
            }
        } else if self.ratio.is_some() || self.completion.is_some() || self.output_ratio.is_some()
        {
            let (input_ratio, completion_ratio, output_ratio) = match draft.pricing {
                DraftPricing::Ratio {
                    input_ratio,
                    completion_ratio,
                    output_ratio,
                } => (input_ratio, completion_ratio, output_ratio),
                DraftPricing::Price { .. } => (1.0, 1.0, None),
            };
            // A new input or completion ratio drops a stale output override.
            let output_ratio = match self.output_ratio {
                Some(ratio) => Some(ratio),
                None if self.ratio.is_some() || self.completion.is_some() => None,
                None => output_ratio,
            };
            DraftPricing::Ratio {
                input_ratio: self.ratio.unwrap_or(input_ratio),
                completion_ratio: self.completion.unwrap_or(completion_ratio),
                output_ratio,
            }
        } else {
            draft.pricing
        };

        RuleDraft {
            name: self.name.clone().unwrap_or(draft.name),
            bounds,
            pricing,
        }
    }
}

fn blank_draft() -> RuleDraft {
    RuleDraft {
        name: String::new(),
        bounds: TokenBounds::default(),
        pricing: DraftPricing::Ratio {
            input_ratio: 1.0,
            completion_ratio: 1.0,
            output_ratio: None,
        },
    }
}

#[derive(Subcommand, Debug)]
pub enum RuleAction {
    /// Append a rule to a config
    Add {
        config: String,
        #[command(flatten)]
        fields: RuleArgs,
    },
    /// Change fields of an existing rule
    Edit {
        config: String,
        rule: String,
        #[command(flatten)]
        fields: RuleArgs,
    },
    /// Delete a rule
    Remove { config: String, rule: String },
    /// Move a rule one place earlier
    Up { config: String, rule: String },
    /// Move a rule one place later
    Down { config: String, rule: String },
    /// Replace a config's rules with the default four-tier template
    Defaults { config: String },
}

/// Persist the edited snapshot and report it.
fn commit(
    ctx: &Context,
    next: &TokenTierPricingConfig,
    message: String,
    opts: &OutputOptions,
) -> Result<()> {
    ctx.save_snapshot(next)?;
    for issue in next.validate() {
        warn!("{}", issue);
    }
    match opts.format {
        OutputFormat::Text => println!("{}", message),
        OutputFormat::Json => opts.print_json(next)?,
    }
    Ok(())
}

pub fn run_config(ctx: &Context, action: &TierConfigAction, opts: &OutputOptions) -> Result<()> {
    let current = ctx.snapshot()?;
    let (next, message) = match action {
        TierConfigAction::List => {
            match opts.format {
                OutputFormat::Text => {
                    println!("{}", renderer::render_config_list(&current, opts.use_color))
                }
                OutputFormat::Json => opts.print_json(&current)?,
            }
            return Ok(());
        }
        TierConfigAction::Show { name } => {
            let config = current
                .model_configs
                .get(name)
                .with_context(|| format!("Config '{}' not found", name))?;
            match opts.format {
                OutputFormat::Text => println!(
                    "{}",
                    renderer::render_rule_editor(name, config, ctx.app.basis(), opts.use_color)
                ),
                OutputFormat::Json => opts.print_json(config)?,
            }
            return Ok(());
        }
        TierConfigAction::Add {
            name,
            models,
            empty,
        } => {
            let rules = if *empty { Some(Vec::new()) } else { None };
            let next = current.with_added_config(name, models, rules)?;
            let priority = next
                .model_configs
                .get(name.trim())
                .map(|c| c.priority)
                .unwrap_or_default();
            (next, format!("Added config: {} (priority {})", name.trim(), priority))
        }
        TierConfigAction::Copy { name } => {
            let (next, copy) = current.with_copied_config(name)?;
            (next, format!("Copied config {} to {}", name, copy))
        }
        TierConfigAction::Remove { name } => (
            current.without_config(name)?,
            format!("Removed config: {}", name),
        ),
        TierConfigAction::Enable { name } => (
            current.with_config_enabled(name, true)?,
            format!("Enabled config: {}", name),
        ),
        TierConfigAction::Disable { name } => (
            current.with_config_enabled(name, false)?,
            format!("Disabled config: {}", name),
        ),
        TierConfigAction::Priority { name, priority } => (
            current.with_priority(name, *priority)?,
            format!("Set priority of {} to {}", name, priority),
        ),
        TierConfigAction::Models { name, models } => {
            let next = current.with_models(name, models)?;
            let message = match next.model_configs.get(name) {
                Some(c) => format!("Models of {}: {}", name, c.models),
                None => format!("Updated models of {}", name),
            };
            (next, message)
        }
        TierConfigAction::Global { state } => {
            let enabled = *state == Switch::On;
            (
                current.with_global_enabled(enabled),
                format!(
                    "Tiered pricing globally {}",
                    if enabled { "enabled" } else { "disabled" }
                ),
            )
        }
    };
    commit(ctx, &next, message, opts)
}

pub fn run_rule(ctx: &Context, action: &RuleAction, opts: &OutputOptions) -> Result<()> {
    let current = ctx.snapshot()?;
    let basis = ctx.app.basis();
    let (next, message) = match action {
        RuleAction::Add { config, fields } => {
            let draft = fields.apply(blank_draft());
            let name = draft.name.trim().to_string();
            (
                current.with_rule(config, None, draft, basis)?,
                format!("Added rule {} to {}", name, config),
            )
        }
        RuleAction::Edit {
            config,
            rule,
            fields,
        } => {
            let existing = current
                .model_configs
                .get(config)
                .and_then(|c| c.rules.iter().find(|r| &r.name == rule))
                .with_context(|| format!("Rule '{}' not found in config '{}'", rule, config))?;
            let draft = fields.apply(RuleDraft::from(existing));
            (
                current.with_rule_replaced(config, rule, draft, basis)?,
                format!("Updated rule {} in {}", rule, config),
            )
        }
        RuleAction::Remove { config, rule } => (
            current.without_rule(config, rule)?,
            format!("Removed rule {} from {}", rule, config),
        ),
        RuleAction::Up { config, rule } => (
            current.with_rule_moved(config, rule, MoveDirection::Up)?,
            format!("Moved rule {} up in {}", rule, config),
        ),
        RuleAction::Down { config, rule } => (
            current.with_rule_moved(config, rule, MoveDirection::Down)?,
            format!("Moved rule {} down in {}", rule, config),
        ),
        RuleAction::Defaults { config } => (
            current.with_default_rules(config)?,
            format!("Reset {} to the default rules", config),
        ),
    };
    commit(ctx, &next, message, opts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn existing_ratio() -> RuleDraft {
        RuleDraft {
            name: "T1".to_string(),
            bounds: TokenBounds {
                max_input: 32_000,
                ..TokenBounds::default()
            },
            pricing: DraftPricing::Ratio {
                input_ratio: 0.4,
                completion_ratio: 1.5,
                output_ratio: None,
            },
        }
    }

    #[test]
    fn empty_args_keep_the_draft() {
        let draft = RuleArgs::default().apply(existing_ratio());
        assert_eq!(draft, existing_ratio());
    }

    #[test]
    fn bounds_and_name_override_individually() {
        let args = RuleArgs {
            name: Some("short".to_string()),
            min_output: Some(201),
            ..RuleArgs::default()
        };
        let draft = args.apply(existing_ratio());
        assert_eq!(draft.name, "short");
        assert_eq!(draft.bounds.max_input, 32_000);
        assert_eq!(draft.bounds.min_output, 201);
    }

    #[test]
    fn completion_alone_keeps_input_ratio() {
        let args = RuleArgs {
            completion: Some(2.0),
            ..RuleArgs::default()
        };
        let draft = args.apply(existing_ratio());
        assert_eq!(
            draft.pricing,
            DraftPricing::Ratio {
                input_ratio: 0.4,
                completion_ratio: 2.0,
                output_ratio: None
            }
        );
    }

    #[test]
    fn prices_switch_a_ratio_rule_to_price_mode() {
        let args = RuleArgs {
            input_price: Some(1.0),
            as_ratio: true,
            ..RuleArgs::default()
        };
        let draft = args.apply(existing_ratio());
        assert_eq!(
            draft.pricing,
            DraftPricing::Price {
                input_price: 1.0,
                output_price: 0.0,
                store_as_ratio: true
            }
        );
    }

    #[test]
    fn blank_draft_defaults_to_unit_ratio() {
        let args = RuleArgs {
            name: Some("all".to_string()),
            ..RuleArgs::default()
        };
        let draft = args.apply(blank_draft());
        assert!(draft.bounds.is_unbounded());
        assert_eq!(
            draft.pricing,
            DraftPricing::Ratio {
                input_ratio: 1.0,
                completion_ratio: 1.0,
                output_ratio: None
            }
        );
    }

    fn with_output_override() -> RuleDraft {
        RuleDraft {
            pricing: DraftPricing::Ratio {
                input_ratio: 1.0,
                completion_ratio: 4.0,
                output_ratio: Some(0.5),
            },
            ..existing_ratio()
        }
    }

    #[test]
    fn bounds_only_edit_keeps_output_ratio() {
        let args = RuleArgs {
            max_input: Some(64_000),
            ..RuleArgs::default()
        };
        let draft = args.apply(with_output_override());
        assert_eq!(draft.bounds.max_input, 64_000);
        assert_eq!(draft.pricing, with_output_override().pricing);
    }

    #[test]
    fn new_completion_clears_output_ratio_unless_given() {
        let args = RuleArgs {
            completion: Some(2.0),
            ..RuleArgs::default()
        };
        let draft = args.apply(with_output_override());
        assert_eq!(
            draft.pricing,
            DraftPricing::Ratio {
                input_ratio: 1.0,
                completion_ratio: 2.0,
                output_ratio: None
            }
        );

        let args = RuleArgs {
            output_ratio: Some(0.75),
            ..RuleArgs::default()
        };
        let draft = args.apply(with_output_override());
        assert_eq!(
            draft.pricing,
            DraftPricing::Ratio {
                input_ratio: 1.0,
                completion_ratio: 4.0,
                output_ratio: Some(0.75)
            }
        );
    }
}

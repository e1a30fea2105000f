use anyhow::{bail, Context as _, Result};
use clap::Args;
use serde::Serialize;

use crate::cli::output::{OutputFormat, OutputOptions};
use crate::cli::renderer;
use crate::cli::Context;
use tierprice::core::models::model::{lookup_group_ratio, ModelPriceRecord, QuotaType};
use tierprice::core::models::price::{
    EffectivePrice, FormattedTierPrice, GroupPriceRow, TierPrice, TierPriceResult, TokenCounts,
};
use tierprice::core::models::tier::ModelTierConfig;
use tierprice::core::pricing::quota::{self, QuotaCharge};
use tierprice::core::pricing::resolver::TieredPricingResolver;
use tierprice::core::pricing::units::TokenUnit;

#[derive(Args, Debug)]
pub struct QueryArgs {
    /// Model name
    pub model: String,

    /// User group whose ratio applies
    #[arg(short, long, default_value = "default")]
    pub group: String,

    /// Input tokens of the request used to pick a tier rule
    #[arg(short, long, default_value_t = 0)]
    pub input: u64,

    /// Output tokens of the request used to pick a tier rule
    #[arg(short, long, default_value_t = 0)]
    pub output: u64,

    /// Display unit (K or M); defaults to settings.token_unit
    #[arg(short, long)]
    pub unit: Option<TokenUnit>,
}

impl QueryArgs {
    fn tokens(&self) -> TokenCounts {
        TokenCounts::new(self.input, self.output)
    }

    fn unit(&self, ctx: &Context) -> TokenUnit {
        self.unit.unwrap_or(ctx.app.settings.token_unit)
    }
}

#[derive(Serialize)]
struct PricePayload<'a> {
    model: &'a str,
    group: &'a str,
    group_ratio: f64,
    unit: TokenUnit,
    price: EffectivePrice,
    #[serde(skip_serializing_if = "Option::is_none")]
    formatted: Option<FormattedTierPrice>,
}

#[derive(Serialize)]
struct TiersPayload<'a> {
    model: &'a str,
    config_name: Option<&'a str>,
    config: Option<&'a ModelTierConfig>,
}

#[derive(Serialize)]
struct GroupsPayload<'a> {
    model: &'a str,
    unit: TokenUnit,
    groups: Vec<GroupPriceRow>,
}

#[derive(Serialize)]
struct CostPayload<'a> {
    model: &'a str,
    group: &'a str,
    group_ratio: f64,
    tokens: TokenCounts,
    tier: TierPriceResult,
    charge: QuotaCharge,
}

/// Flat pricing of `model`. Models only known through a tier config get a
/// zero-priced metered record, so they resolve purely through their tiers.
fn model_record(
    ctx: &Context,
    resolver: &TieredPricingResolver<'_>,
    model: &str,
    tokens: TokenCounts,
) -> Result<ModelPriceRecord> {
    if let Some(record) = ctx.app.find_model(model) {
        return Ok(record.clone());
    }
    if resolver.resolve(model, tokens).is_none() {
        bail!(
            "Unknown model '{}': add it under [[models]] in {} or to a tier config",
            model,
            ctx.config_path.display()
        );
    }
    Ok(ModelPriceRecord {
        model_name: model.to_string(),
        quota_type: QuotaType::Metered,
        model_ratio: 0.0,
        completion_ratio: 1.0,
        model_price: 0.0,
        enable_groups: Vec::new(),
    })
}

fn formatted(price: &EffectivePrice) -> Option<FormattedTierPrice> {
    match *price {
        EffectivePrice::Tiered { input, output, .. } | EffectivePrice::Metered { input, output } => {
            Some(TierPrice { input, output }.formatted())
        }
        EffectivePrice::PerCall { .. } => None,
    }
}

pub fn price(ctx: &Context, args: &QueryArgs, opts: &OutputOptions) -> Result<()> {
    let snapshot = ctx.snapshot()?;
    let resolver = TieredPricingResolver::new(&snapshot, ctx.app.basis());
    let unit = args.unit(ctx);
    let tokens = args.tokens();
    let record = model_record(ctx, &resolver, &args.model, tokens)?;
    let group_ratio = lookup_group_ratio(&ctx.app.group_ratios, &args.group);
    let price = resolver.compute_effective_price(&record, group_ratio, unit, tokens);

    match opts.format {
        OutputFormat::Text => println!(
            "{}",
            renderer::render_effective_price(
                &args.model,
                &args.group,
                group_ratio,
                &price,
                unit,
                opts.use_color
            )
        ),
        OutputFormat::Json => opts.print_json(&PricePayload {
            model: &args.model,
            group: &args.group,
            group_ratio,
            unit,
            formatted: formatted(&price),
            price,
        })?,
    }
    Ok(())
}

pub fn tiers(ctx: &Context, model: &str, unit: Option<TokenUnit>, opts: &OutputOptions) -> Result<()> {
    let snapshot = ctx.snapshot()?;
    let resolver = TieredPricingResolver::new(&snapshot, ctx.app.basis());
    let unit = unit.unwrap_or(ctx.app.settings.token_unit);
    let matched = resolver.find_config(model);

    match opts.format {
        OutputFormat::Text => match matched {
            Some(m) => println!(
                "{}",
                renderer::render_tier_rules(m.name, m.config, unit, opts.use_color)
            ),
            None if !snapshot.global_enabled => {
                eprintln!("Tiered pricing is globally disabled.")
            }
            None => eprintln!("No enabled tier config lists '{}'.", model),
        },
        OutputFormat::Json => opts.print_json(&TiersPayload {
            model,
            config_name: matched.map(|m| m.name),
            config: matched.map(|m| m.config),
        })?,
    }
    Ok(())
}

pub fn groups(ctx: &Context, args: &QueryArgs, opts: &OutputOptions) -> Result<()> {
    let snapshot = ctx.snapshot()?;
    let resolver = TieredPricingResolver::new(&snapshot, ctx.app.basis());
    let unit = args.unit(ctx);
    let record = model_record(ctx, &resolver, &args.model, args.tokens())?;
    let rows = resolver.group_prices(&record, &ctx.app.group_ratios, unit, args.tokens());

    match opts.format {
        OutputFormat::Text => println!(
            "{}",
            renderer::render_group_table(&args.model, &rows, unit, opts.use_color)
        ),
        OutputFormat::Json => opts.print_json(&GroupsPayload {
            model: &args.model,
            unit,
            groups: rows,
        })?,
    }
    Ok(())
}

pub fn cost(ctx: &Context, args: &QueryArgs, opts: &OutputOptions) -> Result<()> {
    let snapshot = ctx.snapshot()?;
    let basis = ctx.app.basis();
    let resolver = TieredPricingResolver::new(&snapshot, basis);
    let tokens = args.tokens();
    let Some(tier) = resolver.resolve(&args.model, tokens) else {
        bail!(
            "No tier rule applies to '{}' at {} input / {} output tokens; it is billed at its flat price",
            args.model,
            tokens.input,
            tokens.output
        );
    };
    let group_ratio = lookup_group_ratio(&ctx.app.group_ratios, &args.group);
    let charge = quota::charge(&tier.pricing, tokens, basis, group_ratio)
        .with_context(|| format!("Failed to compute the charge for '{}'", args.model))?;

    match opts.format {
        OutputFormat::Text => println!(
            "{}",
            renderer::render_charge(&args.model, tokens, &tier, &charge, opts.use_color)
        ),
        OutputFormat::Json => opts.print_json(&CostPayload {
            model: &args.model,
            group: &args.group,
            group_ratio,
            tokens,
            tier,
            charge,
        })?,
    }
    Ok(())
}

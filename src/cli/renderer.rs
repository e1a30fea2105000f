use colored::{control, Colorize};

use tierprice::core::formatter::{
    describe_conditions, format_price, format_ratio, format_rule_values, format_thousands,
    format_token_range, format_unit_price, pricing_mode_label,
};
use tierprice::core::models::price::{EffectivePrice, GroupPriceRow, TierPriceResult, TokenCounts};
use tierprice::core::models::tier::{ModelTierConfig, RulePricing, TokenTierPricingConfig};
use tierprice::core::pricing::quota::QuotaCharge;
use tierprice::core::pricing::units::{output_ratio_from_prices, PriceBasis, TokenUnit};

/// Price summary of one model for one group.
///
/// ```text
///  gpt-4o (default, 1.00x)
///   Tier      long_context / T3_input_32k_to_128k
///   Input     $1.2000 / 1M
///   Output    $1.2000 / 1M
/// ```
pub fn render_effective_price(
    model: &str,
    group: &str,
    group_ratio: f64,
    price: &EffectivePrice,
    unit: TokenUnit,
    use_color: bool,
) -> String {
    control::set_override(use_color);

    let mut lines = vec![format!(" {} ({}, {})", model, group, format_ratio(group_ratio))
        .bold()
        .to_string()];
    match price {
        EffectivePrice::Tiered {
            config,
            rule,
            input,
            output,
        } => {
            lines.push(format!("  {}      {} / {}", "Tier".cyan(), config, rule));
            push_token_prices(&mut lines, *input, *output, unit);
        }
        EffectivePrice::Metered { input, output } => {
            lines.push(format!("  {}      {}", "Tier".cyan(), "flat".dimmed()));
            push_token_prices(&mut lines, *input, *output, unit);
        }
        EffectivePrice::PerCall { price } => {
            lines.push(format!(
                "  {}  {} / call",
                "Per call".cyan(),
                format_price(*price).green()
            ));
        }
    }
    lines.join("\n")
}

fn push_token_prices(lines: &mut Vec<String>, input: f64, output: f64, unit: TokenUnit) {
    lines.push(format!(
        "  {}     {} / {}",
        "Input".cyan(),
        format_price(input).green(),
        unit.label()
    ));
    lines.push(format!(
        "  {}    {} / {}",
        "Output".cyan(),
        format_price(output).green(),
        unit.label()
    ));
}

/// Rule table of one config: name, condition, mode, input and output.
pub fn render_tier_rules(
    name: &str,
    config: &ModelTierConfig,
    unit: TokenUnit,
    use_color: bool,
) -> String {
    control::set_override(use_color);

    let state = if config.enabled {
        "enabled".green()
    } else {
        "disabled".red()
    };
    let mut lines = vec![
        format!(" {} (priority {}, {})", name.bold(), config.priority, state),
        format!("  {}    {}", "Models".cyan(), config.models),
    ];
    if config.rules.is_empty() {
        lines.push(format!("  {}", "No rules".dimmed()));
        return lines.join("\n");
    }

    let rows: Vec<[String; 5]> = config
        .rules
        .iter()
        .map(|rule| {
            let (input, output) = format_rule_values(&rule.pricing, unit);
            [
                rule.name.clone(),
                describe_conditions(&rule.bounds, unit),
                pricing_mode_label(&rule.pricing).to_string(),
                input,
                output,
            ]
        })
        .collect();
    let header = ["Rule", "Condition", "Mode", "Input", "Output"];
    lines.extend(render_table(&header, &rows));
    lines.join("\n")
}

/// Per-group prices of one model.
pub fn render_group_table(
    model: &str,
    rows: &[GroupPriceRow],
    unit: TokenUnit,
    use_color: bool,
) -> String {
    control::set_override(use_color);

    let mut lines = vec![format!(" {}", model.bold())];
    if rows.is_empty() {
        lines.push(format!("  {}", "Not available to any group".dimmed()));
        return lines.join("\n");
    }

    let table: Vec<[String; 5]> = rows
        .iter()
        .map(|row| {
            let (source, input, output) = match &row.price {
                EffectivePrice::Tiered {
                    rule,
                    input,
                    output,
                    ..
                } => (rule.clone(), format_price(*input), format_price(*output)),
                EffectivePrice::Metered { input, output } => {
                    ("flat".to_string(), format_price(*input), format_price(*output))
                }
                EffectivePrice::PerCall { price } => {
                    ("per call".to_string(), format_price(*price), "-".to_string())
                }
            };
            [
                row.group.clone(),
                format_ratio(row.ratio),
                source,
                input,
                output,
            ]
        })
        .collect();
    let input_header = format!("Input/{}", unit.label());
    let output_header = format!("Output/{}", unit.label());
    let header = [
        "Group",
        "Ratio",
        "Source",
        input_header.as_str(),
        output_header.as_str(),
    ];
    lines.extend(render_table(&header, &table));
    lines.join("\n")
}

/// Quota charged for one request.
pub fn render_charge(
    model: &str,
    tokens: TokenCounts,
    result: &TierPriceResult,
    charge: &QuotaCharge,
    use_color: bool,
) -> String {
    control::set_override(use_color);

    [
        format!(" {}", model.bold()),
        format!(
            "  {}    {} in / {} out",
            "Tokens".cyan(),
            format_thousands(tokens.input),
            format_thousands(tokens.output)
        ),
        format!(
            "  {}      {} / {} ({})",
            "Tier".cyan(),
            result.config_name,
            result.rule_name,
            pricing_mode_label(&result.pricing)
        ),
        format!("  {}     {}", "Quota".cyan(), charge.quota.round_dp(2)),
        format!(
            "  {}      {}",
            "Cost".cyan(),
            format!("${}", charge.usd.round_dp(6)).green()
        ),
    ]
    .join("\n")
}

/// All tier configs, highest priority first.
pub fn render_config_list(config: &TokenTierPricingConfig, use_color: bool) -> String {
    control::set_override(use_color);

    let switch = if config.global_enabled {
        "on".green()
    } else {
        "off".red()
    };
    let mut lines = vec![format!(" {} {}", "Tiered pricing".bold(), switch)];
    if config.model_configs.is_empty() {
        lines.push(format!("  {}", "No tier configs".dimmed()));
        return lines.join("\n");
    }

    let mut entries: Vec<_> = config.model_configs.iter().collect();
    entries.sort_by(|a, b| b.1.priority.cmp(&a.1.priority));
    let rows: Vec<[String; 5]> = entries
        .into_iter()
        .map(|(name, c)| {
            [
                name.clone(),
                c.priority.to_string(),
                if c.enabled { "yes" } else { "no" }.to_string(),
                c.rules.len().to_string(),
                c.models.to_string(),
            ]
        })
        .collect();
    let header = ["Config", "Priority", "Enabled", "Rules", "Models"];
    lines.extend(render_table(&header, &rows));
    lines.join("\n")
}

/// Rule editor view: raw token ranges, stored values and the equivalent
/// value in the other pricing mode.
pub fn render_rule_editor(
    name: &str,
    config: &ModelTierConfig,
    basis: PriceBasis,
    use_color: bool,
) -> String {
    control::set_override(use_color);

    let mut lines = vec![format!(" {} ({} rules)", name.bold(), config.rules.len())];
    let rows: Vec<[String; 5]> = config
        .rules
        .iter()
        .enumerate()
        .map(|(i, rule)| {
            let (stored, equivalent) = match rule.pricing {
                RulePricing::Ratio { input_ratio, .. } => {
                    let output_ratio = rule.pricing.effective_output_ratio().unwrap_or_default();
                    (
                        format!("{} / {}", format_ratio(input_ratio), format_ratio(output_ratio)),
                        format!(
                            "{} / {}",
                            format_unit_price(basis.price_from_ratio(input_ratio), TokenUnit::M),
                            format_unit_price(basis.price_from_ratio(output_ratio), TokenUnit::M)
                        ),
                    )
                }
                RulePricing::Absolute {
                    input_price,
                    output_price,
                } => (
                    format!(
                        "{} / {}",
                        format_unit_price(input_price, TokenUnit::M),
                        format_unit_price(output_price, TokenUnit::M)
                    ),
                    format!(
                        "{} (completion {})",
                        format_ratio(basis.ratio_from_price(input_price)),
                        format_ratio(output_ratio_from_prices(input_price, output_price))
                    ),
                ),
            };
            [
                format!("{}. {}", i + 1, rule.name),
                format_token_range(rule.bounds.min_input, rule.bounds.max_input),
                format_token_range(rule.bounds.min_output, rule.bounds.max_output),
                stored,
                equivalent,
            ]
        })
        .collect();
    let header = ["Rule", "Input tokens", "Output tokens", "In / Out", "Equivalent"];
    lines.extend(render_table(&header, &rows));
    lines.join("\n")
}

/// Left-aligned columns with a cyan header row. Cells are padded before
/// they are colored so ANSI codes do not skew the widths.
fn render_table<const N: usize>(header: &[&str; N], rows: &[[String; N]]) -> Vec<String> {
    let mut widths = header.map(str::len);
    for row in rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }
    let pad = |cells: Vec<String>| -> Vec<String> {
        cells
            .into_iter()
            .zip(widths)
            .map(|(cell, w)| format!("{:<w$}", cell, w = w))
            .collect()
    };

    let head = pad(header.iter().map(|h| h.to_string()).collect());
    let mut lines = vec![format!("  {}", head.join("  ").trim_end().cyan())];
    for row in rows {
        lines.push(format!("  {}", pad(row.to_vec()).join("  ").trim_end()));
    }
    lines
}

use crate::core::models::tier::{RulePricing, TokenBounds};
use crate::core::pricing::units::TokenUnit;

/// Returns "$0.8000".
pub fn format_price(usd: f64) -> String {
    format!("${:.4}", usd)
}

/// Returns "1.25x".
pub fn format_ratio(ratio: f64) -> String {
    format!("{:.2}x", ratio)
}

/// Returns "$0.000002 / 1K" for rule tables, where prices need more precision.
pub fn format_unit_price(usd: f64, unit: TokenUnit) -> String {
    format!("${:.6} / {}", usd, unit.label())
}

/// Token count in display units: "32K", "0.128M", or the raw count when it
/// is below one unit.
pub fn format_tokens(tokens: u64, unit: TokenUnit) -> String {
    let per_unit = unit.tokens();
    if tokens < per_unit {
        return tokens.to_string();
    }
    let value = tokens as f64 / per_unit as f64;
    match unit {
        TokenUnit::K => format!("{:.0}K", value),
        TokenUnit::M => format!("{:.3}M", value),
    }
}

/// Returns "1,234,567".
pub fn format_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// One bound pair as shown in the rule editor: "unlimited", "<= 32,000",
/// ">= 128,001" or "32,001 - 128,000".
pub fn format_token_range(min: u64, max: u64) -> String {
    match (min, max) {
        (0, 0) => "unlimited".to_string(),
        (0, max) => format!("<= {}", format_thousands(max)),
        (min, 0) => format!(">= {}", format_thousands(min)),
        (min, max) => format!("{} - {}", format_thousands(min), format_thousands(max)),
    }
}

fn describe_side(label: &str, min: u64, max: u64, unit: TokenUnit) -> Option<String> {
    if max > 0 {
        if min > 0 {
            Some(format!(
                "{} <= {} <= {}",
                format_tokens(min, unit),
                label,
                format_tokens(max, unit)
            ))
        } else {
            Some(format!("{} <= {}", label, format_tokens(max, unit)))
        }
    } else if min > 0 {
        Some(format!("{} >= {}", label, format_tokens(min, unit)))
    } else {
        None
    }
}

/// Human-readable trigger of a rule, e.g. "input <= 32K & output >= 201".
pub fn describe_conditions(bounds: &TokenBounds, unit: TokenUnit) -> String {
    let parts: Vec<String> = [
        describe_side("input", bounds.min_input, bounds.max_input, unit),
        describe_side("output", bounds.min_output, bounds.max_output, unit),
    ]
    .into_iter()
    .flatten()
    .collect();
    if parts.is_empty() {
        "default".to_string()
    } else {
        parts.join(" & ")
    }
}

/// "price" or "ratio".
pub fn pricing_mode_label(pricing: &RulePricing) -> &'static str {
    match pricing {
        RulePricing::Absolute { .. } => "price",
        RulePricing::Ratio { .. } => "ratio",
    }
}

/// Input and output cells of a rule table row: USD per unit for price
/// rules, multipliers for ratio rules.
pub fn format_rule_values(pricing: &RulePricing, unit: TokenUnit) -> (String, String) {
    match *pricing {
        RulePricing::Absolute {
            input_price,
            output_price,
        } => (
            format_unit_price(input_price, unit),
            format_unit_price(output_price, unit),
        ),
        RulePricing::Ratio { input_ratio, .. } => (
            format_ratio(input_ratio),
            format_ratio(pricing.effective_output_ratio().unwrap_or_default()),
        ),
    }
}

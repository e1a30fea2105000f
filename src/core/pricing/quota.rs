use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use crate::core::models::price::TokenCounts;
use crate::core::models::tier::RulePricing;
use crate::core::pricing::units::PriceBasis;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaError {
    #[error("Quota for {input} input / {output} output tokens is too large to represent")]
    Overflow { input: u64, output: u64 },
}

/// Quota charged for a request and its USD value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaCharge {
    pub quota: Decimal,
    pub usd: Decimal,
}

fn decimal(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or_default()
}

/// Product of all `factors`, or `None` on overflow.
fn product(factors: &[Decimal]) -> Option<Decimal> {
    factors
        .iter()
        .try_fold(Decimal::ONE, |acc, factor| acc.checked_mul(*factor))
}

/// Any request that consumed tokens costs at least one quota unit.
fn with_minimum(tokens: TokenCounts, quota: Option<Decimal>) -> Result<Decimal, QuotaError> {
    let quota = quota.ok_or(QuotaError::Overflow {
        input: tokens.input,
        output: tokens.output,
    })?;
    if !tokens.is_empty() && quota < Decimal::ONE {
        return Ok(Decimal::ONE);
    }
    Ok(quota)
}

/// Quota for an absolute-price rule (prices in USD per 1M tokens).
pub fn quota_by_tier_price(
    tokens: TokenCounts,
    input_price: f64,
    output_price: f64,
    quota_per_unit: Decimal,
    group_ratio: Decimal,
) -> Result<Decimal, QuotaError> {
    let million = Decimal::from(1_000_000u64);
    let side = |count: u64, price: f64| {
        product(&[Decimal::from(count), decimal(price)])?
            .checked_div(million)
            .and_then(|per_million| product(&[per_million, quota_per_unit, group_ratio]))
    };
    let total = side(tokens.input, input_price)
        .zip(side(tokens.output, output_price))
        .and_then(|(input, output)| input.checked_add(output));
    with_minimum(tokens, total)
}

/// Quota for a ratio rule; `output_ratio` is the effective output multiplier.
pub fn quota_by_tier_ratio(
    tokens: TokenCounts,
    input_ratio: f64,
    output_ratio: f64,
    group_ratio: Decimal,
) -> Result<Decimal, QuotaError> {
    let input = product(&[Decimal::from(tokens.input), decimal(input_ratio), group_ratio]);
    let output = product(&[Decimal::from(tokens.output), decimal(output_ratio), group_ratio]);
    let total = input
        .zip(output)
        .and_then(|(input, output)| input.checked_add(output));
    with_minimum(tokens, total)
}

/// Output multiplier used for billing. Unlike display, billing treats a
/// `completion_ratio` of 0 as 1.0 unless an explicit `output_ratio` is set.
fn billed_output_ratio(pricing: &RulePricing) -> f64 {
    match *pricing {
        RulePricing::Ratio {
            input_ratio,
            completion_ratio,
            output_ratio: None,
        } if completion_ratio == 0.0 => input_ratio,
        _ => pricing.effective_output_ratio().unwrap_or_default(),
    }
}

/// Charge a request under a resolved rule's pricing.
pub fn charge(
    pricing: &RulePricing,
    tokens: TokenCounts,
    basis: PriceBasis,
    group_ratio: f64,
) -> Result<QuotaCharge, QuotaError> {
    let quota_per_unit = Decimal::from(basis.quota_per_unit());
    let group_ratio = decimal(group_ratio);
    let quota = match *pricing {
        RulePricing::Absolute {
            input_price,
            output_price,
        } => quota_by_tier_price(tokens, input_price, output_price, quota_per_unit, group_ratio)?,
        RulePricing::Ratio { input_ratio, .. } => quota_by_tier_ratio(
            tokens,
            input_ratio,
            billed_output_ratio(pricing),
            group_ratio,
        )?,
    };
    Ok(QuotaCharge {
        quota,
        usd: quota.checked_div(quota_per_unit).unwrap_or_default(),
    })
}

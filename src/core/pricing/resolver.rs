use tracing::debug;

use crate::core::models::model::{lookup_group_ratio, GroupRatioTable, ModelPriceRecord, QuotaType};
use crate::core::models::price::{
    EffectivePrice, GroupPriceRow, TierPrice, TierPriceResult, TokenCounts,
};
use crate::core::models::tier::{RulePricing, TierRule, TokenTierPricingConfig};
use crate::core::pricing::matcher::{find_matching_config, find_matching_rule, MatchedConfig};
use crate::core::pricing::units::{PriceBasis, TokenUnit};

/// Groups that never get a row in a model's price table.
const HIDDEN_GROUPS: &[&str] = &["", "auto"];

/// Price of one rule for a group, in USD per `unit`.
///
/// Absolute rules scale their USD/1M prices; ratio rules are converted
/// through the ratio base price first.
pub fn compute_tier_price(
    rule: &TierRule,
    basis: PriceBasis,
    group_ratio: f64,
    unit: TokenUnit,
) -> TierPrice {
    let divisor = unit.price_divisor();
    match rule.pricing {
        RulePricing::Absolute {
            input_price,
            output_price,
        } => TierPrice {
            input: input_price * group_ratio / divisor,
            output: output_price * group_ratio / divisor,
        },
        RulePricing::Ratio { input_ratio, .. } => {
            let base = basis.ratio_base_price();
            let output_ratio = rule.pricing.effective_output_ratio().unwrap_or_default();
            TierPrice {
                input: input_ratio * base * group_ratio / divisor,
                output: output_ratio * base * group_ratio / divisor,
            }
        }
    }
}

/// Resolves prices against one immutable tier configuration snapshot.
#[derive(Debug, Clone, Copy)]
pub struct TieredPricingResolver<'a> {
    config: &'a TokenTierPricingConfig,
    basis: PriceBasis,
}

impl<'a> TieredPricingResolver<'a> {
    pub fn new(config: &'a TokenTierPricingConfig, basis: PriceBasis) -> Self {
        Self { config, basis }
    }

    pub fn basis(&self) -> PriceBasis {
        self.basis
    }

    pub fn find_config(&self, model_name: &str) -> Option<MatchedConfig<'a>> {
        let matched = find_matching_config(model_name, self.config);
        match &matched {
            Some(m) => debug!(model = model_name, config = m.name, "tier config matched"),
            None => debug!(model = model_name, "no tier config applies"),
        }
        matched
    }

    /// The config and rule that apply to a request, or `None` when flat
    /// pricing should be used.
    pub fn resolve(&self, model_name: &str, tokens: TokenCounts) -> Option<TierPriceResult> {
        let matched = self.find_config(model_name)?;
        let rule = find_matching_rule(&matched.config.rules, tokens.input, tokens.output);
        let Some(rule) = rule else {
            debug!(
                model = model_name,
                config = matched.name,
                input_tokens = tokens.input,
                output_tokens = tokens.output,
                "no tier rule admits request"
            );
            return None;
        };
        debug!(config = matched.name, rule = %rule.name, "tier rule matched");
        Some(TierPriceResult {
            config_name: matched.name.to_string(),
            rule_name: rule.name.clone(),
            pricing: rule.pricing,
        })
    }

    pub fn compute_tier_price(&self, rule: &TierRule, group_ratio: f64, unit: TokenUnit) -> TierPrice {
        compute_tier_price(rule, self.basis, group_ratio, unit)
    }

    /// Price of `record` for a group: per-call price, the matching tier
    /// rule, or the model's flat metered price.
    pub fn compute_effective_price(
        &self,
        record: &ModelPriceRecord,
        group_ratio: f64,
        unit: TokenUnit,
        tokens: TokenCounts,
    ) -> EffectivePrice {
        if record.quota_type == QuotaType::PerCall {
            return EffectivePrice::PerCall {
                price: record.model_price * group_ratio,
            };
        }

        if let Some(matched) = self.find_config(&record.model_name) {
            if let Some(rule) = find_matching_rule(&matched.config.rules, tokens.input, tokens.output)
            {
                let price = self.compute_tier_price(rule, group_ratio, unit);
                return EffectivePrice::Tiered {
                    config: matched.name.to_string(),
                    rule: rule.name.clone(),
                    input: price.input,
                    output: price.output,
                };
            }
        }

        let input = record.model_ratio * self.basis.ratio_base_price() * group_ratio
            / unit.price_divisor();
        EffectivePrice::Metered {
            input,
            output: input * record.completion_ratio,
        }
    }

    /// One row per group the model is enabled for and the table prices.
    /// A model with no `enable_groups` is shown for every group.
    pub fn group_prices(
        &self,
        record: &ModelPriceRecord,
        groups: &GroupRatioTable,
        unit: TokenUnit,
        tokens: TokenCounts,
    ) -> Vec<GroupPriceRow> {
        groups
            .keys()
            .filter(|g| !HIDDEN_GROUPS.contains(&g.as_str()))
            .filter(|g| record.enable_groups.is_empty() || record.enable_groups.contains(g))
            .map(|group| {
                let ratio = lookup_group_ratio(groups, group);
                GroupPriceRow {
                    group: group.clone(),
                    ratio,
                    price: self.compute_effective_price(record, ratio, unit, tokens),
                }
            })
            .collect()
    }
}
